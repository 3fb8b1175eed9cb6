//! Redirect chain reconstruction and domain loop-back detection.

use crate::driver::{NavigatedRequest, NavigationResponse};
use crate::rules::{DomainRules, netloc_of};

/// Separator between ordinary redirect hops.
pub const REDIRECT_ARROW: &str = " → ";
/// Separator in front of a hop produced by re-applying domain substitution.
pub const REPLACEMENT_ARROW: &str = " ⇒ ";

/// Every URL visited by one navigation, oldest first. An empty chain means
/// the navigation was not redirected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectChain {
    hops: Vec<String>,
}

impl RedirectChain {
    pub fn new(hops: Vec<String>) -> Self {
        Self { hops }
    }

    pub fn hops(&self) -> &[String] {
        &self.hops
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.hops.last().map(String::as_str)
    }

    pub fn serialize(&self) -> String {
        self.hops.join(REDIRECT_ARROW)
    }
}

/// Walks the `redirected_from` links of the response's request back to the
/// origin. `None` when the response carries no request to walk.
pub fn reconstruct(response: &NavigationResponse) -> Option<RedirectChain> {
    let request = response.request.as_ref()?;
    if request.redirected_from.is_none() {
        return Some(RedirectChain::default());
    }

    let mut hops = Vec::new();
    let mut current: Option<&NavigatedRequest> = Some(request);
    while let Some(req) = current {
        hops.push(req.url.clone());
        current = req.redirected_from.as_deref();
    }
    hops.reverse();
    Some(RedirectChain::new(hops))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopCheck {
    /// The chain ended back on the pre-substitution domain; navigate to the
    /// re-substituted target once more.
    LoopedBack { candidate: String },
    NoLoop,
}

impl LoopCheck {
    pub fn candidate(&self) -> Option<&str> {
        match self {
            Self::LoopedBack { candidate } => Some(candidate),
            Self::NoLoop => None,
        }
    }
}

/// Decides whether `chain` drifted back onto the domain `original_url` was
/// substituted away from.
pub fn detect(chain: &RedirectChain, original_url: &str, rules: &DomainRules) -> LoopCheck {
    let Some(last) = chain.last() else {
        return LoopCheck::NoLoop;
    };
    let Some(original_netloc) = netloc_of(original_url) else {
        return LoopCheck::NoLoop;
    };
    let Some(rule) = rules.matching_rule(&original_netloc) else {
        return LoopCheck::NoLoop;
    };
    let Some(last_netloc) = netloc_of(last) else {
        return LoopCheck::NoLoop;
    };
    if !last_netloc.contains(&rule.original) {
        return LoopCheck::NoLoop;
    }

    match rules.apply(last) {
        Ok(candidate) if candidate != last => LoopCheck::LoopedBack { candidate },
        Ok(_) => LoopCheck::NoLoop,
        Err(err) => {
            tracing::warn!(url = last, %err, "could not re-substitute redirect target");
            LoopCheck::NoLoop
        }
    }
}

/// Appends the re-substituted hop to a serialized chain.
pub fn append_replacement_hop(serialized: &str, candidate: &str) -> String {
    if serialized.is_empty() {
        format!("{REPLACEMENT_ARROW}{candidate}")
    } else {
        format!("{serialized}{REPLACEMENT_ARROW}{candidate}")
    }
}
