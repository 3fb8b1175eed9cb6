//! Browser surface consumed by the capture and re-crawl workflows.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Chromium's error text for a navigation that received a response carrying
/// an error status but no renderable body.
pub const CODED_RESPONSE_FAILURE: &str = "ERR_HTTP_RESPONSE_CODE_FAILURE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    DomContentLoaded,
    Load,
}

/// One request issued during a navigation. `redirected_from` points at the
/// request whose response redirected to this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigatedRequest {
    pub url: String,
    pub redirected_from: Option<Arc<NavigatedRequest>>,
}

impl NavigatedRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            redirected_from: None,
        }
    }

    /// Builds the terminal request of a chain given its URLs oldest first.
    pub fn from_hops<I, S>(hops: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut current: Option<Self> = None;
        for url in hops {
            current = Some(Self {
                url: url.into(),
                redirected_from: current.map(Arc::new),
            });
        }
        current
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResponse {
    pub status: u16,
    pub url: String,
    /// Absent when the driver could not associate the response with a request.
    pub request: Option<NavigatedRequest>,
}

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("navigation to {url} timed out after {}ms", after.as_millis())]
    Timeout { url: String, after: Duration },
    #[error("HTTP error: status={status}")]
    HttpStatus { url: String, status: u16 },
    #[error("navigation to {url} failed: {message}")]
    Protocol { url: String, message: String },
    #[error("no response received for {url}")]
    NoResponse { url: String },
    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

impl NavigationError {
    /// True when the driver reports that a response with an error status
    /// arrived, as opposed to the navigation never reaching a server.
    pub fn is_coded_response_failure(&self) -> bool {
        match self {
            Self::HttpStatus { .. } => true,
            Self::Protocol { message, .. } => message.contains(CODED_RESPONSE_FAILURE),
            _ => false,
        }
    }
}

/// A single browser page shared across a whole run. Every call suspends the
/// caller until the browser answers; callers never issue calls concurrently.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
        wait_until: WaitUntil,
    ) -> Result<NavigationResponse, NavigationError>;

    /// Serialized DOM of the current page.
    async fn content(&mut self) -> anyhow::Result<String>;

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> anyhow::Result<()>;

    /// Resolves once the page's visible text no longer contains `text`.
    async fn wait_for_text_to_disappear(
        &mut self,
        text: &str,
        timeout: Duration,
    ) -> anyhow::Result<()>;

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration)
    -> anyhow::Result<()>;

    async fn pause(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_hops_links_back_to_origin() {
        let last = NavigatedRequest::from_hops(["a", "b", "c"]).expect("terminal request");
        assert_eq!(last.url, "c");
        let middle = last.redirected_from.as_deref().expect("middle hop");
        assert_eq!(middle.url, "b");
        let first = middle.redirected_from.as_deref().expect("first hop");
        assert_eq!(first.url, "a");
        assert!(first.redirected_from.is_none());
    }

    #[test]
    fn coded_response_failures_are_recognized() {
        let coded = NavigationError::Protocol {
            url: "http://example.com".to_owned(),
            message: "net::ERR_HTTP_RESPONSE_CODE_FAILURE".to_owned(),
        };
        let refused = NavigationError::Protocol {
            url: "http://example.com".to_owned(),
            message: "net::ERR_CONNECTION_REFUSED".to_owned(),
        };
        let timeout = NavigationError::Timeout {
            url: "http://example.com".to_owned(),
            after: Duration::from_secs(1),
        };
        assert!(coded.is_coded_response_failure());
        assert!(!refused.is_coded_response_failure());
        assert!(!timeout.is_coded_response_failure());
    }
}
