use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("parse url {url:?}: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("substituted network location {netloc:?} is not valid for {url}")]
    InvalidNetloc { url: String, netloc: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRule {
    pub original: String,
    pub replacement: String,
}

/// Ordered `original fragment -> replacement fragment` pairs; the first
/// fragment found in a URL's network location wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainRules {
    rules: Vec<DomainRule>,
}

impl DomainRules {
    pub fn new<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let rules = pairs
            .into_iter()
            .map(|(original, replacement)| DomainRule {
                original: original.into(),
                replacement: replacement.into(),
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// First rule whose original fragment occurs in `netloc`.
    pub fn matching_rule(&self, netloc: &str) -> Option<&DomainRule> {
        self.rules
            .iter()
            .find(|rule| !rule.original.is_empty() && netloc.contains(&rule.original))
    }

    /// Rewrites the network location of `url` with the first matching rule.
    /// Everything outside the network location is kept as written, and URLs
    /// without a matching rule come back byte-for-byte unchanged.
    pub fn apply(&self, url: &str) -> Result<String, RuleError> {
        if self.rules.is_empty() {
            return Ok(url.to_owned());
        }

        Url::parse(url).map_err(|source| RuleError::Parse {
            url: url.to_owned(),
            source,
        })?;
        let Some((start, end)) = authority_span(url) else {
            return Ok(url.to_owned());
        };
        let authority = &url[start..end];
        let Some(rule) = self.matching_rule(authority) else {
            return Ok(url.to_owned());
        };

        let replaced = authority.replacen(&rule.original, &rule.replacement, 1);
        let rebuilt = format!("{}{replaced}{}", &url[..start], &url[end..]);
        match Url::parse(&rebuilt) {
            Ok(parsed) if parsed.host_str().is_some_and(|host| !host.is_empty()) => Ok(rebuilt),
            _ => Err(RuleError::InvalidNetloc {
                url: url.to_owned(),
                netloc: replaced,
            }),
        }
    }
}

/// Byte range of the raw network location: after `://`, up to the next
/// `/`, `?` or `#`.
fn authority_span(url: &str) -> Option<(usize, usize)> {
    let start = url.find("://")? + 3;
    let end = url[start..]
        .find(['/', '?', '#'])
        .map_or(url.len(), |offset| start + offset);
    Some((start, end))
}

/// `host[:port]` of a parsed URL, empty for URLs without a host.
pub fn netloc(url: &Url) -> String {
    let Some(host) = url.host_str() else {
        return String::new();
    };
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    }
}

/// Network location of a raw URL string, `None` when it does not parse.
pub fn netloc_of(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|parsed| netloc(&parsed))
}

impl<'de> Deserialize<'de> for DomainRules {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RulesVisitor;

        impl<'de> Visitor<'de> for RulesVisitor {
            type Value = DomainRules;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of original domain fragments to replacements")
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(DomainRules::default())
            }

            fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut rules = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((original, replacement)) =
                    access.next_entry::<String, String>()?
                {
                    rules.push(DomainRule {
                        original,
                        replacement,
                    });
                }
                Ok(DomainRules { rules })
            }
        }

        deserializer.deserialize_any(RulesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> DomainRules {
        DomainRules::new([
            ("old.example.com", "new.example.com"),
            ("example.com", "example.org"),
        ])
    }

    #[test]
    fn non_matching_url_is_returned_unchanged() -> anyhow::Result<()> {
        let url = "https://other.test/path?q=1#frag";
        assert_eq!(rules().apply(url)?, url);
        Ok(())
    }

    #[test]
    fn empty_rule_set_is_identity_even_for_garbage() -> anyhow::Result<()> {
        assert_eq!(DomainRules::default().apply("not a url")?, "not a url");
        Ok(())
    }

    #[test]
    fn first_configured_match_wins() -> anyhow::Result<()> {
        let out = rules().apply("http://old.example.com/a")?;
        assert_eq!(out, "http://new.example.com/a");
        Ok(())
    }

    #[test]
    fn only_network_location_is_rewritten() -> anyhow::Result<()> {
        let out = rules().apply("https://shop.example.com:8443/example.com/x?next=example.com#example.com")?;
        assert_eq!(
            out,
            "https://shop.example.org:8443/example.com/x?next=example.com#example.com"
        );
        Ok(())
    }

    #[test]
    fn replacement_may_introduce_a_port() -> anyhow::Result<()> {
        let rules = DomainRules::new([("prod.example.com", "localhost:8080")]);
        assert_eq!(
            rules.apply("http://prod.example.com/a")?,
            "http://localhost:8080/a"
        );
        Ok(())
    }

    #[test]
    fn unparseable_url_with_rules_is_an_error() {
        let err = rules().apply("/relative/only").unwrap_err();
        assert!(matches!(err, RuleError::Parse { .. }));
    }

    #[test]
    fn yaml_mapping_keeps_configured_order() -> anyhow::Result<()> {
        let yaml = "example.com: first.test\nold.example.com: second.test\n";
        let rules: DomainRules = serde_yaml::from_str(yaml)?;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.apply("http://old.example.com/a")?, "http://old.first.test/a");
        Ok(())
    }

    #[test]
    fn path_and_query_keep_their_raw_text() -> anyhow::Result<()> {
        let out = rules().apply("http://old.example.com/a b?q=日本")?;
        assert_eq!(out, "http://new.example.com/a b?q=日本");
        Ok(())
    }

    #[test]
    fn bare_origin_gains_no_trailing_slash() -> anyhow::Result<()> {
        assert_eq!(rules().apply("http://old.example.com")?, "http://new.example.com");
        assert_eq!(
            rules().apply("http://old.example.com?x=1")?,
            "http://new.example.com?x=1"
        );
        Ok(())
    }

    #[test]
    fn explicit_default_port_is_kept() -> anyhow::Result<()> {
        assert_eq!(
            rules().apply("http://old.example.com:80/a")?,
            "http://new.example.com:80/a"
        );
        Ok(())
    }

    #[test]
    fn replacement_yielding_no_host_is_rejected() {
        let rules = DomainRules::new([("old.example.com", "bad host")]);
        let err = rules.apply("http://old.example.com/a").unwrap_err();
        assert!(matches!(err, RuleError::InvalidNetloc { .. }));
    }
}
