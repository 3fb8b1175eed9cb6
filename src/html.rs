use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

/// Which discovered links are worth following.
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    pub allowed_domains: Vec<String>,
    pub skip_link_keywords: Vec<String>,
    pub skip_url_patterns: Vec<String>,
    pub skip_extensions: Vec<String>,
}

impl LinkFilter {
    fn skips_anchor_text(&self, text: &str) -> bool {
        self.skip_link_keywords
            .iter()
            .any(|keyword| !keyword.is_empty() && text.contains(keyword.as_str()))
    }

    fn skips_url(&self, url: &Url) -> bool {
        let raw = url.as_str();
        if self
            .skip_url_patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && raw.contains(pattern.as_str()))
        {
            return true;
        }

        if !self.allowed_domains.is_empty() {
            let netloc = crate::rules::netloc(url);
            if !self
                .allowed_domains
                .iter()
                .any(|domain| netloc.ends_with(domain.as_str()))
            {
                return true;
            }
        }

        let lower = raw.to_ascii_lowercase();
        self.skip_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    pub url: String,
    pub anchor_html: String,
}

pub fn extract_title(html: &str) -> String {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_owned())
        .unwrap_or_default()
}

/// Unique followable links of a page in document order, resolved against
/// `<base href>` when present and `base_url` otherwise.
pub fn extract_unique_links(html: &str, base_url: &str, filter: &LinkFilter) -> Vec<DiscoveredLink> {
    let doc = Html::parse_document(html);
    let (Ok(anchor_sel), Ok(base_sel)) = (Selector::parse("a[href]"), Selector::parse("base[href]"))
    else {
        return Vec::new();
    };

    let page_base = Url::parse(base_url).ok();
    let base = doc
        .select(&base_sel)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| match &page_base {
            Some(page_base) => page_base.join(href).ok(),
            None => Url::parse(href).ok(),
        })
        .or(page_base);
    let Some(base) = base else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in doc.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        let text = anchor.text().collect::<String>();
        if filter.skips_anchor_text(text.trim()) {
            continue;
        }

        if is_non_navigational(href) {
            continue;
        }

        let Ok(mut resolved) = base.join(href.trim()) else {
            continue;
        };
        resolved.set_fragment(None);
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        if filter.skips_url(&resolved) {
            continue;
        }

        let url = resolved.to_string();
        if seen.insert(url.clone()) {
            links.push(DiscoveredLink {
                url,
                anchor_html: anchor.html(),
            });
        }
    }
    links
}

fn is_non_navigational(href: &str) -> bool {
    let scheme = href
        .trim()
        .split_once(':')
        .map(|(scheme, _)| scheme.to_ascii_lowercase());
    matches!(scheme.as_deref(), Some("mailto" | "tel" | "javascript"))
}
