use std::fmt;

/// Columns written by a breadth-first crawl, in ledger order.
pub const CRAWL_FIELDS: [&str; 12] = [
    "url",
    "redirect_chain",
    "from_url",
    "case_id",
    "depth",
    "title",
    "status_code",
    "content_length",
    "link_count",
    "crawled_at",
    "error_message",
    "anchor_html",
];

/// Columns appended by the domain-replacement re-crawl, in ledger order.
pub const REPLACEMENT_FIELDS: [&str; 8] = [
    "url_r1",
    "redirect_chain_r1",
    "title_r1",
    "status_code_r1",
    "content_length_r1",
    "link_count_r1",
    "crawled_at_r1",
    "error_message_r1",
];

pub const ERROR_STATUS: &str = "ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCell {
    Code(u16),
    Error,
}

impl StatusCell {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == ERROR_STATUS {
            return Some(Self::Error);
        }
        raw.parse().ok().map(Self::Code)
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for StatusCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Error => f.write_str(ERROR_STATUS),
        }
    }
}

/// Timestamp format used for `crawled_at` cells.
pub fn ledger_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRecord {
    pub url: String,
    pub redirect_chain: String,
    pub from_url: String,
    pub case_id: String,
    pub depth: u32,
    pub title: String,
    pub status: StatusCell,
    pub content_length: usize,
    pub link_count: usize,
    pub crawled_at: String,
    pub error_message: String,
    pub anchor_html: String,
}

impl CrawlRecord {
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("url", self.url.clone()),
            ("redirect_chain", self.redirect_chain.clone()),
            ("from_url", self.from_url.clone()),
            ("case_id", self.case_id.clone()),
            ("depth", self.depth.to_string()),
            ("title", self.title.clone()),
            ("status_code", self.status.to_string()),
            ("content_length", self.content_length.to_string()),
            ("link_count", self.link_count.to_string()),
            ("crawled_at", self.crawled_at.clone()),
            ("error_message", self.error_message.clone()),
            ("anchor_html", self.anchor_html.clone()),
        ]
    }
}

/// Result of re-crawling one ledger row under domain substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementRecord {
    pub url: String,
    pub redirect_chain: String,
    pub title: String,
    pub status: StatusCell,
    pub content_length: usize,
    pub link_count: usize,
    pub crawled_at: String,
    pub error_message: String,
}

impl ReplacementRecord {
    pub fn failed(url: &str, error_message: String) -> Self {
        Self {
            url: url.to_owned(),
            redirect_chain: String::new(),
            title: String::new(),
            status: StatusCell::Error,
            content_length: 0,
            link_count: 0,
            crawled_at: ledger_timestamp(),
            error_message,
        }
    }

    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let values = [
            self.url.clone(),
            self.redirect_chain.clone(),
            self.title.clone(),
            self.status.to_string(),
            self.content_length.to_string(),
            self.link_count.to_string(),
            self.crawled_at.clone(),
            self.error_message.clone(),
        ];
        REPLACEMENT_FIELDS.into_iter().zip(values).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_cell_parses_codes_and_error_marker() {
        assert_eq!(StatusCell::parse("200"), Some(StatusCell::Code(200)));
        assert_eq!(StatusCell::parse(" ERROR "), Some(StatusCell::Error));
        assert_eq!(StatusCell::parse(""), None);
        assert_eq!(StatusCell::Code(500).to_string(), "500");
        assert_eq!(StatusCell::Error.to_string(), "ERROR");
    }

    #[test]
    fn replacement_fields_follow_column_order() {
        let record = ReplacementRecord::failed("http://new.example.com/a", "boom".to_owned());
        let names = record
            .fields()
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        assert_eq!(names, REPLACEMENT_FIELDS.to_vec());
        assert_eq!(record.fields()[3].1, "ERROR");
        assert_eq!(record.fields()[7].1, "boom");
    }
}
