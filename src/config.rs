use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

use crate::html::LinkFilter;
use crate::rules::DomainRules;

pub const DEFAULT_CONFIG_PATH: &str = "snapcrawl.yaml";

const DEFAULT_SKIP_EXTENSIONS: [&str; 19] = [
    ".pdf", ".jpg", ".png", ".zip", ".exe", ".csv", ".tsv", ".xls", ".xlsx", ".doc", ".docx",
    ".ppt", ".pptx", ".txt", ".mp4", ".avi", ".mov", ".mp3", ".wav",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub start_urls: Vec<String>,
    pub max_depth: u32,
    pub allowed_domains: Vec<String>,
    pub skip_link_keywords: Vec<String>,
    pub skip_url_patterns: Vec<String>,
    pub skip_extensions: Vec<String>,
    /// Text shown by client-side loading states; captures wait for it to go away.
    pub wait_for_text_to_disappear: Option<String>,
    pub domain_replacement_rules: DomainRules,
    pub browser: BrowserConfig,
    pub login: Option<LoginConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_urls: Vec::new(),
            max_depth: 1,
            allowed_domains: Vec::new(),
            skip_link_keywords: Vec::new(),
            skip_url_patterns: Vec::new(),
            skip_extensions: DEFAULT_SKIP_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_owned())
                .collect(),
            wait_for_text_to_disappear: None,
            domain_replacement_rules: DomainRules::default(),
            browser: BrowserConfig::default(),
            login: None,
        }
    }
}

impl Config {
    /// Reads `explicit` when given; otherwise the default path if present,
    /// falling back to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !default.exists() {
                    tracing::debug!("no {DEFAULT_CONFIG_PATH}; using built-in defaults");
                    return Ok(Self::default());
                }
                default
            }
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("parse config: {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("deserialize config yaml")
    }

    pub fn link_filter(&self) -> LinkFilter {
        LinkFilter {
            allowed_domains: self.allowed_domains.clone(),
            skip_link_keywords: self.skip_link_keywords.clone(),
            skip_url_patterns: self.skip_url_patterns.clone(),
            skip_extensions: self.skip_extensions.clone(),
        }
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            navigation_timeout: Duration::from_millis(self.browser.navigation_timeout_ms),
            marker_text: self
                .wait_for_text_to_disappear
                .clone()
                .filter(|text| !text.is_empty()),
            marker_timeout: Duration::from_millis(self.browser.marker_timeout_ms),
            settle_delay: Duration::from_millis(self.browser.settle_delay_ms),
            full_page_screenshot: self.browser.full_page_screenshot,
            link_filter: self.link_filter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    /// Persistent profile directory; keeps a login session between runs.
    pub user_data_dir: Option<PathBuf>,
    pub viewport: Viewport,
    pub navigation_timeout_ms: u64,
    pub marker_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub full_page_screenshot: bool,
    pub ignore_https_errors: bool,
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            user_data_dir: None,
            viewport: Viewport::default(),
            navigation_timeout_ms: 30_000,
            marker_timeout_ms: 10_000,
            settle_delay_ms: 500,
            full_page_screenshot: true,
            ignore_https_errors: true,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginConfig {
    pub url: String,
    pub wait_selector: String,
    #[serde(default = "default_login_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_login_timeout_ms() -> u64 {
    600_000
}

/// Per-page capture policy shared by every crawl mode.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub navigation_timeout: Duration,
    pub marker_text: Option<String>,
    pub marker_timeout: Duration,
    pub settle_delay: Duration,
    pub full_page_screenshot: bool,
    pub link_filter: LinkFilter,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Config::default().capture_options()
    }
}
