use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use snapcrawl::driver::{
    BrowserDriver, NavigatedRequest, NavigationError, NavigationResponse, WaitUntil,
};

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Response with `status`; `hops` lists every URL fetched, the requested one first.
    Page {
        status: u16,
        hops: Vec<String>,
        html: String,
    },
    /// Response whose redirect history the browser did not report.
    NoHistory { status: u16, html: String },
    Timeout,
    Protocol(String),
}

#[allow(dead_code)]
impl Outcome {
    pub fn ok(html: &str) -> Self {
        Self::Page {
            status: 200,
            hops: Vec::new(),
            html: html.to_owned(),
        }
    }

    pub fn redirected(hops: &[&str], html: &str) -> Self {
        Self::Page {
            status: 200,
            hops: hops.iter().map(|hop| (*hop).to_owned()).collect(),
            html: html.to_owned(),
        }
    }
}

/// Scripted browser keyed by URL; unknown URLs fail like an unreachable host.
/// A URL given several outcomes plays them in order and then repeats the last.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct FakeBrowser {
    pages: HashMap<String, VecDeque<Outcome>>,
    current_html: String,
    pub navigations: Vec<String>,
    pub wait_modes: Vec<WaitUntil>,
    pub screenshots: Vec<String>,
    pub closed: bool,
    /// Every screenshot attempt fails.
    pub broken_screenshots: bool,
    /// Marker text never goes away.
    pub marker_stuck: bool,
}

#[allow(dead_code)]
impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, outcome: Outcome) -> Self {
        self.set(url, outcome);
        self
    }

    pub fn set(&mut self, url: &str, outcome: Outcome) {
        self.pages.entry(url.to_owned()).or_default().push_back(outcome);
    }

    pub fn without_screenshots(mut self) -> Self {
        self.broken_screenshots = true;
        self
    }

    pub fn with_stuck_marker(mut self) -> Self {
        self.marker_stuck = true;
        self
    }

    pub fn visits(&self, url: &str) -> usize {
        self.navigations.iter().filter(|visited| *visited == url).count()
    }

    fn next_outcome(&mut self, url: &str) -> Outcome {
        let Some(queue) = self.pages.get_mut(url) else {
            return Outcome::Protocol("net::ERR_NAME_NOT_RESOLVED".to_owned());
        };
        if queue.len() > 1
            && let Some(outcome) = queue.pop_front()
        {
            return outcome;
        }
        queue
            .front()
            .cloned()
            .unwrap_or_else(|| Outcome::Protocol("net::ERR_NAME_NOT_RESOLVED".to_owned()))
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
        wait_until: WaitUntil,
    ) -> Result<NavigationResponse, NavigationError> {
        self.navigations.push(url.to_owned());
        self.wait_modes.push(wait_until);
        match self.next_outcome(url) {
            Outcome::Page { status, hops, html } => {
                self.current_html = html;
                let hops = if hops.is_empty() {
                    vec![url.to_owned()]
                } else {
                    hops
                };
                let final_url = hops.last().cloned().unwrap_or_else(|| url.to_owned());
                Ok(NavigationResponse {
                    status,
                    url: final_url,
                    request: NavigatedRequest::from_hops(hops),
                })
            }
            Outcome::NoHistory { status, html } => {
                self.current_html = html;
                Ok(NavigationResponse {
                    status,
                    url: url.to_owned(),
                    request: None,
                })
            }
            Outcome::Timeout => Err(NavigationError::Timeout {
                url: url.to_owned(),
                after: timeout,
            }),
            Outcome::Protocol(message) => {
                self.current_html = "<html><head></head><body></body></html>".to_owned();
                Err(NavigationError::Protocol {
                    url: url.to_owned(),
                    message,
                })
            }
        }
    }

    async fn content(&mut self) -> anyhow::Result<String> {
        Ok(self.current_html.clone())
    }

    async fn screenshot(&mut self, path: &Path, _full_page: bool) -> anyhow::Result<()> {
        if self.broken_screenshots {
            anyhow::bail!("screenshot target closed");
        }
        std::fs::write(path, b"\x89PNG")?;
        self.screenshots.push(path.display().to_string());
        Ok(())
    }

    async fn wait_for_text_to_disappear(
        &mut self,
        text: &str,
        _timeout: Duration,
    ) -> anyhow::Result<()> {
        if self.marker_stuck {
            anyhow::bail!("text {text:?} still present");
        }
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        _selector: &str,
        _timeout: Duration,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn pause(&mut self, _duration: Duration) {}

    async fn close(&mut self) -> anyhow::Result<()> {
        self.closed = true;
        Ok(())
    }
}
