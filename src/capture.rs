//! Capture of a single page: navigation, status policy, HTML and screenshot.

use std::path::PathBuf;

use anyhow::Context as _;

use crate::artifacts::{ArtifactDirs, write_html};
use crate::config::CaptureOptions;
use crate::driver::{BrowserDriver, NavigationError, NavigationResponse, WaitUntil};
use crate::redirect::{RedirectChain, reconstruct};

/// Status recorded when the browser got an error response.
pub const NORMALIZED_ERROR_STATUS: u16 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub status: u16,
    /// Absent when the driver failed with a coded response and handed back
    /// no response object.
    pub response: Option<NavigationResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerWait {
    NotConfigured,
    Cleared,
    GaveUp,
}

#[derive(Debug, Clone)]
pub struct PageCapture {
    pub status: u16,
    pub html: String,
    pub html_path: Option<PathBuf>,
    pub screenshot_path: Option<PathBuf>,
    /// `None` when the redirect history could not be read.
    pub chain: Option<RedirectChain>,
    pub marker: MarkerWait,
}

impl PageCapture {
    pub fn serialized_chain(&self) -> String {
        self.chain
            .as_ref()
            .map(RedirectChain::serialize)
            .unwrap_or_default()
    }
}

/// Navigates with DOM-ready semantics. Error responses are normalized to
/// status 500 instead of failing; every other navigation failure is returned.
pub async fn navigate(
    driver: &mut dyn BrowserDriver,
    url: &str,
    options: &CaptureOptions,
) -> Result<Navigation, NavigationError> {
    match driver
        .navigate(url, options.navigation_timeout, WaitUntil::DomContentLoaded)
        .await
    {
        Ok(response) if response.status >= 400 => {
            let err = NavigationError::HttpStatus {
                url: url.to_owned(),
                status: response.status,
            };
            tracing::warn!(url, %err, "error response; recording status {NORMALIZED_ERROR_STATUS}");
            Ok(Navigation {
                status: NORMALIZED_ERROR_STATUS,
                response: Some(response),
            })
        }
        Ok(response) => Ok(Navigation {
            status: response.status,
            response: Some(response),
        }),
        Err(err) if err.is_coded_response_failure() => {
            tracing::warn!(url, %err, "coded response failure; recording status {NORMALIZED_ERROR_STATUS}");
            Ok(Navigation {
                status: NORMALIZED_ERROR_STATUS,
                response: None,
            })
        }
        Err(err) => Err(err),
    }
}

pub async fn wait_for_marker(
    driver: &mut dyn BrowserDriver,
    url: &str,
    options: &CaptureOptions,
) -> MarkerWait {
    let Some(marker) = options.marker_text.as_deref() else {
        return MarkerWait::NotConfigured;
    };
    match driver
        .wait_for_text_to_disappear(marker, options.marker_timeout)
        .await
    {
        Ok(()) => MarkerWait::Cleared,
        Err(err) => {
            tracing::warn!(url, marker, "marker text still present: {err:#}");
            MarkerWait::GaveUp
        }
    }
}

/// Navigates to `url` and stores its HTML and screenshot under `case_id`.
/// Only navigation and DOM retrieval failures fail the capture.
pub async fn capture_page(
    driver: &mut dyn BrowserDriver,
    url: &str,
    case_id: &str,
    dirs: &ArtifactDirs,
    options: &CaptureOptions,
) -> anyhow::Result<PageCapture> {
    let navigation = navigate(driver, url, options).await?;
    let marker = wait_for_marker(driver, url, options).await;

    let html = driver
        .content()
        .await
        .with_context(|| format!("read page content: {url}"))?;

    let html_path = dirs.html_path(case_id);
    let html_path = match write_html(&html_path, &html) {
        Ok(()) => Some(html_path),
        Err(err) => {
            tracing::warn!(url, "html snapshot not saved: {err:#}");
            None
        }
    };

    driver.pause(options.settle_delay).await;
    let screenshot_path = dirs.screenshot_path(case_id);
    let screenshot_path = match driver
        .screenshot(&screenshot_path, options.full_page_screenshot)
        .await
    {
        Ok(()) => Some(screenshot_path),
        Err(err) => {
            tracing::warn!(url, "screenshot not saved: {err:#}");
            None
        }
    };

    let chain = navigation.response.as_ref().and_then(reconstruct);
    if navigation.response.is_some() && chain.is_none() {
        tracing::warn!(url, "redirect history unavailable");
    }

    Ok(PageCapture {
        status: navigation.status,
        html,
        html_path,
        screenshot_path,
        chain,
        marker,
    })
}
