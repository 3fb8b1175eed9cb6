//! Chromium-backed [`BrowserDriver`] speaking CDP through chromiumoxide.
//!
//! Redirect history is rebuilt from `Network.requestWillBeSent` events: every
//! hop of a main-document redirect chain reuses the navigation's request id,
//! and each follow-up event carries the redirect response of the hop before.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig as CdpBrowserConfig, Page};
use futures::{Stream, StreamExt as _};
use tokio::task::JoinHandle;

use crate::config::BrowserConfig;
use crate::driver::{
    BrowserDriver, NavigatedRequest, NavigationError, NavigationResponse, WaitUntil,
};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

const READY_STATE_SCRIPT: &str = r#"
    new Promise((resolve) => {
        const wanted = __WANTED__;
        const done = () => wanted.includes(document.readyState);
        if (done()) {
            resolve(document.readyState);
            return;
        }
        document.addEventListener('readystatechange', () => {
            if (done()) resolve(document.readyState);
        });
    })
"#;

pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumDriver {
    pub async fn launch(config: &BrowserConfig) -> anyhow::Result<Self> {
        let mut builder = CdpBrowserConfig::builder()
            .viewport(None)
            .window_size(config.viewport.width, config.viewport.height);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(dir) = &config.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        if config.ignore_https_errors {
            builder = builder.arg("--ignore-certificate-errors");
        }
        for arg in &config.args {
            builder = builder.arg(arg);
        }
        let cdp_config = builder
            .build()
            .map_err(|err| anyhow::anyhow!("build browser config: {err}"))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .context("start chromium")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::debug!("cdp handler stopped: {err}");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("open browser page")?;
        page.execute(EnableParams::default())
            .await
            .context("enable network events")?;

        tracing::debug!(headless = config.headless, "chromium ready");
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    async fn wait_for_ready_state(&self, wait_until: WaitUntil) -> anyhow::Result<()> {
        let wanted = match wait_until {
            WaitUntil::DomContentLoaded => r#"["interactive", "complete"]"#,
            WaitUntil::Load => r#"["complete"]"#,
        };
        let script = READY_STATE_SCRIPT.replace("__WANTED__", wanted);
        let state = self.page.evaluate(script).await?;
        tracing::trace!(state = ?state.into_value::<String>().ok(), "page ready");
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
        wait_until: WaitUntil,
    ) -> Result<NavigationResponse, NavigationError> {
        let mut requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("subscribe to request events")?;
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("subscribe to response events")?;

        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|err| NavigationError::Protocol {
                url: url.to_owned(),
                message: err,
            })?;

        let navigated = tokio::time::timeout(timeout, async {
            let navigated = self.page.execute(params).await;
            if navigated
                .as_ref()
                .is_ok_and(|res| res.result.error_text.is_none())
                && let Err(err) = self.wait_for_ready_state(wait_until).await
            {
                tracing::debug!(url, "ready state not observed: {err:#}");
            }
            navigated
        })
        .await
        .map_err(|_| NavigationError::Timeout {
            url: url.to_owned(),
            after: timeout,
        })?
        .map_err(|err| NavigationError::Protocol {
            url: url.to_owned(),
            message: err.to_string(),
        })?;

        if let Some(message) = navigated.result.error_text.clone() {
            return Err(NavigationError::Protocol {
                url: url.to_owned(),
                message,
            });
        }

        let loader_id = navigated
            .result
            .loader_id
            .as_ref()
            .map(|id| id.inner().clone());
        let sent = drain(&mut requests).await;
        let received = drain(&mut responses).await;

        let Some(request_id) = loader_id.or_else(|| {
            sent.iter()
                .find(|event| event.redirect_response.is_none() && event.request.url == url)
                .map(|event| event.request_id.inner().clone())
        }) else {
            return Err(NavigationError::NoResponse {
                url: url.to_owned(),
            });
        };

        let hops = sent
            .iter()
            .filter(|event| *event.request_id.inner() == request_id)
            .map(|event| event.request.url.clone())
            .collect::<Vec<_>>();
        let Some(response) = received
            .iter()
            .rev()
            .find(|event| *event.request_id.inner() == request_id)
        else {
            return Err(NavigationError::NoResponse {
                url: url.to_owned(),
            });
        };

        let status = u16::try_from(response.response.status).unwrap_or(0);
        tracing::debug!(url, status, hops = hops.len(), "navigation committed");
        Ok(NavigationResponse {
            status,
            url: response.response.url.clone(),
            request: NavigatedRequest::from_hops(hops),
        })
    }

    async fn content(&mut self) -> anyhow::Result<String> {
        self.page.content().await.context("read page html")
    }

    async fn screenshot(&mut self, path: &Path, full_page: bool) -> anyhow::Result<()> {
        let params = ScreenshotParams::builder().full_page(full_page).build();
        let png = self
            .page
            .screenshot(params)
            .await
            .context("capture screenshot")?;
        tokio::fs::write(path, png)
            .await
            .with_context(|| format!("write screenshot: {}", path.display()))
    }

    async fn wait_for_text_to_disappear(
        &mut self,
        text: &str,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let needle = serde_json::to_string(text).context("encode marker text")?;
        let script = format!(
            "!(document.body && document.body.innerText.includes({needle}))"
        );
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let gone = self
                .page
                .evaluate(script.as_str())
                .await
                .context("evaluate marker check")?
                .into_value::<bool>()
                .unwrap_or(false);
            if gone {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("text {text:?} still present after {}ms", timeout.as_millis());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!(
                    "selector {selector:?} not found after {}ms",
                    timeout.as_millis()
                );
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.browser.close().await.context("close browser")?;
        if let Err(err) = self.browser.wait().await {
            tracing::debug!("waiting for browser exit: {err}");
        }
        self.handler.abort();
        Ok(())
    }
}

/// Events already buffered on `stream`; stops at the first quiet interval.
async fn drain<T, S>(stream: &mut S) -> Vec<Arc<T>>
where
    S: Stream<Item = Arc<T>> + Unpin,
{
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(EVENT_DRAIN_TIMEOUT, stream.next()).await {
        events.push(event);
    }
    events
}
