use std::time::Duration;

use anyhow::Context as _;

use crate::config::{Config, LoginConfig};
use crate::driver::{BrowserDriver, WaitUntil};

/// Launches the browser for a run and signs in when a login page is configured.
pub async fn open(config: &Config) -> anyhow::Result<Box<dyn BrowserDriver>> {
    let mut driver = launch(config).await?;
    if let Some(login) = &config.login
        && let Err(err) = bootstrap_login(driver.as_mut(), login, &config.browser).await
    {
        let _ = driver.close().await;
        return Err(err);
    }
    Ok(driver)
}

#[cfg(feature = "browser")]
async fn launch(config: &Config) -> anyhow::Result<Box<dyn BrowserDriver>> {
    let driver = crate::chromium::ChromiumDriver::launch(&config.browser)
        .await
        .context("launch browser")?;
    Ok(Box::new(driver))
}

#[cfg(not(feature = "browser"))]
async fn launch(_config: &Config) -> anyhow::Result<Box<dyn BrowserDriver>> {
    anyhow::bail!("snapcrawl was built without the `browser` feature")
}

/// Opens the login page and waits until `wait_selector` shows up, which
/// happens once the operator has signed in.
pub async fn bootstrap_login(
    driver: &mut dyn BrowserDriver,
    login: &LoginConfig,
    browser: &crate::config::BrowserConfig,
) -> anyhow::Result<()> {
    tracing::info!(url = %login.url, selector = %login.wait_selector, "waiting for login");
    driver
        .navigate(
            &login.url,
            Duration::from_millis(browser.navigation_timeout_ms),
            WaitUntil::Load,
        )
        .await
        .with_context(|| format!("open login page: {}", login.url))?;
    driver
        .wait_for_selector(&login.wait_selector, Duration::from_millis(login.timeout_ms))
        .await
        .with_context(|| format!("wait for login selector {:?}", login.wait_selector))?;
    tracing::info!("login complete");
    Ok(())
}
