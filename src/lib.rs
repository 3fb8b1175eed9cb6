#![forbid(unsafe_code)]

pub mod artifacts;
pub mod capture;
#[cfg(feature = "browser")]
pub mod chromium;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod driver;
pub mod formats;
pub mod html;
pub mod ledger;
pub mod logging;
pub mod redirect;
pub mod replace;
pub mod rules;
pub mod session;
