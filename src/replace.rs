//! Domain-replacement re-crawl of an existing ledger.
//!
//! Every row's URL is rewritten with the configured domain rules and crawled
//! again; the result lands in the `*_r1` columns of the same row so original
//! and replacement captures can be compared side by side. When the
//! replacement's redirects lead back onto the original domain, the final
//! redirect target is substituted and fetched once more.

use std::path::PathBuf;

use crate::artifacts::{ArtifactDirs, case_id_for_url};
use crate::capture::{PageCapture, capture_page};
use crate::cli::DomainReplaceArgs;
use crate::config::{CaptureOptions, Config};
use crate::driver::BrowserDriver;
use crate::formats::{REPLACEMENT_FIELDS, ReplacementRecord, StatusCell, ledger_timestamp};
use crate::html::{extract_title, extract_unique_links};
use crate::ledger::{self, Ledger};
use crate::redirect::{LoopCheck, append_replacement_hop, detect};
use crate::rules::DomainRules;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub total: usize,
    pub recrawled: usize,
    pub failed: usize,
    pub looped_back: usize,
    pub skipped_no_rule: usize,
    pub skipped_done: usize,
}

#[derive(Debug, Clone)]
pub struct RowOutcome {
    pub record: ReplacementRecord,
    pub looped_back: bool,
}

pub struct Recrawl<'a> {
    pub ledger_path: PathBuf,
    pub rules: &'a DomainRules,
    pub options: &'a CaptureOptions,
    /// Only rows whose replacement columns are empty or failed.
    pub pending_only: bool,
}

pub async fn run(args: DomainReplaceArgs, config: &Config) -> anyhow::Result<()> {
    let ledger_path = PathBuf::from(&args.csv);
    if !ledger_path.is_file() {
        anyhow::bail!("ledger not found: {}", ledger_path.display());
    }
    if config.domain_replacement_rules.is_empty() {
        tracing::warn!("no domain_replacement_rules configured; every row will be skipped");
    }

    let options = config.capture_options();
    let job = Recrawl {
        ledger_path,
        rules: &config.domain_replacement_rules,
        options: &options,
        pending_only: args.pending_only,
    };

    let mut driver = crate::session::open(config).await?;
    let result = job.run(driver.as_mut()).await;
    if let Err(err) = driver.close().await {
        tracing::warn!("closing browser: {err:#}");
    }

    let summary = result?;
    tracing::info!(
        total = summary.total,
        recrawled = summary.recrawled,
        failed = summary.failed,
        looped_back = summary.looped_back,
        skipped_no_rule = summary.skipped_no_rule,
        skipped_done = summary.skipped_done,
        "domain replacement finished"
    );
    Ok(())
}

impl Recrawl<'_> {
    pub async fn run(&self, driver: &mut dyn BrowserDriver) -> anyhow::Result<ReplaceSummary> {
        if ledger::ensure_columns(&self.ledger_path, &REPLACEMENT_FIELDS)? {
            tracing::info!(
                ledger = %self.ledger_path.display(),
                "added replacement columns to ledger header"
            );
        }

        let dirs = ArtifactDirs::replacement(&self.ledger_path);
        dirs.create()?;

        let snapshot = Ledger::load(&self.ledger_path)?;
        let mut summary = ReplaceSummary {
            total: snapshot.len(),
            ..ReplaceSummary::default()
        };
        if snapshot.is_empty() {
            tracing::info!(ledger = %self.ledger_path.display(), "ledger has no rows");
            return Ok(summary);
        }

        tracing::info!("processing {} urls for domain replacement", summary.total);
        for row in 0..snapshot.len() {
            let url = snapshot.value(row, "url");
            if url.is_empty() {
                continue;
            }
            if self.pending_only && !needs_replacement(&snapshot, row) {
                summary.skipped_done += 1;
                continue;
            }

            tracing::info!("[{}/{}] processing {url}", row + 1, summary.total);

            let replaced = match self.rules.apply(url) {
                Ok(replaced) => replaced,
                Err(err) => {
                    tracing::warn!(url, %err, "domain substitution failed");
                    let record = ReplacementRecord::failed("", err.to_string());
                    self.persist(url, &record)?;
                    summary.failed += 1;
                    continue;
                }
            };
            if replaced == url {
                tracing::info!(url, "no domain replacement rule matched; skipping");
                summary.skipped_no_rule += 1;
                continue;
            }

            let case_id = match snapshot.value(row, "case_id") {
                "" => case_id_for_url(url),
                existing => existing.to_owned(),
            };

            let record = match self
                .recrawl_row(driver, url, &replaced, &case_id, &dirs)
                .await
            {
                Ok(outcome) => {
                    summary.recrawled += 1;
                    if outcome.looped_back {
                        summary.looped_back += 1;
                    }
                    tracing::info!(url = %replaced, status = %outcome.record.status, "replacement crawl completed");
                    outcome.record
                }
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(url = %replaced, "replacement crawl failed: {err:#}");
                    ReplacementRecord::failed(&replaced, format!("{err:#}"))
                }
            };
            self.persist(url, &record)?;
        }

        Ok(summary)
    }

    /// Crawls `replaced` for the row keyed by `original`, with at most one
    /// extra pass when the redirects loop back onto the original domain.
    pub async fn recrawl_row(
        &self,
        driver: &mut dyn BrowserDriver,
        original: &str,
        replaced: &str,
        case_id: &str,
        dirs: &ArtifactDirs,
    ) -> anyhow::Result<RowOutcome> {
        let first = capture_page(driver, replaced, case_id, dirs, self.options).await?;
        let mut redirect_chain = first.serialized_chain();
        let mut page = first;
        let mut looped_back = false;

        let check = page
            .chain
            .as_ref()
            .map(|chain| detect(chain, original, self.rules))
            .unwrap_or(LoopCheck::NoLoop);
        if let LoopCheck::LoopedBack { candidate } = check {
            tracing::info!(
                url = replaced,
                candidate = %candidate,
                "redirects returned to the original domain; crawling re-substituted target"
            );
            match capture_page(driver, &candidate, case_id, dirs, self.options).await {
                Ok(second) => {
                    redirect_chain = append_replacement_hop(&redirect_chain, &candidate);
                    page = second;
                    looped_back = true;
                }
                Err(err) => {
                    tracing::warn!(url = %candidate, "second pass failed; keeping first pass: {err:#}");
                }
            }
        }

        Ok(RowOutcome {
            record: replacement_record(replaced, redirect_chain, &page, self.options),
            looped_back,
        })
    }

    fn persist(&self, original: &str, record: &ReplacementRecord) -> anyhow::Result<()> {
        if !ledger::update_row(&self.ledger_path, original, &record.fields())? {
            tracing::warn!(url = original, "row disappeared from ledger; result not recorded");
        }
        Ok(())
    }
}

fn replacement_record(
    replaced: &str,
    redirect_chain: String,
    page: &PageCapture,
    options: &CaptureOptions,
) -> ReplacementRecord {
    let links = extract_unique_links(&page.html, replaced, &options.link_filter);
    ReplacementRecord {
        url: replaced.to_owned(),
        redirect_chain,
        title: extract_title(&page.html),
        status: StatusCell::Code(page.status),
        content_length: page.html.chars().count(),
        link_count: links.len(),
        crawled_at: ledger_timestamp(),
        error_message: String::new(),
    }
}

fn needs_replacement(ledger: &Ledger, row: usize) -> bool {
    match StatusCell::parse(ledger.value(row, "status_code_r1")) {
        None => true,
        Some(status) => status.is_error(),
    }
}
