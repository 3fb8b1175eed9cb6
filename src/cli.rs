use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML config file (default: `snapcrawl.yaml` when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Breadth-first crawl from the configured start URLs.
    Crawl(CrawlArgs),
    /// Continue a crawl from the pages saved at the previous depth.
    Resume(ResumeArgs),
    /// Crawl again every row recorded as `ERROR`.
    Retry(RetryArgs),
    /// Re-crawl every ledger row on its replacement domain.
    DomainReplace(DomainReplaceArgs),
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Output directory (default: `results/<timestamp>`).
    #[arg(long)]
    pub out: Option<String>,
}

#[derive(Debug, Args)]
pub struct ResumeArgs {
    /// Output directory of an earlier crawl.
    #[arg(long)]
    pub dir: String,

    /// Depth to continue from (default: one past the deepest recorded row).
    #[arg(long)]
    pub start_depth: Option<u32>,
}

#[derive(Debug, Args)]
pub struct RetryArgs {
    /// Output directory of an earlier crawl.
    #[arg(long)]
    pub dir: String,
}

#[derive(Debug, Args)]
pub struct DomainReplaceArgs {
    /// Ledger CSV to update in place.
    #[arg(long)]
    pub csv: String,

    /// Skip rows that already have a successful replacement result.
    #[arg(long)]
    pub pending_only: bool,
}
