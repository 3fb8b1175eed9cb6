use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    snapcrawl::logging::init().context("init logging")?;

    let cli = snapcrawl::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let config = snapcrawl::config::Config::load(cli.config.as_deref()).context("load config")?;

    match cli.command {
        snapcrawl::cli::Command::Crawl(args) => {
            snapcrawl::crawl::run(args, &config).await.context("crawl")?;
        }
        snapcrawl::cli::Command::Resume(args) => {
            snapcrawl::crawl::resume(args, &config)
                .await
                .context("resume")?;
        }
        snapcrawl::cli::Command::Retry(args) => {
            snapcrawl::crawl::retry(args, &config).await.context("retry")?;
        }
        snapcrawl::cli::Command::DomainReplace(args) => {
            snapcrawl::replace::run(args, &config)
                .await
                .context("domain replace")?;
        }
    }

    Ok(())
}
