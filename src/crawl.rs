use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use crate::artifacts::{ArtifactDirs, case_id_for_url, ledger_path, read_html};
use crate::capture::capture_page;
use crate::cli::{CrawlArgs, ResumeArgs, RetryArgs};
use crate::config::{CaptureOptions, Config};
use crate::driver::BrowserDriver;
use crate::formats::{CRAWL_FIELDS, CrawlRecord, StatusCell, ledger_timestamp};
use crate::html::{DiscoveredLink, extract_title, extract_unique_links};
use crate::ledger::Ledger;

/// A URL waiting to be crawled, with the anchor that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub url: String,
    pub from_url: String,
    pub anchor_html: String,
}

impl Seed {
    pub fn start(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            from_url: String::new(),
            anchor_html: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub crawled: usize,
    pub failed: usize,
}

pub struct Crawler<'a> {
    pub out_dir: PathBuf,
    pub max_depth: u32,
    pub options: &'a CaptureOptions,
}

pub async fn run(args: CrawlArgs, config: &Config) -> anyhow::Result<()> {
    if config.start_urls.is_empty() {
        anyhow::bail!("no start_urls configured");
    }
    let out_dir = match args.out {
        Some(out) => PathBuf::from(out),
        None => PathBuf::from("results")
            .join(chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()),
    };
    let seeds = config.start_urls.iter().map(Seed::start).collect();

    let options = config.capture_options();
    let crawler = Crawler {
        out_dir,
        max_depth: config.max_depth,
        options: &options,
    };
    let mut driver = crate::session::open(config).await?;
    let result = crawler.crawl(driver.as_mut(), seeds, 0, HashSet::new()).await;
    finish(driver, result).await
}

pub async fn resume(args: ResumeArgs, config: &Config) -> anyhow::Result<()> {
    let out_dir = PathBuf::from(&args.dir);
    if !out_dir.is_dir() {
        anyhow::bail!("crawl directory not found: {}", out_dir.display());
    }

    let ledger = Ledger::load(&ledger_path(&out_dir))?;
    let (visited, max_depth) = restore_state(&ledger);
    let start_depth = match (args.start_depth, max_depth) {
        (Some(depth), _) => depth,
        (None, Some(max)) => max + 1,
        (None, None) => 0,
    };

    let seeds = if start_depth == 0 {
        config
            .start_urls
            .iter()
            .filter(|url| !visited.contains(url.as_str()))
            .map(Seed::start)
            .collect()
    } else {
        let dirs = ArtifactDirs::crawl(&out_dir);
        resume_seeds(&ledger, &dirs, start_depth - 1, &config.link_filter())?
    };
    tracing::info!(
        dir = %out_dir.display(),
        start_depth,
        visited = visited.len(),
        seeds = seeds.len(),
        "resuming crawl"
    );

    let options = config.capture_options();
    let crawler = Crawler {
        out_dir,
        max_depth: config.max_depth,
        options: &options,
    };
    let mut driver = crate::session::open(config).await?;
    let result = crawler.crawl(driver.as_mut(), seeds, start_depth, visited).await;
    finish(driver, result).await
}

pub async fn retry(args: RetryArgs, config: &Config) -> anyhow::Result<()> {
    let out_dir = PathBuf::from(&args.dir);
    if !out_dir.is_dir() {
        anyhow::bail!("crawl directory not found: {}", out_dir.display());
    }

    let options = config.capture_options();
    let crawler = Crawler {
        out_dir,
        max_depth: config.max_depth,
        options: &options,
    };
    let mut driver = crate::session::open(config).await?;
    let result = crawler.retry_errors(driver.as_mut()).await;
    finish(driver, result).await
}

async fn finish(
    mut driver: Box<dyn BrowserDriver>,
    result: anyhow::Result<CrawlSummary>,
) -> anyhow::Result<()> {
    if let Err(err) = driver.close().await {
        tracing::warn!("closing browser: {err:#}");
    }
    let summary = result?;
    tracing::info!(
        crawled = summary.crawled,
        failed = summary.failed,
        "crawl finished"
    );
    Ok(())
}

/// URLs already in the ledger and the deepest depth recorded.
pub fn restore_state(ledger: &Ledger) -> (HashSet<String>, Option<u32>) {
    let mut visited = HashSet::new();
    let mut max_depth = None;
    for row in 0..ledger.len() {
        let url = ledger.value(row, "url");
        if !url.is_empty() {
            visited.insert(url.to_owned());
        }
        if let Ok(depth) = ledger.value(row, "depth").parse::<u32>() {
            max_depth = Some(max_depth.map_or(depth, |max: u32| max.max(depth)));
        }
    }
    (visited, max_depth)
}

/// Links found in the saved HTML of every row at `depth`.
pub fn resume_seeds(
    ledger: &Ledger,
    dirs: &ArtifactDirs,
    depth: u32,
    filter: &crate::html::LinkFilter,
) -> anyhow::Result<Vec<Seed>> {
    let depth = depth.to_string();
    let mut seeds = Vec::new();
    for row in 0..ledger.len() {
        if ledger.value(row, "depth") != depth {
            continue;
        }
        let url = ledger.value(row, "url");
        if url.is_empty() {
            continue;
        }
        let case_id = match ledger.value(row, "case_id") {
            "" => case_id_for_url(url),
            existing => existing.to_owned(),
        };
        let Some(html) = read_html(&dirs.html_path(&case_id))? else {
            tracing::debug!(url, "no saved html; cannot resume from this page");
            continue;
        };
        seeds.extend(
            extract_unique_links(&html, url, filter)
                .into_iter()
                .map(|link| Seed {
                    url: link.url,
                    from_url: url.to_owned(),
                    anchor_html: link.anchor_html,
                }),
        );
    }
    Ok(seeds)
}

impl Crawler<'_> {
    fn dirs(&self) -> ArtifactDirs {
        ArtifactDirs::crawl(&self.out_dir)
    }

    fn ledger_path(&self) -> PathBuf {
        ledger_path(&self.out_dir)
    }

    /// Breadth-first crawl from `seeds` at `start_depth`, skipping `visited`.
    /// The ledger is rewritten after every page.
    pub async fn crawl(
        &self,
        driver: &mut dyn BrowserDriver,
        seeds: Vec<Seed>,
        start_depth: u32,
        mut visited: HashSet<String>,
    ) -> anyhow::Result<CrawlSummary> {
        if start_depth > self.max_depth {
            tracing::info!(
                start_depth,
                max_depth = self.max_depth,
                "start depth is past max depth; nothing to crawl"
            );
            return Ok(CrawlSummary::default());
        }

        let dirs = self.dirs();
        dirs.create()?;
        let path = self.ledger_path();
        let mut ledger = Ledger::load_or_new(&path, &CRAWL_FIELDS)?;
        ledger.ensure_columns(&CRAWL_FIELDS);

        let levels = (self.max_depth - start_depth) as usize + 1;
        let mut queue: Vec<VecDeque<Seed>> = vec![VecDeque::new(); levels];
        let mut queued: HashSet<String> = HashSet::new();
        for seed in seeds {
            if !visited.contains(&seed.url) && queued.insert(seed.url.clone()) {
                queue[0].push_back(seed);
            }
        }

        let mut summary = CrawlSummary::default();
        for level in 0..levels {
            let depth = start_depth + level as u32;
            while let Some(seed) = queue[level].pop_front() {
                let pending = queue.iter().map(VecDeque::len).sum::<usize>();
                tracing::info!(
                    depth,
                    queue = queue[level].len(),
                    total_queue = pending,
                    visited = visited.len(),
                    "→ {}",
                    seed.url
                );

                visited.insert(seed.url.clone());
                let (record, links) = self.crawl_page(driver, &seed, depth, &dirs).await;
                summary.crawled += 1;
                if record.status.is_error() {
                    summary.failed += 1;
                }
                ledger.upsert(&record.url, &record.fields());
                ledger.save(&path)?;

                if level + 1 < levels {
                    for link in links {
                        if !visited.contains(&link.url) && queued.insert(link.url.clone()) {
                            queue[level + 1].push_back(Seed {
                                url: link.url,
                                from_url: seed.url.clone(),
                                anchor_html: link.anchor_html,
                            });
                        }
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Re-crawls every `ERROR` row in place.
    pub async fn retry_errors(&self, driver: &mut dyn BrowserDriver) -> anyhow::Result<CrawlSummary> {
        let dirs = self.dirs();
        dirs.create()?;
        let path = self.ledger_path();
        let mut ledger = Ledger::load(&path)?;

        let errors = (0..ledger.len())
            .filter(|row| {
                StatusCell::parse(ledger.value(*row, "status_code")).is_some_and(StatusCell::is_error)
            })
            .map(|row| {
                let seed = Seed {
                    url: ledger.value(row, "url").to_owned(),
                    from_url: ledger.value(row, "from_url").to_owned(),
                    anchor_html: ledger.value(row, "anchor_html").to_owned(),
                };
                let depth = ledger.value(row, "depth").parse::<u32>().unwrap_or(0);
                (seed, depth)
            })
            .filter(|(seed, _)| !seed.url.is_empty())
            .collect::<Vec<_>>();
        tracing::info!("retrying {} error rows", errors.len());

        let mut summary = CrawlSummary::default();
        for (i, (seed, depth)) in errors.iter().enumerate() {
            tracing::info!("[{}/{}] retrying {}", i + 1, errors.len(), seed.url);
            let (record, _) = self.crawl_page(driver, seed, *depth, &dirs).await;
            summary.crawled += 1;
            if record.status.is_error() {
                summary.failed += 1;
            }
            ledger.upsert(&record.url, &record.fields());
            ledger.save(&path)?;
        }
        tracing::info!(ledger = %path.display(), "updated {} rows", errors.len());

        Ok(summary)
    }

    /// Captures one page; failures become an `ERROR` record instead of an error.
    pub async fn crawl_page(
        &self,
        driver: &mut dyn BrowserDriver,
        seed: &Seed,
        depth: u32,
        dirs: &ArtifactDirs,
    ) -> (CrawlRecord, Vec<DiscoveredLink>) {
        let case_id = case_id_for_url(&seed.url);
        match capture_page(driver, &seed.url, &case_id, dirs, self.options).await {
            Ok(page) => {
                let links = extract_unique_links(&page.html, &seed.url, &self.options.link_filter);
                let record = CrawlRecord {
                    url: seed.url.clone(),
                    redirect_chain: page.serialized_chain(),
                    from_url: seed.from_url.clone(),
                    case_id,
                    depth,
                    title: extract_title(&page.html),
                    status: StatusCell::Code(page.status),
                    content_length: page.html.chars().count(),
                    link_count: links.len(),
                    crawled_at: ledger_timestamp(),
                    error_message: String::new(),
                    anchor_html: seed.anchor_html.clone(),
                };
                (record, links)
            }
            Err(err) => {
                tracing::warn!(url = %seed.url, "crawl failed: {err:#}");
                let record = CrawlRecord {
                    url: seed.url.clone(),
                    redirect_chain: String::new(),
                    from_url: seed.from_url.clone(),
                    case_id,
                    depth,
                    title: String::new(),
                    status: StatusCell::Error,
                    content_length: 0,
                    link_count: 0,
                    crawled_at: ledger_timestamp(),
                    error_message: format!("{err:#}"),
                    anchor_html: seed.anchor_html.clone(),
                };
                (record, Vec::new())
            }
        }
    }
}
