mod fake_browser;

use std::collections::HashSet;

use fake_browser::{FakeBrowser, Outcome};
use snapcrawl::artifacts::{ArtifactDirs, case_id_for_url, ledger_path};
use snapcrawl::config::CaptureOptions;
use snapcrawl::crawl::{Crawler, Seed, restore_state, resume_seeds};
use snapcrawl::ledger::Ledger;
use tempfile::TempDir;

const ROOT: &str = r#"<!doctype html>
<html>
  <head><title>Home</title></head>
  <body>
    <a href="/a">Page A</a>
    <a href="/b">Page B</a>
    <a href="/a#top">Again</a>
    <a href="mailto:team@site.test">Mail</a>
    <a href="/report.pdf">Report</a>
  </body>
</html>"#;

const PAGE_A: &str = r#"<html><head><title>A</title></head><body><a href="/c">Deeper</a></body></html>"#;
const PAGE_C: &str = r#"<html><head><title>C</title></head><body></body></html>"#;

fn site() -> FakeBrowser {
    FakeBrowser::new()
        .page("http://site.test/", Outcome::ok(ROOT))
        .page("http://site.test/a", Outcome::ok(PAGE_A))
        .page("http://site.test/c", Outcome::ok(PAGE_C))
}

#[tokio::test]
async fn crawl_visits_breadth_first_up_to_max_depth() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let options = CaptureOptions::default();
    let crawler = Crawler {
        out_dir: temp.path().to_path_buf(),
        max_depth: 1,
        options: &options,
    };
    let mut browser = site();

    let summary = crawler
        .crawl(
            &mut browser,
            vec![Seed::start("http://site.test/")],
            0,
            HashSet::new(),
        )
        .await?;
    assert_eq!(summary.crawled, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        browser.navigations,
        vec![
            "http://site.test/",
            "http://site.test/a",
            "http://site.test/b"
        ]
    );

    let ledger = Ledger::load(&ledger_path(temp.path()))?;
    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.value(0, "title"), "Home");
    assert_eq!(ledger.value(0, "depth"), "0");
    assert_eq!(ledger.value(0, "status_code"), "200");
    assert_eq!(ledger.value(0, "link_count"), "2");

    assert_eq!(ledger.value(1, "url"), "http://site.test/a");
    assert_eq!(ledger.value(1, "from_url"), "http://site.test/");
    assert_eq!(ledger.value(1, "depth"), "1");
    assert!(ledger.value(1, "anchor_html").contains("Page A"));
    assert_eq!(ledger.value(1, "case_id"), case_id_for_url("http://site.test/a"));

    assert_eq!(ledger.value(2, "status_code"), "ERROR");
    assert!(!ledger.value(2, "error_message").is_empty());

    let dirs = ArtifactDirs::crawl(temp.path());
    assert!(dirs.html_path(&case_id_for_url("http://site.test/a")).is_file());
    assert!(dirs.screenshot_path(&case_id_for_url("http://site.test/")).is_file());
    Ok(())
}

#[tokio::test]
async fn retry_recrawls_error_rows_in_place() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let options = CaptureOptions::default();
    let crawler = Crawler {
        out_dir: temp.path().to_path_buf(),
        max_depth: 1,
        options: &options,
    };
    let mut browser = site();
    crawler
        .crawl(
            &mut browser,
            vec![Seed::start("http://site.test/")],
            0,
            HashSet::new(),
        )
        .await?;

    browser.set("http://site.test/b", Outcome::ok(PAGE_C));
    browser.navigations.clear();
    let summary = crawler.retry_errors(&mut browser).await?;
    assert_eq!(summary.crawled, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(browser.navigations, vec!["http://site.test/b"]);

    let ledger = Ledger::load(&ledger_path(temp.path()))?;
    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.value(2, "url"), "http://site.test/b");
    assert_eq!(ledger.value(2, "status_code"), "200");
    assert_eq!(ledger.value(2, "error_message"), "");
    assert_eq!(ledger.value(2, "from_url"), "http://site.test/");
    assert_eq!(ledger.value(2, "depth"), "1");
    Ok(())
}

#[tokio::test]
async fn resume_continues_from_saved_pages() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let options = CaptureOptions::default();
    let shallow = Crawler {
        out_dir: temp.path().to_path_buf(),
        max_depth: 1,
        options: &options,
    };
    let mut browser = site();
    shallow
        .crawl(
            &mut browser,
            vec![Seed::start("http://site.test/")],
            0,
            HashSet::new(),
        )
        .await?;

    let ledger = Ledger::load(&ledger_path(temp.path()))?;
    let (visited, max_depth) = restore_state(&ledger);
    assert_eq!(max_depth, Some(1));
    let seeds = resume_seeds(
        &ledger,
        &ArtifactDirs::crawl(temp.path()),
        1,
        &options.link_filter,
    )?;
    assert_eq!(
        seeds,
        vec![Seed {
            url: "http://site.test/c".to_owned(),
            from_url: "http://site.test/a".to_owned(),
            anchor_html: r#"<a href="/c">Deeper</a>"#.to_owned(),
        }]
    );

    let deeper = Crawler {
        out_dir: temp.path().to_path_buf(),
        max_depth: 2,
        options: &options,
    };
    browser.navigations.clear();
    deeper.crawl(&mut browser, seeds, 2, visited).await?;
    assert_eq!(browser.navigations, vec!["http://site.test/c"]);

    let ledger = Ledger::load(&ledger_path(temp.path()))?;
    assert_eq!(ledger.len(), 4);
    assert_eq!(ledger.value(3, "url"), "http://site.test/c");
    assert_eq!(ledger.value(3, "depth"), "2");
    assert_eq!(ledger.value(3, "title"), "C");
    Ok(())
}

#[tokio::test]
async fn start_depth_past_max_depth_crawls_nothing() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let options = CaptureOptions::default();
    let crawler = Crawler {
        out_dir: temp.path().to_path_buf(),
        max_depth: 1,
        options: &options,
    };
    let mut browser = site();

    let summary = crawler
        .crawl(
            &mut browser,
            vec![Seed::start("http://site.test/c")],
            2,
            HashSet::new(),
        )
        .await?;
    assert_eq!(summary.crawled, 0);
    assert!(browser.navigations.is_empty());
    assert!(!ledger_path(temp.path()).exists());
    Ok(())
}
