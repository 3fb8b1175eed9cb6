use std::path::{Path, PathBuf};

use anyhow::Context as _;
use sha2::Digest as _;

pub const LEDGER_FILE: &str = "result.csv";

/// Ledger of a crawl output directory.
pub fn ledger_path(out_dir: &Path) -> PathBuf {
    out_dir.join(LEDGER_FILE)
}

/// Stable artifact key for a URL: lowercase hex SHA-256 of the URL string.
pub fn case_id_for_url(url: &str) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Where HTML snapshots and screenshots of one pass are written.
#[derive(Debug, Clone)]
pub struct ArtifactDirs {
    pub html: PathBuf,
    pub screenshots: PathBuf,
}

impl ArtifactDirs {
    /// Directories of an original crawl under `out_dir`.
    pub fn crawl(out_dir: &Path) -> Self {
        Self {
            html: out_dir.join("html"),
            screenshots: out_dir.join("screenshots"),
        }
    }

    /// Directories of a domain-replacement pass, alongside the ledger.
    pub fn replacement(ledger_path: &Path) -> Self {
        let base = match ledger_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            html: base.join("html_r1"),
            screenshots: base.join("screenshots_r1"),
        }
    }

    pub fn create(&self) -> anyhow::Result<()> {
        for dir in [&self.html, &self.screenshots] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create artifact dir: {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn html_path(&self, case_id: &str) -> PathBuf {
        self.html.join(format!("{case_id}.html"))
    }

    pub fn screenshot_path(&self, case_id: &str) -> PathBuf {
        self.screenshots.join(format!("{case_id}.png"))
    }
}

pub fn write_html(path: &Path, html: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create html dir: {}", parent.display()))?;
    }
    std::fs::write(path, html).with_context(|| format!("write html: {}", path.display()))
}

/// Saved HTML of a page, `None` when it was never captured.
pub fn read_html(path: &Path) -> anyhow::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    std::fs::read_to_string(path)
        .map(Some)
        .with_context(|| format!("read html: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_id_is_deterministic_hex() {
        let a = case_id_for_url("http://old.example.com/a");
        assert_eq!(a, case_id_for_url("http://old.example.com/a"));
        assert_ne!(a, case_id_for_url("http://old.example.com/b"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn replacement_dirs_sit_next_to_the_ledger() {
        let dirs = ArtifactDirs::replacement(Path::new("runs/20260101/result.csv"));
        assert_eq!(dirs.html_path("c1"), Path::new("runs/20260101/html_r1/c1.html"));
        assert_eq!(
            dirs.screenshot_path("c1"),
            Path::new("runs/20260101/screenshots_r1/c1.png")
        );

        let bare = ArtifactDirs::replacement(Path::new("result.csv"));
        assert_eq!(bare.html, Path::new("./html_r1"));
    }

    #[test]
    fn missing_html_reads_as_none() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("html").join("x.html");
        assert_eq!(read_html(&path)?, None);
        write_html(&path, "<html></html>")?;
        assert_eq!(read_html(&path)?.as_deref(), Some("<html></html>"));
        Ok(())
    }
}
