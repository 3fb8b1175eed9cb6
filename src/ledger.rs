//! CSV ledger: one row per crawled URL, rewritten atomically on every update.

use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Ledger {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read ledger: {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("parse ledger: {}", path.display()))
    }

    /// Loads `path`, or starts an empty ledger with `headers` when it does not exist yet.
    pub fn load_or_new(path: &Path, headers: &[&str]) -> anyhow::Result<Self> {
        if path.exists() {
            let mut ledger = Self::load(path)?;
            if ledger.headers.is_empty() {
                ledger.headers = headers.iter().map(|h| (*h).to_owned()).collect();
            }
            return Ok(ledger);
        }
        Ok(Self::new(headers.iter().copied()))
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);
        let headers = reader
            .headers()
            .context("read ledger header")?
            .iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("read ledger row")?;
            rows.push(record.iter().map(str::to_owned).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .context("write ledger header")?;
        for row in &self.rows {
            writer.write_record(row).context("write ledger row")?;
        }
        writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("flush ledger buffer: {}", err.error()))
    }

    /// Replaces the file at `path` with this ledger in a single rename.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let bytes = self.to_bytes()?;
        write_atomic(path, &bytes)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Appends the names in `names` that are not yet in the header. Returns
    /// whether the header changed.
    pub fn ensure_columns(&mut self, names: &[&str]) -> bool {
        let mut changed = false;
        for name in names {
            if self.column(name).is_none() {
                self.headers.push((*name).to_owned());
                changed = true;
            }
        }
        changed
    }

    /// Cell value, empty for columns the row does not reach.
    pub fn value(&self, row: usize, name: &str) -> &str {
        let Some(col) = self.column(name) else {
            return "";
        };
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn find_row(&self, url: &str) -> Option<usize> {
        let col = self.column("url")?;
        self.rows
            .iter()
            .position(|cells| cells.get(col).map(String::as_str) == Some(url))
    }

    /// Overwrites the named cells of `row`, adding unknown columns to the header.
    /// Rows past the end are left alone, header included.
    pub fn merge(&mut self, row: usize, fields: &[(&str, String)]) {
        if row >= self.rows.len() {
            return;
        }
        for (name, value) in fields {
            let col = match self.column(name) {
                Some(col) => col,
                None => {
                    self.headers.push((*name).to_owned());
                    self.headers.len() - 1
                }
            };
            set_cell(&mut self.rows[row], col, value);
        }
    }

    /// Merges into the row whose `url` matches, or appends a new row.
    pub fn upsert(&mut self, url: &str, fields: &[(&str, String)]) -> usize {
        let row = match self.find_row(url) {
            Some(row) => row,
            None => {
                self.rows.push(Vec::new());
                self.merge(self.rows.len() - 1, &[("url", url.to_owned())]);
                self.rows.len() - 1
            }
        };
        self.merge(row, fields);
        row
    }
}

fn set_cell(cells: &mut Vec<String>, col: usize, value: &str) {
    if cells.len() <= col {
        cells.resize(col + 1, String::new());
    }
    cells[col] = value.to_owned();
}

fn raw_reader(bytes: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new().flexible(true).from_reader(bytes)
}

fn offset(reader: &csv::Reader<&[u8]>, len: usize) -> usize {
    usize::try_from(reader.position().byte())
        .unwrap_or(len)
        .min(len)
}

/// End of a line's content, before its `\n` or `\r\n`.
fn content_end(bytes: &[u8], start: usize, end: usize) -> usize {
    let mut end = end.min(bytes.len());
    while end > start && matches!(bytes[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    end
}

fn skip_line_breaks(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && matches!(bytes[pos], b'\r' | b'\n') {
        pos += 1;
    }
    pos
}

/// One CSV record without a line terminator.
fn encode_record<I, T>(fields: I) -> anyhow::Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields).context("encode ledger record")?;
    let mut out = writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("flush ledger record: {}", err.error()))?;
    if out.last() == Some(&b'\n') {
        out.pop();
    }
    Ok(out)
}

/// Header line with `added` names appended after the existing raw text.
fn extend_header(raw: &[u8], added: &[String]) -> anyhow::Result<Vec<u8>> {
    let mut out = raw.to_vec();
    if added.is_empty() {
        return Ok(out);
    }
    if !out.is_empty() {
        out.push(b',');
    }
    out.extend(encode_record(added)?);
    Ok(out)
}

/// Appends any of `names` missing from the ledger header. Only the header
/// line changes; its terminator and every data row are copied byte for byte.
/// Returns whether the file changed.
pub fn ensure_columns(path: &Path, names: &[&str]) -> anyhow::Result<bool> {
    let bytes = std::fs::read(path).with_context(|| format!("read ledger: {}", path.display()))?;

    let mut reader = raw_reader(&bytes);
    let headers = reader
        .headers()
        .with_context(|| format!("read ledger header: {}", path.display()))?
        .iter()
        .map(str::to_owned)
        .collect::<Vec<_>>();
    let header_end = content_end(&bytes, 0, offset(&reader, bytes.len()));

    let mut missing: Vec<String> = Vec::new();
    for name in names {
        if !headers.iter().any(|h| h == name) && !missing.iter().any(|m| m == name) {
            missing.push((*name).to_owned());
        }
    }
    if missing.is_empty() {
        return Ok(false);
    }

    let mut out = extend_header(&bytes[..header_end], &missing)?;
    out.extend_from_slice(&bytes[header_end..]);
    write_atomic(path, &out)?;
    Ok(true)
}

/// Ledger Row Updater: merges `fields` into the first row whose `url` equals
/// `url`. Only that row is re-encoded (plus the header when it gains
/// columns); every other byte of the file is kept. Returns `false` when no
/// row matched.
pub fn update_row(path: &Path, url: &str, fields: &[(&str, String)]) -> anyhow::Result<bool> {
    let bytes = std::fs::read(path).with_context(|| format!("read ledger: {}", path.display()))?;

    let mut reader = raw_reader(&bytes);
    let mut headers = reader
        .headers()
        .with_context(|| format!("read ledger header: {}", path.display()))?
        .iter()
        .map(str::to_owned)
        .collect::<Vec<_>>();
    let header_end = content_end(&bytes, 0, offset(&reader, bytes.len()));
    let Some(url_col) = headers.iter().position(|h| h == "url") else {
        return Ok(false);
    };

    let mut record = csv::StringRecord::new();
    let (row_start, row_end) = loop {
        let start = skip_line_breaks(&bytes, offset(&reader, bytes.len()));
        if !reader
            .read_record(&mut record)
            .with_context(|| format!("read ledger row: {}", path.display()))?
        {
            return Ok(false);
        }
        if record.get(url_col) == Some(url) {
            break (start, content_end(&bytes, start, offset(&reader, bytes.len())));
        }
    };

    let mut cells = record.iter().map(str::to_owned).collect::<Vec<_>>();
    let mut added = Vec::new();
    for (name, value) in fields {
        let col = match headers.iter().position(|h| h == name) {
            Some(col) => col,
            None => {
                headers.push((*name).to_owned());
                added.push((*name).to_owned());
                headers.len() - 1
            }
        };
        set_cell(&mut cells, col, value);
    }

    let mut out = extend_header(&bytes[..header_end], &added)?;
    out.extend_from_slice(&bytes[header_end..row_start]);
    out.extend(encode_record(&cells)?);
    out.extend_from_slice(&bytes[row_end..]);
    write_atomic(path, &out)?;
    Ok(true)
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file next to ledger: {}", path.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp ledger for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync temp ledger for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace ledger: {}", path.display()))?;
    Ok(())
}
