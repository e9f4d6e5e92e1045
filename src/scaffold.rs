//! Blank page scaffolding from `pages.csv`.
//!
//! Each row of the page list names a URL path and a title:
//!
//! ```text
//! path,title
//! /about,About us
//! /blog/,Blog
//! ```
//!
//! For every row whose page template does not exist yet, a new template is
//! written from `src/templates/lib/_template.html` with `<%= title %>`
//! replaced by the row's title:
//!
//! ```text
//! /about   →  src/templates/pages/about/index.html
//! /blog/   →  src/templates/pages/blog/index.html
//! ```
//!
//! Existing files are never touched. Files are created with create-new
//! semantics, so even a file that appears between the existence check and
//! the write is left alone. A bad row is recorded in the report and the
//! remaining rows are still processed.

use crate::layout::{Layout, PAGE_FILENAME};
use regex::{NoExpand, Regex};
use serde::Deserialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static TITLE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<%=\s*title\s*%>").expect("static regex"));

/// Errors that stop scaffolding before any row is processed: a missing page
/// list or blank template.
#[derive(Error, Debug)]
pub enum ScaffoldError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One row of the page list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageRecord {
    pub path: String,
    pub title: String,
}

/// A row that could not be scaffolded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldFailure {
    /// The row's path, or its line number if the row could not be parsed.
    pub record: String,
    pub message: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScaffoldReport {
    /// Newly written templates.
    pub created: Vec<PathBuf>,
    /// Destinations that already existed.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<ScaffoldFailure>,
}

/// Parse page records. Rows that fail to parse are returned as failures
/// alongside the good ones.
pub fn parse_records(reader: impl io::Read) -> (Vec<PageRecord>, Vec<ScaffoldFailure>) {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();
    let mut failures = Vec::new();
    for (row, result) in csv.deserialize::<PageRecord>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => failures.push(ScaffoldFailure {
                // +2: one for the header, one for 1-based lines
                record: format!("line {}", row + 2),
                message: e.to_string(),
            }),
        }
    }
    (records, failures)
}

/// Compute where a page path's template lives under `pages_dir`.
///
/// Appends `/` when missing, then `index.html`; a leading `/` is ignored.
/// Returns `None` for paths that would leave `pages_dir`.
pub fn page_destination(pages_dir: &Path, page_path: &str) -> Option<PathBuf> {
    let mut relative = page_path.trim().to_string();
    if !relative.ends_with('/') {
        relative.push('/');
    }
    relative.push_str(PAGE_FILENAME);
    let relative = Path::new(relative.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(pages_dir.join(relative))
}

/// Substitute `title` into the blank template.
pub fn render_blank(template: &str, title: &str) -> String {
    TITLE_PLACEHOLDER
        .replace_all(template, NoExpand(title))
        .into_owned()
}

/// Scaffold every record into `pages_dir` from the `blank` template text.
pub fn scaffold_records(records: &[PageRecord], pages_dir: &Path, blank: &str) -> ScaffoldReport {
    let mut report = ScaffoldReport::default();
    for record in records {
        let Some(dest) = page_destination(pages_dir, &record.path) else {
            report.failed.push(ScaffoldFailure {
                record: record.path.clone(),
                message: "path leaves the pages directory".into(),
            });
            continue;
        };
        if dest.exists() {
            report.skipped.push(dest);
            continue;
        }
        match create_page(&dest, &render_blank(blank, &record.title)) {
            Ok(()) => report.created.push(dest),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => report.skipped.push(dest),
            Err(e) => report.failed.push(ScaffoldFailure {
                record: record.path.clone(),
                message: format!("{}: {e}", dest.display()),
            }),
        }
    }
    report
}

fn create_page(dest: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().write(true).create_new(true).open(dest)?;
    file.write_all(contents.as_bytes())
}

/// Read `pages.csv` and the blank template from the project and scaffold
/// every listed page.
pub fn scaffold(layout: &Layout) -> Result<ScaffoldReport, ScaffoldError> {
    let list = layout.page_list();
    let file = fs::File::open(&list).map_err(|source| ScaffoldError::Io {
        path: list.clone(),
        source,
    })?;
    let template_path = layout.blank_page_template();
    let blank = fs::read_to_string(&template_path).map_err(|source| ScaffoldError::Io {
        path: template_path.clone(),
        source,
    })?;

    let (records, parse_failures) = parse_records(file);
    let mut report = scaffold_records(&records, &layout.pages(), &blank);
    report.failed.splice(0..0, parse_failures);
    Ok(report)
}
