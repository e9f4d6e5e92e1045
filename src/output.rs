//! CLI output formatting for pipeline events.
//!
//! Every task, the watcher and the preview server report progress as
//! [`PipelineEvent`]s sent over a channel to a printer thread. This module
//! turns each event into display lines.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! ==> style-compile
//! ==> template-compile
//!     1 file → dist
//! <== style-compile (18 ms)
//! Template Lint Error: broken/index.html
//!     syntax error: unexpected end of input (in pages/broken/index.html:1)
//!     3 files → dist
//! <== template-compile (25 ms)
//! ```
//!
//! Lines of concurrently running tasks interleave; every line names its task
//! or follows one that does.
//!
//! ## Release
//!
//! ```text
//! ==> image-optimize
//!     2 files → public/imgs
//!     Cache: 5 cached, 2 optimized (7 total)
//! <== image-optimize (1.4 s)
//! ```
//!
//! ## Watch
//!
//! ```text
//! Watching
//!     src/styles
//!     dist
//! Changed src/styles/style.scss → style-compile
//! Reloaded preview (#3)
//! ```
//!
//! # Architecture
//!
//! `format_*` functions return `Vec<String>` and are pure, no I/O, so they
//! can be tested directly. `print_*` wrappers write to stdout. Paths are
//! shown relative to the project root when they are under it.

use crate::graph::TaskEvent;
use crate::scaffold::ScaffoldReport;
use crate::tasks::PipelineEvent;
use std::path::Path;
use std::time::Duration;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 file`, `3 files`.
fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Display `path` relative to `root` when it is under it.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

/// `850 ms` below one second, `1.4 s` above.
pub fn format_duration(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(1) {
        format!("{} ms", elapsed.as_millis())
    } else {
        format!("{:.1} s", elapsed.as_secs_f64())
    }
}

/// Format a single pipeline event as display lines.
pub fn format_event(event: &PipelineEvent, root: &Path) -> Vec<String> {
    match event {
        PipelineEvent::Task(TaskEvent::Started(task)) => vec![format!("==> {task}")],
        PipelineEvent::Task(TaskEvent::Finished { task, elapsed }) => {
            vec![format!("<== {task} ({})", format_duration(*elapsed))]
        }
        PipelineEvent::Task(TaskEvent::Failed { task, message }) => {
            vec![format!("!!! {task} failed: {message}")]
        }
        PipelineEvent::Lint { error, .. } => {
            let mut lines = vec![format!("Template Lint Error: {}", error.file.display())];
            lines.extend(
                error
                    .message
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(|l| format!("{}{}", indent(1), l.trim_end())),
            );
            lines
        }
        PipelineEvent::Wrote { count, dest, .. } => vec![format!(
            "{}{} → {}",
            indent(1),
            plural(*count, "file"),
            display_path(dest, root)
        )],
        PipelineEvent::Optimized(stats) => vec![format!("{}Cache: {stats}", indent(1))],
        PipelineEvent::Scaffolded(report) => format_scaffold_report(report, root),
        PipelineEvent::Skipped { task, reason } => {
            vec![format!("{}{task} skipped: {reason}", indent(1))]
        }
        PipelineEvent::WatchStarted { roots } => {
            let mut lines = vec!["Watching".to_string()];
            lines.extend(
                roots
                    .iter()
                    .map(|r| format!("{}{}", indent(1), display_path(r, root))),
            );
            lines
        }
        PipelineEvent::WatchTriggered { path, task } => {
            vec![format!("Changed {} → {task}", display_path(path, root))]
        }
        PipelineEvent::WatchError(message) => vec![format!("Watch error: {message}")],
        PipelineEvent::Reloaded { version } => vec![format!("Reloaded preview (#{version})")],
        PipelineEvent::Serving { url } => vec![format!("Serving dist/ at {url}")],
    }
}

/// Print a pipeline event to stdout.
pub fn print_event(event: &PipelineEvent, root: &Path) {
    for line in format_event(event, root) {
        println!("{}", line);
    }
}

/// Format the outcome of `scaffold-pages`.
///
/// ```text
///     created src/templates/pages/about/index.html
///     2 existing pages skipped
///     failed /../x: path leaves the pages directory
/// ```
pub fn format_scaffold_report(report: &ScaffoldReport, root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for created in &report.created {
        lines.push(format!("{}created {}", indent(1), display_path(created, root)));
    }
    if !report.skipped.is_empty() {
        lines.push(format!(
            "{}{} skipped",
            indent(1),
            plural(report.skipped.len(), "existing page")
        ));
    }
    for failure in &report.failed {
        lines.push(format!(
            "{}failed {}: {}",
            indent(1),
            failure.record,
            failure.message
        ));
    }
    if lines.is_empty() {
        lines.push(format!("{}no pages listed", indent(1)));
    }
    lines
}
