//! Template compiler adapter (minijinja).
//!
//! Input files are page templates relative to `src/templates/pages`. Each is
//! rendered with the template root (`src/templates`) as the loader base, so
//! pages can `{% extends "lib/base.html" %}` or `{% include %}` partials.
//!
//! Templates see two globals:
//!
//! - `site`: the site configuration, `[data]` flattened in, plus the derived
//!   `protect` and `base_url` values
//! - `page.path`: the page's output path, e.g. `about/index.html`
//!
//! Output of `.html` templates is HTML-escaped, but only `& < > " '` are
//! replaced. Slashes are kept, so root-relative URLs built from variables
//! (`href="/{{ page.path }}"`) stay visible to the release URL rewriter.
//!
//! A page that fails to parse is a lint error: it is reported and skipped,
//! and the rest of the pages still compile. Any other render failure fails
//! the whole transform.

use super::{Adapter, AdapterError, LintError, Transformed};
use crate::fileset::{FileSet, SourceFile};
use crate::layout::slash_path;
use minijinja::{AutoEscape, Environment, Error, ErrorKind, Output, State, Value, context};
use regex::Regex;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

static BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("static regex"));

pub struct TemplateCompiler {
    env: Environment<'static>,
    site: Value,
    pretty: bool,
}

impl TemplateCompiler {
    pub fn new(template_root: &Path, site: &impl Serialize, pretty: bool) -> Self {
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(template_root));
        env.set_keep_trailing_newline(true);
        env.set_formatter(html_formatter);
        Self {
            env,
            site: Value::from_serialize(site),
            pretty,
        }
    }

    fn render(&self, file: &SourceFile) -> Result<Result<String, LintError>, AdapterError> {
        let path = slash_path(&file.path);
        let Some(source) = file.text() else {
            return Err(AdapterError::Failed {
                tool: self.name(),
                file: file.path.clone(),
                message: "template is not valid UTF-8".into(),
            });
        };
        let name = format!("pages/{path}");
        let ctx = context! {
            site => &self.site,
            page => context! { path => &path },
        };
        match self.env.render_named_str(&name, source, ctx) {
            Ok(html) => Ok(Ok(html)),
            Err(e) if e.kind() == ErrorKind::SyntaxError => Ok(Err(LintError {
                file: file.path.clone(),
                message: e.to_string(),
            })),
            Err(e) => Err(AdapterError::Failed {
                tool: self.name(),
                file: file.path.clone(),
                message: e.to_string(),
            }),
        }
    }
}

impl Adapter for TemplateCompiler {
    fn name(&self) -> &'static str {
        "minijinja"
    }

    fn apply(&self, input: FileSet) -> Result<Transformed, AdapterError> {
        let mut out = Transformed::default();
        for file in input.iter() {
            match self.render(file)? {
                Ok(html) => {
                    let html = if self.pretty {
                        html
                    } else {
                        compress_html(&html)
                    };
                    out.files.push(SourceFile::new(file.path.clone(), html));
                }
                Err(lint) => out.lint.push(lint),
            }
        }
        Ok(out)
    }
}

fn html_formatter(out: &mut Output, state: &State, value: &Value) -> Result<(), Error> {
    let escape = matches!(state.auto_escape(), AutoEscape::Html)
        && !value.is_safe()
        && !value.is_none()
        && !value.is_undefined();
    if !escape {
        return minijinja::escape_formatter(out, state, value);
    }
    out.write_str(&escape_html(&value.to_string()))?;
    Ok(())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Collapse whitespace between tags and trim the document.
pub fn compress_html(html: &str) -> String {
    BETWEEN_TAGS.replace_all(html.trim(), "><").into_owned()
}
