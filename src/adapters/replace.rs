//! URL rewriting for relative deployment.
//!
//! Rewrites root-relative references in HTML and CSS so a site built for `/`
//! can be served from a sub-path or another host:
//!
//! ```text
//! src="/img/a.png"      →  src="https://example.com/site/img/a.png"
//! href="/about/"        →  href="https://example.com/site/about/"
//! url("/fonts/x.woff")  →  url("https://example.com/site/fonts/x.woff")
//! ```
//!
//! Protocol-relative references (`src="//cdn.example.com/x"`) are never
//! touched: the character after the leading slash must not be another slash.
//! `href="/?query"` is also left alone.

use super::{Adapter, AdapterError, Transformed};
use crate::fileset::{FileSet, SourceFile};
use regex::{Captures, Regex};
use std::sync::LazyLock;

struct Rule {
    pattern: Regex,
    prefix: &'static str,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    [
        (r#"src="/([^/])"#, "src=\""),
        (r#"href="/([^/?])"#, "href=\""),
        (r#"url\("/([^/])"#, "url(\""),
    ]
    .into_iter()
    .map(|(pattern, prefix)| Rule {
        pattern: Regex::new(pattern).expect("static regex"),
        prefix,
    })
    .collect()
});

pub struct UrlRewriter {
    base_url: String,
}

impl UrlRewriter {
    /// `base_url` should already have its trailing slash stripped.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn rewrite(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in RULES.iter() {
            out = rule
                .pattern
                .replace_all(&out, |caps: &Captures| {
                    format!("{}{}/{}", rule.prefix, self.base_url, &caps[1])
                })
                .into_owned();
        }
        out
    }
}

impl Adapter for UrlRewriter {
    fn name(&self) -> &'static str {
        "replace"
    }

    fn apply(&self, input: FileSet) -> Result<Transformed, AdapterError> {
        let files = input
            .into_iter()
            .map(|file| match file.text() {
                Some(text) => SourceFile::new(file.path.clone(), self.rewrite(text)),
                None => file,
            })
            .collect::<FileSet>();
        Ok(files.into())
    }
}
