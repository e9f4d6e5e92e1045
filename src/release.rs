//! Release pipeline: preview output (`dist/`) → publish output (`public/`).
//!
//! By the time these actions run, the graph has already run `build` (and for
//! `release` also `image-optimize` and `favicon-generate`, which write
//! straight into `public/`). What is left is moving the preview output
//! across:
//!
//! | Entry | Mode | Effect |
//! |---|---|---|
//! | `release` | `is_relative = true` | `.html`/`.css` rewritten to `base_url`, `.js` copied |
//! | `release` | `is_relative = false` | everything copied except `dist/imgs/**` |
//! | `pre-release` | any | everything copied, nothing rewritten |
//! | `rewrite-urls` | any | `.html`/`.css` rewritten; skipped without `url` |
//!
//! Raw images are excluded from an absolute release because `public/imgs`
//! holds the optimized copies. Partial writes are not rolled back on failure.

use crate::adapters::UrlRewriter;
use crate::fileset::{FileSet, copy_tree};
use crate::layout::{IMAGES_SUBDIR, has_extension};
use crate::tasks::{Pipeline, PipelineError, PipelineEvent, TaskId};
use std::path::Path;

/// Files the URL rewriter applies to.
pub fn is_rewritable(path: &Path) -> bool {
    has_extension(path, "html") || has_extension(path, "css")
}

/// Absolute-mode filter: everything but the raw image subtree.
pub fn is_outside_images(path: &Path) -> bool {
    !path.starts_with(IMAGES_SUBDIR)
}

fn rewrite_into_public(p: &Pipeline, task: TaskId, base_url: &str) -> Result<usize, PipelineError> {
    let input = FileSet::read(&p.layout.dist(), is_rewritable)?;
    p.pipe(task, &UrlRewriter::new(base_url), input, &p.layout.public())
}

fn copy_into_public(
    p: &Pipeline,
    task: TaskId,
    filter: impl Fn(&Path) -> bool,
) -> Result<usize, PipelineError> {
    let public = p.layout.public();
    let count = copy_tree(&p.layout.dist(), &public, filter)?;
    p.emit(PipelineEvent::Wrote {
        task,
        count,
        dest: public,
    });
    Ok(count)
}

pub fn release(p: &Pipeline) -> Result<(), PipelineError> {
    if p.config.is_relative {
        let base_url = p
            .derived
            .base_url
            .as_deref()
            .ok_or(PipelineError::MissingBaseUrl)?;
        rewrite_into_public(p, TaskId::Release, base_url)?;
        copy_into_public(p, TaskId::Release, |path| has_extension(path, "js"))?;
    } else {
        copy_into_public(p, TaskId::Release, is_outside_images)?;
    }
    Ok(())
}

pub fn pre_release(p: &Pipeline) -> Result<(), PipelineError> {
    copy_into_public(p, TaskId::PreRelease, |_| true)?;
    Ok(())
}

pub fn rewrite_urls(p: &Pipeline) -> Result<(), PipelineError> {
    match p.derived.base_url.as_deref() {
        Some(base_url) => {
            rewrite_into_public(p, TaskId::RewriteUrls, base_url)?;
        }
        None => p.emit(PipelineEvent::Skipped {
            task: TaskId::RewriteUrls,
            reason: "no url configured".into(),
        }),
    }
    Ok(())
}
