//! The concrete task set.
//!
//! Every task is a thin pipe: read a source selection into a [`FileSet`],
//! hand it to one [`Adapter`], write the result under a destination root.
//!
//! ```text
//! serve ─▶ watch ─▶ build ─┬─▶ template-compile   src/templates/pages → dist/
//!                          ├─▶ style-compile      src/styles/style.scss → dist/style.css
//!                          ├─▶ script-bundle      src/scripts/entry.js → dist/script.js
//!                          └─▶ static-image-copy  src/images → dist/imgs
//!
//! release ─┬─▶ build
//!          ├─▶ image-optimize     src/images → public/imgs
//!          └─▶ favicon-generate   src/favicon.* → public/
//!
//! pre-release ─▶ build
//! scaffold-pages, rewrite-urls    standalone
//! ```
//!
//! The registry is built once per process by [`registry`]. Tasks share a
//! read-only [`Pipeline`] context and report progress as [`PipelineEvent`]s.

use crate::adapters::{
    Adapter, AdapterError, FaviconGenerator, ImageOptimizer, LintError, Passthrough,
    ScriptBundler, StyleCompiler, TemplateCompiler,
};
use crate::cache::{self, CacheManifest, CacheStats};
use crate::config::{DerivedValues, SiteConfig};
use crate::fileset::{FileSet, FileSetError};
use crate::graph::{GraphError, RunError, TaskEvent, TaskGraph};
use crate::layout::{self, Layout};
use crate::release;
use crate::scaffold::{self, ScaffoldError, ScaffoldReport};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum,
)]
pub enum TaskId {
    Build,
    TemplateCompile,
    StyleCompile,
    ScriptBundle,
    StaticImageCopy,
    ImageOptimize,
    FaviconGenerate,
    ScaffoldPages,
    Watch,
    Serve,
    RewriteUrls,
    PreRelease,
    Release,
}

impl TaskId {
    pub fn name(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::TemplateCompile => "template-compile",
            Self::StyleCompile => "style-compile",
            Self::ScriptBundle => "script-bundle",
            Self::StaticImageCopy => "static-image-copy",
            Self::ImageOptimize => "image-optimize",
            Self::FaviconGenerate => "favicon-generate",
            Self::ScaffoldPages => "scaffold-pages",
            Self::Watch => "watch",
            Self::Serve => "serve",
            Self::RewriteUrls => "rewrite-urls",
            Self::PreRelease => "pre-release",
            Self::Release => "release",
        }
    }

    /// Entry points that produce publishable output.
    pub fn is_publishing(self) -> bool {
        matches!(self, Self::Release | Self::PreRelease)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Files(#[from] FileSetError),
    #[error(transparent)]
    Scaffold(#[from] ScaffoldError),
    #[error("relative release needs `url` in site.toml")]
    MissingBaseUrl,
}

/// Progress reported by tasks, the watcher and the preview server.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Task(TaskEvent<TaskId>),
    /// A template failed to parse and was skipped.
    Lint { task: TaskId, error: LintError },
    Wrote {
        task: TaskId,
        count: usize,
        dest: PathBuf,
    },
    Optimized(CacheStats),
    Scaffolded(ScaffoldReport),
    Skipped { task: TaskId, reason: String },
    WatchStarted { roots: Vec<PathBuf> },
    WatchTriggered { path: PathBuf, task: TaskId },
    WatchError(String),
    Reloaded { version: u64 },
    Serving { url: String },
}

pub type TaskRegistry = TaskGraph<TaskId, Pipeline, PipelineError>;
pub type PipelineRunError = RunError<TaskId, PipelineError>;

/// Shared, read-only context of one invocation.
pub struct Pipeline {
    pub layout: Layout,
    pub config: SiteConfig,
    pub derived: DerivedValues,
    pub no_cache: bool,
    events: Option<Sender<PipelineEvent>>,
}

/// What templates see as `site`.
#[derive(Serialize)]
struct SiteData<'a> {
    #[serde(flatten)]
    config: &'a SiteConfig,
    #[serde(flatten)]
    data: &'a toml::Table,
    protect: bool,
    base_url: Option<&'a str>,
}

impl Pipeline {
    /// Derived values are computed here, once, for the requested entry task.
    pub fn new(layout: Layout, config: SiteConfig, target: TaskId) -> Self {
        let derived = DerivedValues::compute(&config, target.is_publishing());
        Self {
            layout,
            config,
            derived,
            no_cache: false,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // A closed printer only loses progress output.
            let _ = tx.send(event);
        }
    }

    /// Run `target` and its dependencies on `registry`, reporting task
    /// events through this pipeline.
    pub fn run(&self, registry: &TaskRegistry, target: TaskId) -> Result<Vec<TaskId>, PipelineRunError> {
        registry.run(target, self, &|event| self.emit(PipelineEvent::Task(event)))
    }

    /// Transform `input` with `adapter` and write the result under `dest`.
    /// Lint errors are reported and their files skipped. Returns the number
    /// of files written.
    pub fn pipe(
        &self,
        task: TaskId,
        adapter: &dyn Adapter,
        input: FileSet,
        dest: &Path,
    ) -> Result<usize, PipelineError> {
        let transformed = adapter.apply(input)?;
        for error in transformed.lint {
            self.emit(PipelineEvent::Lint { task, error });
        }
        let written = transformed.files.write_to(dest)?;
        self.emit(PipelineEvent::Wrote {
            task,
            count: written.len(),
            dest: dest.to_path_buf(),
        });
        Ok(written.len())
    }

    fn site_data(&self) -> SiteData<'_> {
        SiteData {
            config: &self.config,
            data: &self.config.data,
            protect: self.derived.protect,
            base_url: self.derived.base_url.as_deref(),
        }
    }
}

/// Build the task registry.
pub fn registry() -> Result<TaskRegistry, GraphError<TaskId>> {
    use TaskId::*;
    TaskGraph::builder()
        .task(TemplateCompile, &[], template_compile)
        .task(StyleCompile, &[], style_compile)
        .task(ScriptBundle, &[], script_bundle)
        .task(StaticImageCopy, &[], static_image_copy)
        .composite(
            Build,
            &[TemplateCompile, StyleCompile, ScriptBundle, StaticImageCopy],
        )
        .task(ImageOptimize, &[], image_optimize)
        .task(FaviconGenerate, &[], favicon_generate)
        .task(ScaffoldPages, &[], scaffold_pages)
        // The coordinator takes over once these complete.
        .composite(Watch, &[Build])
        .composite(Serve, &[Watch])
        .task(RewriteUrls, &[], release::rewrite_urls)
        .task(PreRelease, &[Build], release::pre_release)
        .task(
            Release,
            &[Build, ImageOptimize, FaviconGenerate],
            release::release,
        )
        .default_task(Serve)
        .build()
}

fn template_compile(p: &Pipeline) -> Result<(), PipelineError> {
    let compiler = TemplateCompiler::new(&p.layout.templates(), &p.site_data(), p.config.format);
    let input = FileSet::read(&p.layout.pages(), layout::is_page_template)?;
    p.pipe(TaskId::TemplateCompile, &compiler, input, &p.layout.dist())?;
    Ok(())
}

fn style_compile(p: &Pipeline) -> Result<(), PipelineError> {
    let compiler = StyleCompiler::new(p.layout.styles(), p.config.format);
    let input = FileSet::read_single(&p.layout.style_entry())?;
    p.pipe(TaskId::StyleCompile, &compiler, input, &p.layout.dist())?;
    Ok(())
}

fn script_bundle(p: &Pipeline) -> Result<(), PipelineError> {
    let bundler = ScriptBundler::new(p.config.scripts.bundler.clone(), p.layout.scripts());
    let input = FileSet::read_single(&p.layout.script_entry())?;
    p.pipe(TaskId::ScriptBundle, &bundler, input, &p.layout.dist())?;
    Ok(())
}

fn static_image_copy(p: &Pipeline) -> Result<(), PipelineError> {
    let input = FileSet::read(&p.layout.images(), |_| true)?;
    p.pipe(TaskId::StaticImageCopy, &Passthrough, input, &p.layout.dist_images())?;
    Ok(())
}

/// Optimize `src/images` into `public/imgs`, skipping files the cache
/// manifest says are up to date.
fn image_optimize(p: &Pipeline) -> Result<(), PipelineError> {
    let dest = p.layout.public_images();
    let optimizer = ImageOptimizer::new(p.config.images.quality);
    let params_hash = cache::hash_optimize_params(optimizer.quality());
    let mut manifest = if p.no_cache {
        CacheManifest::empty()
    } else {
        CacheManifest::load(&dest)
    };
    let mut stats = CacheStats::default();

    let mut pending = FileSet::new();
    let mut pending_keys = Vec::new();
    let mut live = HashSet::new();
    for file in FileSet::read(&p.layout.images(), |_| true)? {
        let source_hash = cache::hash_bytes(&file.contents);
        let key = layout::slash_path(&file.path);
        live.insert(key.clone());
        match manifest.find_cached(&key, &source_hash, &params_hash, &dest) {
            Some(stored) if stored == key => stats.hit(),
            Some(stored) => {
                let from = dest.join(&stored);
                let to = dest.join(&file.path);
                if let Some(parent) = to.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| FileSetError::io(parent, e))?;
                }
                std::fs::copy(&from, &to).map_err(|e| FileSetError::io(&from, e))?;
                manifest.insert(key, source_hash, params_hash.clone());
                stats.copy();
            }
            None => {
                pending_keys.push((key, source_hash));
                pending.push(file);
                stats.miss();
            }
        }
    }

    p.pipe(TaskId::ImageOptimize, &optimizer, pending, &dest)?;
    for (key, source_hash) in pending_keys {
        manifest.insert(key, source_hash, params_hash.clone());
    }
    manifest.retain_outputs(|path| live.contains(path));
    manifest
        .save(&dest)
        .map_err(|e| FileSetError::io(cache::manifest_path(&dest), e))?;
    p.emit(PipelineEvent::Optimized(stats));
    Ok(())
}

fn favicon_generate(p: &Pipeline) -> Result<(), PipelineError> {
    // Only direct children of src/ are favicon sources.
    let input = FileSet::read(&p.layout.src(), |path| {
        path.components().count() == 1 && layout::is_favicon_source(path)
    })?;
    if input.is_empty() {
        p.emit(PipelineEvent::Skipped {
            task: TaskId::FaviconGenerate,
            reason: "no src/favicon.* file".into(),
        });
        return Ok(());
    }
    let generator = FaviconGenerator::new(p.config.favicon.clone());
    p.pipe(TaskId::FaviconGenerate, &generator, input, &p.layout.public())?;
    Ok(())
}

fn scaffold_pages(p: &Pipeline) -> Result<(), PipelineError> {
    let report = scaffold::scaffold(&p.layout)?;
    p.emit(PipelineEvent::Scaffolded(report));
    Ok(())
}
