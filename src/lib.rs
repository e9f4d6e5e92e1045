//! # sitepipe
//!
//! A static-site asset pipeline packaged as a single CLI. It compiles
//! templates, stylesheets and scripts from a source tree into a preview site,
//! and produces a publishable release with optimized images, favicons and,
//! optionally, URLs rewritten for deployment under a base URL.
//!
//! # Architecture: Pipes on a Task Graph
//!
//! Every unit of work is a task: a thin pipe that reads a source selection
//! into a [`fileset::FileSet`], transforms it through one
//! [`adapters::Adapter`], and writes the result under a destination root.
//! Tasks declare dependencies and run on a [`graph::TaskGraph`]:
//!
//! ```text
//! site.toml ─▶ config ─▶ Pipeline (layout, config, derived values, events)
//!                              │
//!           tasks::registry() ─┴─▶ TaskGraph::run(target)
//!                                     │
//!                     ┌───────────────┼───────────────┐
//!                     ▼               ▼               ▼
//!              template-compile  style-compile  ...  (scoped threads)
//!                     │
//!          FileSet::read ─▶ Adapter::apply ─▶ FileSet::write_to
//! ```
//!
//! Two output roots:
//!
//! - `dist/`: local preview, written by `build` and served by `serve`
//! - `public/`: publishable release, written by `release` / `pre-release`
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`graph`] | Generic dependency-ordered task runner with cycle detection |
//! | [`tasks`] | The concrete task set, pipeline context, events and errors |
//! | [`adapters`] | File transform adapters around minijinja, grass, the bundler command, `image`, regex |
//! | [`fileset`] | In-memory file sets: read a selection, write under a root |
//! | [`release`] | Release, pre-release and standalone URL rewriting |
//! | [`scaffold`] | Blank page scaffolding from `pages.csv` |
//! | [`watch`] | Change routing and the watch state machine |
//! | [`serve`] | Preview HTTP server with polling live reload |
//! | [`cache`] | Content-addressed optimization cache for `image-optimize` |
//! | [`config`] | `site.toml` loading, validation, and derived values |
//! | [`layout`] | The fixed project layout |
//! | [`output`] | CLI output formatting of pipeline events |
//!
//! # Design Decisions
//!
//! ## Configuration Is Read Once
//!
//! `site.toml` is loaded and validated before any task runs, then frozen.
//! Values that depend on the entry task (`protect`) or need normalizing
//! (`base_url`) are computed once into [`config::DerivedValues`] and passed
//! alongside, never written back.
//!
//! ## Tools Behind Adapters
//!
//! Tasks never call a compiler directly. Each tool sits behind the same
//! file-set-in, file-set-out contract, so tasks can be exercised with a
//! recording mock and a tool can be swapped without touching the graph.
//!
//! ## Run Build Once, Then Watch
//!
//! `watch` and `serve` depend on `build` like any other task. After the
//! graph completes, the coordinator only runs the single task bound to a
//! changed path. Dependencies are not re-run per change.

pub mod adapters;
pub mod cache;
pub mod config;
pub mod fileset;
pub mod graph;
pub mod layout;
pub mod output;
pub mod release;
pub mod scaffold;
pub mod serve;
pub mod tasks;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
