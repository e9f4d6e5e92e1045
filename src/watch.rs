//! Watch/serve coordinator.
//!
//! After the initial `build` (run by the graph as the dependency of `watch`),
//! the coordinator observes the source tree and the preview directory and
//! maps each changed path to a target:
//!
//! | Root | Files | Target |
//! |---|---|---|
//! | `src/styles` | `*.scss` | `style-compile` |
//! | `src/templates` | `*.html` | `template-compile` |
//! | `src/images` | any | `static-image-copy` |
//! | `src/scripts` | `*.js` | `script-bundle` |
//! | `dist` | any | reload signal |
//!
//! State machine:
//!
//! ```text
//! Idle ──start──▶ Watching ──change──▶ TaskTriggered(task) ──done/failed──▶ Watching
//! ```
//!
//! Only the bound task runs on a change; its dependencies are not re-run.
//! A failing task is reported and the coordinator keeps watching.
//!
//! Changes arriving in quick succession are collected into batches. Every
//! changed path in a batch triggers its bound task again, in arrival order;
//! only the duplicate paths of a single notification are dropped. Preview
//! changes within one batch send a single reload signal.

use crate::layout::{Layout, has_extension};
use crate::tasks::{Pipeline, PipelineEvent, TaskId, TaskRegistry};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use thiserror::Error;

/// How long to keep collecting changes after the first one of a batch.
const BATCH_WINDOW: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("file watcher: {0}")]
    Notify(#[from] notify::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Task(TaskId),
    Reload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    TaskTriggered(TaskId),
}

/// Receives the reload signal when preview output changes.
pub trait Reload: Sync {
    fn reload(&self) -> u64;
}

pub struct WatchBinding {
    pub root: PathBuf,
    predicate: fn(&Path) -> bool,
    pub target: Target,
}

impl WatchBinding {
    /// Whether `path` (absolute, as reported by the watcher) falls under this
    /// binding.
    pub fn matches(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root)
            .is_ok_and(|relative| (self.predicate)(relative))
    }
}

fn any_file(_: &Path) -> bool {
    true
}

pub fn bindings(layout: &Layout) -> Vec<WatchBinding> {
    vec![
        WatchBinding {
            root: layout.styles(),
            predicate: |p| has_extension(p, "scss"),
            target: Target::Task(TaskId::StyleCompile),
        },
        WatchBinding {
            root: layout.templates(),
            predicate: |p| has_extension(p, "html"),
            target: Target::Task(TaskId::TemplateCompile),
        },
        WatchBinding {
            root: layout.images(),
            predicate: any_file,
            target: Target::Task(TaskId::StaticImageCopy),
        },
        WatchBinding {
            root: layout.scripts(),
            predicate: |p| has_extension(p, "js"),
            target: Target::Task(TaskId::ScriptBundle),
        },
        WatchBinding {
            root: layout.dist(),
            predicate: any_file,
            target: Target::Reload,
        },
    ]
}

/// A changed path and the target of the binding it fell under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub path: PathBuf,
    pub target: Target,
}

/// One trigger per changed path that falls under a binding, in path order.
/// Binding roots are disjoint, so a path matches at most one binding.
pub fn route(bindings: &[WatchBinding], paths: &[PathBuf]) -> Vec<Trigger> {
    paths
        .iter()
        .filter_map(|path| {
            bindings.iter().find(|b| b.matches(path)).map(|b| Trigger {
                path: path.clone(),
                target: b.target,
            })
        })
        .collect()
}

pub struct Coordinator<'a> {
    pipeline: &'a Pipeline,
    registry: &'a TaskRegistry,
    reload: Option<&'a dyn Reload>,
    bindings: Vec<WatchBinding>,
    state: WatchState,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        pipeline: &'a Pipeline,
        registry: &'a TaskRegistry,
        reload: Option<&'a dyn Reload>,
    ) -> Self {
        Self {
            pipeline,
            registry,
            reload,
            bindings: bindings(&pipeline.layout),
            state: WatchState::Idle,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn start(&mut self) {
        self.state = WatchState::Watching;
    }

    /// React to one batch of changed paths. Returns the targets fired: one
    /// task run per matching path, and at most one reload.
    pub fn handle_changes(&mut self, paths: &[PathBuf]) -> Vec<Target> {
        let mut fired = Vec::new();
        let mut reload_pending = false;
        for trigger in route(&self.bindings, paths) {
            match trigger.target {
                Target::Task(task) => {
                    self.state = WatchState::TaskTriggered(task);
                    self.pipeline.emit(PipelineEvent::WatchTriggered {
                        path: trigger.path,
                        task,
                    });
                    // Failures were already reported as task events.
                    let _ = self.pipeline.run(self.registry, task);
                    self.state = WatchState::Watching;
                    fired.push(trigger.target);
                }
                Target::Reload => reload_pending = true,
            }
        }
        if reload_pending {
            if let Some(reload) = self.reload {
                let version = reload.reload();
                self.pipeline.emit(PipelineEvent::Reloaded { version });
            }
            fired.push(Target::Reload);
        }
        fired
    }

    /// Watch every existing binding root until the watcher shuts down.
    pub fn watch(mut self) -> Result<(), WatchError> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(tx)?;
        let mut roots: Vec<PathBuf> = Vec::new();
        for binding in &self.bindings {
            if binding.root.is_dir() && !roots.contains(&binding.root) {
                watcher.watch(&binding.root, RecursiveMode::Recursive)?;
                roots.push(binding.root.clone());
            }
        }
        self.pipeline.emit(PipelineEvent::WatchStarted { roots });
        self.start();

        while let Ok(first) = rx.recv() {
            let mut paths = Vec::new();
            self.collect(first, &mut paths);
            while let Ok(next) = rx.recv_timeout(BATCH_WINDOW) {
                self.collect(next, &mut paths);
            }
            if !paths.is_empty() {
                self.handle_changes(&paths);
            }
        }
        Ok(())
    }

    fn collect(&self, event: notify::Result<Event>, paths: &mut Vec<PathBuf>) {
        match event {
            Ok(event) if is_change(&event.kind) => {
                let mut seen = Vec::new();
                for path in event.paths {
                    if !seen.contains(&path) {
                        seen.push(path);
                    }
                }
                paths.extend(seen);
            }
            Ok(_) => {}
            Err(e) => self.pipeline.emit(PipelineEvent::WatchError(e.to_string())),
        }
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskEvent;
    use crate::tasks::registry;
    use crate::test_helpers::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct CountingReload(AtomicU64);

    impl Reload for CountingReload {
        fn reload(&self) -> u64 {
            self.0.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    fn started_tasks(rx: mpsc::Receiver<PipelineEvent>) -> Vec<TaskId> {
        rx.iter()
            .filter_map(|e| match e {
                PipelineEvent::Task(TaskEvent::Started(task)) => Some(task),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn routes_by_root_and_extension() {
        let layout = Layout::new("/site");
        let b = bindings(&layout);
        let route_one = |p: &str| {
            route(&b, &[PathBuf::from(p)])
                .into_iter()
                .map(|t| t.target)
                .collect::<Vec<_>>()
        };

        assert_eq!(
            route_one("/site/src/styles/components/_button.scss"),
            vec![Target::Task(TaskId::StyleCompile)]
        );
        assert_eq!(
            route_one("/site/src/templates/lib/base.html"),
            vec![Target::Task(TaskId::TemplateCompile)]
        );
        assert_eq!(
            route_one("/site/src/images/a/b.jpg"),
            vec![Target::Task(TaskId::StaticImageCopy)]
        );
        assert_eq!(
            route_one("/site/src/scripts/entry.js"),
            vec![Target::Task(TaskId::ScriptBundle)]
        );
        assert_eq!(route_one("/site/dist/index.html"), vec![Target::Reload]);
        assert!(route_one("/site/src/styles/notes.txt").is_empty());
        assert!(route_one("/site/pages.csv").is_empty());
    }

    #[test]
    fn every_changed_path_is_routed() {
        let b = bindings(&Layout::new("/site"));
        let paths = [
            PathBuf::from("/site/dist/style.css"),
            PathBuf::from("/site/src/styles/a.scss"),
            PathBuf::from("/site/src/styles/a.scss"),
            PathBuf::from("/site/src/scripts/notes.txt"),
        ];
        let triggers = route(&b, &paths);
        assert_eq!(
            triggers,
            vec![
                Trigger {
                    path: paths[0].clone(),
                    target: Target::Reload
                },
                Trigger {
                    path: paths[1].clone(),
                    target: Target::Task(TaskId::StyleCompile)
                },
                Trigger {
                    path: paths[2].clone(),
                    target: Target::Task(TaskId::StyleCompile)
                },
            ]
        );
    }

    #[test]
    fn rapid_style_changes_each_run_style_compile() {
        let project = setup_project();
        let styles = project.path().join("src/styles");
        let (p, rx) = test_pipeline(project.path(), TaskId::Watch);
        let registry = registry().unwrap();
        let mut coordinator = Coordinator::new(&p, &registry, None);
        coordinator.start();

        let fired = coordinator.handle_changes(&[
            styles.join("style.scss"),
            styles.join("style.scss"),
            styles.join("components/_button.scss"),
        ]);

        assert_eq!(fired, vec![Target::Task(TaskId::StyleCompile); 3]);
        drop(coordinator);
        drop(p);
        assert_eq!(started_tasks(rx), vec![TaskId::StyleCompile; 3]);
    }

    #[test]
    fn trigger_reports_the_matching_path() {
        let project = setup_project();
        let (p, rx) = test_pipeline(project.path(), TaskId::Watch);
        let registry = registry().unwrap();
        let mut coordinator = Coordinator::new(&p, &registry, None);
        coordinator.start();
        let style = project.path().join("src/styles/style.scss");

        coordinator.handle_changes(&[project.path().join("dist/index.html"), style.clone()]);

        drop(coordinator);
        drop(p);
        let reported: Vec<_> = rx
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::WatchTriggered { path, task } => Some((path, task)),
                _ => None,
            })
            .collect();
        assert_eq!(reported, vec![(style, TaskId::StyleCompile)]);
    }

    #[test]
    fn style_change_runs_only_style_compile() {
        let project = setup_project();
        let (p, rx) = test_pipeline(project.path(), TaskId::Watch);
        let registry = registry().unwrap();
        let mut coordinator = Coordinator::new(&p, &registry, None);
        coordinator.start();

        let fired = coordinator.handle_changes(&[project.path().join("src/styles/style.scss")]);

        assert_eq!(fired, vec![Target::Task(TaskId::StyleCompile)]);
        assert_eq!(coordinator.state(), WatchState::Watching);
        assert!(project.path().join("dist/style.css").exists());
        drop(coordinator);
        drop(p);
        assert_eq!(started_tasks(rx), vec![TaskId::StyleCompile]);
    }

    #[test]
    fn failing_task_keeps_watching() {
        let project = setup_project();
        write_file(project.path(), "src/styles/style.scss", "a { color: ");
        let (p, rx) = test_pipeline(project.path(), TaskId::Watch);
        let registry = registry().unwrap();
        let mut coordinator = Coordinator::new(&p, &registry, None);
        coordinator.start();

        coordinator.handle_changes(&[project.path().join("src/styles/style.scss")]);

        assert_eq!(coordinator.state(), WatchState::Watching);
        drop(coordinator);
        drop(p);
        assert!(rx.iter().any(|e| matches!(
            e,
            PipelineEvent::Task(TaskEvent::Failed {
                task: TaskId::StyleCompile,
                ..
            })
        )));
    }

    #[test]
    fn preview_change_signals_reload() {
        let project = setup_project();
        let (p, _rx) = test_pipeline(project.path(), TaskId::Serve);
        let registry = registry().unwrap();
        let reload = CountingReload::default();
        let mut coordinator = Coordinator::new(&p, &registry, Some(&reload));

        let fired = coordinator.handle_changes(&[
            project.path().join("dist/index.html"),
            project.path().join("dist/style.css"),
        ]);
        assert_eq!(fired, vec![Target::Reload]);
        coordinator.handle_changes(&[project.path().join("dist/script.js")]);

        assert_eq!(reload.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn starts_idle() {
        let project = setup_project();
        let (p, _rx) = test_pipeline(project.path(), TaskId::Watch);
        let registry = registry().unwrap();
        let coordinator = Coordinator::new(&p, &registry, None);
        assert_eq!(coordinator.state(), WatchState::Idle);
    }
}
