//! Dependency-ordered task runner.
//!
//! A [`TaskGraph`] maps task identifiers to descriptors (dependency list plus
//! an optional action). It is assembled once through [`TaskGraphBuilder`],
//! which rejects duplicate names, unknown dependencies and cycles before
//! anything can run, so a built graph is always a valid DAG.
//!
//! # Running
//!
//! [`TaskGraph::run`] executes a target and, transitively, everything it
//! depends on:
//!
//! ```text
//!            build
//!      ┌───┬──┴──┬────┐
//!  templates styles scripts images      ← start together
//! ```
//!
//! 1. The plan is the target plus its transitive dependencies. Each task in
//!    the plan runs exactly once per run.
//! 2. Every task whose dependencies have all completed is started on its own
//!    scoped thread.
//! 3. Each worker reports completion over an mpsc channel. The scheduler
//!    releases dependents as their last dependency completes.
//! 4. On the first failure no further tasks are started. Tasks already
//!    running finish, then the run returns the failing task's error.
//!
//! A task never starts before every one of its dependencies has completed in
//! the current run.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A task's side effect. Receives the shared run context.
pub type Action<C, E> = Box<dyn Fn(&C) -> Result<(), E> + Send + Sync>;

/// Bounds every task identifier satisfies.
pub trait TaskKey: Copy + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync {}

impl<T: Copy + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync> TaskKey for T {}

/// Graph construction errors. Fatal: reported before any task runs.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError<K: TaskKey> {
    #[error("task '{0}' is registered twice")]
    Duplicate(K),
    #[error("task '{task}' depends on unregistered task '{dependency}'")]
    UnknownDependency { task: K, dependency: K },
    #[error("default task '{0}' is not registered")]
    UnknownDefault(K),
    #[error("dependency cycle: {}", format_cycle(.0))]
    Cycle(Vec<K>),
}

fn format_cycle<K: fmt::Display>(cycle: &[K]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors returned by [`TaskGraph::run`].
#[derive(Error, Debug)]
pub enum RunError<K: TaskKey, E: std::error::Error + 'static> {
    #[error("unknown task '{0}'")]
    UnknownTask(K),
    #[error("task '{task}' failed: {source}")]
    TaskFailed {
        task: K,
        #[source]
        source: E,
    },
}

impl<K: TaskKey, E: std::error::Error + 'static> RunError<K, E> {
    /// The task that failed, if any.
    pub fn task(&self) -> K {
        match self {
            Self::UnknownTask(task) | Self::TaskFailed { task, .. } => *task,
        }
    }
}

/// Progress notifications emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent<K> {
    Started(K),
    Finished { task: K, elapsed: Duration },
    Failed { task: K, message: String },
}

struct TaskDescriptor<K, C, E> {
    dependencies: Vec<K>,
    action: Option<Action<C, E>>,
}

pub struct TaskGraphBuilder<K, C, E> {
    tasks: BTreeMap<K, TaskDescriptor<K, C, E>>,
    default: Option<K>,
    duplicate: Option<K>,
}

impl<K: TaskKey, C, E> TaskGraphBuilder<K, C, E> {
    /// Register a task with its dependencies and an optional action.
    /// Composite tasks have no action of their own.
    pub fn register(
        mut self,
        name: K,
        dependencies: &[K],
        action: Option<Action<C, E>>,
    ) -> Self {
        let descriptor = TaskDescriptor {
            dependencies: dependencies.to_vec(),
            action,
        };
        if self.tasks.insert(name, descriptor).is_some() {
            self.duplicate.get_or_insert(name);
        }
        self
    }

    /// Convenience for registering a task with an action closure.
    pub fn task<F>(self, name: K, dependencies: &[K], action: F) -> Self
    where
        F: Fn(&C) -> Result<(), E> + Send + Sync + 'static,
    {
        self.register(name, dependencies, Some(Box::new(action)))
    }

    /// Convenience for registering a composite task.
    pub fn composite(self, name: K, dependencies: &[K]) -> Self {
        self.register(name, dependencies, None)
    }

    /// Task to run when none is named.
    pub fn default_task(mut self, name: K) -> Self {
        self.default = Some(name);
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<TaskGraph<K, C, E>, GraphError<K>> {
        if let Some(name) = self.duplicate {
            return Err(GraphError::Duplicate(name));
        }
        for (name, task) in &self.tasks {
            if let Some(missing) = task
                .dependencies
                .iter()
                .find(|d| !self.tasks.contains_key(d))
            {
                return Err(GraphError::UnknownDependency {
                    task: *name,
                    dependency: *missing,
                });
            }
        }
        if let Some(name) = self.default
            && !self.tasks.contains_key(&name)
        {
            return Err(GraphError::UnknownDefault(name));
        }
        if let Some(cycle) = find_cycle(&self.tasks) {
            return Err(GraphError::Cycle(cycle));
        }
        Ok(TaskGraph {
            tasks: self.tasks,
            default: self.default,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search for a back edge. Returns the cycle as a path that
/// starts and ends with the same task.
fn find_cycle<K: TaskKey, C, E>(tasks: &BTreeMap<K, TaskDescriptor<K, C, E>>) -> Option<Vec<K>> {
    fn visit<K: TaskKey, C, E>(
        name: K,
        tasks: &BTreeMap<K, TaskDescriptor<K, C, E>>,
        marks: &mut HashMap<K, Mark>,
        stack: &mut Vec<K>,
    ) -> Option<Vec<K>> {
        match marks.get(&name) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|k| *k == name).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(name);
                return Some(cycle);
            }
            None => {}
        }
        marks.insert(name, Mark::Visiting);
        stack.push(name);
        for dep in tasks.get(&name).map(|t| t.dependencies.as_slice()).unwrap_or(&[]) {
            if let Some(cycle) = visit(*dep, tasks, marks, stack) {
                return Some(cycle);
            }
        }
        stack.pop();
        marks.insert(name, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    for name in tasks.keys() {
        let mut stack = Vec::new();
        if let Some(cycle) = visit(*name, tasks, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

/// A validated task graph. See the [module docs](self).
pub struct TaskGraph<K, C, E> {
    tasks: BTreeMap<K, TaskDescriptor<K, C, E>>,
    default: Option<K>,
}

impl<K: TaskKey, C: Sync, E: std::error::Error + Send + 'static> TaskGraph<K, C, E> {
    pub fn builder() -> TaskGraphBuilder<K, C, E> {
        TaskGraphBuilder {
            tasks: BTreeMap::new(),
            default: None,
            duplicate: None,
        }
    }

    pub fn default_task(&self) -> Option<K> {
        self.default
    }

    pub fn contains(&self, name: K) -> bool {
        self.tasks.contains_key(&name)
    }

    pub fn dependencies(&self, name: K) -> &[K] {
        self.tasks
            .get(&name)
            .map(|t| t.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// The target and everything it transitively depends on.
    pub fn plan(&self, target: K) -> Result<BTreeSet<K>, RunError<K, E>> {
        if !self.tasks.contains_key(&target) {
            return Err(RunError::UnknownTask(target));
        }
        let mut plan = BTreeSet::new();
        let mut queue = vec![target];
        while let Some(name) = queue.pop() {
            if plan.insert(name) {
                queue.extend_from_slice(self.dependencies(name));
            }
        }
        Ok(plan)
    }

    /// Run `target` and its dependencies. Returns the tasks in the order
    /// they completed.
    pub fn run(
        &self,
        target: K,
        ctx: &C,
        on_event: &dyn Fn(TaskEvent<K>),
    ) -> Result<Vec<K>, RunError<K, E>> {
        let plan = self.plan(target)?;

        let mut waiting: HashMap<K, usize> = HashMap::new();
        let mut dependents: HashMap<K, Vec<K>> = HashMap::new();
        for name in &plan {
            let deps = self.dependencies(*name);
            waiting.insert(*name, deps.len());
            for dep in deps {
                dependents.entry(*dep).or_default().push(*name);
            }
        }

        let mut completed = Vec::with_capacity(plan.len());
        let mut failure: Option<(K, E)> = None;

        std::thread::scope(|scope| {
            // `None` marks a worker that panicked. The worker re-raises the
            // panic after reporting, and the scope propagates it on exit.
            let (tx, rx) = mpsc::channel::<(K, Option<Result<Duration, E>>)>();
            let spawn = |name: K| {
                on_event(TaskEvent::Started(name));
                let action = self.tasks.get(&name).and_then(|t| t.action.as_ref());
                let tx = tx.clone();
                scope.spawn(move || {
                    let start = Instant::now();
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match action {
                        Some(action) => action(ctx).map(|()| start.elapsed()),
                        None => Ok(start.elapsed()),
                    }));
                    match outcome {
                        Ok(result) => {
                            let _ = tx.send((name, Some(result)));
                        }
                        Err(payload) => {
                            let _ = tx.send((name, None));
                            panic::resume_unwind(payload);
                        }
                    }
                });
            };

            let mut in_flight = 0usize;
            let mut halted = false;
            for (name, count) in &waiting {
                if *count == 0 {
                    spawn(*name);
                    in_flight += 1;
                }
            }

            while in_flight > 0 {
                let Ok((name, outcome)) = rx.recv() else {
                    break;
                };
                in_flight -= 1;
                match outcome {
                    Some(Ok(elapsed)) => {
                        on_event(TaskEvent::Finished {
                            task: name,
                            elapsed,
                        });
                        completed.push(name);
                        if halted {
                            continue;
                        }
                        for dependent in dependents.get(&name).into_iter().flatten() {
                            if let Some(count) = waiting.get_mut(dependent) {
                                *count -= 1;
                                if *count == 0 {
                                    spawn(*dependent);
                                    in_flight += 1;
                                }
                            }
                        }
                    }
                    Some(Err(error)) => {
                        on_event(TaskEvent::Failed {
                            task: name,
                            message: error.to_string(),
                        });
                        halted = true;
                        if failure.is_none() {
                            failure = Some((name, error));
                        }
                    }
                    None => halted = true,
                }
            }
        });

        match failure {
            Some((task, source)) => Err(RunError::TaskFailed { task, source }),
            None => Ok(completed),
        }
    }

    /// Run the default task.
    pub fn run_default(
        &self,
        ctx: &C,
        on_event: &dyn Fn(TaskEvent<K>),
    ) -> Result<Option<Vec<K>>, RunError<K, E>> {
        match self.default {
            Some(target) => self.run(target, ctx, on_event).map(Some),
            None => Ok(None),
        }
    }
}
