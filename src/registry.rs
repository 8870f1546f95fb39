//! The task registry and dependency resolver.
//!
//! Tasks are registered by name together with their *prerequisite stages*: an
//! ordered list of groups, where every group must complete before the next
//! one starts, while the members of one group may run concurrently. The
//! composite `build` task is expressed as `[[clean], [scripts, styles,
//! images, copy]]`: the destructive stage strictly precedes the parallel
//! generation stage, enforced by graph edges rather than incidental ordering.
//!
//! ## Execution
//!
//! `run` first resolves the requested task into an execution DAG and rejects
//! unregistered prerequisites and cycles before any action runs. The DAG is
//! then executed by a dependency-counting topological scheduler: ready tasks
//! are spawned on the Rayon pool, results come back over a channel, and each
//! completion unlocks its dependents.
//!
//! ## Failure policy
//!
//! A failing task never aborts the run. Its error is captured, reported
//! through the notification sink and recorded in the [`RunSummary`]; its
//! transitive dependents are marked [`TaskStatus::Skipped`]. Sibling tasks in
//! the same group always run to completion, so one broken pipeline cannot
//! hide another. The run as a whole succeeds only if every task succeeded.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use indicatif::{ProgressBar, ProgressStyle};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::Manifest;
use crate::error::RegistryError;
use crate::report;

/// A task action. Receives the manifest by reference; any ambient state it
/// needs has to come from there.
pub type Action = Box<dyn Fn(&Manifest) -> anyhow::Result<()> + Send + Sync>;

struct Registered {
    name: String,
    stages: Vec<Vec<String>>,
    action: Action,
}

/// Terminal status of one task execution.
#[derive(Debug)]
pub enum TaskStatus {
    Succeeded,
    Failed(anyhow::Error),
    /// Not executed because a prerequisite failed.
    Skipped,
}

/// Ephemeral record of one task execution. Logged, never persisted.
#[derive(Debug)]
pub struct TaskRun {
    pub name: String,
    pub started: Instant,
    pub elapsed: Duration,
    pub status: TaskStatus,
}

/// Aggregate outcome of one `run` invocation, in completion order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub runs: Vec<TaskRun>,
}

impl RunSummary {
    /// True iff every executed task succeeded and none was skipped.
    pub fn success(&self) -> bool {
        self.runs
            .iter()
            .all(|run| matches!(run.status, TaskStatus::Succeeded))
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskRun> {
        self.runs
            .iter()
            .filter(|run| matches!(run.status, TaskStatus::Failed(_)))
    }
}

/// Named task registry backing the whole command surface.
#[derive(Default)]
pub struct Registry {
    tasks: Vec<Registered>,
    names: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under a unique name. `stages` lists prerequisite
    /// groups: groups run sequentially, members of a group concurrently.
    /// Prerequisites may be registered later; they are resolved at run time.
    pub fn register<F>(
        &mut self,
        name: &str,
        stages: &[&[&str]],
        action: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&Manifest) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if self.names.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }

        self.names.insert(name.to_string(), self.tasks.len());
        self.tasks.push(Registered {
            name: name.to_string(),
            stages: stages
                .iter()
                .map(|stage| stage.iter().map(|dep| dep.to_string()).collect())
                .collect(),
            action: Box::new(action),
        });

        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Registered task names, in registration order.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|task| task.name.as_str())
    }

    /// Execute a task and everything it depends on. Resolution errors are
    /// returned before any action runs; action failures are captured in the
    /// summary instead.
    pub fn run(&self, name: &str, manifest: &Manifest) -> Result<RunSummary, RegistryError> {
        let task = *self
            .names
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let mut resolver = Resolver {
            registry: self,
            graph: DiGraph::new(),
            resolved: HashMap::new(),
            in_progress: HashSet::new(),
        };
        resolver.add(task)?;
        let graph = resolver.graph;

        Ok(self.execute(&graph, manifest))
    }

    /// Dependency-counting parallel topological execution over the resolved
    /// DAG. Tasks without a dependency relation interleave freely.
    fn execute(&self, graph: &DiGraph<usize, ()>, manifest: &Manifest) -> RunSummary {
        let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        for edge in graph.raw_edges() {
            dependents
                .entry(edge.source())
                .or_default()
                .push(edge.target());
        }

        let mut dependency_counts: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|i| (i, graph.neighbors_directed(i, Direction::Incoming).count()))
            .collect();

        let total = graph.node_count() as u64;
        let mut completed = 0;
        let mut summary = RunSummary::default();

        if total == 0 {
            return summary;
        }

        let bar = ProgressBar::new(total).with_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Error setting progress bar template")
                .progress_chars("#>-"),
        );
        bar.set_message("Running tasks...");

        // Succeeded nodes; anything completed but absent here failed or was
        // skipped, which poisons its dependents.
        let mut succeeded: HashSet<NodeIndex> = HashSet::new();
        let (result_tx, result_rx) = unbounded::<(NodeIndex, TaskRun)>();

        rayon::scope(|s| {
            let spawn = |index: NodeIndex| {
                let task = &self.tasks[graph[index]];
                let tx = result_tx.clone();

                s.spawn(move |_| {
                    let started = Instant::now();
                    tracing::debug!(task = %task.name, "task started");

                    let status = match (task.action)(manifest) {
                        Ok(()) => TaskStatus::Succeeded,
                        Err(err) => TaskStatus::Failed(err),
                    };

                    let run = TaskRun {
                        name: task.name.clone(),
                        started,
                        elapsed: started.elapsed(),
                        status,
                    };

                    // The receiver outlives the scope, send cannot fail.
                    tx.send((index, run)).ok();
                });
            };

            // Completions that never touch the worker pool (skipped tasks).
            let mut pending: VecDeque<(NodeIndex, TaskRun)> = VecDeque::new();

            let mut dispatch =
                |index: NodeIndex,
                 succeeded: &HashSet<NodeIndex>,
                 pending: &mut VecDeque<(NodeIndex, TaskRun)>| {
                    let poisoned = graph
                        .neighbors_directed(index, Direction::Incoming)
                        .any(|dep| !succeeded.contains(&dep));

                    if poisoned {
                        let name = self.tasks[graph[index]].name.clone();
                        tracing::warn!(task = %name, "skipped, prerequisite failed");
                        pending.push_back((
                            index,
                            TaskRun {
                                name,
                                started: Instant::now(),
                                elapsed: Duration::ZERO,
                                status: TaskStatus::Skipped,
                            },
                        ));
                    } else {
                        spawn(index);
                    }
                };

            // Seed the initial tasks, then drain completions until done.
            for index in graph.node_indices() {
                if dependency_counts[&index] == 0 {
                    dispatch(index, &succeeded, &mut pending);
                }
            }

            while completed < total {
                let (index, run) = match pending.pop_front() {
                    Some(done) => done,
                    // Workers hold a sender for as long as they run.
                    None => match result_rx.recv() {
                        Ok(done) => done,
                        Err(_) => break,
                    },
                };

                match &run.status {
                    TaskStatus::Succeeded => {
                        succeeded.insert(index);
                        tracing::info!(task = %run.name, elapsed = ?run.elapsed, "task finished");
                    }
                    TaskStatus::Failed(err) => report::report(&run.name, err),
                    TaskStatus::Skipped => {}
                }

                summary.runs.push(run);
                completed += 1;
                bar.inc(1);

                if let Some(unlocked) = dependents.get(&index) {
                    for &next in unlocked {
                        let count = dependency_counts
                            .get_mut(&next)
                            .expect("dependent missing from the resolved graph");
                        *count -= 1;
                        if *count == 0 {
                            dispatch(next, &succeeded, &mut pending);
                        }
                    }
                }
            }
        });

        bar.finish_and_clear();
        summary
    }
}

/// Builds the execution DAG for one `run` invocation. Detects unknown
/// prerequisites and cycles while expanding, before anything executes.
struct Resolver<'a> {
    registry: &'a Registry,
    graph: DiGraph<usize, ()>,
    /// Task index to (task node, entry nodes of its subtree). Entry nodes
    /// carry the ordering edges from the preceding stage, so a later stage
    /// cannot start anywhere inside its subtree early.
    resolved: HashMap<usize, (NodeIndex, Vec<NodeIndex>)>,
    in_progress: HashSet<usize>,
}

impl Resolver<'_> {
    fn add(&mut self, task: usize) -> Result<(NodeIndex, Vec<NodeIndex>), RegistryError> {
        if let Some(done) = self.resolved.get(&task) {
            return Ok(done.clone());
        }

        let registered = &self.registry.tasks[task];
        if !self.in_progress.insert(task) {
            return Err(RegistryError::Cycle(registered.name.clone()));
        }

        let mut previous: Vec<NodeIndex> = Vec::new();
        let mut entries: Vec<NodeIndex> = Vec::new();

        for (position, stage) in registered.stages.iter().enumerate() {
            let mut members = Vec::new();

            for prerequisite in stage {
                let dep = *self.registry.names.get(prerequisite).ok_or_else(|| {
                    RegistryError::Unknown {
                        task: registered.name.clone(),
                        prerequisite: prerequisite.clone(),
                    }
                })?;

                let (node, roots) = self.add(dep)?;

                for &before in &previous {
                    for &root in &roots {
                        self.graph.update_edge(before, root, ());
                    }
                }

                members.push(node);
                if position == 0 {
                    entries.extend(roots);
                }
            }

            previous = members;
        }

        let node = self.graph.add_node(task);
        for &before in &previous {
            self.graph.update_edge(before, node, ());
        }

        if entries.is_empty() {
            entries.push(node);
        }

        self.in_progress.remove(&task);
        self.resolved.insert(task, (node, entries.clone()));
        Ok((node, entries))
    }
}
