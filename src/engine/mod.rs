//! The task graph.
//!
//! A [`Plan`] is a directed acyclic graph of leaf tasks, built once from a
//! tree of [`Step`]s. Two operators compose steps:
//!
//! * [`sequence`]: every step starts only after all sinks of the previous step
//!   have completed.
//! * [`parallel`]: all steps start together, the group completes when every
//!   member has completed.
//!
//! The tree is flattened into a `petgraph` graph where an edge `a -> b` means
//! "b waits for a". The runner then walks the graph with the same dependency
//! counting scheduler for every entry point.

mod diagnostics;
mod runner;

use std::fmt::{self, Display};

use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::task::Task;
use crate::Config;

pub use diagnostics::{Outcome, Report};
pub use runner::run;

/// A node of the composition tree.
#[derive(Debug, Clone)]
pub enum Step {
    Task(Task),
    Sequence(Vec<Step>),
    Parallel(Vec<Step>),
}

impl From<Task> for Step {
    fn from(task: Task) -> Self {
        Step::Task(task)
    }
}

/// Runs `steps` one after another.
pub fn sequence(steps: impl IntoIterator<Item = impl Into<Step>>) -> Step {
    Step::Sequence(steps.into_iter().map(Into::into).collect())
}

/// Runs `steps` concurrently.
pub fn parallel(steps: impl IntoIterator<Item = impl Into<Step>>) -> Step {
    Step::Parallel(steps.into_iter().map(Into::into).collect())
}

/// A fixed, acyclic graph of named leaf tasks.
#[derive(Debug, Clone)]
pub struct Plan {
    pub(crate) graph: Graph<Task, ()>,
}

/// Entry and exit nodes of a flattened step.
struct Ends {
    sources: Vec<NodeIndex>,
    sinks: Vec<NodeIndex>,
}

impl Plan {
    pub fn new(step: impl Into<Step>) -> Self {
        let mut graph = Graph::new();
        flatten(&mut graph, step.into());
        Self { graph }
    }

    /// `clean`, then styles, scripts, images and copy side by side, then the
    /// style guide when one is configured.
    pub fn build(config: &Config) -> Self {
        let mut steps = vec![
            Step::from(Task::Clean),
            parallel([Task::Styles, Task::Scripts, Task::Images, Task::Copy]),
        ];

        if config.paths.styleguide.is_some() {
            steps.push(Task::StyleGuide.into());
        }

        Self::new(sequence(steps))
    }

    /// A plan holding a single leaf.
    pub fn single(task: Task) -> Self {
        Self::new(task)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Tasks that must complete before `task` may start.
    pub fn dependencies_of(&self, task: Task) -> Vec<Task> {
        let Some(index) = self.index_of(task) else {
            return Vec::new();
        };

        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(index, petgraph::Direction::Incoming)
            .map(|i| self.graph[i])
            .collect();
        deps.sort();
        deps
    }

    pub fn contains(&self, task: Task) -> bool {
        self.index_of(task).is_some()
    }

    fn index_of(&self, task: Task) -> Option<NodeIndex> {
        self.graph.node_indices().find(|&i| self.graph[i] == task)
    }
}

fn flatten(graph: &mut Graph<Task, ()>, step: Step) -> Ends {
    match step {
        Step::Task(task) => {
            let index = graph.add_node(task);
            Ends {
                sources: vec![index],
                sinks: vec![index],
            }
        }
        Step::Sequence(steps) => {
            let mut sources = Vec::new();
            let mut sinks: Vec<NodeIndex> = Vec::new();

            for step in steps {
                let ends = flatten(graph, step);
                if ends.sources.is_empty() {
                    continue;
                }

                if sources.is_empty() {
                    sources = ends.sources.clone();
                }

                for &sink in &sinks {
                    for &source in &ends.sources {
                        graph.add_edge(sink, source, ());
                    }
                }

                sinks = ends.sinks;
            }

            Ends { sources, sinks }
        }
        Step::Parallel(steps) => {
            let mut sources = Vec::new();
            let mut sinks = Vec::new();

            for step in steps {
                let ends = flatten(graph, step);
                sources.extend(ends.sources);
                sinks.extend(ends.sinks);
            }

            Ends { sources, sinks }
        }
    }
}

/// Renders the plan as a Mermaid diagram.
impl Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            writeln!(f, "    {}[\"{}\"]", index.index(), self.graph[index])?;
        }

        for edge in self.graph.raw_edges() {
            writeln!(f, "    {} --> {}", edge.source().index(), edge.target().index())?;
        }

        Ok(())
    }
}
