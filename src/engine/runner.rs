use std::collections::{HashMap, HashSet};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use petgraph::graph::NodeIndex;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::Environment;
use crate::engine::{Outcome, Plan, Report};
use crate::error::{BuildError, TaskError};
use crate::io::{PROGRESS_STYLE, TASK_STYLE, as_overhead};

/// Executes the plan, one scoped thread per running task.
///
/// Nodes are started as soon as all of their dependencies have completed:
///
/// 1. Count the incoming edges of each node.
/// 2. Spawn every node with no dependencies.
/// 3. Wait on the result channel. When a node completes, decrement the count
///    of each dependent and spawn the ones that reach zero.
/// 4. A fatal failure poisons its dependents. A poisoned node is recorded as
///    cancelled instead of being spawned, and poisons its own dependents in
///    turn. Recoverable failures are logged and do not poison anything.
///
/// The function returns once every node has completed or been cancelled.
pub fn run(plan: &Plan, env: &Environment) -> Result<Report, BuildError> {
    let graph = &plan.graph;

    if petgraph::algo::toposort(graph, None).is_err() {
        return Err(BuildError::Cycle);
    }

    let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for edge in graph.raw_edges() {
        dependents
            .entry(edge.source())
            .or_default()
            .push(edge.target());
    }

    let mut counts: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|i| {
            let count = graph
                .neighbors_directed(i, petgraph::Direction::Incoming)
                .count();
            (i, count)
        })
        .collect();

    let total = graph.node_count();
    let mut report = Report::default();

    if total == 0 {
        return Ok(report);
    }

    let s = Instant::now();

    let root_span = tracing::span!(Level::INFO, "plan");
    root_span.pb_set_length(total as u64);
    root_span.pb_set_style(&PROGRESS_STYLE);
    root_span.pb_set_message("Running tasks...");
    let _enter = root_span.enter();

    std::thread::scope(|scope| {
        let (sender, receiver) = channel::<(NodeIndex, Result<(), TaskError>, Duration)>();
        let mut poisoned = HashSet::new();
        let mut completed = 0;

        let spawn = |index: NodeIndex| {
            let task = graph[index];
            let sender = sender.clone();

            let root_span = &root_span;

            scope.spawn(move || {
                let span = tracing::span!(parent: root_span, Level::INFO, "task", name = %task);
                span.pb_set_style(&TASK_STYLE);
                span.pb_set_message(&format!("Running {task}"));
                let _enter = span.enter();

                let start = Instant::now();

                // A panicking collaborator must not take the scheduler down
                // with it, the other workers only share immutable state.
                let result = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    task.run(env)
                })) {
                    Ok(result) => result,
                    Err(panic) => {
                        let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = panic.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            String::from("unknown payload")
                        };
                        Err(TaskError::Panic(msg))
                    }
                };

                // The receiver outlives every worker inside the scope.
                let _ = sender.send((index, result, start.elapsed()));
            });
        };

        // Nodes whose dependencies are all settled. Cancelled nodes go
        // through this queue too so their dependents are released.
        let mut ready: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|i| counts.get(i).copied().unwrap_or(0) == 0)
            .collect();

        loop {
            while let Some(index) = ready.pop() {
                if poisoned.contains(&index) {
                    tracing::warn!(task = %graph[index], "skipped after an earlier failure");
                    report.outcomes.push((graph[index], Outcome::Cancelled));
                    completed += 1;
                    root_span.pb_inc(1);
                    release(index, true, &dependents, &mut counts, &mut poisoned, &mut ready);
                } else {
                    spawn(index);
                }
            }

            if completed == total {
                break;
            }

            let Ok((index, result, duration)) = receiver.recv() else {
                break;
            };

            let task = graph[index];
            completed += 1;
            root_span.pb_inc(1);

            let fatal = match result {
                Ok(()) => {
                    tracing::info!(task = %task, "finished in {duration:.2?}");
                    report.outcomes.push((task, Outcome::Done(duration)));
                    false
                }
                Err(error) => {
                    let fatal = error.is_fatal();
                    if fatal {
                        tracing::error!(task = %task, "{error}");
                    } else {
                        tracing::warn!(task = %task, "{error}");
                    }
                    report.outcomes.push((
                        task,
                        Outcome::Failed {
                            error: error.to_string(),
                            fatal,
                        },
                    ));
                    fatal
                }
            };

            release(index, fatal, &dependents, &mut counts, &mut poisoned, &mut ready);
        }
    });

    tracing::info!("Plan finished {}", as_overhead(s));
    Ok(report)
}

fn release(
    index: NodeIndex,
    poison: bool,
    dependents: &HashMap<NodeIndex, Vec<NodeIndex>>,
    counts: &mut HashMap<NodeIndex, usize>,
    poisoned: &mut HashSet<NodeIndex>,
    ready: &mut Vec<NodeIndex>,
) {
    let Some(targets) = dependents.get(&index) else {
        return;
    };

    for &target in targets {
        if poison {
            poisoned.insert(target);
        }

        if let Some(count) = counts.get_mut(&target) {
            *count -= 1;
            if *count == 0 {
                ready.push(target);
            }
        }
    }
}
