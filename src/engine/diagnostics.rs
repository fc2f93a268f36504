use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::error::BuildError;
use crate::task::Task;

/// How a single node of the plan ended.
#[derive(Debug, Clone)]
pub enum Outcome {
    Done(Duration),
    /// The task ran and failed. `fatal` failures cancel later steps.
    Failed { error: String, fatal: bool },
    /// Never started because an earlier step failed fatally.
    Cancelled,
}

/// Per-task outcomes of a plan run, in completion order.
#[derive(Debug, Default)]
pub struct Report {
    pub outcomes: Vec<(Task, Outcome)>,
}

impl Report {
    pub fn outcome(&self, task: Task) -> Option<&Outcome> {
        self.outcomes.iter().find(|(t, _)| *t == task).map(|(_, o)| o)
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| matches!(o, Outcome::Done(_)))
    }

    /// Whether some task failed in a way that cancelled the steps after it.
    pub fn has_fatal(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, o)| matches!(o, Outcome::Failed { fatal: true, .. }))
    }

    /// Tasks that failed or never ran.
    pub fn failed(&self) -> Vec<Task> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !matches!(o, Outcome::Done(_)))
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn into_result(self) -> Result<Report, BuildError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BuildError::Failed(
                self.failed().into_iter().map(|t| t.to_string()).collect(),
            ))
        }
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (task, outcome) in &self.outcomes {
            match outcome {
                Outcome::Done(duration) => writeln!(f, "{task:>12}  ok      {duration:.2?}")?,
                Outcome::Failed { fatal: true, .. } => writeln!(f, "{task:>12}  FATAL")?,
                Outcome::Failed { .. } => writeln!(f, "{task:>12}  failed")?,
                Outcome::Cancelled => writeln!(f, "{task:>12}  skipped")?,
            }
        }
        Ok(())
    }
}
