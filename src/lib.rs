#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod config;
mod core;
pub mod engine;
mod error;
mod io;
#[cfg(feature = "live")]
pub mod reload;
#[cfg(feature = "server")]
pub mod server;
pub mod task;
#[cfg(feature = "live")]
pub mod watch;

pub use crate::config::{
    Config, ImagePaths, Paths, PruneOptions, ScriptPaths, ScriptStrategy, StyleGuidePaths,
    StylePaths,
};
pub use crate::core::{Environment, Mode, Reload, ReloadKind};
pub use crate::engine::{Outcome, Plan, Report, Step, parallel, sequence};
pub use crate::error::*;
pub use crate::task::Task;

/// Entry points over one project.
///
/// Every entry point runs a [`Plan`] through the scheduler, so a single leaf
/// like `styles` gets the same logging and failure reporting as a full
/// `build`.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    env: Environment,
}

impl Orchestrator {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// The `build` graph: clean, then the asset leaves side by side, then the
    /// style guide when one is configured.
    pub fn plan(&self) -> Plan {
        Plan::build(&self.env.config)
    }

    /// Runs the `build` graph. Fails when any task failed.
    pub fn build(&self) -> Result<Report, BuildError> {
        engine::run(&self.plan(), &self.env)?.into_result()
    }

    /// Runs a single leaf, e.g. `clean`.
    pub fn run(&self, task: Task) -> Result<Report, BuildError> {
        engine::run(&Plan::single(task), &self.env)?.into_result()
    }

    /// Watches the project and re-runs leaves on change until the process
    /// exits.
    #[cfg(feature = "live")]
    pub fn watch(&self, config_path: &camino::Utf8Path) -> Result<(), WatchError> {
        watch::watch(&self.env, config_path)
    }

    /// The `default` entry point: build, then serve, then watch.
    ///
    /// A build with recoverable failures still goes on to serve and watch, so
    /// a broken stylesheet can be fixed while the server runs. Fatal failures
    /// stop here.
    #[cfg(feature = "server")]
    pub fn develop(
        &self,
        config_path: &camino::Utf8Path,
        live: std::sync::Arc<reload::LiveReload>,
    ) -> anyhow::Result<()> {
        let report = engine::run(&self.plan(), &self.env)?;
        if report.has_fatal() {
            report.into_result()?;
        }

        let _server = server::start(&self.env, Some(live))?;
        self.watch(config_path)?;

        Ok(())
    }
}
