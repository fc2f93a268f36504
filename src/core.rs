use std::fmt::Display;
use std::sync::Arc;

use crate::Config;

/// Which branch every leaf task takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Source maps, no minification, images copied as they are.
    #[default]
    Development,
    /// Minified, pruned and compressed artifacts for deployment.
    Production,
}

impl Mode {
    pub fn from_flag(production: bool) -> Self {
        if production {
            Mode::Production
        } else {
            Mode::Development
        }
    }

    pub fn is_production(self) -> bool {
        self == Mode::Production
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Development => f.write_str("development"),
            Mode::Production => f.write_str("production"),
        }
    }
}

/// What connected browsers should do after an artifact changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadKind {
    /// Swap stylesheets in place, the page is not navigated.
    Css,
    /// Reload the whole page.
    Full,
}

impl ReloadKind {
    /// Message sent over the live-reload socket.
    pub fn message(self) -> &'static str {
        match self {
            ReloadKind::Css => "css",
            ReloadKind::Full => "reload",
        }
    }
}

/// Sink for reload signals. Implemented by the live-reload socket server and
/// by test recorders.
pub trait Reload: Send + Sync {
    fn signal(&self, kind: ReloadKind);
}

/// Immutable state handed to every task.
#[derive(Clone)]
pub struct Environment {
    pub mode: Mode,
    pub config: Arc<Config>,
    reload: Option<Arc<dyn Reload>>,
}

impl Environment {
    pub fn new(mode: Mode, config: impl Into<Arc<Config>>) -> Self {
        Self {
            mode,
            config: config.into(),
            reload: None,
        }
    }

    /// Attaches a reload sink, tasks use it to push changes to browsers.
    pub fn with_reload(mut self, reload: Arc<dyn Reload>) -> Self {
        self.reload = Some(reload);
        self
    }

    pub fn signal(&self, kind: ReloadKind) {
        if let Some(reload) = &self.reload {
            reload.signal(kind);
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("mode", &self.mode)
            .field("config", &self.config)
            .field("reload", &self.reload.is_some())
            .finish()
    }
}
