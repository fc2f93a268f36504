use thiserror::Error;

/// Fatal startup errors: a missing or malformed settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read settings file '{0}'.\n{1}")]
    Read(String, std::io::Error),

    #[error("Couldn't parse settings file '{0}'.\n{1}")]
    Parse(String, serde_yaml::Error),

    #[error("Invalid setting '{0}': {1}")]
    Invalid(&'static str, String),
}

/// Errors that can occur when expanding glob patterns.
#[derive(Debug, Error)]
pub enum GlobError {
    #[error("Couldn't compile glob pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}

/// Errors that can occur when compiling stylesheets.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sass compilation error: {0}")]
    Sass(#[from] Box<grass::Error>),

    #[error("Esbuild execution failed: {0}")]
    Esbuild(String),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Glob(#[from] GlobError),
}

/// Errors that can occur when bundling scripts.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Esbuild execution failed: {0}")]
    Esbuild(String),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("No script entries matched {0:?}")]
    NoEntries(Vec<String>),

    #[error(transparent)]
    Glob(#[from] GlobError),
}

/// Errors that can occur when processing images.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Glob(#[from] GlobError),
}

/// Errors that can occur when rendering the style guide.
#[derive(Debug, Error)]
pub enum StyleGuideError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// Failure of a single leaf task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Error while clearing the dist directory:\n{0}")]
    Clean(std::io::Error),

    #[error("Error while copying static files:\n{0}")]
    Copy(std::io::Error),

    #[error("Couldn't resolve static files:\n{0}")]
    CopyGlob(#[from] GlobError),

    #[error(transparent)]
    Style(#[from] StyleError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    StyleGuide(#[from] StyleGuideError),

    #[error("Task panicked: {0}")]
    Panic(String),
}

impl TaskError {
    /// Fatal failures cancel every task that comes after them in a sequence.
    /// The rest are logged and the previous artifact stays on disk.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TaskError::Clean(_) | TaskError::Copy(_) | TaskError::CopyGlob(_) | TaskError::Panic(_)
        )
    }
}

/// Aggregate outcome of running a plan.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Task graph contains a cycle")]
    Cycle,

    #[error("{} task(s) failed: {}", .0.len(), .0.join(", "))]
    Failed(Vec<String>),
}

#[cfg(feature = "server")]
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not listen on port {0}: {1}")]
    Bind(u16, #[source] std::io::Error),

    #[error("Upstream request failed: {0}")]
    Proxy(String),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error("Watch channel closed")]
    Closed,
}
