//! Settings file loading.
//!
//! The settings are read once at startup from a YAML file and never change
//! afterwards. Every relative path in the file is resolved against the
//! directory that holds the file, so a project can be built from anywhere.

use std::fs;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::ConfigError;

/// The immutable settings of a project.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding the settings file, filled in by [`Config::load`].
    #[serde(skip)]
    pub root: Utf8PathBuf,
    /// Output root, purged on every build.
    #[serde(default = "default_dist")]
    pub dist: Utf8PathBuf,
    /// Port of the development server.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Port of the control plane (status page and live-reload socket).
    #[serde(default = "default_ui_port")]
    pub ui_port: u16,
    /// Upstream the development server forwards to. When absent the server
    /// serves the `dist` directory instead.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Browser targets passed to esbuild, e.g. `chrome58` or `safari11`.
    #[serde(default)]
    pub compatibility: Vec<String>,
    /// Unused CSS removal.
    #[serde(default)]
    pub uncss: PruneOptions,
    pub paths: Paths,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Paths {
    /// Globs copied verbatim; a leading `!` excludes.
    #[serde(default, rename = "static")]
    pub statics: Vec<String>,
    /// Sass load paths.
    #[serde(default)]
    pub sass: Vec<Utf8PathBuf>,
    pub styles: StylePaths,
    pub scripts: ScriptPaths,
    pub images: ImagePaths,
    /// Templates, a change to these recompiles the styles.
    #[serde(default)]
    pub templates: Vec<String>,
    #[serde(default)]
    pub styleguide: Option<StyleGuidePaths>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StylePaths {
    pub entry: Utf8PathBuf,
    pub watch: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStrategy {
    /// One bundle per entry, imports resolved.
    #[default]
    Bundle,
    /// Every matched file transpiled on its own, then joined into one file.
    Concat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptPaths {
    pub entries: Vec<String>,
    pub watch: String,
    #[serde(default)]
    pub strategy: ScriptStrategy,
    /// File name of the concatenated bundle.
    #[serde(default = "default_script_output")]
    pub output: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImagePaths {
    pub source: Utf8PathBuf,
    #[serde(default = "default_image_output")]
    pub output: Utf8PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleGuidePaths {
    pub content: Utf8PathBuf,
    pub template: Utf8PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PruneOptions {
    #[serde(default)]
    pub enabled: bool,
    /// Pages scanned for used selectors.
    #[serde(default)]
    pub html: Vec<String>,
    /// Selectors that are never removed.
    #[serde(default)]
    pub ignore: Vec<String>,
}

fn default_dist() -> Utf8PathBuf {
    Utf8PathBuf::from("dist")
}

fn default_port() -> u16 {
    3000
}

fn default_ui_port() -> u16 {
    3001
}

fn default_script_output() -> String {
    String::from("app.js")
}

fn default_image_output() -> Utf8PathBuf {
    Utf8PathBuf::from("gr")
}

/// Directory of the settings file, without `.` components. A file in the
/// working directory gets an empty root, so resolved paths stay exactly as
/// written and line up with what `glob` reports.
fn project_root(path: &Utf8Path) -> Utf8PathBuf {
    path.parent()
        .map(|parent| {
            parent
                .components()
                .filter(|c| !matches!(c, Utf8Component::CurDir))
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    /// Reads the settings file at `path`. A missing or malformed file is
    /// fatal, there is no fallback configuration.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let text = fs::read_to_string(path) //
            .map_err(|e| ConfigError::Read(path.to_string(), e))?;

        let root = project_root(path);

        let config = Self::parse(&text, root).map_err(|e| match e {
            ConfigError::Parse(_, e) => ConfigError::Parse(path.to_string(), e),
            other => other,
        })?;

        tracing::debug!(?config, "loaded settings");
        Ok(config)
    }

    /// Parses settings from YAML text, resolving paths against `root`.
    pub fn parse(text: &str, root: impl Into<Utf8PathBuf>) -> Result<Self, ConfigError> {
        let mut config: Config =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(String::new(), e))?;
        config.root = root.into();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dist.as_str().is_empty() || self.dist == "." || self.dist == "/" {
            return Err(ConfigError::Invalid("dist", format!("refusing to use {:?}", self.dist)));
        }

        if self.port == self.ui_port {
            return Err(ConfigError::Invalid(
                "ui_port",
                format!("must differ from port {}", self.port),
            ));
        }

        if self.paths.scripts.entries.is_empty() {
            return Err(ConfigError::Invalid("paths.scripts.entries", "empty".into()));
        }

        if let Some(proxy) = &self.proxy
            && !proxy.starts_with("http://")
        {
            return Err(ConfigError::Invalid("proxy", format!("not an http:// url: {proxy}")));
        }

        Ok(())
    }

    /// Resolves a path from the settings file against the project root.
    pub fn resolve(&self, path: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Resolves a glob from the settings file, keeping a leading `!`.
    pub fn resolve_glob(&self, glob: &str) -> String {
        match glob.strip_prefix('!') {
            Some(rest) => format!("!{}", self.resolve(rest)),
            None => self.resolve(glob).into_string(),
        }
    }

    /// Absolute-ish path of the output root.
    pub fn dist_dir(&self) -> Utf8PathBuf {
        self.resolve(&self.dist)
    }
}
