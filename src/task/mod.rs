//! Leaf tasks.
//!
//! Every leaf reads the immutable [`Environment`] and writes into its own
//! part of the output directory, so leaves that run side by side never touch
//! the same path:
//!
//! | task       | writes                      |
//! |------------|-----------------------------|
//! | clean      | removes `dist`              |
//! | copy       | `dist/**` (static files)    |
//! | styles     | `dist/css/`                 |
//! | scripts    | `dist/js/`                  |
//! | images     | `dist/<images.output>/`     |
//! | styleguide | `dist/styleguide.html`      |

mod clean;
mod copy;
mod esbuild;
mod images;
mod prune;
mod scripts;
mod sourcemap;
mod styleguide;
mod styles;

use std::fmt::Display;
use std::str::FromStr;

use crate::Environment;
use crate::error::TaskError;

pub use clean::clean;
pub use copy::copy_static;
pub use images::process_images;
pub use prune::{UsedSelectors, prune_css};
pub use scripts::bundle_scripts;
pub use styleguide::generate_style_guide;
pub use styles::compile_styles;

/// A named leaf of the task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Task {
    Clean,
    Copy,
    Styles,
    Scripts,
    Images,
    StyleGuide,
}

impl Task {
    pub const ALL: [Task; 6] = [
        Task::Clean,
        Task::Copy,
        Task::Styles,
        Task::Scripts,
        Task::Images,
        Task::StyleGuide,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Task::Clean => "clean",
            Task::Copy => "copy",
            Task::Styles => "styles",
            Task::Scripts => "scripts",
            Task::Images => "images",
            Task::StyleGuide => "styleguide",
        }
    }

    /// Runs the leaf to completion on the calling thread.
    pub fn run(self, env: &Environment) -> Result<(), TaskError> {
        match self {
            Task::Clean => clean(env),
            Task::Copy => copy_static(env),
            Task::Styles => compile_styles(env).map(drop).map_err(Into::into),
            Task::Scripts => bundle_scripts(env).map(drop).map_err(Into::into),
            Task::Images => process_images(env).map(drop).map_err(Into::into),
            Task::StyleGuide => generate_style_guide(env).map(drop).map_err(Into::into),
        }
    }
}

impl Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown task '{s}'"))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use camino::{Utf8Path, Utf8PathBuf};

    use crate::core::{Reload, ReloadKind};
    use crate::{Config, Environment, Mode};

    /// Records every reload signal it receives.
    #[derive(Default)]
    pub struct Recorder(pub Mutex<Vec<ReloadKind>>);

    impl Reload for Recorder {
        fn signal(&self, kind: ReloadKind) {
            self.0.lock().unwrap().push(kind);
        }
    }

    /// A throwaway project directory with a settings file.
    pub struct Project {
        pub dir: tempfile::TempDir,
    }

    impl Project {
        pub fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        pub fn root(&self) -> Utf8PathBuf {
            Utf8Path::from_path(self.dir.path()).unwrap().to_path_buf()
        }

        pub fn file(&self, rel: &str, data: impl AsRef<[u8]>) -> &Self {
            crate::io::write(&self.root().join(rel), data).unwrap();
            self
        }

        pub fn read(&self, rel: &str) -> Vec<u8> {
            std::fs::read(self.root().join(rel)).unwrap()
        }

        pub fn read_string(&self, rel: &str) -> String {
            String::from_utf8(self.read(rel)).unwrap()
        }

        pub fn exists(&self, rel: &str) -> bool {
            self.root().join(rel).exists()
        }

        pub fn config(&self, extra: &str) -> Config {
            let text = format!(
                r#"
paths:
  static: ["src/**/*", "!src/scss/**/*", "!src/js/**/*", "!src/gr/**/*"]
  styles: {{ entry: src/scss/app.scss, watch: "src/scss/**/*.scss" }}
  scripts: {{ entries: [src/js/app.js], watch: "src/js/**/*.js" }}
  images: {{ source: src/gr }}
{extra}"#
            );
            self.parse(&text)
        }

        pub fn parse(&self, text: &str) -> Config {
            Config::parse(text, self.root()).unwrap()
        }

        pub fn env(&self, mode: Mode) -> Environment {
            Environment::new(mode, self.config(""))
        }

        pub fn env_with(&self, mode: Mode, extra: &str, recorder: Arc<Recorder>) -> Environment {
            Environment::new(mode, self.config(extra)).with_reload(recorder)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for task in Task::ALL {
            assert_eq!(task.name().parse::<Task>().unwrap(), task);
        }
        assert!("sass".parse::<Task>().is_err());
    }

    #[test]
    fn test_display_pads() {
        assert_eq!(format!("{:>7}", Task::Copy), "   copy");
    }
}
