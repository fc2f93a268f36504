//! Watch mode maps filesystem changes to leaf tasks.
//!
//! Every [`Category`] pairs a set of globs with the task that rebuilds what
//! they feed and the kind of reload browsers get afterwards:
//!
//! | category  | globs                     | task    | reload |
//! |-----------|---------------------------|---------|--------|
//! | static    | `paths.static`            | copy    | full   |
//! | templates | `paths.templates`         | styles  | full   |
//! | styles    | `paths.styles.watch`      | styles  | css    |
//! | scripts   | `paths.scripts.watch`     | scripts | full   |
//! | images    | `paths.images.source/**`  | images  | full   |
//! | config    | the settings file         | scripts | full   |
//!
//! Each matching change runs its reaction on a fresh thread, so a slow
//! image pass never holds back a stylesheet. Reactions that overlap are
//! allowed to run side by side. A failing task is logged and the watcher
//! keeps going.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use notify::{EventKind, RecursiveMode, Watcher};

use crate::core::ReloadKind;
use crate::error::{GlobError, TaskError, WatchError};
use crate::task::Task;
use crate::{Config, Environment};

/// Where a reaction currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    ChangeDetected,
    TaskRunning,
    ReloadSignaled,
}

/// A group of watched globs and what to do when one of them changes.
#[derive(Debug)]
pub struct Category {
    pub name: &'static str,
    pub task: Task,
    pub reload: ReloadKind,
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
    roots: Vec<Utf8PathBuf>,
}

impl Category {
    fn new(name: &'static str, task: Task, reload: ReloadKind, globs: &[String]) -> Self {
        let mut category = Self {
            name,
            task,
            reload,
            includes: vec![],
            excludes: vec![],
            roots: vec![],
        };

        for glob in globs {
            let (exclude, glob) = match glob.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, glob.as_str()),
            };

            match resolve_watch_path(glob) {
                Ok((_, pattern)) if exclude => category.excludes.push(pattern),
                Ok((root, pattern)) => {
                    category.roots.push(root);
                    category.includes.push(pattern);
                }
                Err(e) => tracing::warn!(category = name, "not watching {glob}: {e}"),
            }
        }

        category
    }

    /// Whether a change to `path` concerns this category.
    pub fn matches(&self, path: &Path) -> bool {
        self.includes.iter().any(|p| p.matches_path(path))
            && !self.excludes.iter().any(|p| p.matches_path(path))
    }

    /// Runs the task, then signals browsers. Every state the reaction passes
    /// through is reported to `observe`, ending back in [`WatchState::Idle`].
    pub fn react(
        &self,
        env: &Environment,
        mut observe: impl FnMut(WatchState),
    ) -> Result<(), TaskError> {
        observe(WatchState::ChangeDetected);
        tracing::info!(category = self.name, "change detected, running {}", self.task);

        observe(WatchState::TaskRunning);
        let result = self.task.run(env);
        if let Err(e) = &result {
            tracing::error!(category = self.name, "{} failed: {e}", self.task);
        }

        observe(WatchState::ReloadSignaled);
        env.signal(self.reload);

        observe(WatchState::Idle);
        result
    }
}

/// Builds the watch table for a project. Globs whose static part does not
/// exist are skipped with a warning.
pub fn categories(config: &Config, config_path: &Utf8Path) -> Vec<Category> {
    let resolve = |globs: &[String]| -> Vec<String> {
        globs.iter().map(|g| config.resolve_glob(g)).collect()
    };
    let paths = &config.paths;
    let images = config.resolve(&paths.images.source).join("**/*");

    vec![
        Category::new("static", Task::Copy, ReloadKind::Full, &resolve(&paths.statics)),
        Category::new("templates", Task::Styles, ReloadKind::Full, &resolve(&paths.templates)),
        Category::new(
            "styles",
            Task::Styles,
            ReloadKind::Css,
            &resolve(std::slice::from_ref(&paths.styles.watch)),
        ),
        Category::new(
            "scripts",
            Task::Scripts,
            ReloadKind::Full,
            &resolve(std::slice::from_ref(&paths.scripts.watch)),
        ),
        Category::new("images", Task::Images, ReloadKind::Full, &[images.into_string()]),
        Category::new("config", Task::Scripts, ReloadKind::Full, &[config_path.to_string()]),
    ]
}

/// Watches the project until the process exits.
pub fn watch(env: &Environment, config_path: &Utf8Path) -> Result<(), WatchError> {
    let categories: Vec<Arc<Category>> = categories(&env.config, config_path)
        .into_iter()
        .map(Arc::new)
        .collect();

    let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
    let mut watcher = notify::recommended_watcher(tx)?;

    let roots = categories
        .iter()
        .flat_map(|c| c.roots.iter().cloned())
        .collect();
    for root in collapse_watch_paths(roots) {
        tracing::info!("watching {}", root);
        watcher.watch(root.as_std_path(), RecursiveMode::Recursive)?;
    }

    loop {
        let event = match rx.recv() {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                tracing::error!("watch error: {e}");
                continue;
            }
            Err(_) => return Err(WatchError::Closed),
        };

        if matches!(event.kind, EventKind::Access(_)) {
            continue;
        }

        for category in affected(&categories, &event.paths) {
            let category = category.clone();
            let env = env.clone();
            std::thread::spawn(move || {
                let name = category.name;
                let _ = category.react(&env, |state| tracing::debug!(category = name, ?state));
            });
        }
    }
}

/// Categories touched by a batch of changed paths, each at most once.
fn affected<'a>(categories: &'a [Arc<Category>], paths: &[PathBuf]) -> Vec<&'a Arc<Category>> {
    categories
        .iter()
        .filter(|category| paths.iter().any(|path| category.matches(path)))
        .collect()
}

/// Splits a glob string into a canonicalized static root path (for
/// watching) and a compiled absolute Pattern (for matching).
fn resolve_watch_path(glob_str: &str) -> Result<(Utf8PathBuf, Pattern), WatchError> {
    let path = Utf8Path::new(glob_str);

    let components: Vec<_> = path.components().collect();
    let split_idx = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    let root_part: Utf8PathBuf = components.iter().take(split_idx).collect();
    let suffix_part: Utf8PathBuf = components.iter().skip(split_idx).collect();

    // the static root must exist on disk, an empty one is the working directory
    let root_part = if root_part.as_str().is_empty() {
        Utf8PathBuf::from(".")
    } else {
        root_part
    };
    let absolute_root = root_part.canonicalize_utf8()?;

    // A concrete file is matched as is, but its parent is watched so that
    // editors replacing the file are still seen.
    let (watch_root, pattern) = if suffix_part.as_str().is_empty() && absolute_root.is_file() {
        let parent = absolute_root
            .parent()
            .unwrap_or(&absolute_root)
            .to_path_buf();
        (parent, absolute_root)
    } else {
        let pattern = absolute_root.join(&suffix_part);
        (absolute_root, pattern)
    };

    let pattern = Pattern::new(pattern.as_str()).map_err(GlobError::from)?;

    Ok((watch_root, pattern))
}

/// Reduces a set of paths to the minimal set of watch roots. The watcher is
/// recursive, so `/a` covers `/a/b`.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered: Vec<Utf8PathBuf> = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::Mode;
    use crate::task::testing::{Project, Recorder};

    fn project() -> Project {
        let project = Project::new();
        project
            .file("config.yml", "")
            .file("src/index.html", "<html></html>")
            .file("src/scss/app.scss", "$c: red;\nbody { color: $c; }\n")
            .file("src/js/app.js", "console.log(1);\n")
            .file("src/gr/logo.svg", "<svg/>")
            .file("templates/page.html", "<main></main>");
        project
    }

    fn canonical(project: &Project) -> Utf8PathBuf {
        project.root().canonicalize_utf8().unwrap()
    }

    fn table(project: &Project) -> Vec<Arc<Category>> {
        let config = project.config("  templates: [\"templates/**/*.html\"]\n");
        categories(&config, &project.root().join("config.yml"))
            .into_iter()
            .map(Arc::new)
            .collect()
    }

    fn names(categories: &[&Arc<Category>]) -> Vec<&'static str> {
        categories.iter().map(|c| c.name).collect()
    }

    #[test]
    fn test_concrete_file() {
        let project = project();
        let root = canonical(&project);

        let (watch, pattern) = resolve_watch_path(project.root().join("config.yml").as_str()).unwrap();

        assert_eq!(watch, root);
        assert_eq!(pattern.as_str(), root.join("config.yml"));
    }

    #[test]
    fn test_directory_wildcard() {
        let project = project();
        let root = canonical(&project);

        let (watch, pattern) = resolve_watch_path(project.root().join("src/**/*.scss").as_str()).unwrap();

        assert_eq!(watch, root.join("src"));
        assert_eq!(pattern.as_str(), root.join("src/**/*.scss"));
    }

    #[test]
    fn test_missing_root() {
        let project = project();
        let err = resolve_watch_path(project.root().join("nope/**/*").as_str()).unwrap_err();
        assert!(matches!(err, WatchError::Io(_)));
    }

    #[test]
    fn test_collapse_watch_paths() {
        let paths = ["/a", "/a/b", "/a/b/c", "/b", "/c/d", "/foo-bar"]
            .into_iter()
            .map(Utf8PathBuf::from)
            .collect();

        assert_eq!(collapse_watch_paths(paths), ["/a", "/b", "/c/d", "/foo-bar"]);
    }

    #[test]
    fn test_table() {
        let project = project();
        let table: Vec<_> = table(&project)
            .iter()
            .map(|c| (c.name, c.task, c.reload))
            .collect();

        assert_eq!(
            table,
            [
                ("static", Task::Copy, ReloadKind::Full),
                ("templates", Task::Styles, ReloadKind::Full),
                ("styles", Task::Styles, ReloadKind::Css),
                ("scripts", Task::Scripts, ReloadKind::Full),
                ("images", Task::Images, ReloadKind::Full),
                ("config", Task::Scripts, ReloadKind::Full),
            ]
        );
    }

    #[test]
    fn test_affected() {
        let project = project();
        let root = canonical(&project);
        let table = table(&project);
        let touched = |rel: &str| names(&affected(&table, &[root.join(rel).into_std_path_buf()]));

        assert_eq!(touched("src/scss/_grid.scss"), ["styles"]);
        assert_eq!(touched("src/index.html"), ["static"]);
        assert_eq!(touched("src/js/app.js"), ["scripts"]);
        assert_eq!(touched("src/gr/photos/sea.jpg"), ["images"]);
        assert_eq!(touched("templates/page.html"), ["templates"]);
        assert_eq!(touched("config.yml"), ["config"]);
        assert!(touched("README.md").is_empty());
    }

    #[test]
    fn test_affected_once_per_batch() {
        let project = project();
        let root = canonical(&project);
        let table = table(&project);
        let paths = [
            root.join("src/scss/a.scss").into_std_path_buf(),
            root.join("src/scss/b.scss").into_std_path_buf(),
        ];

        assert_eq!(names(&affected(&table, &paths)), ["styles"]);
    }

    #[test]
    fn test_react_walks_states() {
        let project = project();
        let recorder = Arc::new(Recorder::default());
        let env = project.env_with(Mode::Development, "", recorder.clone());
        let styles = table(&project).into_iter().find(|c| c.name == "styles").unwrap();

        let mut states = vec![];
        styles.react(&env, |state| states.push(state)).unwrap();

        assert_eq!(
            states,
            [
                WatchState::ChangeDetected,
                WatchState::TaskRunning,
                WatchState::ReloadSignaled,
                WatchState::Idle,
            ]
        );
        assert_eq!(recorder.0.lock().unwrap().last(), Some(&ReloadKind::Css));
        assert!(project.exists("dist/css/app.css"));
    }

    #[test]
    fn test_broken_stylesheet_keeps_previous_css() {
        let project = project();
        let env = project.env(Mode::Development);
        let styles = table(&project).into_iter().find(|c| c.name == "styles").unwrap();

        styles.react(&env, |_| {}).unwrap();
        let before = project.read("dist/css/app.css");

        project.file("src/scss/app.scss", "body { color: $missing; ");
        let mut states = vec![];
        let result = styles.react(&env, |state| states.push(state));

        assert!(result.is_err());
        assert_eq!(states.last(), Some(&WatchState::Idle));
        assert_eq!(project.read("dist/css/app.css"), before);
    }
}
