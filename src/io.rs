use std::fmt::Display;
use std::fs;
use std::sync::LazyLock;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use console::Style;
use glob::Pattern;
use indicatif::ProgressStyle;

use crate::error::GlobError;

const ANSI_BLUE: Style = Style::new().blue();

pub(crate) static PROGRESS_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("Error setting progress bar template")
        .progress_chars("=>-")
});

pub(crate) static TASK_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .expect("Error setting progress bar template")
});

pub fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// A file matched by a glob, with the path it should take under the output
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Matched {
    pub path: Utf8PathBuf,
    pub relative: Utf8PathBuf,
}

/// Splits a glob into the static directory prefix and the wildcard suffix.
///
/// `src/assets/**/*.png` becomes (`src/assets`, `**/*.png`). A glob without
/// wildcards is its own base.
pub(crate) fn glob_base(glob: &str) -> Utf8PathBuf {
    let path = Utf8Path::new(glob);
    let components: Vec<_> = path.components().collect();
    let split = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    components.iter().take(split).collect()
}

/// Drops leading `./` from a glob. `glob` reports `./src/a` as `src/a`, so
/// bases and exclusions have to be spelled the same way to match.
fn trim_cur_dir(mut glob: &str) -> &str {
    while let Some(rest) = glob.strip_prefix("./") {
        glob = rest.trim_start_matches('/');
    }
    glob
}

/// Expands include globs minus `!` exclusion globs, keeping regular files
/// only. Matches keep the order of their include glob, then sorted within it,
/// and a path matched by two include globs is reported once.
pub(crate) fn expand(globs: &[String]) -> Result<Vec<Matched>, GlobError> {
    let mut exclude = Vec::new();
    let mut include = Vec::new();

    for glob in globs {
        match glob.strip_prefix('!') {
            Some(rest) => exclude.push(Pattern::new(trim_cur_dir(rest))?),
            None => include.push(trim_cur_dir(glob)),
        }
    }

    let mut seen = std::collections::HashSet::new();
    let mut matched = Vec::new();

    for glob in include {
        let base = glob_base(glob);
        let is_literal = base.as_str() == glob;

        let mut paths = Vec::new();
        for path in glob::glob(glob)? {
            let path = Utf8PathBuf::try_from(path?)?;
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            if exclude.iter().any(|p| p.matches_path(path.as_std_path())) {
                continue;
            }

            if !seen.insert(path.clone()) {
                continue;
            }

            let relative = if is_literal {
                Utf8PathBuf::from(path.file_name().unwrap_or(path.as_str()))
            } else {
                path.strip_prefix(&base)
                    .map(Utf8Path::to_path_buf)
                    .unwrap_or_else(|_| path.clone())
            };

            matched.push(Matched { path, relative });
        }
    }

    Ok(matched)
}

/// Writes `data` to `path`, creating the parent directories.
pub(crate) fn write(path: &Utf8Path, data: impl AsRef<[u8]>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)
}

/// Copies `src` to `dst`, creating the parent directories.
pub(crate) fn copy(src: &Utf8Path, dst: &Utf8Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst).map(|_| ())
}
