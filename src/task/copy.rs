use std::time::Instant;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::Environment;
use crate::error::TaskError;
use crate::io::as_overhead;

/// Mirror the static globs into the output directory, keeping every path
/// relative to the static prefix of the glob that matched it.
pub fn copy_static(env: &Environment) -> Result<(), TaskError> {
    let s = Instant::now();
    let config = &env.config;
    let dist = config.dist_dir();

    let globs: Vec<_> = config
        .paths
        .statics
        .iter()
        .map(|glob| config.resolve_glob(glob))
        .collect();

    let matched = crate::io::expand(&globs)?;

    matched
        .par_iter()
        .try_for_each(|file| crate::io::copy(&file.path, &dist.join(&file.relative)))
        .map_err(TaskError::Copy)?;

    tracing::info!("Copied {} static files {}", matched.len(), as_overhead(s));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mode;
    use crate::task::testing::Project;

    #[test]
    fn test_copy_skips_dedicated_trees() {
        let project = Project::new();
        project
            .file("src/index.html", "<html></html>")
            .file("src/fonts/a.woff", [0u8, 1, 2])
            .file("src/scss/app.scss", "a { b: c }")
            .file("src/js/app.js", "1")
            .file("src/gr/logo.png", [9u8]);

        copy_static(&project.env(Mode::Development)).unwrap();

        assert_eq!(project.read_string("dist/index.html"), "<html></html>");
        assert_eq!(project.read("dist/fonts/a.woff"), [0u8, 1, 2]);
        assert!(!project.exists("dist/scss"));
        assert!(!project.exists("dist/js"));
        assert!(!project.exists("dist/gr"));
    }

    #[test]
    fn test_copy_nothing_matched() {
        let project = Project::new();
        copy_static(&project.env(Mode::Development)).unwrap();
        assert!(!project.exists("dist"));
    }
}
