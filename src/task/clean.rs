use std::fs;
use std::io::ErrorKind;
use std::time::Instant;

use crate::Environment;
use crate::error::TaskError;
use crate::io::as_overhead;

/// Delete the entire output directory. An already missing directory is not
/// an error.
pub fn clean(env: &Environment) -> Result<(), TaskError> {
    let s = Instant::now();
    let dist = env.config.dist_dir();

    match fs::remove_dir_all(&dist) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(TaskError::Clean(e)),
    }

    tracing::info!("Cleaned {} {}", dist, as_overhead(s));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mode;
    use crate::task::testing::Project;

    #[test]
    fn test_clean_twice() {
        let project = Project::new();
        project.file("dist/css/old.css", "stale");
        let env = project.env(Mode::Development);

        clean(&env).unwrap();
        assert!(!project.exists("dist"));

        clean(&env).unwrap();
        assert!(!project.exists("dist"));
    }

    #[test]
    fn test_clean_file_in_place_of_dir() {
        let project = Project::new();
        project.file("dist", "not a directory");
        let env = project.env(Mode::Development);

        assert!(matches!(clean(&env), Err(TaskError::Clean(_))));
    }
}
