use std::time::Instant;

use camino::Utf8PathBuf;

use crate::config::ScriptStrategy;
use crate::error::ScriptError;
use crate::io::{Matched, as_overhead};
use crate::task::esbuild::{esbuild, target_arg};
use crate::task::sourcemap::{self, Comment};
use crate::Environment;

/// Transpiles and bundles the script entries into `dist/js/`.
///
/// With [`ScriptStrategy::Bundle`] every entry becomes its own bundle named
/// after the entry. With [`ScriptStrategy::Concat`] every matched file is
/// transpiled on its own and the results are joined, in configured order,
/// into a single file.
///
/// Nothing is written unless every entry compiled, so a failure leaves the
/// previous bundles in place.
pub fn bundle_scripts(env: &Environment) -> Result<Vec<Utf8PathBuf>, ScriptError> {
    let s = Instant::now();
    let config = &env.config;
    let scripts = &config.paths.scripts;

    let globs: Vec<_> = scripts
        .entries
        .iter()
        .map(|g| config.resolve_glob(g))
        .collect();

    let entries = crate::io::expand(&globs)?;
    if entries.is_empty() {
        return Err(ScriptError::NoEntries(scripts.entries.clone()));
    }

    let outputs = match scripts.strategy {
        ScriptStrategy::Bundle => bundle(env, &entries)?,
        ScriptStrategy::Concat => vec![(Utf8PathBuf::from(&scripts.output), concat(env, &entries)?)],
    };

    let dist = config.dist_dir().join("js");
    let mut written = Vec::with_capacity(outputs.len());

    for (name, code) in outputs {
        let path = dist.join(name);
        crate::io::write(&path, code)?;
        written.push(path);
    }

    tracing::info!("Bundled {} script(s) {}", written.len(), as_overhead(s));
    Ok(written)
}

fn common_args(env: &Environment) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(target) = target_arg(&env.config.compatibility) {
        args.push(target);
    }
    args
}

fn bundle(env: &Environment, entries: &[Matched]) -> Result<Vec<(Utf8PathBuf, Vec<u8>)>, ScriptError> {
    let mut outputs = Vec::with_capacity(entries.len());

    for entry in entries {
        let mut args = vec![entry.path.to_string(), String::from("--bundle")];
        args.extend(common_args(env));

        if env.mode.is_production() {
            args.push(String::from("--minify"));
        } else {
            args.push(String::from("--sourcemap=inline"));
        }

        let code = esbuild(&args, None)?;
        outputs.push((entry.relative.with_extension("js"), code));
    }

    Ok(outputs)
}

fn concat(env: &Environment, entries: &[Matched]) -> Result<Vec<u8>, ScriptError> {
    let name = env.config.paths.scripts.output.as_str();
    let mut joined = String::new();
    let mut sections = Vec::new();

    for entry in entries {
        let mut args = vec![entry.path.to_string()];
        args.extend(common_args(env));

        if !env.mode.is_production() {
            args.push(String::from("--sourcemap=inline"));
        }

        let code = String::from_utf8(esbuild(&args, None)?)?;
        let (code, map) = sourcemap::split(&code);

        if let Some(map) = map {
            let line = joined.matches('\n').count();
            sections.push((line, map));
        }

        joined.push_str(code);
        if !joined.ends_with('\n') {
            joined.push('\n');
        }
    }

    if env.mode.is_production() {
        let args = vec![String::from("--loader=js"), String::from("--minify")];
        return Ok(esbuild(&args, Some(joined.as_bytes()))?);
    }

    joined.push_str(&sourcemap::comment(&sourcemap::index_map(name, sections), Comment::Js));
    Ok(joined.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mode;
    use crate::task::testing::Project;

    fn project(extra: &str) -> (Project, Environment, Environment) {
        let project = Project::new();
        project
            .file("src/js/util.js", "export const twice = (x) => x * 2;\n")
            .file("src/js/app.js", "import { twice } from './util.js';\nconsole.log(twice(21));\n")
            .file("src/js/admin.js", "const admin = () => 'admin';\nconsole.log(admin());\n");

        let text = format!(
            r#"
paths:
  styles: {{ entry: src/scss/app.scss, watch: "src/scss/**/*.scss" }}
  scripts: {{ entries: [src/js/app.js, src/js/admin.js], watch: "src/js/**/*.js"{extra} }}
  images: {{ source: src/gr }}
"#
        );
        let dev = Environment::new(Mode::Development, project.parse(&text));
        let prod = Environment::new(Mode::Production, project.parse(&text));
        (project, dev, prod)
    }

    #[test]
    fn test_no_entries() {
        let project = Project::new();
        let err = bundle_scripts(&project.env(Mode::Development)).unwrap_err();
        assert!(matches!(err, ScriptError::NoEntries(_)));
    }

    #[test]
    #[ignore = "needs esbuild"]
    fn test_bundle_one_file_per_entry() {
        let (project, dev, prod) = project("");

        let written = bundle_scripts(&dev).unwrap();
        assert_eq!(written.len(), 2);

        let app = project.read_string("dist/js/app.js");
        assert!(app.contains("21"));
        assert!(sourcemap::has_inline_map(&app));
        assert!(project.exists("dist/js/admin.js"));

        bundle_scripts(&prod).unwrap();
        let app = project.read_string("dist/js/app.js");
        assert!(!sourcemap::has_inline_map(&app));
    }

    #[test]
    #[ignore = "needs esbuild"]
    fn test_concat_keeps_order() {
        let (project, dev, _) = project(", strategy: concat, output: all.js");
        project.file("src/js/app.js", "console.log('first');\n");

        let written = bundle_scripts(&dev).unwrap();
        assert_eq!(written.len(), 1);
        assert!(!project.exists("dist/js/app.js"));

        let all = project.read_string("dist/js/all.js");
        let first = all.find("first").unwrap();
        let second = all.find("admin").unwrap();
        assert!(first < second);
        assert_eq!(all.matches("sourceMappingURL").count(), 1);
    }
}
