use std::fs;
use std::time::Instant;

use camino::Utf8PathBuf;
use grass::{Options, OutputStyle};

use crate::core::ReloadKind;
use crate::error::StyleError;
use crate::io::as_overhead;
use crate::task::esbuild::{esbuild, target_arg};
use crate::task::prune::{UsedSelectors, prune_css};
use crate::task::sourcemap::{self, Comment};
use crate::Environment;

/// Compiles the entry stylesheet into `dist/css/<stem>.css`.
///
/// Pipeline: Sass → vendor prefixes (when targets are configured) → in
/// production unused rule removal and minification, otherwise an inline
/// source map. The file is written only once every step succeeded, so a
/// broken stylesheet leaves the previous output in place. Connected browsers
/// are told to swap stylesheets afterwards.
///
/// grass emits no mappings of its own, so the development map is coarse: it
/// ties the output to the entry file and embeds that file's text, but points
/// every rule at the start of the entry rather than at its own line.
pub fn compile_styles(env: &Environment) -> Result<Utf8PathBuf, StyleError> {
    let s = Instant::now();
    let config = &env.config;
    let entry = config.resolve(&config.paths.styles.entry);
    let stem = entry.file_stem().unwrap_or("app");
    let file = format!("{stem}.css");

    let load_paths: Vec<_> = config
        .paths
        .sass
        .iter()
        .map(|p| config.resolve(p))
        .collect();

    let options = Options::default()
        .load_paths(&load_paths)
        .style(OutputStyle::Expanded);

    let mut css = grass::from_path(&entry, &options)?;

    if let Some(target) = target_arg(&config.compatibility) {
        let args = vec![String::from("--loader=css"), target];
        css = String::from_utf8(esbuild(&args, Some(css.as_bytes()))?)?;
    }

    if env.mode.is_production() {
        if config.uncss.enabled {
            let used = scan_pages(env)?;
            css = prune_css(&css, &used, &config.uncss.ignore);
        }
        css = minify(&css)?;
    } else {
        let source = entry
            .strip_prefix(&config.root)
            .unwrap_or(&entry)
            .to_string();
        let content = fs::read_to_string(&entry)?;
        let map = sourcemap::whole_file(&file, &source, &content);

        if !css.ends_with('\n') {
            css.push('\n');
        }
        css.push_str(&sourcemap::comment(&map, Comment::Css));
    }

    let path = config.dist_dir().join("css").join(&file);
    crate::io::write(&path, &css)?;

    tracing::info!("Compiled {} {}", path, as_overhead(s));
    env.signal(ReloadKind::Css);

    Ok(path)
}

/// Re-emits plain CSS in the compressed style, which also strips comments.
fn minify(css: &str) -> Result<String, StyleError> {
    let options = Options::default().style(OutputStyle::Compressed);
    Ok(grass::from_string(css.to_owned(), &options)?)
}

/// Collects what the configured pages use.
fn scan_pages(env: &Environment) -> Result<UsedSelectors, StyleError> {
    let config = &env.config;
    let globs: Vec<_> = config
        .uncss
        .html
        .iter()
        .map(|g| config.resolve_glob(g))
        .collect();

    let mut used = UsedSelectors::default();
    for page in crate::io::expand(&globs)? {
        used.scan(&fs::read_to_string(&page.path)?);
    }

    tracing::debug!(
        tags = used.tags.len(),
        classes = used.classes.len(),
        ids = used.ids.len(),
        "scanned pages for used selectors"
    );

    Ok(used)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::Mode;
    use crate::task::testing::{Project, Recorder};

    const SCSS: &str = "\
$accent: #ff0000;
// a comment that never reaches the output
.card { color: $accent; .title { margin: 0; } }
.unused { color: blue; }
";

    fn project() -> Project {
        let project = Project::new();
        project
            .file("src/scss/app.scss", SCSS)
            .file("src/scss/_vars.scss", "$pad: 4px;");
        project
    }

    #[test]
    fn test_development_has_source_map() {
        let project = project();
        let recorder = Arc::new(Recorder::default());
        let env = project.env_with(Mode::Development, "", recorder.clone());

        let path = compile_styles(&env).unwrap();

        assert!(path.ends_with("dist/css/app.css"));
        let css = project.read_string("dist/css/app.css");
        assert!(css.contains(".card .title"));
        assert!(css.contains("color: #ff0000"));
        assert!(sourcemap::has_inline_map(&css));
        assert_eq!(*recorder.0.lock().unwrap(), [ReloadKind::Css]);
    }

    #[test]
    fn test_production_is_minified_without_map() {
        let project = project();
        compile_styles(&project.env(Mode::Production)).unwrap();

        let css = project.read_string("dist/css/app.css");
        assert!(!sourcemap::has_inline_map(&css));
        assert!(!css.contains("comment"));
        assert!(css.contains(".card{"));
        assert!(css.contains(".unused"));
    }

    #[test]
    fn test_production_prunes_when_enabled() {
        let project = project();
        project.file("templates/index.html", r#"<div class="card"><h2 class="title">x</h2></div>"#);

        let extra = "uncss:\n  enabled: true\n  html: [\"templates/**/*.html\"]\n";
        let env = Environment::new(Mode::Production, project.config(extra));
        compile_styles(&env).unwrap();

        let css = project.read_string("dist/css/app.css");
        assert!(css.contains(".card"));
        assert!(!css.contains(".unused"));
    }

    #[test]
    fn test_load_paths() {
        let project = Project::new();
        project
            .file("vendor/scss/_grid.scss", ".row { display: flex; }")
            .file("src/scss/app.scss", "@use 'grid';");

        let env = Environment::new(
            Mode::Development,
            project.config("  sass: [vendor/scss]\n"),
        );
        compile_styles(&env).unwrap();

        assert!(project.read_string("dist/css/app.css").contains(".row"));
    }

    #[test]
    fn test_broken_stylesheet_keeps_previous_output() {
        let project = project();
        let recorder = Arc::new(Recorder::default());
        let env = project.env_with(Mode::Development, "", recorder.clone());

        compile_styles(&env).unwrap();
        let before = project.read("dist/css/app.css");

        project.file("src/scss/app.scss", ".card { color: ");
        let err = compile_styles(&env).unwrap_err();

        assert!(matches!(err, StyleError::Sass(_)));
        assert_eq!(project.read("dist/css/app.css"), before);
        // only the successful run reached the browsers
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[test]
    #[ignore = "needs esbuild"]
    fn test_prefixing_with_esbuild() {
        let project = Project::new();
        project.file("src/scss/app.scss", ".box { user-select: none; }");

        let env = Environment::new(
            Mode::Development,
            project.config("compatibility: [chrome50, safari9]\n"),
        );
        compile_styles(&env).unwrap();

        assert!(project.read_string("dist/css/app.css").contains("-webkit-user-select"));
    }
}
