use std::fs;
use std::time::Instant;

use camino::Utf8PathBuf;
use minijinja::{Value, context};
use pulldown_cmark::{Options, Parser};

use crate::Environment;
use crate::error::StyleGuideError;
use crate::io::as_overhead;

/// One top-level heading of the style guide and everything below it.
#[derive(Debug, Clone, PartialEq)]
struct Section {
    title: String,
    anchor: String,
    markdown: String,
}

/// Renders the Markdown style guide through the HTML template into
/// `dist/styleguide.html`. Does nothing when no style guide is configured.
///
/// The template receives `sections`, a list of `{ title, anchor, body }`
/// where `body` is already rendered HTML.
pub fn generate_style_guide(env: &Environment) -> Result<Option<Utf8PathBuf>, StyleGuideError> {
    let config = &env.config;
    let Some(paths) = &config.paths.styleguide else {
        return Ok(None);
    };

    let s = Instant::now();
    let markdown = fs::read_to_string(config.resolve(&paths.content))?;
    let template = fs::read_to_string(config.resolve(&paths.template))?;

    let sections: Vec<Value> = split_sections(&markdown)
        .into_iter()
        .map(|section| {
            context! {
                title => section.title,
                anchor => section.anchor,
                body => Value::from_safe_string(render_markdown(&section.markdown)),
            }
        })
        .collect();

    let mut jinja = minijinja::Environment::new();
    jinja.add_template("styleguide.html", &template)?;
    let html = jinja
        .get_template("styleguide.html")?
        .render(context! { sections => sections })?;

    let path = config.dist_dir().join("styleguide.html");
    crate::io::write(&path, html)?;

    tracing::info!("Rendered {} {}", path, as_overhead(s));
    Ok(Some(path))
}

fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, Parser::new_ext(markdown, options));
    html
}

/// Splits at every `# ` heading outside of fenced code. Text before the first
/// heading becomes an untitled section.
fn split_sections(markdown: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section {
        title: String::new(),
        anchor: String::new(),
        markdown: String::new(),
    };
    let mut fenced = false;

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            fenced = !fenced;
        }

        if !fenced && let Some(title) = line.strip_prefix("# ") {
            if !current.title.is_empty() || !current.markdown.trim().is_empty() {
                sections.push(current);
            }
            let title = title.trim().to_string();
            current = Section {
                anchor: slugify(&title),
                title,
                markdown: String::new(),
            };
            continue;
        }

        current.markdown.push_str(line);
        current.markdown.push('\n');
    }

    if !current.title.is_empty() || !current.markdown.trim().is_empty() {
        sections.push(current);
    }

    sections
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());

    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }

    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mode;
    use crate::task::testing::Project;

    const GUIDE: &str = "\
Intro text.

# Colors

The **accent** color.

```sh
# not a heading
```

# Buttons & Links

<button class=\"button\">Go</button>
";

    const TEMPLATE: &str = "\
<nav>{% for s in sections %}<a href=\"#{{ s.anchor }}\">{{ s.title }}</a>{% endfor %}</nav>
{% for s in sections %}<section id=\"{{ s.anchor }}\">{{ s.body }}</section>{% endfor %}
";

    #[test]
    fn test_split_sections() {
        let sections = split_sections(GUIDE);
        let titles: Vec<_> = sections.iter().map(|s| s.title.as_str()).collect();

        assert_eq!(titles, ["", "Colors", "Buttons & Links"]);
        assert_eq!(sections[2].anchor, "buttons-links");
        assert!(sections[1].markdown.contains("# not a heading"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Grid 12  "), "grid-12");
    }

    #[test]
    fn test_render() {
        let project = Project::new();
        project
            .file("src/styleguide/index.md", GUIDE)
            .file("src/styleguide/template.html", TEMPLATE);

        let extra = "  styleguide: { content: src/styleguide/index.md, template: src/styleguide/template.html }\n";
        let env = Environment::new(Mode::Development, project.config(extra));

        let path = generate_style_guide(&env).unwrap().unwrap();
        assert!(path.ends_with("dist/styleguide.html"));

        let html = project.read_string("dist/styleguide.html");
        assert!(html.contains("<a href=\"#colors\">Colors</a>"));
        assert!(html.contains("Buttons &amp; Links"));
        assert!(html.contains("<strong>accent</strong>"));
        assert!(html.contains("<button class=\"button\">Go</button>"));
    }

    #[test]
    fn test_not_configured() {
        let project = Project::new();
        assert!(generate_style_guide(&project.env(Mode::Development)).unwrap().is_none());
        assert!(!project.exists("dist"));
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let project = Project::new();
        project.file("src/styleguide/index.md", GUIDE);

        let extra = "  styleguide: { content: src/styleguide/index.md, template: src/styleguide/template.html }\n";
        let env = Environment::new(Mode::Development, project.config(extra));

        assert!(matches!(generate_style_guide(&env), Err(StyleGuideError::Io(_))));
    }
}
