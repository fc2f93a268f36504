//! Removal of style rules that no scanned page can match.
//!
//! The pruner works on plain CSS text. It only understands enough of the
//! syntax to find rule boundaries: comments, strings, braces and selector
//! lists. Rules inside conditional group at-rules (`@media`, `@supports`,
//! `@layer`, `@container`) are pruned recursively, every other at-rule is kept
//! as it is.

use std::collections::HashSet;

/// Everything a set of HTML pages can match against.
#[derive(Debug, Default, Clone)]
pub struct UsedSelectors {
    pub tags: HashSet<String>,
    pub classes: HashSet<String>,
    pub ids: HashSet<String>,
}

impl UsedSelectors {
    /// Collects tag names and `class` / `id` attribute values from markup.
    pub fn scan(&mut self, html: &str) {
        let bytes = html.as_bytes();
        let mut i = 0;

        while let Some(offset) = html[i..].find('<') {
            i += offset + 1;

            let name: String = html[i..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect();

            if name.is_empty() || !name.as_bytes()[0].is_ascii_alphabetic() {
                continue;
            }
            self.tags.insert(name.to_ascii_lowercase());

            // Attributes run until the closing bracket.
            let end = html[i..].find('>').map_or(bytes.len(), |e| i + e);
            let tag = &html[i..end];

            for value in attribute_values(tag, "class") {
                self.classes
                    .extend(value.split_whitespace().map(str::to_string));
            }
            for value in attribute_values(tag, "id") {
                self.ids.insert(value.trim().to_string());
            }

            i = end.min(bytes.len());
        }
    }

    fn matches(&self, selector: &str) -> bool {
        let parts = SelectorParts::parse(selector);

        parts.classes.iter().all(|c| self.classes.contains(c))
            && parts.ids.iter().all(|id| self.ids.contains(id))
            && parts
                .tags
                .iter()
                .all(|t| matches!(t.as_str(), "html" | "body" | ":root") || self.tags.contains(t))
    }
}

/// Values of every `name="..."` or `name='...'` attribute inside a tag.
fn attribute_values<'a>(tag: &'a str, name: &str) -> Vec<&'a str> {
    let lower = tag.to_ascii_lowercase();
    let needle = format!("{name}=");
    let mut values = Vec::new();
    let mut from = 0;

    while let Some(pos) = lower[from..].find(&needle) {
        let start = from + pos;
        from = start + needle.len();

        // `data-class=` must not count as `class=`.
        let boundary = start == 0 || tag.as_bytes()[start - 1].is_ascii_whitespace();
        if !boundary {
            continue;
        }

        let rest = &tag[from..];
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            let value = rest.split(|c: char| c.is_whitespace() || c == '/').next();
            values.extend(value.filter(|v| !v.is_empty()));
            continue;
        };

        if let Some(close) = rest[1..].find(quote) {
            values.push(&rest[1..1 + close]);
            from += close + 2;
        }
    }

    values
}

/// The simple selectors a complex selector requires.
#[derive(Debug, Default, PartialEq)]
struct SelectorParts {
    tags: Vec<String>,
    classes: Vec<String>,
    ids: Vec<String>,
}

impl SelectorParts {
    fn parse(selector: &str) -> Self {
        let mut parts = SelectorParts::default();
        let chars: Vec<char> = selector.chars().collect();
        let mut i = 0;
        let mut compound_start = true;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '.' | '#' => {
                    let (ident, next) = read_ident(&chars, i + 1);
                    if !ident.is_empty() {
                        if c == '.' {
                            parts.classes.push(ident);
                        } else {
                            parts.ids.push(ident);
                        }
                    }
                    i = next;
                    compound_start = false;
                }
                '[' => {
                    i = skip_group(&chars, i, '[', ']');
                    compound_start = false;
                }
                '(' => {
                    i = skip_group(&chars, i, '(', ')');
                }
                ':' => {
                    // pseudo-classes and pseudo-elements never need markup
                    let mut j = i + 1;
                    if chars.get(j) == Some(&':') {
                        j += 1;
                    }
                    let (_, next) = read_ident(&chars, j);
                    i = next;
                    compound_start = false;
                }
                ' ' | '\t' | '\n' | '>' | '+' | '~' => {
                    i += 1;
                    compound_start = true;
                }
                '*' | '&' => {
                    i += 1;
                    compound_start = false;
                }
                _ if compound_start && (c.is_alphabetic() || c == '_' || c == '-') => {
                    let (ident, next) = read_ident(&chars, i);
                    parts.tags.push(ident.to_ascii_lowercase());
                    i = next;
                    compound_start = false;
                }
                _ => {
                    i += 1;
                }
            }
        }

        parts
    }
}

fn read_ident(chars: &[char], mut i: usize) -> (String, usize) {
    let mut ident = String::new();

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            ident.push(chars[i + 1]);
            i += 2;
        } else if c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            ident.push(c);
            i += 1;
        } else {
            break;
        }
    }

    (ident, i)
}

fn skip_group(chars: &[char], mut i: usize, open: char, close: char) -> usize {
    let mut depth = 0;

    while i < chars.len() {
        if chars[i] == open {
            depth += 1;
        } else if chars[i] == close {
            depth -= 1;
            if depth == 0 {
                return i + 1;
            }
        }
        i += 1;
    }

    i
}

/// Drops every rule of `css` whose selectors all miss `used`. Selectors
/// listed in `ignore` are always kept.
pub fn prune_css(css: &str, used: &UsedSelectors, ignore: &[String]) -> String {
    let mut out = String::with_capacity(css.len());
    prune_block(css, used, ignore, &mut out);
    out
}

fn prune_block(css: &str, used: &UsedSelectors, ignore: &[String], out: &mut String) {
    let mut i = 0;

    loop {
        i = skip_trivia(css, i);
        if i >= css.len() {
            break;
        }

        let Some(open) = find_outside_strings(css, i, &['{', ';']) else {
            // trailing garbage, keep it untouched
            out.push_str(&css[i..]);
            break;
        };

        let prelude = css[i..open].trim();

        if css.as_bytes()[open] == b';' {
            out.push_str(prelude);
            out.push_str(";\n");
            i = open + 1;
            continue;
        }

        let close = matching_brace(css, open);
        let body = &css[open + 1..close.min(css.len())];
        i = (close + 1).min(css.len());

        if let Some(at) = prelude.strip_prefix('@') {
            let name: String = at
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '-')
                .collect();

            if matches!(name.as_str(), "media" | "supports" | "layer" | "container") {
                let mut inner = String::new();
                prune_block(body, used, ignore, &mut inner);
                if !inner.trim().is_empty() {
                    out.push_str(prelude);
                    out.push_str(" {\n");
                    out.push_str(&inner);
                    out.push_str("}\n");
                }
            } else {
                out.push_str(prelude);
                out.push('{');
                out.push_str(body);
                out.push_str("}\n");
            }
            continue;
        }

        let kept: Vec<&str> = split_selectors(prelude)
            .into_iter()
            .filter(|s| ignore.iter().any(|i| i.trim() == *s) || used.matches(s))
            .collect();

        if !kept.is_empty() {
            out.push_str(&kept.join(", "));
            out.push_str(" {");
            out.push_str(body);
            out.push_str("}\n");
        }
    }
}

/// Skips whitespace and comments.
fn skip_trivia(css: &str, mut i: usize) -> usize {
    loop {
        let rest = &css[i..];
        let trimmed = rest.trim_start();
        i += rest.len() - trimmed.len();

        if trimmed.starts_with("/*") {
            match trimmed[2..].find("*/") {
                Some(end) => i += end + 4,
                None => return css.len(),
            }
        } else {
            return i;
        }
    }
}

/// Byte index of the first of `targets` found outside of strings and
/// parentheses.
fn find_outside_strings(css: &str, from: usize, targets: &[char]) -> Option<usize> {
    let mut quote = None;
    let mut parens = 0usize;
    let mut escaped = false;

    for (offset, c) in css[from..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => parens += 1,
            (None, ')') => parens = parens.saturating_sub(1),
            (None, c) if parens == 0 && targets.contains(&c) => return Some(from + offset),
            _ => {}
        }
    }

    None
}

/// Byte index of the brace closing the one at `open`, or the end of input.
fn matching_brace(css: &str, open: usize) -> usize {
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;
    let mut comment = false;
    let bytes = css.as_bytes();

    let mut i = open;
    while i < bytes.len() {
        let c = bytes[i];
        if comment {
            if c == b'*' && bytes.get(i + 1) == Some(&b'/') {
                comment = false;
                i += 1;
            }
        } else if escaped {
            escaped = false;
        } else if let Some(q) = quote {
            if c == b'\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
        } else {
            match c {
                b'\\' => escaped = true,
                b'"' | b'\'' => quote = Some(c),
                b'/' if bytes.get(i + 1) == Some(&b'*') => comment = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return i;
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }

    bytes.len()
}

/// Splits a selector list on commas that are not nested in parentheses or
/// attribute brackets.
fn split_selectors(prelude: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in prelude.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(prelude[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    parts.push(prelude[start..].trim());
    parts.retain(|s| !s.is_empty());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn used(html: &str) -> UsedSelectors {
        let mut used = UsedSelectors::default();
        used.scan(html);
        used
    }

    #[test]
    fn test_scan() {
        let used = used(r#"<div class="card  card--big" id=main data-class="nope"><a href='#'>x</a></div>"#);

        assert!(used.tags.contains("div"));
        assert!(used.tags.contains("a"));
        assert!(used.classes.contains("card"));
        assert!(used.classes.contains("card--big"));
        assert!(!used.classes.contains("nope"));
        assert!(used.ids.contains("main"));
    }

    #[test]
    fn test_selector_parts() {
        let parts = SelectorParts::parse("nav > ul li.item:hover a[href^='http'], ::before");

        assert_eq!(parts.tags, ["nav", "ul", "li", "a"]);
        assert_eq!(parts.classes, ["item"]);
        assert!(parts.ids.is_empty());
    }

    #[test]
    fn test_escaped_class() {
        let parts = SelectorParts::parse(".md\\:flex");
        assert_eq!(parts.classes, ["md:flex"]);
    }

    #[test]
    fn test_prune_rules() {
        let css = "\
/* header */
.card { color: red; }
.unused { color: blue; }
.card, .ghost { margin: 0; }
#main .title { padding: 0; }
table td { border: 0; }
";
        let out = prune_css(
            css,
            &used(r#"<div id="main" class="card"><h1 class="title"></h1></div>"#),
            &[],
        );

        assert!(out.contains(".card {"));
        assert!(!out.contains(".unused"));
        assert!(out.contains(".card { margin: 0; }"));
        assert!(!out.contains(".ghost"));
        assert!(out.contains("#main .title"));
        assert!(!out.contains("table td"));
    }

    #[test]
    fn test_prune_media_and_keep_other_at_rules() {
        let css = "\
@charset \"utf-8\";
@font-face { font-family: X; src: url('x.woff'); }
@media (min-width: 40em) { .gone { a: b; } }
@media print { .card { a: b; } .gone { c: d; } }
@keyframes spin { from { opacity: 0; } to { opacity: 1; } }
";
        let out = prune_css(css, &used(r#"<p class="card"></p>"#), &[]);

        assert!(out.contains("@charset \"utf-8\";"));
        assert!(out.contains("@font-face"));
        assert!(!out.contains("min-width"));
        assert!(out.contains("@media print"));
        assert!(out.contains(".card"));
        assert!(!out.contains(".gone"));
        assert!(out.contains("@keyframes spin"));
    }

    #[test]
    fn test_ignore_list() {
        let css = ".is-active { a: b; }\n";
        let out = prune_css(css, &UsedSelectors::default(), &[".is-active".into()]);
        assert!(out.contains(".is-active"));
    }

    #[test]
    fn test_root_and_body_always_match() {
        let css = ":root { --x: 1; }\nbody { margin: 0; }\nhtml, body { height: 100%; }\n";
        let out = prune_css(css, &UsedSelectors::default(), &[]);

        assert!(out.contains(":root"));
        assert!(out.contains("body { margin: 0; }"));
        assert!(out.contains("html, body"));
    }

    #[test]
    fn test_braces_in_strings() {
        let css = ".card::after { content: \"}\"; }\n.gone { a: b; }\n";
        let out = prune_css(css, &used(r#"<i class="card"></i>"#), &[]);

        assert!(out.contains("content: \"}\""));
        assert!(!out.contains(".gone"));
    }
}
