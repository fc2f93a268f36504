//! Inline source maps (revision 3) embedded as base64 data URLs.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

const PREFIX: &str = "sourceMappingURL=data:application/json;charset=utf-8;base64,";
const PREFIX_PLAIN: &str = "sourceMappingURL=data:application/json;base64,";

#[derive(Debug, Clone, Copy)]
pub(crate) enum Comment {
    Css,
    Js,
}

/// A map pointing the whole output at the start of a single source, with the
/// source text embedded so dev tools can show it. The single `AAAA` segment
/// maps the first output column only, so positions past it are not exact.
pub(crate) fn whole_file(file: &str, source: &str, content: &str) -> Value {
    json!({
        "version": 3,
        "file": file,
        "sources": [source],
        "sourcesContent": [content],
        "names": [],
        "mappings": "AAAA",
    })
}

/// An index map stitching per-section maps together, each section starting
/// at the given zero-based output line.
pub(crate) fn index_map(file: &str, sections: Vec<(usize, Value)>) -> Value {
    let sections: Vec<_> = sections
        .into_iter()
        .map(|(line, map)| json!({ "offset": { "line": line, "column": 0 }, "map": map }))
        .collect();

    json!({
        "version": 3,
        "file": file,
        "sections": sections,
    })
}

/// The trailing comment that embeds `map`.
pub(crate) fn comment(map: &Value, style: Comment) -> String {
    let encoded = STANDARD.encode(map.to_string());
    match style {
        Comment::Css => format!("/*# {PREFIX}{encoded} */\n"),
        Comment::Js => format!("//# {PREFIX}{encoded}\n"),
    }
}

/// Splits a trailing inline map comment off `code`. Returns the code without
/// the comment and the decoded map, if there was a readable one.
pub(crate) fn split(code: &str) -> (&str, Option<Value>) {
    let trimmed = code.trim_end();
    let Some(start) = trimmed.rfind("//# sourceMappingURL=") else {
        return (code, None);
    };

    let tail = &trimmed[start + 4..];
    let encoded = tail
        .strip_prefix(PREFIX)
        .or_else(|| tail.strip_prefix(PREFIX_PLAIN));

    let map = encoded
        .and_then(|data| STANDARD.decode(data.trim()).ok())
        .and_then(|bytes| serde_json::from_slice(&bytes).ok());

    (&code[..start], map)
}

pub(crate) fn has_inline_map(code: &str) -> bool {
    code.contains("sourceMappingURL=")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_comment() {
        let map = whole_file("app.css", "src/scss/app.scss", "a { b: c }");
        let comment = comment(&map, Comment::Css);

        assert!(comment.starts_with("/*# sourceMappingURL=data:application/json"));
        assert!(comment.ends_with(" */\n"));
    }

    #[test]
    fn test_split_reads_back_map() {
        let map = whole_file("app.js", "a.js", "let a = 1;");
        let code = format!("let a = 1;\n{}", comment(&map, Comment::Js));

        let (stripped, parsed) = split(&code);

        assert_eq!(stripped, "let a = 1;\n");
        assert_eq!(parsed.unwrap()["sources"][0], "a.js");
        assert!(!has_inline_map(stripped));
    }

    #[test]
    fn test_whole_file_is_coarse() {
        let map = whole_file("app.css", "src/scss/app.scss", "a { b: c }");

        assert_eq!(map["sourcesContent"][0], "a { b: c }");
        assert_eq!(map["mappings"], "AAAA");
        assert!(map.get("sections").is_none());
    }

    #[test]
    fn test_split_without_map() {
        let (code, map) = split("let a = 1;\n");
        assert_eq!(code, "let a = 1;\n");
        assert!(map.is_none());
    }

    #[test]
    fn test_index_map_offsets() {
        let map = index_map(
            "app.js",
            vec![(0, json!({"version": 3})), (12, json!({"version": 3}))],
        );

        assert_eq!(map["sections"][1]["offset"]["line"], 12);
    }
}
