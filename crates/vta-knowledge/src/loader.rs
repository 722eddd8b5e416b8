//! Plain-text extraction for supported document types.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use vta_core::error::Result;

/// Document formats the pipeline can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Html,
    Markdown,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(Self::Text),
            "html" | "htm" => Some(Self::Html),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// Read `path` and return its plain text, or `None` for unsupported types.
pub fn load_document(path: &Path) -> Result<Option<String>> {
    let Some(kind) = DocumentKind::from_path(path) else {
        return Ok(None);
    };
    let raw = std::fs::read_to_string(path)?;
    Ok(Some(extract_text(kind, &raw)))
}

pub fn extract_text(kind: DocumentKind, raw: &str) -> String {
    match kind {
        DocumentKind::Text => raw.to_string(),
        DocumentKind::Html => html_to_text(raw),
        DocumentKind::Markdown => markdown_to_text(raw),
    }
}

/// Text nodes joined by newlines; script and style bodies dropped.
pub fn html_to_text(raw: &str) -> String {
    let document = Html::parse_document(raw);
    let mut pieces: Vec<&str> = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            pieces.push(trimmed);
        }
    }
    pieces.join("\n")
}

struct MarkdownRules {
    fence: Regex,
    image: Regex,
    link: Regex,
    heading: Regex,
    quote: Regex,
    rule: Regex,
    list: Regex,
    strong: Regex,
    strong_alt: Regex,
    emphasis: Regex,
    code: Regex,
    tag: Regex,
}

static MARKDOWN: LazyLock<MarkdownRules> = LazyLock::new(|| MarkdownRules {
    fence: Regex::new(r"(?m)^\s*(```|~~~).*$").expect("markdown regex"),
    image: Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("markdown regex"),
    link: Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("markdown regex"),
    heading: Regex::new(r"(?m)^\s{0,3}#{1,6}\s+").expect("markdown regex"),
    quote: Regex::new(r"(?m)^\s*>\s?").expect("markdown regex"),
    rule: Regex::new(r"(?m)^\s*([-*_]\s*){3,}$").expect("markdown regex"),
    list: Regex::new(r"(?m)^\s*([-*+]|\d+\.)\s+").expect("markdown regex"),
    strong: Regex::new(r"\*\*([^*]+)\*\*").expect("markdown regex"),
    strong_alt: Regex::new(r"__([^_]+)__").expect("markdown regex"),
    emphasis: Regex::new(r"\*([^*\n]+)\*").expect("markdown regex"),
    code: Regex::new(r"`([^`]+)`").expect("markdown regex"),
    tag: Regex::new(r"<[^>]+>").expect("markdown regex"),
});

/// Markdown with markup removed; link and image text kept.
pub fn markdown_to_text(raw: &str) -> String {
    let r = &*MARKDOWN;
    let text = r.fence.replace_all(raw, "");
    let text = r.image.replace_all(&text, "$1");
    let text = r.link.replace_all(&text, "$1");
    let text = r.heading.replace_all(&text, "");
    let text = r.quote.replace_all(&text, "");
    let text = r.rule.replace_all(&text, "");
    let text = r.list.replace_all(&text, "");
    let text = r.strong.replace_all(&text, "$1");
    let text = r.strong_alt.replace_all(&text, "$1");
    let text = r.emphasis.replace_all(&text, "$1");
    let text = r.code.replace_all(&text, "$1");
    let text = r.tag.replace_all(&text, "");
    text.into_owned()
}
