//! Content renderer contract
//!
//! Markdown-to-HTML rendering lives outside this crate; the mapper only
//! needs "raw source in, display markup out". The default implementation
//! escapes and paragraph-wraps, which keeps development output safe
//! without pulling in a markdown engine.

/// Turns a raw document body into display markup
pub trait ContentRenderer: Send + Sync {
    fn render(&self, raw: &str) -> String;
}

/// Escaping fallback renderer for development and tests
#[derive(Debug, Default)]
pub struct EscapingRenderer;

impl ContentRenderer for EscapingRenderer {
    fn render(&self, raw: &str) -> String {
        let escaped = html_escape::encode_text(raw);
        format!("<p>{}</p>", escaped)
    }
}
