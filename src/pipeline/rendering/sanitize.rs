use std::collections::HashSet;
use std::sync::LazyLock;

use pulldown_cmark::{html, Options, Parser};

use crate::models::enums::HistoryFormat;

/// Structural markup that may reach a rendered document. No attributes
/// are allowed on any of them.
const ALLOWED_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "br", "strong", "em", "b", "i", "ul", "ol", "li",
    "blockquote", "pre", "code", "table", "thead", "tbody", "tr", "th", "td",
];

/// Tags removed together with their content.
const DROPPED_WITH_CONTENT: &[&str] = &["script", "style"];

static SANITIZER: LazyLock<ammonia::Builder<'static>> = LazyLock::new(|| {
    let mut builder = ammonia::Builder::empty();
    builder
        .add_tags(ALLOWED_TAGS)
        .clean_content_tags(DROPPED_WITH_CONTENT.iter().copied().collect::<HashSet<_>>())
        .link_rel(None)
        .strip_comments(true);
    builder
});

/// Clean arbitrary HTML down to the allow-list. Disallowed tags are
/// unwrapped (text kept); `<script>`/`<style>` vanish with their content.
pub fn sanitize_html(html: &str) -> String {
    SANITIZER.clean(html).to_string()
}

pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Markdown in, allow-listed HTML out.
pub fn markdown_to_safe_html(markdown: &str) -> String {
    sanitize_html(&markdown_to_html(markdown))
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Convert stored history content to safe HTML according to its format.
pub fn content_to_safe_html(content: &str, format: HistoryFormat) -> String {
    let raw = match format {
        HistoryFormat::Markdown => markdown_to_html(content),
        HistoryFormat::Html => content.to_string(),
        HistoryFormat::PlainText => content
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")))
            .collect::<Vec<_>>()
            .join("\n"),
        HistoryFormat::Json => {
            let pretty = serde_json::from_str::<serde_json::Value>(content)
                .and_then(|v| serde_json::to_string_pretty(&v))
                .unwrap_or_else(|_| content.to_string());
            format!("<pre><code>{}</code></pre>", escape_html(&pretty))
        }
    };
    sanitize_html(&raw)
}
