//! Rich-text span rendering.

use crate::links::LinkResolver;
use crate::model::{RichSpan, Style};

/// Render a run of spans as inline Markdown.
pub fn render_spans(spans: &[RichSpan], links: &LinkResolver) -> String {
    spans.iter().map(|span| render_span(span, links)).collect()
}

fn render_span(span: &RichSpan, links: &LinkResolver) -> String {
    if span.equation {
        let expression = span.text.trim();
        return if expression.is_empty() {
            String::new()
        } else {
            format!("${expression}$")
        };
    }

    // Emphasis markers hugging whitespace don't parse, so keep it outside.
    let (lead, core, trail) = split_whitespace(&span.text);
    if core.is_empty() {
        return span.text.clone();
    }

    let mut text = if span.style.code {
        code_span(core)
    } else {
        emphasize(core, &span.style)
    };
    if let Some(href) = span.href.as_deref().filter(|h| !h.is_empty()) {
        text = format!("[{text}]({})", links.resolve(href));
    }
    if let Some(color) = span.style.color.as_deref() {
        text = colorize(&text, color);
    }
    format!("{lead}{text}{trail}")
}

fn split_whitespace(text: &str) -> (&str, &str, &str) {
    let trimmed_start = text.trim_start();
    let lead = &text[..text.len() - trimmed_start.len()];
    let core = trimmed_start.trim_end();
    let trail = &trimmed_start[core.len()..];
    (lead, core, trail)
}

fn emphasize(text: &str, style: &Style) -> String {
    let mut out = text.to_string();
    if style.bold {
        out = format!("**{out}**");
    }
    if style.italic {
        out = format!("*{out}*");
    }
    if style.strikethrough {
        out = format!("~~{out}~~");
    }
    if style.underline {
        out = format!("<u>{out}</u>");
    }
    out
}

/// Backtick code span, widened when the text itself contains backticks.
fn code_span(text: &str) -> String {
    if !text.contains('`') {
        return format!("`{text}`");
    }
    let longest = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest + 1);
    format!("{fence} {text} {fence}")
}

/// Source colors are names like `red` or `red_background`; `default` is none.
fn colorize(text: &str, color: &str) -> String {
    if color.is_empty() || color == "default" {
        return text.to_string();
    }
    match color.strip_suffix("_background") {
        Some(base) => format!("<span style=\"background-color: {base}\">{text}</span>"),
        None => format!("<span style=\"color: {color}\">{text}</span>"),
    }
}
