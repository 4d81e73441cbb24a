//! Rendering of articles into Telegram Markdown messages.

use crate::config::{FormatConfig, TruncateUnit};
use crate::source::Article;

/// Pure article-to-message renderer
#[derive(Debug, Clone)]
pub struct Formatter {
    max_body_length: usize,
    unit: TruncateUnit,
    ellipsis: String,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::from_config(&FormatConfig::default())
    }
}

impl Formatter {
    pub fn from_config(config: &FormatConfig) -> Self {
        Self {
            max_body_length: config.max_body_length,
            unit: config.truncate_by,
            ellipsis: config.ellipsis.clone(),
        }
    }

    /// Render the message:
    ///
    /// ```text
    /// *<title>*
    ///
    /// <body>
    ///
    /// Source: <source_name> | [Read Full Article](<url>)
    /// ```
    pub fn format(&self, article: &Article, source_name: &str) -> String {
        let body = self.truncate(&article.body);
        format!(
            "{}\n\n{}\n\nSource: {} | [Read Full Article]({})",
            bold_markdown(&article.title),
            escape_markdown(&body),
            escape_markdown(source_name),
            escape_link_target(&article.article_ref.url),
        )
    }

    /// Cut the body to `max_body_length` units, appending the ellipsis only
    /// when something was removed
    pub fn truncate(&self, body: &str) -> String {
        let cut = match self.unit {
            TruncateUnit::Chars => char_boundary(body, self.max_body_length),
            TruncateUnit::Words => word_boundary(body, self.max_body_length),
        };
        match cut {
            Some(end) => format!("{}{}", &body[..end], self.ellipsis),
            None => body.to_string(),
        }
    }
}

/// Byte offset just past the `max`-th char, or `None` if the text is not longer
fn char_boundary(text: &str, max: usize) -> Option<usize> {
    text.char_indices().nth(max).map(|(idx, _)| idx)
}

/// Byte offset at the end of the `max`-th word, or `None` if no further word follows
fn word_boundary(text: &str, max: usize) -> Option<usize> {
    let mut words = 0;
    let mut in_word = false;
    let mut end = 0;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_word {
                in_word = false;
                end = idx;
            }
        } else if !in_word {
            if words == max {
                return Some(end);
            }
            in_word = true;
            words += 1;
        }
    }
    None
}

/// Backslash-escape characters that Telegram Markdown treats as entity
/// markers. Only valid outside an entity.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if is_markdown_marker(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Render `text` in bold. Escapes are not allowed inside an entity, so each
/// marker character closes the bold run, is escaped, and a new run opens:
/// `2*2=4` becomes `*2*\**2=4*`.
pub fn bold_markdown(text: &str) -> String {
    let mut rendered = String::with_capacity(text.len() + 2);
    let mut run = String::new();
    for ch in text.chars() {
        if is_markdown_marker(ch) {
            push_bold_run(&mut rendered, &mut run);
            rendered.push('\\');
            rendered.push(ch);
        } else {
            run.push(ch);
        }
    }
    push_bold_run(&mut rendered, &mut run);
    rendered
}

fn push_bold_run(out: &mut String, run: &mut String) {
    if !run.is_empty() {
        out.push('*');
        out.push_str(run);
        out.push('*');
        run.clear();
    }
}

fn is_markdown_marker(ch: char) -> bool {
    matches!(ch, '_' | '*' | '`' | '[')
}

/// Percent-encode characters that would terminate a Markdown link target
pub fn escape_link_target(url: &str) -> String {
    let mut escaped = String::with_capacity(url.len());
    for ch in url.chars() {
        match ch {
            '(' => escaped.push_str("%28"),
            ')' => escaped.push_str("%29"),
            ' ' => escaped.push_str("%20"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
