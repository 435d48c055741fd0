//! Message rendering
//!
//! Turns archived message content into HTML: inline markup and mentions,
//! then code spans and bare URLs, then the attachment fragment.

mod attachments;
mod links;
mod markup;

pub use attachments::{attachment_path, render_attachments};

use archview_common::{Error, Result};
use archview_storage::Message;
use links::{autolink, CodeRules};
use markup::MarkupRules;
use regex::Regex;

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Internal(format!("invalid pattern {}: {}", pattern, e)))
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#039;"),
        c => out.push(c),
    }
}

/// Escape text for HTML content
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        push_escaped(&mut out, c);
    }
    out
}

/// Escape text for an HTML attribute; backticks are escaped as well
pub fn escape_html_attr(input: &str) -> String {
    escape_html(input).replace('`', "&#96;")
}

/// Compiled rule set, built once and shared
pub struct MessageRenderer {
    markup: MarkupRules,
    code: CodeRules,
}

impl MessageRenderer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            markup: MarkupRules::new()?,
            code: CodeRules::new()?,
        })
    }

    /// Render message content; mentions resolve against the authors on `page`
    pub fn render_message(&self, content: &str, page: &[Message]) -> String {
        let scanned = self.markup.scan(content, page);
        autolink(&self.code.apply(&scanned))
    }

    /// Rendered content followed by the attachment fragment
    pub fn render_body(&self, message: &Message, page: &[Message]) -> String {
        let mut body = self.render_message(&message.content, page);
        body.push_str(&render_attachments(&message.attachments));
        trim_one_newline(&body).to_string()
    }

    /// Replace the content of every message on a page with its rendered body
    pub fn render_page(&self, messages: &mut [Message]) {
        let page: &[Message] = messages;
        let bodies: Vec<String> = page
            .iter()
            .map(|message| self.render_body(message, page))
            .collect();

        for (message, body) in messages.iter_mut().zip(bodies) {
            message.content = body;
        }
    }
}

/// Drop at most one leading and one trailing newline
fn trim_one_newline(text: &str) -> &str {
    let text = text.strip_prefix('\n').unwrap_or(text);
    text.strip_suffix('\n').unwrap_or(text)
}
