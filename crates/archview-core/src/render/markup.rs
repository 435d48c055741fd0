//! Inline markup scanner
//!
//! Content is escaped one character at a time into a pending buffer. Every
//! character that is not an ASCII digit (and the final character) is a flush
//! point where the buffer is tested against the rules below, in order. The
//! first rule that matches rewrites the buffer and moves it to the output; if
//! none matches, the buffer keeps growing.

use super::{compile, escape_html, escape_html_attr, push_escaped};
use archview_common::Result;
use archview_storage::Message;
use regex::{NoExpand, Regex};

pub(crate) struct MarkupRules {
    link: Regex,
    bold: Regex,
    italic: Regex,
    underline: Regex,
    strike: Regex,
    mention: Regex,
}

impl MarkupRules {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            link: compile(r"\[(.*?)\]\((.*?)\)")?,
            bold: compile(r"\*\*(.*?)\*\*")?,
            italic: compile(r"(\*(.*?)\*)|(_(.*?)_)")?,
            underline: compile(r"__(.*?)__")?,
            strike: compile(r"~~((?s:.*?))~~")?,
            mention: compile(r"&lt;@!?([0-9]+)&gt;")?,
        })
    }

    /// Scan `content`, resolving mentions against the authors on `page`
    pub(crate) fn scan(&self, content: &str, page: &[Message]) -> String {
        let mut output = String::with_capacity(content.len());
        let mut pending = String::new();
        let mut chars = content.chars().peekable();

        while let Some(c) = chars.next() {
            push_escaped(&mut pending, c);

            let last = chars.peek().is_none();
            if c.is_ascii_digit() && !last {
                continue;
            }

            if let Some(rewritten) = self.rewrite(&pending, page) {
                output.push_str(&rewritten);
                pending.clear();
            }
        }

        output.push_str(&pending);
        output
    }

    fn rewrite(&self, pending: &str, page: &[Message]) -> Option<String> {
        if self.link.is_match(pending) {
            return Some(
                self.link
                    .replace_all(pending, r#"<a href="${2}">${1}</a>"#)
                    .into_owned(),
            );
        }

        if self.bold.is_match(pending) {
            return Some(self.bold.replace_all(pending, "<b>${1}</b>").into_owned());
        }

        // Every italic span takes the text of the first one
        if let Some(caps) = self.italic.captures(pending) {
            let text = caps.get(2).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
            let replacement = format!("<i>{}</i>", text);
            return Some(
                self.italic
                    .replace_all(pending, NoExpand(&replacement))
                    .into_owned(),
            );
        }

        if self.underline.is_match(pending) {
            return Some(self.underline.replace_all(pending, "<u>${1}</u>").into_owned());
        }

        if self.strike.is_match(pending) {
            return Some(self.strike.replace_all(pending, "<s>${1}</s>").into_owned());
        }

        let caps = self.mention.captures(pending)?;
        let token = caps.get(0)?;
        let span = mention_span(&caps[1], token.as_str(), page);
        Some(format!(
            "{}{}{}",
            &pending[..token.start()],
            span,
            &pending[token.end()..]
        ))
    }
}

fn mention_span(user_id: &str, token: &str, page: &[Message]) -> String {
    match page.iter().find(|m| m.author_id == user_id) {
        Some(author) => format!(
            r#"<span class="mention" title="{}#{} (ID: {})">@{}</span>"#,
            escape_html_attr(&author.author_name),
            author.author_discriminator,
            user_id,
            escape_html(&author.author_name)
        ),
        None => format!(
            r#"<span class="mention" title="(ID: {})">{}</span>"#,
            user_id, token
        ),
    }
}
