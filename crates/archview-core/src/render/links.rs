//! Post-processing of scanned markup: code spans and bare URLs

use super::compile;
use archview_common::{is_image, Result};
use regex::Regex;

pub(crate) struct CodeRules {
    labeled_block: Regex,
    block: Regex,
    double: Regex,
    single: Regex,
}

impl CodeRules {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            labeled_block: compile(r"```(.*?)[\n ]((?s:.+?))```")?,
            block: compile(r"```((?s:.+?))```")?,
            double: compile(r"``(.+?)``")?,
            single: compile(r"`(.+?)`")?,
        })
    }

    /// Rewrite the first occurrence of each code form, longest fence first
    pub(crate) fn apply(&self, text: &str) -> String {
        let text = self
            .labeled_block
            .replace(text, r#"<div class="code">${2}</div>"#);
        let text = self.block.replace(&text, r#"<div class="code">${1}</div>"#);
        let text = self.double.replace(&text, r#"<span class="code">${1}</span>"#);
        let text = self.single.replace(&text, r#"<span class="code">${1}</span>"#);
        text.into_owned()
    }
}

/// Turn bare `http(s)://` URLs into anchors
///
/// URLs inside an existing anchor are left alone. A URL runs up to the next
/// whitespace, `<` or `"`. Every image URL also gets an inline preview
/// appended to the end of the text.
pub(crate) fn autolink(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut previews = String::new();
    let mut in_anchor = false;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if rest.starts_with("<a ") {
            in_anchor = true;
        } else if rest.starts_with("</a>") {
            in_anchor = false;
        } else if !in_anchor {
            if let Some(len) = url_len(rest) {
                let url = &rest[..len];
                let href = encode_uri(url);
                output.push_str(&format!(r#"<a href="{}">{}</a>"#, href, url));
                if is_image(url) {
                    previews.push_str(&format!(
                        "\n<a href=\"{0}\"><img src=\"{0}\" alt=\"Image\"/></a>",
                        href
                    ));
                }
                rest = &rest[len..];
                continue;
            }
        }

        output.push(c);
        rest = &rest[c.len_utf8()..];
    }

    output.push_str(&previews);
    output
}

/// Length of the URL at the start of `text`, if there is one
fn url_len(text: &str) -> Option<usize> {
    let scheme = ["https://", "http://"]
        .into_iter()
        .find(|scheme| text.starts_with(scheme))?;

    let body = &text[scheme.len()..];
    let end = body
        .find(|c: char| c.is_whitespace() || c == '<' || c == '"')
        .unwrap_or(body.len());
    (end > 0).then_some(scheme.len() + end)
}

/// Percent-encode everything outside the URI reserved and unreserved sets
pub(crate) fn encode_uri(input: &str) -> String {
    const KEEP: &[u8] = b";,/?:@&=+$-_.!~*'()#";

    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || KEEP.contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}
