//! Attachment fragments appended to rendered messages

use archview_common::sanitize;
use archview_storage::Attachment;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Route under which an attachment is served
pub fn attachment_path(attachment: &Attachment) -> String {
    format!(
        "/attachments/{}/{}",
        attachment.attachment_id,
        sanitize(&attachment.filename)
    )
}

/// HTML for a message's attachments, `""` when there are none
pub fn render_attachments(attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return String::new();
    }

    let fragments: Vec<String> = attachments.iter().map(render_attachment).collect();
    format!("\n{}", fragments.join("\n"))
}

fn render_attachment(attachment: &Attachment) -> String {
    let path = attachment_path(attachment);

    if !attachment.url.to_lowercase().ends_with(".png") {
        return format!(
            r#"<a href="{}">Download [{}]</a>"#,
            path,
            sanitize(&attachment.filename)
        );
    }

    match &attachment.data {
        Some(data) => format!(
            r#"<a href="{}"><img src="data:image/png;base64,{}" alt="Image" /></a>"#,
            path,
            STANDARD.encode(data)
        ),
        None => format!(r#"<a href="{0}"><img src="{0}" alt="Image" /></a>"#, path),
    }
}
