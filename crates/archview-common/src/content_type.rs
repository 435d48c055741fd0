//! Content type lookup by file extension

const OCTET_STREAM: &str = "application/octet-stream";

/// Extension table, checked in order. First match wins.
const CONTENT_TYPES: &[(&str, &str)] = &[
    (".png", "image/png"),
    (".jpeg", "image/jpeg"),
    (".jpg", "image/jpg"),
    (".gif", "image/gif"),
    (".mpeg", "audio/mpeg"),
    (".mp3", "audio/mpeg"),
    (".mp4", "video/mp4"),
    (".midi", "audio/midi"),
    (".mid", "audio/midi"),
    (".pdf", "application/pdf"),
    (".txt", "text/plain; charset=utf-8"),
    (".wav", "audio/wav"),
    (".weba", "audio/webm"),
    (".webm", "video/webm"),
    (".webp", "image/webp"),
    (".csv", "text/csv"),
    (".css", "text/css"),
];

/// Map a filename or URL to a MIME type by its extension.
pub fn content_type_for(name: &str) -> &'static str {
    let name = name.to_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(ext, _)| name.ends_with(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(OCTET_STREAM)
}

/// Whether the name classifies as an image
pub fn is_image(name: &str) -> bool {
    content_type_for(name).starts_with("image/")
}
