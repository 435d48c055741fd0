//! Identifier sanitizing
//!
//! Every filesystem key built from external input goes through [`sanitize`].

/// Whether `c` may appear in a storage key
fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Strip every character outside `[A-Za-z0-9_.-]`.
pub fn sanitize(raw: &str) -> String {
    raw.chars().filter(|&c| is_key_char(c)).collect()
}
