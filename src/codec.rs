//! At-rest format for message content.
//!
//! Content is stored as base64 of a labelled plaintext. This is a storage
//! encoding only: anyone with database access can read it back, and it must
//! not be treated as encryption.

use base64::{Engine, engine::general_purpose::STANDARD};

const LABEL: &str = "encrypted:";

pub fn encode(plain: &str) -> String {
    STANDARD.encode(format!("{LABEL}{plain}"))
}

/// Inverse of [`encode`]. Stored values that were never encoded (not base64,
/// not UTF-8 or missing the label) come back unchanged.
pub fn decode(stored: &str) -> String {
    let Ok(bytes) = STANDARD.decode(stored) else {
        return stored.to_owned();
    };
    let Ok(text) = String::from_utf8(bytes) else {
        return stored.to_owned();
    };

    match text.strip_prefix(LABEL) {
        Some(plain) => plain.to_owned(),
        None => stored.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_inverts_encode() {
        for plain in ["", "hello", "مرحبا بكم", "line\nbreak", "encrypted:nested"] {
            assert_eq!(decode(&encode(plain)), plain);
        }
    }

    #[test]
    fn stored_form_is_not_plaintext() {
        let stored = encode("meet at noon");
        assert!(!stored.contains("meet"));
    }

    #[test]
    fn legacy_plaintext_passes_through() {
        assert_eq!(decode("not base64!"), "not base64!");
        // valid base64 of text without the label
        assert_eq!(decode("aGVsbG8="), "aGVsbG8=");
    }
}
