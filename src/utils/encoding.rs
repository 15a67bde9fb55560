// Encoding utilities

use encoding_rs::{UTF_8, WINDOWS_1252};

/// Decode comment text.
///
/// Comments are specified as UTF-8, but some broadcast software writes the
/// local code page instead. Invalid UTF-8 is decoded as Windows-1252 so those
/// titles stay readable instead of filling up with replacement characters.
pub fn decode_text(data: &[u8]) -> String {
    match UTF_8.decode_without_bom_handling_and_without_replacement(data) {
        Some(text) => text.into_owned(),
        None => WINDOWS_1252.decode_without_bom_handling(data).0.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through() {
        assert_eq!(decode_text("Beyoncé – Halo".as_bytes()), "Beyoncé – Halo");
    }

    #[test]
    fn invalid_utf8_falls_back_to_windows_1252() {
        assert_eq!(decode_text(b"Beyonc\xe9"), "Beyoncé");
        assert_eq!(decode_text(b"\x93quoted\x94"), "\u{201c}quoted\u{201d}");
    }
}
