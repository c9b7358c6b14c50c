//! ISO-8859-1 text on the wire: every byte is one char and every char up to
//! U+00FF is one byte.

/// Decode bytes as Latin-1. Never fails.
pub fn decode(b: &[u8]) -> String {
    b.iter().map(|&c| char::from(c)).collect()
}

/// Encode text as Latin-1, replacing anything outside U+0000..=U+00FF with `?`.
pub fn encode(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
