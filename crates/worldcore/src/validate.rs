//! Account name/password rules and the (weak) password digest.

pub const MIN_PLAYERNAME_LENGTH: usize = 3;
pub const MAX_PLAYERNAME_LENGTH: usize = 15;
pub const MIN_PASSWORD_LENGTH: usize = 8;

const HAS_UPPER: u8 = 1;
const HAS_LOWER: u8 = 2;
const HAS_DIGIT: u8 = 4;
const HAS_ALL: u8 = HAS_UPPER | HAS_LOWER | HAS_DIGIT;

/// 3..=15 chars, each a letter, an ASCII digit or underscore.
///
/// Also the gate for anything that becomes a file name under `players/`.
pub fn is_valid_playername(name: &str) -> bool {
    let len = name.chars().count();
    (MIN_PLAYERNAME_LENGTH..=MAX_PLAYERNAME_LENGTH).contains(&len)
        && name
            .chars()
            .all(|c| c.is_alphabetic() || c.is_ascii_digit() || c == '_')
}

/// At least 8 chars with one uppercase letter, one lowercase letter and one digit.
pub fn is_valid_password(pw: &str) -> bool {
    if pw.chars().count() < MIN_PASSWORD_LENGTH {
        return false;
    }
    let flags = pw.chars().fold(0u8, |flags, c| {
        let mut f = flags;
        if c.is_uppercase() {
            f |= HAS_UPPER;
        }
        if c.is_lowercase() {
            f |= HAS_LOWER;
        }
        if c.is_ascii_digit() {
            f |= HAS_DIGIT;
        }
        f
    });
    flags == HAS_ALL
}

/// 32-bit multiplicative string hash (x31 over UTF-16 units), lowercase hex.
///
/// Not a password hash in any security sense; it only keeps the plain text out
/// of the player file.
pub fn password_digest(pw: &str) -> String {
    let h = pw
        .encode_utf16()
        .fold(0i32, |h, u| h.wrapping_mul(31).wrapping_add(i32::from(u)));
    format!("{:x}", h as u32)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PasswordPolicy {
    /// Returning players get in with any password.
    #[default]
    AcceptAny,
    /// Compare the digest of the attempt with the stored digest.
    Verify,
}

/// The only place a returning player's password is judged.
pub fn verify_password(policy: PasswordPolicy, stored_hash: &str, attempt: &str) -> bool {
    match policy {
        PasswordPolicy::AcceptAny => true,
        PasswordPolicy::Verify => password_digest(attempt).eq_ignore_ascii_case(stored_hash.trim()),
    }
}
