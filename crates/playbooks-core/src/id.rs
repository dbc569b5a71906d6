use crate::error::{PlaybooksError, Result};
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// Length of every platform identifier.
pub const ID_LEN: usize = 26;

const ENCODING: &[u8; 32] = b"ybndrfg8ejkmcpqxot1uwisza345h769";

/// Generate a new 26-character identifier from a random UUID, base32 encoded
/// with the platform alphabet and no padding.
pub fn new_id() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    let mut out = String::with_capacity(ID_LEN);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ENCODING[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ENCODING[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]{26}$").unwrap())
}

pub fn is_valid_id(id: &str) -> bool {
    id_re().is_match(id)
}

/// Validate an optional identifier filter: blank passes, anything else must
/// be a well-formed id.
pub fn validate_optional_id(field: &'static str, value: &str) -> Result<()> {
    if !value.is_empty() && !is_valid_id(value) {
        return Err(PlaybooksError::InvalidId {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_valid_and_distinct() {
        let a = new_id();
        let b = new_id();
        assert_eq!(a.len(), ID_LEN);
        assert!(is_valid_id(&a), "{a}");
        assert_ne!(a, b);
    }

    #[test]
    fn invalid_ids() {
        for id in ["", "short", "abcdefghijklmnopqrstuvwxy!", "abcdefghijklmnopqrstuvwxyz0"] {
            assert!(!is_valid_id(id), "expected invalid: {id}");
        }
    }

    #[test]
    fn optional_id_allows_blank() {
        validate_optional_id("team_id", "").unwrap();
        validate_optional_id("team_id", "abcdefghijklmnopqrstuvwxyz").unwrap();
        assert!(validate_optional_id("team_id", "nope").is_err());
    }
}
