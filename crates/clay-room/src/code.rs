//! Room-code generation, parsing and identity derivation.
//!
//! The code carries 16 symbols from the base-32 alphabet `A–Z2–7`,
//! formatted `U/XXXX-XXXX-XXXX-XXXX`. The symbols are the base-32 encoding
//! of a seed string (unix timestamp + 4-digit random component), padded
//! with `A` to 16 symbols. Every platform derives the network secret from
//! the same 16 symbols, so two peers that share a code end up in the same
//! mesh network.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::error::RoomError;

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Significant symbols in a code.
pub const CODE_SYMBOLS: usize = 16;

/// Secret length shared with the other platform implementations.
const SECRET_LEN: usize = 32;

/// A validated room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode {
    symbols: String,
}

impl RoomCode {
    /// Generate a fresh code from the current time and a random component.
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let random: u16 = rand::thread_rng().gen_range(1000..=9999);
        Self::from_seed(&format!("{timestamp}{random}"))
    }

    /// Derive a code from arbitrary seed material (deterministic).
    pub fn from_seed(seed: &str) -> Self {
        let mut symbols = base32_encode(seed.as_bytes());
        while symbols.len() < CODE_SYMBOLS {
            symbols.push('A');
        }
        symbols.truncate(CODE_SYMBOLS);
        Self { symbols }
    }

    /// Parse `U/XXXX-XXXX-XXXX-XXXX`.
    pub fn parse(code: &str) -> Result<Self, RoomError> {
        let body = code
            .strip_prefix("U/")
            .ok_or_else(|| RoomError::InvalidCode(format!("missing U/ prefix: {code}")))?;

        let groups: Vec<&str> = body.split('-').collect();
        if groups.len() != 4 || groups.iter().any(|g| g.len() != 4) {
            return Err(RoomError::InvalidCode(format!(
                "expected four groups of four symbols: {code}"
            )));
        }

        let symbols: String = groups.concat();
        if !symbols.bytes().all(|b| ALPHABET.contains(&b)) {
            return Err(RoomError::InvalidCode(format!(
                "symbol outside base-32 alphabet: {code}"
            )));
        }

        Ok(Self { symbols })
    }

    /// The 16 raw symbols, ungrouped.
    pub fn symbols(&self) -> &str {
        &self.symbols
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "U/{}-{}-{}-{}",
            &self.symbols[0..4],
            &self.symbols[4..8],
            &self.symbols[8..12],
            &self.symbols[12..16]
        )
    }
}

/// Derive the shared network secret from a code.
///
/// Interop contract: the 16 symbols, right-padded with `0` to 32 chars,
/// lowercased. Deterministic across platforms and re-derivations.
pub fn network_secret(code: &RoomCode) -> String {
    let mut secret = code.symbols().to_string();
    while secret.len() < SECRET_LEN {
        secret.push('0');
    }
    secret.truncate(SECRET_LEN);
    secret.to_lowercase()
}

/// Derive the network name: the explicit room name, or `Clay-<first 8
/// symbols>` when empty.
pub fn network_name(room_name: &str, code: &RoomCode) -> String {
    if room_name.is_empty() {
        format!("Clay-{}", &code.symbols()[..8])
    } else {
        room_name.to_string()
    }
}

/// Base-32 encode (RFC 4648 alphabet, no padding characters; a final
/// partial group is left-shifted into a single symbol).
fn base32_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len() * 8 / 5 + 1);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for &byte in input {
        buffer = (buffer << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }

    if bits > 0 {
        buffer <<= 5 - bits;
        out.push(ALPHABET[(buffer & 0x1f) as usize] as char);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_matches_format() {
        let code = RoomCode::generate();
        let text = code.to_string();

        assert!(text.starts_with("U/"));
        assert_eq!(text.len(), 2 + 16 + 3);
        assert_eq!(code.symbols().len(), CODE_SYMBOLS);
        assert!(code.symbols().bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_roundtrip_parse() {
        let code = RoomCode::generate();
        let parsed = RoomCode::parse(&code.to_string()).unwrap();
        assert_eq!(parsed, code);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = RoomCode::from_seed("17252712345678");
        let b = RoomCode::from_seed("17252712345678");
        assert_eq!(a, b);
        assert_eq!(network_secret(&a), network_secret(&b));
    }

    #[test]
    fn test_parse_rejects_malformed_codes() {
        for bad in [
            "",
            "U/",
            "ABCD-EFGH-IJKL-MNOP",     // missing prefix
            "U/ABCD-EFGH-IJKL",        // three groups
            "U/ABC-DEFG-HIJK-LMNO",    // short group
            "U/ABCD-EFGH-IJKL-MN0P",   // '0' not in alphabet
            "U/abcd-efgh-ijkl-mnop",   // lowercase not in alphabet
        ] {
            assert!(RoomCode::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_secret_derivation_contract() {
        let code = RoomCode::parse("U/ABCD-EFGH-IJKL-MNOP").unwrap();
        assert_eq!(network_secret(&code), "abcdefghijklmnop0000000000000000");
    }

    #[test]
    fn test_secret_stable_across_rederivations() {
        let code = RoomCode::generate();
        let first = network_secret(&code);
        let reparsed = RoomCode::parse(&code.to_string()).unwrap();
        assert_eq!(network_secret(&reparsed), first);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn test_network_name_fallback() {
        let code = RoomCode::parse("U/ABCD-EFGH-IJKL-MNOP").unwrap();
        assert_eq!(network_name("Alpha", &code), "Alpha");
        assert_eq!(network_name("", &code), "Clay-ABCDEFGH");
    }

    #[test]
    fn test_base32_known_vector() {
        // "f" -> 0x66 -> 01100 110(00) -> "MY" without padding
        assert_eq!(base32_encode(b"f"), "MY");
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
    }
}
