//! Correlation token mint
//!
//! Every injection carries a unique 16-character lowercase-hex token that
//! reappears in any callback the payload triggers. The format survives
//! truncation in most sinks, fits in a single DNS label, and needs no URL
//! or percent encoding.

use rand::RngCore;

/// Token length in characters (8 random bytes, hex-encoded).
pub const TOKEN_LEN: usize = 16;

/// Mints a new correlation token: 16 lowercase hex characters from the
/// OS CSPRNG. 64 bits of entropy keeps the collision probability for a
/// campaign of a million injections around 2^-32.
pub fn mint() -> String {
    let mut bytes = [0u8; TOKEN_LEN / 2];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Returns true if `candidate` is a well-formed correlation token:
/// exactly 16 characters, all in `[0-9a-f]`. Uppercase hex is rejected,
/// so listeners never match case-mangled strays.
pub fn is_valid(candidate: &str) -> bool {
    candidate.len() == TOKEN_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
