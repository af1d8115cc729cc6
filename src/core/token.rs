//! Session Token Derivation
//!
//! Tokens identify a session for the whole of its life and are the keys of
//! the session registry. A token is 12 lowercase hex characters:
//! - the first 6 encode the 24-bit game seed,
//! - the last 6 are a truncated SHA-256 of the creation time and the two
//!   participant names.
//!
//! Truncating to 24 bits keeps tokens short enough to type into a client by
//! hand; the registry detects the (astronomically rare) collision and the
//! caller regenerates.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use sha2::{Digest, Sha256};

/// Largest valid game seed (24 bits).
pub const MAX_SEED: u32 = 0x00FF_FFFF;

/// A session token: 12 lowercase hex characters.
pub type SessionToken = String;

/// Draw a random 24-bit seed.
pub fn random_seed() -> u32 {
    rand::thread_rng().gen_range(0..=MAX_SEED)
}

/// Derive a session token from a seed and the two participant names.
///
/// Not pure: mixes in the current wall-clock time so repeated calls with the
/// same inputs yield fresh tokens, which is what the collision-regeneration
/// loop in session creation relies on.
pub fn derive_token(seed: u32, name0: &str, name1: &str) -> SessionToken {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(b"DUELHALL_TOKEN_V1");
    hasher.update(now.as_nanos().to_le_bytes());
    hasher.update(name0.as_bytes());
    hasher.update(b"/");
    hasher.update(name1.as_bytes());
    let digest = hasher.finalize();

    let seed_part = seed.to_be_bytes();
    // 24 bits of seed, 24 bits of hash
    format!("{}{}", hex::encode(&seed_part[1..4]), hex::encode(&digest[..3]))
}
