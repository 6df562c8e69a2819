//! API key generation and keyed fingerprints.
//!
//! An API key is an opaque random string handed to the caller once. The
//! paired token never contains the key itself, only an HMAC-SHA256
//! fingerprint of it under the agent's signing secret.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore};
use sha2::Sha256;

/// Length of a generated API key (alphanumeric characters, ~285 bits).
pub const KEY_LENGTH: usize = 48;

/// Default byte length for [`generate_random_key`].
pub const DEFAULT_RANDOM_KEY_BYTES: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Generate a new random API key.
pub fn generate_api_key() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(KEY_LENGTH)
        .map(char::from)
        .collect()
}

/// `len` random bytes as URL-safe base64, for use as key material.
pub fn generate_random_key(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}

/// Hex HMAC-SHA256 of `api_key` under `secret`.
pub fn fingerprint(secret: &str, api_key: &str) -> String {
    hex::encode(keyed(secret, api_key).finalize().into_bytes())
}

/// Constant-time comparison of `api_key` against a stored fingerprint.
pub fn fingerprint_matches(secret: &str, api_key: &str, expected_hex: &str) -> bool {
    match hex::decode(expected_hex) {
        Some(expected) => keyed(secret, api_key).verify_slice(&expected).is_ok(),
        None => false,
    }
}

fn keyed(secret: &str, api_key: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(api_key.as_bytes());
    mac
}

// ---------------------------------------------------------------------------
// hex encoding helper (no extra dep)
// ---------------------------------------------------------------------------

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes
            .as_ref()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Decode a hex string; `None` on odd length or non-hex characters.
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
            .collect()
    }
}
