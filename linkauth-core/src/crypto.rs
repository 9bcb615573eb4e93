//! Cryptographic primitives for identifier derivation and secret handling
//!
//! Identifiers are truncated SHA-256 digests, so they can be recomputed from an
//! email address instead of being looked up through a secondary index. Secrets and
//! token nonces come from the operating system RNG. Anything that compares a
//! caller-supplied value against a stored hash goes through
//! [`constant_time_compare`].

use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 of `input`.
pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Generate `width` bytes of OS randomness, hex-encoded.
///
/// # Panics
///
/// Panics when the OS entropy source cannot be read.
pub fn random_hex(width: usize) -> String {
    let mut bytes = vec![0u8; width];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");
    hex::encode(bytes)
}

/// Compare two byte slices in time independent of their contents.
///
/// Slices of different length compare unequal immediately; the lengths of
/// hashes and identifiers are public.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_random_hex_width() {
        let secret = random_hex(16);
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, random_hex(16));
        assert_eq!(random_hex(0), "");
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"hello", b"hello"));
        assert!(constant_time_compare(b"", b""));
        assert!(!constant_time_compare(b"hello", b"world"));
        assert!(!constant_time_compare(b"hello", b"hello!"));
    }
}
