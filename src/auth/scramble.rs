//! Password scrambles for the built-in authentication plugins
//!
//! `mysql_native_password`:
//! ```text
//! SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))
//! ```
//!
//! `caching_sha2_password` (fast path):
//! ```text
//! SHA256(password) XOR SHA256(SHA256(SHA256(password)) + scramble)
//! ```

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Length of the server scramble used by both plugins
pub const SCRAMBLE_LEN: usize = 20;

fn seed(scramble: &[u8]) -> &[u8] {
    let scramble = scramble.strip_suffix(&[0]).unwrap_or(scramble);
    &scramble[..scramble.len().min(SCRAMBLE_LEN)]
}

fn xor<const N: usize>(a: [u8; N], b: [u8; N]) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

/// `mysql_native_password` response. Empty password → empty response.
pub fn native_password(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();

    let mut hasher = Sha1::new();
    hasher.update(seed(scramble));
    hasher.update(stage2);
    let stage3: [u8; 20] = hasher.finalize().into();

    xor(stage1, stage3)
}

/// `caching_sha2_password` fast-auth response. Empty password → empty response.
pub fn caching_sha2_password(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let hash: [u8; 32] = Sha256::digest(password.as_bytes()).into();
    let hash_hash: [u8; 32] = Sha256::digest(hash).into();

    let mut hasher = Sha256::new();
    hasher.update(hash_hash);
    hasher.update(seed(scramble));
    let mixed: [u8; 32] = hasher.finalize().into();

    xor(hash, mixed)
}

/// Cleartext password with NUL terminator, only ever sent over TLS
pub fn clear_password(password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(password.len() + 1);
    out.extend_from_slice(password.as_bytes());
    out.push(0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRAMBLE: &[u8; 20] = b"abcdefghijklmnopqrst";

    #[test]
    fn test_empty_password() {
        assert!(native_password("", SCRAMBLE).is_empty());
        assert!(caching_sha2_password("", SCRAMBLE).is_empty());
    }

    #[test]
    fn test_response_lengths() {
        assert_eq!(native_password("secret", SCRAMBLE).len(), 20);
        assert_eq!(caching_sha2_password("secret", SCRAMBLE).len(), 32);
    }

    #[test]
    fn test_trailing_nul_is_ignored() {
        let mut with_nul = SCRAMBLE.to_vec();
        with_nul.push(0);
        assert_eq!(
            native_password("secret", SCRAMBLE),
            native_password("secret", &with_nul)
        );
        assert_eq!(
            caching_sha2_password("secret", SCRAMBLE),
            caching_sha2_password("secret", &with_nul)
        );
    }

    #[test]
    fn test_native_password_unscrambles() {
        // Server side check: SHA1(scramble + stored) XOR response == SHA1(password)
        let response = native_password("secret", SCRAMBLE);
        let stage1: [u8; 20] = Sha1::digest(b"secret").into();
        let stored: [u8; 20] = Sha1::digest(stage1).into();

        let mut hasher = Sha1::new();
        hasher.update(SCRAMBLE);
        hasher.update(stored);
        let mask: [u8; 20] = hasher.finalize().into();

        let recovered: Vec<u8> = response.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect();
        assert_eq!(recovered, stage1.to_vec());
    }

    #[test]
    fn test_different_scrambles_differ() {
        assert_ne!(
            native_password("secret", SCRAMBLE),
            native_password("secret", b"ABCDEFGHIJKLMNOPQRST")
        );
    }
}
