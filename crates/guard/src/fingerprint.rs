//! Stable query fingerprints for audit correlation.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
const FINGERPRINT_LEN: usize = 16;

/// Derive a short, stable identifier for `text` without retaining the text.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("防火墙的作用是什么？"), fingerprint("防火墙的作用是什么？"));
        assert_eq!(fingerprint("abc").len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_fingerprint_differs_per_text() {
        assert_ne!(fingerprint("a"), fingerprint("b"));
    }

    #[test]
    fn test_fingerprint_matches_sha256_prefix() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(fingerprint("abc"), "ba7816bf8f01cfea");
    }
}
