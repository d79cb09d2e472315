use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Header carrying `hex(sha256(body ++ key))` when a signing key is set.
pub const HASH_HEADER: &str = "HashSHA256";

/// Computes the `HashSHA256` value for `body`.
///
/// ```
/// let h = tally_common::hash::sign(b"{}", "secret");
/// assert_eq!(h.len(), 64);
/// assert!(tally_common::hash::verify(b"{}", "secret", &h.to_uppercase()));
/// ```
pub fn sign(body: &[u8], key: &str) -> String {
    hex::encode(digest(body, key))
}

fn digest(body: &[u8], key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

/// Constant-time equality; slices of different length never match.
fn digests_match(expected: &[u8], received: &[u8]) -> bool {
    expected.ct_eq(received).into()
}

/// Checks a received `HashSHA256` value. Hex case is ignored.
pub fn verify(body: &[u8], key: &str, received: &str) -> bool {
    let Ok(received) = hex::decode(received.trim()) else {
        return false;
    };
    digests_match(&digest(body, key), &received)
}
