use sha2::{Digest, Sha256};
use std::fmt;

/// Numeric identity of an advisory lock.
///
/// PostgreSQL keys two-argument advisory locks by a pair of `int4` values. The
/// pair is derived from the lock name: the first 8 bytes of its SHA-256 digest,
/// each half read as a little-endian `i32`.
///
/// Collisions are not detected. Two names hashing to the same pair share a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub high: i32,
    pub low: i32,
}

impl LockKey {
    pub fn from_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let high = i32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let low = i32::from_le_bytes([digest[4], digest[5], digest[6], digest[7]]);
        Self { high, low }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.high, self.low)
    }
}
