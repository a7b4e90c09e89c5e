//! Short public identifiers for notices.
//!
//! A `hash_id` is the first six hex characters of
//! `SHA-256(published_on | full_name | content | salt)`. The salt is fresh
//! random bytes, so the id is an opaque label rather than a content
//! fingerprint: generating twice for the same notice gives different ids.
//! Uniqueness is enforced by the store; callers retry on collision.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

pub const HASH_ID_LEN: usize = 6;
const SALT_LEN: usize = 8;

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Source of random bytes for the salt.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]);
}

/// Thread-local CSPRNG from `rand`, seeded by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngEntropy;

impl EntropySource for ThreadRngEntropy {
    fn fill(&self, buf: &mut [u8]) {
        rand::fill(buf);
    }
}

/// Anything that can hand out a `hash_id` for a notice about to be inserted.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, published_on: NaiveDate, full_name: &str, content: &str) -> String;
}

// ── SHA-256 generator ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct HashIdGenerator<E = ThreadRngEntropy> {
    entropy: E,
}

impl<E: EntropySource> HashIdGenerator<E> {
    pub fn new(entropy: E) -> Self {
        Self { entropy }
    }
}

impl<E: EntropySource> IdGenerator for HashIdGenerator<E> {
    fn generate(&self, published_on: NaiveDate, full_name: &str, content: &str) -> String {
        let mut salt = [0u8; SALT_LEN];
        self.entropy.fill(&mut salt);

        let mut hasher = Sha256::new();
        hasher.update(published_on.format("%Y-%m-%d").to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(full_name.as_bytes());
        hasher.update(b"|");
        hasher.update(content.as_bytes());
        hasher.update(b"|");
        hasher.update(salt);

        let mut id = hex::encode(hasher.finalize());
        id.truncate(HASH_ID_LEN);
        id
    }
}

/// True for six lowercase hex characters.
pub fn is_valid_hash_id(s: &str) -> bool {
    s.len() == HASH_ID_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Deterministic entropy: a counter starting at the seed.
    pub struct SeededEntropy(AtomicU64);

    impl SeededEntropy {
        pub fn new(seed: u64) -> Self {
            Self(AtomicU64::new(seed))
        }
    }

    impl EntropySource for SeededEntropy {
        fn fill(&self, buf: &mut [u8]) {
            let n = self.0.fetch_add(1, Ordering::SeqCst).to_le_bytes();
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = n[i % n.len()];
            }
        }
    }

    /// Hands out a fixed list of ids, then repeats the last one.
    pub struct ScriptedIds(Mutex<VecDeque<String>>);

    impl ScriptedIds {
        pub fn new(ids: &[&str]) -> Self {
            Self(Mutex::new(ids.iter().map(|s| s.to_string()).collect()))
        }
    }

    impl IdGenerator for ScriptedIds {
        fn generate(&self, _: NaiveDate, _: &str, _: &str) -> String {
            let mut ids = self.0.lock().unwrap();
            if ids.len() > 1 {
                ids.pop_front().unwrap()
            } else {
                ids.front().cloned().unwrap()
            }
        }
    }
}
