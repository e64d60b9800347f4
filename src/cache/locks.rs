//! Striped Per-Key Locks
//!
//! Serializes mutation of a single key (access write-back, set, delete,
//! eviction) without one lock for the whole cache.
//!
//! # Design
//!
//! - Fixed table of async mutexes; a key always maps to the same stripe
//! - Power-of-2 stripe count enables fast modulo via bitwise AND
//! - Guards are held only for one key's read-modify-write, never across a scan

use tokio::sync::{Mutex, MutexGuard};

use super::KEY_LOCK_STRIPES;

/// Striped lock table
pub struct KeyLocks {
    stripes: Box<[Mutex<()>]>,
}

impl KeyLocks {
    /// Create a lock table with the default stripe count
    pub fn new() -> Self {
        Self::with_stripes(KEY_LOCK_STRIPES)
    }

    /// Create a lock table with `stripes` stripes (rounded up to a power of two)
    pub fn with_stripes(stripes: usize) -> Self {
        let count = stripes.max(1).next_power_of_two();
        let stripes: Vec<Mutex<()>> = (0..count).map(|_| Mutex::new(())).collect();
        Self {
            stripes: stripes.into_boxed_slice(),
        }
    }

    /// Number of stripes
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// Stripe index for a key
    #[inline]
    pub fn stripe_index(&self, key: &str) -> usize {
        (fx_hash(key.as_bytes()) as usize) & (self.stripes.len() - 1)
    }

    /// Acquire the lock guarding `key`
    pub async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_index(key)].lock().await
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Fast non-cryptographic hash (FxHash algorithm)
#[inline]
pub(crate) fn fx_hash(bytes: &[u8]) -> u64 {
    const SEED: u64 = 0x517cc1b727220a95;
    let mut hash = SEED;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(SEED);
    }
    hash
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_stripe_count_rounded() {
        assert_eq!(KeyLocks::with_stripes(10).stripe_count(), 16);
        assert_eq!(KeyLocks::with_stripes(0).stripe_count(), 1);
        assert_eq!(KeyLocks::new().stripe_count(), KEY_LOCK_STRIPES);
    }

    #[test]
    fn test_same_key_same_stripe() {
        let locks = KeyLocks::new();
        assert_eq!(locks.stripe_index("track-42"), locks.stripe_index("track-42"));
    }

    #[test]
    fn test_stripe_distribution() {
        let locks = KeyLocks::new();
        let mut counts = vec![0usize; locks.stripe_count()];
        for i in 0..6400 {
            counts[locks.stripe_index(&format!("key-{}", i))] += 1;
        }
        let max = *counts.iter().max().unwrap();
        assert!(max < 640, "Uneven distribution: max count {}", max);
    }

    #[tokio::test]
    async fn test_lock_serializes_same_key() {
        let locks = Arc::new(KeyLocks::new());
        let in_critical = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let locks = locks.clone();
            let in_critical = in_critical.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("shared").await;
                let inside = in_critical.fetch_add(1, Ordering::SeqCst);
                assert_eq!(inside, 0, "two holders of the same key lock");
                tokio::task::yield_now().await;
                in_critical.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
