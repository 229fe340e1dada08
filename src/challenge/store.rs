//! Sharded in-memory store of login challenges.
//!
//! Each principal (a wallet address, an email) has at most one outstanding
//! challenge. The map is split into shards, each behind its own mutex, so
//! logins for different principals do not serialize on a single lock.

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tracing::debug;

/// Default challenge lifetime (5 minutes).
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default number of shards.
const DEFAULT_SHARD_COUNT: usize = 16;

/// Token entropy in bytes (256 bits).
const TOKEN_BYTES: usize = 32;

/// An outstanding challenge for one principal.
#[derive(Debug, Clone)]
struct Challenge {
    token: String,
    issued_at: Instant,
}

impl Challenge {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.issued_at) > ttl
    }
}

/// Counters for monitoring the store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeStats {
    /// Challenges issued.
    pub issued: u64,
    /// Successful verifications.
    pub verified: u64,
    /// Failed verifications (absent, expired or mismatched).
    pub rejected: u64,
    /// Entries removed by sweeps.
    pub swept: u64,
}

#[derive(Debug, Default)]
struct Counters {
    issued: AtomicU64,
    verified: AtomicU64,
    rejected: AtomicU64,
    swept: AtomicU64,
}

/// Single-use, time-limited login challenges keyed by normalized principal.
///
/// Cloning is cheap and yields a handle to the same store.
#[derive(Clone)]
pub struct ChallengeStore {
    shards: Arc<[Mutex<HashMap<String, Challenge>>]>,
    hasher: RandomState,
    ttl: Duration,
    counters: Arc<Counters>,
}

impl ChallengeStore {
    /// Create a store with the default TTL and shard count.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CHALLENGE_TTL)
    }

    /// Create a store with the given TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_shards(ttl, DEFAULT_SHARD_COUNT)
    }

    /// Create a store with the given TTL and shard count (minimum 1).
    #[must_use]
    pub fn with_shards(ttl: Duration, shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>();
        Self {
            shards: shards.into(),
            hasher: RandomState::new(),
            ttl,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Issue a fresh challenge for `principal`, replacing any outstanding one.
    pub fn generate(&self, principal: &str) -> String {
        self.generate_at(principal, Instant::now())
    }

    /// Issue a challenge as if the current time were `now`.
    pub fn generate_at(&self, principal: &str, now: Instant) -> String {
        let key = normalize_principal(principal);
        let token = random_token();

        let previous = self.shard(&key).lock().insert(
            key.clone(),
            Challenge {
                token: token.clone(),
                issued_at: now,
            },
        );
        self.counters.issued.fetch_add(1, Ordering::Relaxed);

        debug!(
            principal = %key,
            token = %fingerprint(&token),
            replaced = previous.is_some(),
            "Issued login challenge"
        );
        token
    }

    /// Consume the challenge for `principal` if `token` matches and is fresh.
    ///
    /// Returns `false` without saying why when the challenge is missing,
    /// expired or mismatched. Only a successful call changes the store.
    pub fn verify(&self, principal: &str, token: &str) -> bool {
        self.verify_at(principal, token, Instant::now())
    }

    /// Verify as if the current time were `now`.
    pub fn verify_at(&self, principal: &str, token: &str, now: Instant) -> bool {
        let key = normalize_principal(principal);

        let accepted = {
            let mut shard = self.shard(&key).lock();
            let valid = shard.get(&key).is_some_and(|challenge| {
                !challenge.is_expired(now, self.ttl)
                    && bool::from(challenge.token.as_bytes().ct_eq(token.as_bytes()))
            });
            if valid {
                shard.remove(&key);
            }
            valid
        };

        if accepted {
            self.counters.verified.fetch_add(1, Ordering::Relaxed);
            debug!(principal = %key, "Login challenge verified");
        } else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(principal = %key, "Login challenge rejected");
        }
        accepted
    }

    /// Remove every challenge older than the TTL. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// Sweep as if the current time were `now`.
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            let before = shard.len();
            shard.retain(|_, challenge| !challenge.is_expired(now, self.ttl));
            removed += before - shard.len();
        }
        self.counters
            .swept
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Challenge lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored challenges, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().is_empty())
    }

    /// Get current counters.
    #[must_use]
    pub fn stats(&self) -> ChallengeStats {
        ChallengeStats {
            issued: self.counters.issued.load(Ordering::Relaxed),
            verified: self.counters.verified.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            swept: self.counters.swept.load(Ordering::Relaxed),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, Challenge>> {
        let index = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[index]
    }
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a principal identifier to its lookup key.
#[must_use]
pub fn normalize_principal(principal: &str) -> String {
    principal.trim().to_lowercase()
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Short, non-reversible tag for a token, safe to put in logs.
fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..4])
}
