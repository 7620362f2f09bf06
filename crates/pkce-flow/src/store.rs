//! Correlation store for in-progress login attempts
//!
//! Binds each opaque `state` to its PKCE verifier for the lifetime of one
//! login attempt. A binding is read at most once: `take_and_invalidate`
//! removes it under the same lock acquisition that finds it, so concurrent
//! callbacks carrying the same `state` see exactly one success.
//!
//! Expired bindings are evicted lazily on `put` and by the background sweeper
//! (`sweep::spawn_sweep_task`). Neither path is needed for correctness: an
//! expired binding is rejected on take regardless.

use std::collections::HashMap;
use std::time::Duration;

use common::Secret;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::constants::CLOCK_SKEW;
use crate::error::{Error, Result};

/// One live `state -> verifier` binding.
#[derive(Debug)]
pub struct FlowState {
    pub state: String,
    pub verifier: Secret<String>,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl FlowState {
    /// Expired once `now` is within `CLOCK_SKEW` of `expires_at`.
    fn is_expired(&self, now: Instant) -> bool {
        now + CLOCK_SKEW >= self.expires_at
    }
}

/// In-memory, TTL-bounded binding store shared by all flows.
#[derive(Default)]
pub struct CorrelationStore {
    entries: Mutex<HashMap<String, FlowState>>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `state` to `verifier` for `ttl`.
    ///
    /// Fails with `DuplicateState` if `state` is already bound and unexpired.
    /// An expired leftover under the same key is replaced. A `ttl` too large
    /// to represent as a deadline fails with `InvalidTtl`.
    pub async fn put(&self, state: &str, verifier: Secret<String>, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| Error::InvalidTtl(format!("state ttl {ttl:?} overflows the clock")))?;
        let mut entries = self.entries.lock().await;

        let evicted = evict_expired(&mut entries, now);
        if evicted > 0 {
            debug!(evicted, "evicted expired flow states");
        }

        if entries.contains_key(state) {
            return Err(Error::DuplicateState);
        }

        entries.insert(
            state.to_string(),
            FlowState {
                state: state.to_string(),
                verifier,
                created_at: now,
                expires_at,
            },
        );
        Ok(())
    }

    /// Remove the binding for `state` and return its verifier.
    ///
    /// Fails with `NotFound` if the state was never bound or was already
    /// taken, and with `Expired` if the binding outlived its TTL. The binding
    /// is gone after this call whatever the outcome.
    pub async fn take_and_invalidate(&self, state: &str) -> Result<Secret<String>> {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries.remove(state)
        };

        let entry = entry.ok_or(Error::NotFound)?;
        if entry.is_expired(Instant::now()) {
            debug!(
                age_secs = entry.created_at.elapsed().as_secs(),
                "flow state taken after expiry"
            );
            return Err(Error::Expired);
        }
        Ok(entry.verifier)
    }

    /// Drop a binding early. Returns whether one was present.
    pub async fn cancel(&self, state: &str) -> bool {
        self.entries.lock().await.remove(state).is_some()
    }

    /// Evict every expired binding. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        evict_expired(&mut entries, Instant::now())
    }

    /// Number of bindings currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn evict_expired(entries: &mut HashMap<String, FlowState>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
}
