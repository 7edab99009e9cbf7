// flowgate-core/src/limiter.rs
// ============================================================================
// Module: Bulkhead Limiter Registry
// Description: Process-global, non-blocking concurrency limiters per limit key.
// Purpose: Reject fanout work past a configured concurrency ceiling.
// Dependencies: tokio::sync::Semaphore
// ============================================================================

//! ## Overview
//! One semaphore per `(limit_key, config_version)` pair. Keying on the config
//! version rather than replacing a semaphore in place means a request
//! holding a lease against an old version keeps its capacity guarantee even
//! after a new config snapshot lands; the registry just starts handing out
//! leases against the new version's (possibly resized) semaphore going
//! forward. Entries are never evicted — the domain is bounded by the number
//! of distinct limit keys a host ever configures, the same reasoning the
//! executor dispatch cache and plan template cache use.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tokio::sync::TryAcquireError;

use crate::identifiers::LimitKey;

/// A held bulkhead lease; releases its slot when dropped.
pub struct LimiterLease {
    _permit: OwnedSemaphorePermit,
}

/// Process-global registry of per-`(limit_key, config_version)` semaphores.
#[derive(Default)]
pub struct LimiterRegistry {
    inner: Mutex<HashMap<(LimitKey, u64), Arc<Semaphore>>>,
}

impl LimiterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to acquire a lease for `limit_key` under `config_version`,
    /// lazily creating the backing semaphore with `capacity` permits the
    /// first time this version is seen.
    ///
    /// Returns `None` when the semaphore has no free permits; callers map
    /// this straight to `Skipped(BULKHEAD_REJECTED)`.
    #[must_use]
    pub fn try_acquire(&self, limit_key: &LimitKey, config_version: u64, capacity: usize) -> Option<LimiterLease> {
        let semaphore = self.semaphore_for(limit_key, config_version, capacity);
        match semaphore.try_acquire_owned() {
            Ok(permit) => Some(LimiterLease {
                _permit: permit,
            }),
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => None,
        }
    }

    fn semaphore_for(&self, limit_key: &LimitKey, config_version: u64, capacity: usize) -> Arc<Semaphore> {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let key = (limit_key.clone(), config_version);
        guard.entry(key).or_insert_with(|| Arc::new(Semaphore::new(capacity))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquires_up_to_capacity_then_rejects() {
        let registry = LimiterRegistry::new();
        let key = LimitKey::new("tax_module");
        let first = registry.try_acquire(&key, 1, 1);
        assert!(first.is_some());
        let second = registry.try_acquire(&key, 1, 1);
        assert!(second.is_none(), "capacity of 1 must reject a second concurrent lease");
    }

    #[test]
    fn releasing_a_lease_frees_capacity() {
        let registry = LimiterRegistry::new();
        let key = LimitKey::new("tax_module");
        {
            let lease = registry.try_acquire(&key, 1, 1);
            assert!(lease.is_some());
        }
        let reacquired = registry.try_acquire(&key, 1, 1);
        assert!(reacquired.is_some());
    }

    #[test]
    fn old_version_lease_is_not_disturbed_by_new_version() {
        let registry = LimiterRegistry::new();
        let key = LimitKey::new("tax_module");
        let old_lease = registry.try_acquire(&key, 1, 1);
        assert!(old_lease.is_some());
        let new_lease = registry.try_acquire(&key, 2, 1);
        assert!(new_lease.is_some(), "a new config version must get its own semaphore");
    }
}
