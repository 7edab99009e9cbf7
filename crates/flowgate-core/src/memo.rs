// flowgate-core/src/memo.rs
// ============================================================================
// Module: Per-Request Memo Table
// Description: At-most-one-compute-per-key memoization for stage fanout.
// Purpose: Collapse concurrent lookups of the same memo key into one compute.
// Dependencies: tokio::sync::watch
// ============================================================================

//! ## Overview
//! Scoped to a single request and dropped with its [`crate::context::FlowContext`]
//! — a second request never observes another's entries. A miss installs a
//! `Pending` entry immediately so concurrent lookups of the same key join the
//! in-flight computation via a `watch` channel instead of recomputing,
//! adapted from the `Arc<Mutex<...>>`-guarded deduplication pattern used for
//! single-pipeline dedup, generalized here to fanned-out concurrent lookups.
//!
//! Entries are keyed on [`MemoLookupKey`], not the declared `memoKey` string
//! alone: two modules that happen to share a `memoKey` never alias each
//! other's cached outcome unless they also agree on module type, output
//! type, and primary/shadow path.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::watch;

use crate::identifiers::MemoKey;
use crate::identifiers::ModuleType;
use crate::outcome::CODE_UNHANDLED_EXCEPTION;
use crate::outcome::Outcome;

/// A memoized outcome, shared between the computing caller and any joiners.
pub type SharedOutcome = Arc<Outcome<Value>>;

/// Compound memo table key. Two invocations collapse into one compute only
/// when they agree on declared `memoKey`, module type, output type, and
/// primary/shadow path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoLookupKey {
    /// The module implementation being invoked.
    pub module_type: ModuleType,
    /// The declared `memoKey` from the patch.
    pub memo_key: MemoKey,
    /// The module's declared output type.
    pub output_type: String,
    /// Whether this lookup is on the shadow path.
    pub is_shadow: bool,
}

enum MemoEntry {
    Pending(watch::Receiver<Option<SharedOutcome>>),
    Done(SharedOutcome),
}

/// Per-request memo table keyed by [`MemoLookupKey`].
#[derive(Default)]
pub struct MemoTable {
    inner: Mutex<HashMap<MemoLookupKey, MemoEntry>>,
}

impl MemoTable {
    /// Creates an empty memo table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized outcome for `key`, computing it via `compute`
    /// only if this is the first lookup for that key in this request.
    /// Concurrent lookups of the same key observe the same completed value.
    pub async fn get_or_compute<F, Fut>(&self, key: &MemoLookupKey, compute: F) -> SharedOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<Value>>,
    {
        enum Action {
            UseExisting(SharedOutcome),
            AwaitPending(watch::Receiver<Option<SharedOutcome>>),
            Compute(watch::Sender<Option<SharedOutcome>>),
        }

        let action = {
            let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match guard.get(key) {
                Some(MemoEntry::Done(outcome)) => Action::UseExisting(outcome.clone()),
                Some(MemoEntry::Pending(receiver)) => Action::AwaitPending(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    guard.insert(key.clone(), MemoEntry::Pending(receiver));
                    Action::Compute(sender)
                }
            }
        };

        match action {
            Action::UseExisting(outcome) => outcome,
            Action::AwaitPending(mut receiver) => loop {
                if let Some(outcome) = receiver.borrow().clone() {
                    return outcome;
                }
                if receiver.changed().await.is_err() {
                    return Arc::new(Outcome::error(CODE_UNHANDLED_EXCEPTION));
                }
            },
            Action::Compute(sender) => {
                let outcome: SharedOutcome = Arc::new(compute().await);
                {
                    let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    guard.insert(key.clone(), MemoEntry::Done(outcome.clone()));
                }
                let _ = sender.send(Some(outcome.clone()));
                outcome
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[tokio::test]
    async fn concurrent_lookups_compute_once() {
        let table = Arc::new(MemoTable::new());
        let key = MemoLookupKey {
            module_type: ModuleType::new("pricing_module"),
            memo_key: MemoKey::new("pricing:sku-1"),
            output_type: "Price".to_string(),
            is_shadow: false,
        };
        let compute_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            let key = key.clone();
            let compute_count = compute_count.clone();
            handles.push(tokio::spawn(async move {
                table
                    .get_or_compute(&key, || async move {
                        compute_count.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Outcome::ok("OK", Value::from(42))
                    })
                    .await
            }));
        }

        for handle in handles {
            let outcome = handle.await.unwrap();
            assert_eq!(outcome.value, Some(Value::from(42)));
        }
        assert_eq!(compute_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_module_types_sharing_a_memo_key_do_not_collide() {
        let table = MemoTable::new();
        let shared_memo_key = MemoKey::new("sku-1");

        let tax_key = MemoLookupKey {
            module_type: ModuleType::new("tax_module"),
            memo_key: shared_memo_key.clone(),
            output_type: "Tax".to_string(),
            is_shadow: false,
        };
        let promo_key = MemoLookupKey {
            module_type: ModuleType::new("promo_module"),
            memo_key: shared_memo_key,
            output_type: "Promo".to_string(),
            is_shadow: false,
        };

        let tax_outcome = table.get_or_compute(&tax_key, || async { Outcome::ok("OK", Value::from(1)) }).await;
        let promo_outcome = table.get_or_compute(&promo_key, || async { Outcome::ok("OK", Value::from(2)) }).await;

        assert_eq!(tax_outcome.value, Some(Value::from(1)));
        assert_eq!(promo_outcome.value, Some(Value::from(2)));
    }

    #[tokio::test]
    async fn primary_and_shadow_paths_do_not_share_a_cache_slot() {
        let table = MemoTable::new();
        let module_type = ModuleType::new("scorer");
        let memo_key = MemoKey::new("sku-1");

        let primary_key = MemoLookupKey {
            module_type: module_type.clone(),
            memo_key: memo_key.clone(),
            output_type: "Score".to_string(),
            is_shadow: false,
        };
        let shadow_key = MemoLookupKey {
            module_type,
            memo_key,
            output_type: "Score".to_string(),
            is_shadow: true,
        };

        let primary_outcome = table.get_or_compute(&primary_key, || async { Outcome::ok("OK", Value::from(10)) }).await;
        let shadow_outcome = table.get_or_compute(&shadow_key, || async { Outcome::ok("OK", Value::from(20)) }).await;

        assert_eq!(primary_outcome.value, Some(Value::from(10)));
        assert_eq!(shadow_outcome.value, Some(Value::from(20)));
    }
}
