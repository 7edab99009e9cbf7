// flowgate-core/src/error.rs
// ============================================================================
// Module: Error Taxonomy
// Description: Fatal error types that never become an `Outcome`.
// Purpose: Separate "the request failed" (Outcome) from "the engine cannot
//          proceed at all" (these types).
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`crate::plan::PlanError`] covers blueprint compilation; the types here
//! cover the two other places a fatal, non-catchable error can surface:
//! patch composition ([`PatchError`]) and module invocation plumbing
//! ([`ModuleFault`]). Both are distinct from [`crate::outcome::Outcome`],
//! which is how a module reports a *handled* failure back to its caller.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde_json::Value;
use thiserror::Error;

use crate::outcome::Outcome;

/// Errors raised while composing a [`crate::patch::FlowPatchEvaluation`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    /// The patch document was not valid JSON, or not an object at its root.
    #[error("patch document is malformed: {0}")]
    MalformedJson(String),
    /// A module patch entry was missing both `use` and `with`.
    #[error("module patch `{module_id}` has neither `use` nor `with`")]
    MissingUseOrWith {
        /// The module id whose patch entry was incomplete.
        module_id: String,
    },
}

/// A fault raised by module invocation plumbing itself, as opposed to a
/// module reporting its own handled failure via [`crate::outcome::Outcome`].
#[derive(Debug, Error)]
pub enum ModuleFault {
    /// The request's cancellation signal fired before the module returned.
    #[error("module invocation canceled before completion")]
    Canceled,
    /// The cancellation signal fired after the module had already returned,
    /// so its result is discarded rather than recorded.
    #[error("module invocation canceled after completion; result discarded")]
    CanceledPastDeadline,
    /// The module task panicked or otherwise could not be joined.
    #[error("module invocation panicked: {0}")]
    Unhandled(String),
}

/// Runs a module or join future, catching a panic as a [`ModuleFault`]
/// instead of letting it unwind across the engine's call boundary.
///
/// # Errors
///
/// Returns [`ModuleFault::Unhandled`] if `fut` panics.
pub async fn guard_call<F>(fut: F) -> Result<Outcome<Value>, ModuleFault>
where
    F: Future<Output = Outcome<Value>>,
{
    AssertUnwindSafe(fut).catch_unwind().await.map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "module panicked with a non-string payload".to_string());
        ModuleFault::Unhandled(message)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_call_passes_through_normal_outcome() {
        let outcome = guard_call(async { Outcome::ok("OK", Value::Null) }).await.unwrap();
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn guard_call_catches_panic() {
        let result = guard_call(async { panic!("boom") }).await;
        assert!(matches!(result, Err(ModuleFault::Unhandled(_))));
    }
}
