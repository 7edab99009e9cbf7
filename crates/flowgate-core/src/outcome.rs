// flowgate-core/src/outcome.rs
// ============================================================================
// Module: Outcome Taxonomy
// Description: The closed result-kind enum shared by every node and module.
// Purpose: Give the engine a single type it can always return, never throw.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `Outcome<T>` is the engine's total return type: every execution path ends
//! in one of these, never in a propagated exception. Codes are interned as
//! plain `String`s rather than an open enum because module authors mint their
//! own in addition to the reserved set below.

use serde::Deserialize;
use serde::Serialize;

/// Maximum length, in bytes, of an outcome code.
pub const MAX_CODE_LEN: usize = 64;

/// Deadline was exceeded before or during execution.
pub const CODE_DEADLINE_EXCEEDED: &str = "DEADLINE_EXCEEDED";
/// The request's cancellation signal fired.
pub const CODE_UPSTREAM_CANCELED: &str = "UPSTREAM_CANCELED";
/// A module or join raised a fault the engine could not otherwise classify.
pub const CODE_UNHANDLED_EXCEPTION: &str = "UNHANDLED_EXCEPTION";
/// The module was disabled by the patch (base, experiment, or emergency).
pub const CODE_DISABLED: &str = "DISABLED";
/// The module's gate evaluated to `allowed=false`.
pub const CODE_GATE_FALSE: &str = "GATE_FALSE";
/// The module was trimmed by `fanoutMax`.
pub const CODE_FANOUT_TRIM: &str = "FANOUT_TRIM";
/// A shadow module was not selected by deterministic sampling.
pub const CODE_SHADOW_NOT_SAMPLED: &str = "SHADOW_NOT_SAMPLED";
/// A bulkhead lease could not be acquired.
pub const CODE_BULKHEAD_REJECTED: &str = "BULKHEAD_REJECTED";

/// The kind of result an [`Outcome`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Successful completion; `value` is populated.
    Ok,
    /// A handled failure.
    Error,
    /// The deadline was exceeded.
    Timeout,
    /// The unit of work was not invoked.
    Skipped,
    /// A degraded substitute value was returned.
    Fallback,
    /// The request's cancellation signal fired.
    Canceled,
    /// No outcome kind applies (used only as a placeholder before recording).
    Unspecified,
}

/// A node or module's result: a kind, a stable short code, and an optional
/// value (populated only when `kind == Ok`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    /// The kind of result.
    pub kind: OutcomeKind,
    /// Stable, ALL-CAPS, `<=64`-byte code describing the result.
    pub code: String,
    /// The produced value; only meaningful when `kind == Ok`.
    pub value: Option<T>,
}

impl<T> Outcome<T> {
    /// Builds a successful outcome.
    #[must_use]
    pub fn ok(code: impl Into<String>, value: T) -> Self {
        Self::new(OutcomeKind::Ok, code, Some(value))
    }

    /// Builds an error outcome.
    #[must_use]
    pub fn error(code: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Error, code, None)
    }

    /// Builds a timeout outcome using the reserved deadline code.
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(OutcomeKind::Timeout, CODE_DEADLINE_EXCEEDED, None)
    }

    /// Builds a canceled outcome using the reserved cancellation code.
    #[must_use]
    pub fn canceled() -> Self {
        Self::new(OutcomeKind::Canceled, CODE_UPSTREAM_CANCELED, None)
    }

    /// Builds a skipped outcome with the given reason code.
    #[must_use]
    pub fn skipped(code: impl Into<String>) -> Self {
        Self::new(OutcomeKind::Skipped, code, None)
    }

    /// Builds a fallback outcome carrying a degraded value.
    #[must_use]
    pub fn fallback(code: impl Into<String>, value: T) -> Self {
        Self::new(OutcomeKind::Fallback, code, Some(value))
    }

    fn new(kind: OutcomeKind, code: impl Into<String>, value: Option<T>) -> Self {
        let code = code.into();
        debug_assert!(
            code.len() <= MAX_CODE_LEN,
            "outcome code exceeds {MAX_CODE_LEN} bytes: {code}"
        );
        Self {
            kind,
            code,
            value,
        }
    }

    /// Returns true when this outcome is `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.kind, OutcomeKind::Ok)
    }

    /// Maps the contained value, preserving kind and code.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            kind: self.kind,
            code: self.code,
            value: self.value.map(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_carries_value() {
        let outcome = Outcome::ok("OK", 42);
        assert!(outcome.is_ok());
        assert_eq!(outcome.value, Some(42));
    }

    #[test]
    fn timeout_uses_reserved_code() {
        let outcome: Outcome<()> = Outcome::timeout();
        assert_eq!(outcome.code, CODE_DEADLINE_EXCEEDED);
        assert_eq!(outcome.kind, OutcomeKind::Timeout);
    }

    #[test]
    fn map_preserves_kind_and_code() {
        let outcome = Outcome::ok("OK", 1).map(|v| v + 1);
        assert_eq!(outcome.value, Some(2));
        assert_eq!(outcome.kind, OutcomeKind::Ok);
    }
}
