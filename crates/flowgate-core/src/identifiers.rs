// flowgate-core/src/identifiers.rs
// ============================================================================
// Module: Identifiers
// Description: Newtype wrappers for the named things a flow is built from.
// Purpose: Prevent accidental mixing of string-typed ids across domains.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every identifier in this crate is a thin, `Display`-able wrapper around a
//! `String`. None of them validate their contents here — structural rules
//! (e.g. module id charset) live in the validator, which is the only place
//! that sees untrusted input.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(FlowName, "Identifies a pre-declared flow blueprint.");
string_id!(StageName, "Identifies a contiguous run of nodes sharing a fanout unit.");
string_id!(NodeName, "Identifies a plan node (step or join) within a flow.");
string_id!(ModuleId, "Identifies one module instance within a `FlowPatchEvaluation`.");
string_id!(ModuleType, "Names a module implementation registered in the module catalog.");
string_id!(LayerName, "Names an experiment layer.");
string_id!(VariantName, "Names an experiment variant within a layer.");
string_id!(LimitKey, "Keys a bulkhead limiter; defaults to the owning module's type.");
string_id!(MemoKey, "Keys a per-request memo table entry.");
string_id!(SelectorName, "Names a pluggable boolean predicate used inside a gate.");
string_id!(QosTier, "A coarse per-request service-level label.");
