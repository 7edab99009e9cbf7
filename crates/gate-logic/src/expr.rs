// gate-logic/src/expr.rs
// ============================================================================
// Module: Gate Expression Tree
// Description: The `all`/`any`/`not`/selector/literal boolean tree.
// Purpose: Represent a parsed gate independent of how it is evaluated.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! `GateExpr` is the in-memory form of a gate once parsed. It is a plain
//! recursive enum rather than a generic predicate tree: gate leaves are
//! always either a named selector invocation or a boolean literal, never an
//! arbitrary caller-supplied type.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// A boolean expression tree evaluated against request attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GateExpr {
    /// True iff every child is true.
    All(Vec<GateExpr>),
    /// True iff at least one child is true.
    Any(Vec<GateExpr>),
    /// True iff the child is false.
    Not(Box<GateExpr>),
    /// A named selector invocation, optionally carrying arguments.
    Selector {
        /// Selector name registered with a [`crate::eval::SelectorEval`].
        selector: String,
        /// Optional arguments passed to the selector.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
    /// A constant `true` or `false` leaf.
    Literal(bool),
}

impl GateExpr {
    /// Builds an `all` node from its children.
    #[must_use]
    pub fn all(children: Vec<GateExpr>) -> Self {
        Self::All(children)
    }

    /// Builds an `any` node from its children.
    #[must_use]
    pub fn any(children: Vec<GateExpr>) -> Self {
        Self::Any(children)
    }

    /// Builds a `not` node wrapping `child`.
    #[must_use]
    pub fn not(child: GateExpr) -> Self {
        Self::Not(Box::new(child))
    }

    /// Builds a selector leaf with no arguments.
    #[must_use]
    pub fn selector(name: impl Into<String>) -> Self {
        Self::Selector {
            selector: name.into(),
            args: None,
        }
    }

    /// Builds a selector leaf carrying arguments.
    #[must_use]
    pub fn selector_with_args(name: impl Into<String>, args: Value) -> Self {
        Self::Selector {
            selector: name.into(),
            args: Some(args),
        }
    }

    /// Returns the set of distinct selector names referenced by this tree.
    #[must_use]
    pub fn selector_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_selector_names(&mut out);
        out
    }

    fn collect_selector_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::All(children) | Self::Any(children) => {
                for child in children {
                    child.collect_selector_names(out);
                }
            }
            Self::Not(inner) => inner.collect_selector_names(out),
            Self::Selector {
                selector, ..
            } => {
                if !out.contains(&selector.as_str()) {
                    out.push(selector.as_str());
                }
            }
            Self::Literal(_) => {}
        }
    }
}
