// gate-logic/src/eval.rs
// ============================================================================
// Module: Gate Evaluator
// Description: Short-circuit evaluation of a `GateExpr` against a context.
// Purpose: Produce a deterministic allow/deny decision that never throws.
// Dependencies: crate::expr
// ============================================================================

//! ## Overview
//! Evaluation never throws: a selector fault is folded into `allowed=false`
//! with a selector-identifying code, matching the "gates never abort the
//! request" rule. An absent gate is treated as an unconditional allow by the
//! caller before `evaluate` is even invoked (see [`evaluate`]'s `None` arm).

use serde_json::Value;
use thiserror::Error;

use crate::expr::GateExpr;

/// Read-only context a selector is allowed to observe.
///
/// Deliberately narrow: selectors see identity, variant, and attribute data
/// but never another module's recorded outcome, so gate decisions cannot
/// depend on fanout ordering.
#[derive(Debug, Clone, Copy)]
pub struct GateEvalContext<'a> {
    /// Request-scoped user identifier, when present.
    pub user_id: Option<&'a str>,
    /// Experiment layer -> variant assignments active for this request.
    pub variants: &'a [(String, String)],
    /// Free-form request attributes.
    pub attrs: &'a Value,
    /// Coarse service-level label for the request.
    pub qos_tier: &'a str,
}

impl<'a> GateEvalContext<'a> {
    /// Returns the variant assigned to `layer`, if any.
    #[must_use]
    pub fn variant(&self, layer: &str) -> Option<&'a str> {
        self.variants
            .iter()
            .find(|(candidate, _)| candidate == layer)
            .map(|(_, variant)| variant.as_str())
    }
}

/// A selector failed to produce a decision.
#[derive(Debug, Error)]
#[error("selector {name} failed: {reason}")]
pub struct SelectorFault {
    /// Name of the selector that failed.
    pub name: String,
    /// Human-readable failure reason.
    pub reason: String,
}

/// Pluggable named boolean predicate used inside gate leaves.
pub trait SelectorEval {
    /// Evaluates `name(args)` against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorFault`] when the selector cannot produce a result;
    /// callers must not propagate this as a request failure (see
    /// [`evaluate`]).
    fn eval(
        &self,
        name: &str,
        args: Option<&Value>,
        ctx: &GateEvalContext<'_>,
    ) -> Result<bool, SelectorFault>;
}

/// Outcome of evaluating a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    /// Whether the gate allowed the module to proceed.
    pub allowed: bool,
    /// Stable short code explaining the decision.
    pub code: String,
    /// Name of the selector that determined the outcome, if any.
    pub selector_name: Option<String>,
}

impl GateDecision {
    fn allow(code: &str) -> Self {
        Self {
            allowed: true,
            code: code.to_string(),
            selector_name: None,
        }
    }

    fn deny(code: String, selector_name: Option<String>) -> Self {
        Self {
            allowed: false,
            code,
            selector_name,
        }
    }
}

/// Code used when no gate is present on a module (treated as allow).
pub const GATE_ABSENT: &str = "GATE_ABSENT";
/// Code used when the expression tree evaluates to true.
pub const GATE_TRUE: &str = "GATE_TRUE";
/// Code used when the expression tree evaluates to false.
pub const GATE_FALSE: &str = "GATE_FALSE";
/// Code prefix used when a selector fault occurred; suffixed with the selector name.
pub const GATE_SELECTOR_FAULT_PREFIX: &str = "GATE_SELECTOR_FAULT";

/// Evaluates an optional gate expression, short-circuiting on `all`/`any`.
///
/// `expr == None` is treated as an unconditional allow, per the "absent gate
/// = allow" rule.
#[must_use]
pub fn evaluate(
    expr: Option<&GateExpr>,
    resolver: &dyn SelectorEval,
    ctx: &GateEvalContext<'_>,
) -> GateDecision {
    let Some(expr) = expr else {
        return GateDecision::allow(GATE_ABSENT);
    };
    match eval_node(expr, resolver, ctx) {
        Ok(true) => GateDecision::allow(GATE_TRUE),
        Ok(false) => GateDecision::deny(GATE_FALSE.to_string(), None),
        Err(fault) => GateDecision::deny(
            format!("{GATE_SELECTOR_FAULT_PREFIX}:{}", fault.name),
            Some(fault.name),
        ),
    }
}

fn eval_node(
    expr: &GateExpr,
    resolver: &dyn SelectorEval,
    ctx: &GateEvalContext<'_>,
) -> Result<bool, SelectorFault> {
    match expr {
        GateExpr::Literal(value) => Ok(*value),
        GateExpr::Not(inner) => eval_node(inner, resolver, ctx).map(|value| !value),
        GateExpr::All(children) => {
            for child in children {
                if !eval_node(child, resolver, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        GateExpr::Any(children) => {
            for child in children {
                if eval_node(child, resolver, ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        GateExpr::Selector {
            selector,
            args,
        } => resolver.eval(selector, args.as_ref(), ctx),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct FixedSelectors;

    impl SelectorEval for FixedSelectors {
        fn eval(
            &self,
            name: &str,
            _args: Option<&Value>,
            _ctx: &GateEvalContext<'_>,
        ) -> Result<bool, SelectorFault> {
            match name {
                "always_true" => Ok(true),
                "always_false" => Ok(false),
                "boom" => Err(SelectorFault {
                    name: name.to_string(),
                    reason: "simulated failure".to_string(),
                }),
                other => panic!("unexpected selector {other}"),
            }
        }
    }

    fn ctx(attrs: Value) -> (Value, Vec<(String, String)>) {
        (attrs, Vec::new())
    }

    #[test]
    fn absent_gate_allows() {
        let decision = evaluate(None, &FixedSelectors, &GateEvalContext {
            user_id: None,
            variants: &[],
            attrs: &json!({}),
            qos_tier: "default",
        });
        assert!(decision.allowed);
        assert_eq!(decision.code, GATE_ABSENT);
    }

    #[test]
    fn any_short_circuits_on_first_true() {
        let expr = GateExpr::any(vec![GateExpr::selector("always_false"), GateExpr::selector("always_true")]);
        let (attrs, variants) = ctx(json!({}));
        let decision = evaluate(Some(&expr), &FixedSelectors, &GateEvalContext {
            user_id: None,
            variants: &variants,
            attrs: &attrs,
            qos_tier: "default",
        });
        assert!(decision.allowed);
    }

    #[test]
    fn selector_fault_denies_without_panicking() {
        let expr = GateExpr::selector("boom");
        let (attrs, variants) = ctx(json!({}));
        let decision = evaluate(Some(&expr), &FixedSelectors, &GateEvalContext {
            user_id: None,
            variants: &variants,
            attrs: &attrs,
            qos_tier: "default",
        });
        assert!(!decision.allowed);
        assert_eq!(decision.selector_name.as_deref(), Some("boom"));
        assert!(decision.code.starts_with(GATE_SELECTOR_FAULT_PREFIX));
    }

    #[test]
    fn not_inverts_child() {
        let expr = GateExpr::not(GateExpr::Literal(true));
        let (attrs, variants) = ctx(json!({}));
        let decision = evaluate(Some(&expr), &FixedSelectors, &GateEvalContext {
            user_id: None,
            variants: &variants,
            attrs: &attrs,
            qos_tier: "default",
        });
        assert!(!decision.allowed);
    }
}
