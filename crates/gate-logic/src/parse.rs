// gate-logic/src/parse.rs
// ============================================================================
// Module: Gate Parser
// Description: Parses the gate sub-grammar out of a `serde_json::Value`.
// Purpose: Turn loosely-typed config JSON into a `GateExpr`, never panicking.
// Dependencies: crate::expr, serde_json
// ============================================================================

//! ## Overview
//! The parser is intentionally separate from [`crate::eval`]: the validator
//! needs parse failures (with a JSONPath-like location) while the evaluator
//! only ever sees an already-parsed, already-validated tree.

use serde_json::Value;
use thiserror::Error;

use crate::expr::GateExpr;

/// A gate expression failed to parse.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateParseError {
    /// The node was not an object, array-of-children container, or boolean.
    #[error("gate node must be an object or boolean literal")]
    NotAnObject,
    /// An `all`/`any` node's children were not an array.
    #[error("gate operator `{op}` requires an array of children")]
    ChildrenNotArray {
        /// Operator name (`all` or `any`).
        op: String,
    },
    /// A `not` node was missing its single child.
    #[error("gate operator `not` requires exactly one child")]
    NotMissingChild,
    /// A selector leaf was missing its `selector` field.
    #[error("gate selector leaf requires a non-empty `selector` string")]
    MissingSelectorName,
    /// The node had none of the recognized shapes.
    #[error("gate node must be one of: all, any, not, selector, boolean literal")]
    UnrecognizedShape,
}

/// Parses a gate expression. `Value::Null` and a missing field both parse to
/// `Ok(None)`, matching the "absent gate = allow" rule.
///
/// # Errors
///
/// Returns [`GateParseError`] when `value` does not match the gate grammar.
pub fn parse_gate(value: &Value) -> Result<Option<GateExpr>, GateParseError> {
    if value.is_null() {
        return Ok(None);
    }
    parse_node(value).map(Some)
}

fn parse_node(value: &Value) -> Result<GateExpr, GateParseError> {
    if let Some(literal) = value.as_bool() {
        return Ok(GateExpr::Literal(literal));
    }
    let object = value.as_object().ok_or(GateParseError::NotAnObject)?;

    if let Some(children) = object.get("all") {
        return Ok(GateExpr::All(parse_children("all", children)?));
    }
    if let Some(children) = object.get("any") {
        return Ok(GateExpr::Any(parse_children("any", children)?));
    }
    if let Some(child) = object.get("not") {
        if child.is_null() {
            return Err(GateParseError::NotMissingChild);
        }
        return Ok(GateExpr::not(parse_node(child)?));
    }
    if let Some(selector) = object.get("selector") {
        let name = selector.as_str().filter(|s| !s.is_empty()).ok_or(GateParseError::MissingSelectorName)?;
        let args = object.get("args").cloned();
        return Ok(GateExpr::Selector {
            selector: name.to_string(),
            args,
        });
    }
    Err(GateParseError::UnrecognizedShape)
}

fn parse_children(op: &str, value: &Value) -> Result<Vec<GateExpr>, GateParseError> {
    let array = value.as_array().ok_or_else(|| GateParseError::ChildrenNotArray {
        op: op.to_string(),
    })?;
    array.iter().map(parse_node).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn null_is_absent() {
        assert_eq!(parse_gate(&Value::Null).unwrap(), None);
    }

    #[test]
    fn parses_nested_tree() {
        let value = json!({
            "all": [
                {"selector": "is_beta"},
                {"not": true},
            ]
        });
        let parsed = parse_gate(&value).unwrap().unwrap();
        assert_eq!(parsed.selector_names(), vec!["is_beta"]);
    }

    #[test]
    fn rejects_unrecognized_shape() {
        let value = json!({"bogus": 1});
        assert_eq!(parse_gate(&value), Err(GateParseError::UnrecognizedShape));
    }

    #[test]
    fn rejects_empty_selector_name() {
        let value = json!({"selector": ""});
        assert_eq!(parse_gate(&value), Err(GateParseError::MissingSelectorName));
    }
}
