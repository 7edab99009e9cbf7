// flowgate-core/src/plan.rs
// ============================================================================
// Module: Flow Blueprint & Plan Template
// Description: The pre-declared, reflection-free compiled form of a flow.
// Purpose: Give the engine a frozen node list it can walk without recompiling.
// Dependencies: crate::{identifiers, hashing}
// ============================================================================

//! ## Overview
//! A [`FlowBlueprint`] is authored once per flow (out of scope for this
//! crate: the builder/DSL that produces one). [`PlanTemplate::compile`]
//! freezes it into the form the engine actually walks, checking the
//! invariants from the data model (unique names, contiguous stages, final
//! node is a join) up front so they become fatal [`PlanError`]s at
//! construction time rather than runtime surprises.

use serde::Serialize;
use thiserror::Error;

use crate::hashing::HashDigest;
use crate::hashing::hash_canonical_json;
use crate::identifiers::ModuleType;
use crate::identifiers::NodeName;
use crate::identifiers::StageName;

/// A single node in a flow blueprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanNode {
    /// Node name, unique within the flow.
    pub name: NodeName,
    /// Stage this node belongs to, if it participates in fanout.
    pub stage_name: Option<StageName>,
    /// The node's role.
    pub kind: PlanNodeKind,
    /// Declared args type identifier (opaque outside this crate).
    pub args_type: String,
    /// Declared output type identifier (opaque outside this crate).
    pub output_type: String,
}

/// Whether a node is a single-module step or a reduction join.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanNodeKind {
    /// A single registered module invocation.
    Step {
        /// Registered module type the catalog resolves.
        module_type: ModuleType,
    },
    /// A pure reduction over previously recorded outcomes.
    Join,
}

/// An ordered, pre-declared sequence of plan nodes producing a typed response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowBlueprint {
    /// Nodes in declared order.
    pub nodes: Vec<PlanNode>,
    /// Identifier of the flow's response type; the final join's output type
    /// must match this.
    pub response_type: String,
}

/// Fatal, non-catchable errors discovered when compiling a blueprint.
///
/// These are programmer/configuration-not-yet-validated errors per the error
/// handling design: they are raised once at startup and never converted into
/// an [`crate::outcome::Outcome`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The blueprint declared no nodes.
    #[error("flow blueprint has no nodes")]
    EmptyNodeList,
    /// The final node was not a join.
    #[error("flow blueprint's final node `{0}` is not a join")]
    FinalNodeNotJoin(String),
    /// The final join's output type did not match the flow's response type.
    #[error("flow blueprint's final join output type `{actual}` does not match response type `{expected}`")]
    OutputTypeMismatch {
        /// Declared response type.
        expected: String,
        /// Final join's actual output type.
        actual: String,
    },
    /// Two nodes shared the same name.
    #[error("duplicate node name `{0}`")]
    DuplicateNodeName(String),
    /// A stage name reappeared after the engine had already left it.
    #[error("stage `{0}` is not contiguous")]
    StageNotContiguous(String),
}

/// The compiled, reflection-free form of a [`FlowBlueprint`], shared across
/// requests for one flow.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTemplate {
    /// The validated blueprint this template wraps.
    pub blueprint: FlowBlueprint,
    /// Stable hash of the blueprint, used to detect drift between a cached
    /// template and the one a request observed.
    pub plan_hash: HashDigest,
    name_to_index: Vec<(NodeName, usize)>,
}

impl PlanTemplate {
    /// Compiles and validates a blueprint, computing its `planHash`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] when the blueprint violates a structural
    /// invariant (empty, duplicate names, non-contiguous stages, or a final
    /// node that is not a matching join).
    pub fn compile(blueprint: FlowBlueprint) -> Result<Self, PlanError> {
        validate_blueprint(&blueprint)?;
        let plan_hash = hash_canonical_json(&blueprint).unwrap_or_else(|_| HashDigest {
            value: String::new(),
        });
        let name_to_index = blueprint
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.name.clone(), index))
            .collect();
        Ok(Self {
            blueprint,
            plan_hash,
            name_to_index,
        })
    }

    /// Looks up a node's index by name.
    #[must_use]
    pub fn index_of(&self, name: &NodeName) -> Option<usize> {
        self.name_to_index.iter().find(|(candidate, _)| candidate == name).map(|(_, index)| *index)
    }

    /// Returns the nodes in declared order.
    #[must_use]
    pub fn nodes(&self) -> &[PlanNode] {
        &self.blueprint.nodes
    }
}

fn validate_blueprint(blueprint: &FlowBlueprint) -> Result<(), PlanError> {
    let Some(final_node) = blueprint.nodes.last() else {
        return Err(PlanError::EmptyNodeList);
    };
    match &final_node.kind {
        PlanNodeKind::Join => {
            if final_node.output_type != blueprint.response_type {
                return Err(PlanError::OutputTypeMismatch {
                    expected: blueprint.response_type.clone(),
                    actual: final_node.output_type.clone(),
                });
            }
        }
        PlanNodeKind::Step {
            ..
        } => {
            return Err(PlanError::FinalNodeNotJoin(final_node.name.to_string()));
        }
    }

    let mut seen_names: Vec<&NodeName> = Vec::with_capacity(blueprint.nodes.len());
    for node in &blueprint.nodes {
        if seen_names.contains(&&node.name) {
            return Err(PlanError::DuplicateNodeName(node.name.to_string()));
        }
        seen_names.push(&node.name);
    }

    let mut closed_stages: Vec<&StageName> = Vec::new();
    let mut current_stage: Option<&StageName> = None;
    for node in &blueprint.nodes {
        match (&node.stage_name, current_stage) {
            (Some(stage), Some(active)) if stage == active => {}
            (Some(stage), _) => {
                if closed_stages.contains(&stage) {
                    return Err(PlanError::StageNotContiguous(stage.to_string()));
                }
                if let Some(active) = current_stage.take() {
                    closed_stages.push(active);
                }
                current_stage = Some(stage);
            }
            (None, Some(active)) => {
                closed_stages.push(active);
                current_stage = None;
            }
            (None, None) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, stage: &str) -> PlanNode {
        PlanNode {
            name: NodeName::new(name),
            stage_name: Some(StageName::new(stage)),
            kind: PlanNodeKind::Step {
                module_type: ModuleType::new("noop"),
            },
            args_type: "Req".to_string(),
            output_type: "String".to_string(),
        }
    }

    fn join(name: &str) -> PlanNode {
        PlanNode {
            name: NodeName::new(name),
            stage_name: None,
            kind: PlanNodeKind::Join,
            args_type: "Req".to_string(),
            output_type: "Resp".to_string(),
        }
    }

    #[test]
    fn compiles_valid_blueprint() {
        let blueprint = FlowBlueprint {
            nodes: vec![step("a", "stage1"), join("final")],
            response_type: "Resp".to_string(),
        };
        let template = PlanTemplate::compile(blueprint).unwrap();
        assert_eq!(template.index_of(&NodeName::new("final")), Some(1));
    }

    #[test]
    fn rejects_final_non_join() {
        let blueprint = FlowBlueprint {
            nodes: vec![step("a", "stage1")],
            response_type: "Resp".to_string(),
        };
        assert_eq!(PlanTemplate::compile(blueprint), Err(PlanError::FinalNodeNotJoin("a".to_string())));
    }

    #[test]
    fn rejects_non_contiguous_stage() {
        let mut nodes = vec![step("a", "stage1"), step("b", "stage2"), step("c", "stage1")];
        nodes.push(join("final"));
        let blueprint = FlowBlueprint {
            nodes,
            response_type: "Resp".to_string(),
        };
        assert_eq!(PlanTemplate::compile(blueprint), Err(PlanError::StageNotContiguous("stage1".to_string())));
    }

    #[test]
    fn rejects_duplicate_names() {
        let blueprint = FlowBlueprint {
            nodes: vec![step("a", "stage1"), step("a", "stage1"), join("final")],
            response_type: "Resp".to_string(),
        };
        assert_eq!(PlanTemplate::compile(blueprint), Err(PlanError::DuplicateNodeName("a".to_string())));
    }
}
