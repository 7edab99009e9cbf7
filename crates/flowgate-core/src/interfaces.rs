// flowgate-core/src/interfaces.rs
// ============================================================================
// Module: External Interfaces
// Description: Trait contracts the engine and validator consume from a host.
// Purpose: Let production hosts supply real registries while tests use fakes.
// Dependencies: crate::{identifiers, plan}
// ============================================================================

//! ## Overview
//! Three registries sit between the compiled plan and the host: a
//! [`FlowRegistry`] resolving flow names to blueprints and stage lists, a
//! [`ModuleCatalog`] resolving module types to signatures and factories, and
//! (in `gate-logic`) a selector registry for gate leaves. This mirrors the
//! `EvidenceProvider`/`Dispatcher`/`RunStateStore` split the teacher uses to
//! keep production wiring out of the core crate: everything here is a trait
//! object, with an in-memory `Static*` implementation for tests and demos.

use std::collections::HashMap;
use std::sync::Arc;

use crate::identifiers::FlowName;
use crate::identifiers::LayerName;
use crate::identifiers::ModuleType;
use crate::identifiers::NodeName;
use crate::identifiers::StageName;
use crate::module::Join;
use crate::module::Module;
use crate::plan::FlowBlueprint;

/// Declares which experiment layers may touch which params paths or module
/// ids, used by the validator to flag cross-layer leakage.
#[derive(Debug, Clone, Default)]
pub struct LayerOwnershipContract {
    /// Map of layer name to the module ids it is permitted to patch.
    pub owned_module_ids: HashMap<LayerName, Vec<String>>,
}

/// Resolves flow names to their pre-declared blueprint and stage set.
pub trait FlowRegistry: Send + Sync {
    /// Returns the declared stage names for a flow, if registered.
    fn stage_names(&self, flow: &FlowName) -> Option<&[StageName]>;

    /// Returns the flow's blueprint, if registered.
    fn blueprint(&self, flow: &FlowName) -> Option<&FlowBlueprint>;

    /// Returns the flow's experiment-layer ownership contract, if it declares one.
    fn experiment_layer_contract(&self, flow: &FlowName) -> Option<&LayerOwnershipContract> {
        let _ = flow;
        None
    }

    /// Returns the declared field names of the flow's `params` patch type,
    /// if it declares one. `None` means this flow places no restriction on
    /// `params` fields; `Some(&[])` means `params` must be empty.
    fn params_fields(&self, flow: &FlowName) -> Option<&[String]> {
        let _ = flow;
        None
    }
}

/// The args/output type identifiers a registered module declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSignature {
    /// Identifier of the module's bound arguments type.
    pub args_type: String,
    /// Identifier of the module's output type.
    pub output_type: String,
}

/// Resolves module types to their declared signature and builds instances.
pub trait ModuleCatalog: Send + Sync {
    /// Returns the signature for a registered module type, if known.
    fn signature(&self, module_type: &ModuleType) -> Option<ModuleSignature>;

    /// Builds a module instance for a registered module type, if known.
    fn create(&self, module_type: &ModuleType) -> Option<Arc<dyn Module>>;
}

/// In-memory `FlowRegistry` for tests and the CLI demo.
#[derive(Debug, Default)]
pub struct StaticFlowRegistry {
    blueprints: HashMap<FlowName, FlowBlueprint>,
    stage_names: HashMap<FlowName, Vec<StageName>>,
    contracts: HashMap<FlowName, LayerOwnershipContract>,
    params_fields: HashMap<FlowName, Vec<String>>,
}

impl StaticFlowRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a flow's blueprint along with its declared stage names.
    #[must_use]
    pub fn with_flow(mut self, flow: FlowName, stage_names: Vec<StageName>, blueprint: FlowBlueprint) -> Self {
        self.stage_names.insert(flow.clone(), stage_names);
        self.blueprints.insert(flow, blueprint);
        self
    }

    /// Attaches an experiment-layer ownership contract to an already-registered flow.
    #[must_use]
    pub fn with_layer_contract(mut self, flow: FlowName, contract: LayerOwnershipContract) -> Self {
        self.contracts.insert(flow, contract);
        self
    }

    /// Declares the field names a flow's `params` patch type allows.
    #[must_use]
    pub fn with_params_fields(mut self, flow: FlowName, fields: Vec<String>) -> Self {
        self.params_fields.insert(flow, fields);
        self
    }
}

impl FlowRegistry for StaticFlowRegistry {
    fn stage_names(&self, flow: &FlowName) -> Option<&[StageName]> {
        self.stage_names.get(flow).map(Vec::as_slice)
    }

    fn blueprint(&self, flow: &FlowName) -> Option<&FlowBlueprint> {
        self.blueprints.get(flow)
    }

    fn experiment_layer_contract(&self, flow: &FlowName) -> Option<&LayerOwnershipContract> {
        self.contracts.get(flow)
    }

    fn params_fields(&self, flow: &FlowName) -> Option<&[String]> {
        self.params_fields.get(flow).map(Vec::as_slice)
    }
}

/// In-memory `ModuleCatalog` for tests and the CLI demo.
#[derive(Default)]
pub struct StaticModuleCatalog {
    signatures: HashMap<ModuleType, ModuleSignature>,
    factories: HashMap<ModuleType, Arc<dyn Module>>,
}

impl StaticModuleCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module type's signature and a shared instance the
    /// catalog hands back on every `create` call.
    #[must_use]
    pub fn with_module(mut self, module_type: ModuleType, signature: ModuleSignature, instance: Arc<dyn Module>) -> Self {
        self.factories.insert(module_type.clone(), instance);
        self.signatures.insert(module_type, signature);
        self
    }
}

impl ModuleCatalog for StaticModuleCatalog {
    fn signature(&self, module_type: &ModuleType) -> Option<ModuleSignature> {
        self.signatures.get(module_type).cloned()
    }

    fn create(&self, module_type: &ModuleType) -> Option<Arc<dyn Module>> {
        self.factories.get(module_type).cloned()
    }
}

/// Resolves a join plan node's name to its registered reduction.
pub trait JoinRegistry: Send + Sync {
    /// Returns the join implementation for `node`, if registered.
    fn join_for(&self, node: &NodeName) -> Option<Arc<dyn Join>>;
}

/// In-memory `JoinRegistry` for tests and the CLI demo.
#[derive(Default)]
pub struct StaticJoinRegistry {
    joins: HashMap<NodeName, Arc<dyn Join>>,
}

impl StaticJoinRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a join implementation for `node`.
    #[must_use]
    pub fn with_join(mut self, node: NodeName, join: Arc<dyn Join>) -> Self {
        self.joins.insert(node, join);
        self
    }
}

impl JoinRegistry for StaticJoinRegistry {
    fn join_for(&self, node: &NodeName) -> Option<Arc<dyn Join>> {
        self.joins.get(node).cloned()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::module::ModuleContext;
    use crate::outcome::Outcome;

    struct EchoModule;

    #[async_trait::async_trait]
    impl Module for EchoModule {
        async fn execute(&self, _ctx: &ModuleContext<'_>) -> Outcome<Value> {
            Outcome::ok("OK", Value::Null)
        }
    }

    #[test]
    fn static_catalog_roundtrips_signature_and_factory() {
        let catalog = StaticModuleCatalog::new().with_module(
            ModuleType::new("tax_module"),
            ModuleSignature {
                args_type: "TaxArgs".to_string(),
                output_type: "TaxResult".to_string(),
            },
            Arc::new(EchoModule),
        );
        let signature = catalog.signature(&ModuleType::new("tax_module")).unwrap();
        assert_eq!(signature.output_type, "TaxResult");
        assert!(catalog.signature(&ModuleType::new("missing")).is_none());
        assert!(catalog.create(&ModuleType::new("tax_module")).is_some());
        assert!(catalog.create(&ModuleType::new("missing")).is_none());
    }
}
