// flowgate-core/src/lib.rs
// ============================================================================
// Module: Flowgate Core Library
// Description: Public API surface for the flowgate execution engine.
// Purpose: Expose plan compilation, patch evaluation, and request execution.
// Dependencies: crate::{identifiers, outcome, hashing, plan, error, patch,
//               interfaces, observability, limiter, memo, module, context,
//               fanout, engine}
// ============================================================================

//! ## Overview
//! Flowgate compiles a pre-declared flow blueprint into a frozen plan,
//! resolves a request's config-patch overlays into a per-request
//! [`patch::FlowPatchEvaluation`], and walks the plan node by node,
//! fanning concurrent modules out within each stage. It is backend-agnostic:
//! hosts supply registries and sinks through the traits in [`interfaces`] and
//! [`observability`] rather than this crate embedding a particular catalog
//! or metrics backend.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod hashing;
pub mod identifiers;
pub mod interfaces;
pub mod limiter;
pub mod memo;
pub mod module;
pub mod observability;
pub mod outcome;
pub mod patch;
pub mod plan;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::FlowContext;
pub use context::TestOverride;
pub use context::TestOverrideProvider;
pub use engine::EngineServices;
pub use engine::execute;
pub use error::ModuleFault;
pub use error::PatchError;
pub use error::guard_call;
pub use fanout::FixedCapacity;
pub use fanout::LimiterCapacities;
pub use fanout::StageFanoutSnapshot;
pub use fanout::run_primary;
pub use fanout::run_shadow;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::hash_canonical_json;
pub use identifiers::FlowName;
pub use identifiers::LayerName;
pub use identifiers::LimitKey;
pub use identifiers::MemoKey;
pub use identifiers::ModuleId;
pub use identifiers::ModuleType;
pub use identifiers::NodeName;
pub use identifiers::QosTier;
pub use identifiers::SelectorName;
pub use identifiers::StageName;
pub use identifiers::VariantName;
pub use interfaces::FlowRegistry;
pub use interfaces::JoinRegistry;
pub use interfaces::LayerOwnershipContract;
pub use interfaces::ModuleCatalog;
pub use interfaces::ModuleSignature;
pub use interfaces::StaticFlowRegistry;
pub use interfaces::StaticJoinRegistry;
pub use interfaces::StaticModuleCatalog;
pub use limiter::LimiterLease;
pub use limiter::LimiterRegistry;
pub use memo::MemoTable;
pub use memo::SharedOutcome;
pub use module::Join;
pub use module::Module;
pub use module::ModuleContext;
pub use observability::ExecExplainRecord;
pub use observability::ExecutionPath;
pub use observability::ExplainEntry;
pub use observability::ExplainSink;
pub use observability::InMemoryExplainCollector;
pub use observability::MetricDimensions;
pub use observability::MetricsSink;
pub use observability::NoopMetricsSink;
pub use observability::NoopTraceSink;
pub use observability::TraceSink;
pub use observability::TraceSpan;
pub use outcome::CODE_BULKHEAD_REJECTED;
pub use outcome::CODE_DEADLINE_EXCEEDED;
pub use outcome::CODE_DISABLED;
pub use outcome::CODE_FANOUT_TRIM;
pub use outcome::CODE_GATE_FALSE;
pub use outcome::CODE_SHADOW_NOT_SAMPLED;
pub use outcome::CODE_UNHANDLED_EXCEPTION;
pub use outcome::CODE_UPSTREAM_CANCELED;
pub use outcome::MAX_CODE_LEN;
pub use outcome::Outcome;
pub use outcome::OutcomeKind;
pub use patch::FlowPatchEvaluation;
pub use patch::OverlayRecord;
pub use patch::StageModulePatch;
pub use patch::StagePatch;
pub use patch::evaluate as evaluate_patch;
pub use plan::FlowBlueprint;
pub use plan::PlanError;
pub use plan::PlanNode;
pub use plan::PlanNodeKind;
pub use plan::PlanTemplate;
