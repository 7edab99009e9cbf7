// flowgate-core/src/context.rs
// ============================================================================
// Module: Flow Context
// Description: Per-request mutable carrier the engine reads and writes.
// Purpose: Hold everything a request needs without leaking engine internals
//          to modules or selectors.
// Dependencies: tokio::time, crate::{patch, memo, observability, outcome}
// ============================================================================

//! ## Overview
//! One [`FlowContext`] is created per request and mutated only by the
//! engine; modules receive a read-mostly facade through [`FlowContext`]'s
//! accessor methods rather than the struct itself. It is dropped once the
//! final outcome returns — nothing here outlives a single request.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use serde_json::Value;
use tokio::time::Instant;

use crate::identifiers::ModuleId;
use crate::identifiers::QosTier;
use crate::memo::MemoTable;
use crate::observability::ExplainSink;
use crate::outcome::Outcome;
use crate::patch::FlowPatchEvaluation;

/// A fixed outcome or a deferred compute callback, keyed by node name or
/// module id, used to bypass the module catalog in tests.
pub enum TestOverride {
    /// A pre-computed outcome, returned immediately.
    Fixed(Outcome<Value>),
    /// A callback invoked in place of the catalog-built module.
    Compute(Box<dyn Fn() -> Outcome<Value> + Send + Sync>),
}

/// Supplies per-context, per-node/module test overrides.
pub trait TestOverrideProvider: Send + Sync {
    /// Returns an override for `name` (a node name or module id), if any.
    fn override_for(&self, name: &str) -> Option<TestOverride>;
}

/// Per-request mutable state. Created once per request, mutated only by the
/// execution engine, released when the final outcome returns.
pub struct FlowContext {
    /// Absolute instant by which the request must complete.
    pub deadline: Instant,
    cancel_flag: Arc<AtomicBool>,
    /// Request-scoped user identifier, when present.
    pub user_id: Option<String>,
    /// Experiment layer -> variant assignments active for this request, in
    /// declaration order.
    pub variants: Vec<(String, String)>,
    /// Free-form request attributes.
    pub attrs: Value,
    /// Config snapshot version this request observed.
    pub config_version: u64,
    /// Coarse service-level label for the request.
    pub qos_tier: QosTier,
    /// The resolved patch evaluation driving this request.
    pub patch: Arc<FlowPatchEvaluation>,
    /// Request-scoped memoization table.
    pub memo: MemoTable,
    request_started_at: std::time::Instant,
    node_outcomes: Vec<Option<Outcome<Value>>>,
    module_outcomes: HashMap<ModuleId, Outcome<Value>>,
    explain: Option<Arc<dyn ExplainSink>>,
    overrides: Option<Arc<dyn TestOverrideProvider>>,
}

impl FlowContext {
    /// Creates a new context for a request against a plan with `node_count`
    /// nodes.
    #[must_use]
    pub fn new(
        deadline: Instant,
        node_count: usize,
        user_id: Option<String>,
        variants: Vec<(String, String)>,
        attrs: Value,
        config_version: u64,
        qos_tier: QosTier,
        patch: Arc<FlowPatchEvaluation>,
    ) -> Self {
        Self {
            deadline,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            user_id,
            variants,
            attrs,
            config_version,
            qos_tier,
            patch,
            memo: MemoTable::new(),
            request_started_at: std::time::Instant::now(),
            node_outcomes: (0..node_count).map(|_| None).collect(),
            module_outcomes: HashMap::new(),
            explain: None,
            overrides: None,
        }
    }

    /// Attaches an explain sink; entries are recorded only when this is set.
    #[must_use]
    pub fn with_explain(mut self, sink: Arc<dyn ExplainSink>) -> Self {
        self.explain = Some(sink);
        self
    }

    /// Attaches a test-override provider.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Arc<dyn TestOverrideProvider>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Returns a handle that can be shared with other tasks to request
    /// cancellation of this request.
    #[must_use]
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    /// True once the deadline has passed.
    #[must_use]
    pub fn is_deadline_exceeded(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// True once cancellation has been requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancel_flag.load(Ordering::Acquire)
    }

    /// Returns the attached explain sink, if any.
    #[must_use]
    pub fn explain(&self) -> Option<&Arc<dyn ExplainSink>> {
        self.explain.as_ref()
    }

    /// Microseconds elapsed since the request's context was created.
    #[must_use]
    pub fn elapsed_micros(&self) -> u64 {
        u64::try_from(self.request_started_at.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    /// Returns the test override for `name`, if a provider is attached and
    /// it has one.
    pub fn override_for(&self, name: &str) -> Option<TestOverride> {
        self.overrides.as_ref().and_then(|provider| provider.override_for(name))
    }

    /// Records a plan node's outcome by its compiled index.
    pub fn record_node_outcome(&mut self, index: usize, outcome: Outcome<Value>) {
        if let Some(slot) = self.node_outcomes.get_mut(index) {
            *slot = Some(outcome);
        }
    }

    /// Returns a previously recorded node outcome, if any.
    #[must_use]
    pub fn node_outcome(&self, index: usize) -> Option<&Outcome<Value>> {
        self.node_outcomes.get(index).and_then(Option::as_ref)
    }

    /// Records a stage-fanout module's outcome by its module id.
    pub fn record_module_outcome(&mut self, module_id: ModuleId, outcome: Outcome<Value>) {
        self.module_outcomes.insert(module_id, outcome);
    }

    /// Returns a previously recorded module outcome, if any.
    #[must_use]
    pub fn module_outcome(&self, module_id: &ModuleId) -> Option<&Outcome<Value>> {
        self.module_outcomes.get(module_id)
    }

    /// Returns the narrow view of this context a gate selector is allowed to see.
    #[must_use]
    pub fn gate_eval_context(&self) -> gate_logic::GateEvalContext<'_> {
        gate_logic::GateEvalContext {
            user_id: self.user_id.as_deref(),
            variants: &self.variants,
            attrs: &self.attrs,
            qos_tier: self.qos_tier.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::FlowName;
    use crate::patch::FlowPatchEvaluation;
    use crate::patch::OverlayRecord;

    fn empty_patch() -> Arc<FlowPatchEvaluation> {
        Arc::new(FlowPatchEvaluation {
            flow_name: FlowName::new("checkout"),
            stages: Vec::new(),
            overlays_applied: vec![OverlayRecord::Base],
        })
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded_after_advance() {
        let deadline = Instant::now() + std::time::Duration::from_millis(10);
        let context = FlowContext::new(deadline, 1, None, Vec::new(), Value::Null, 1, QosTier::new("standard"), empty_patch());
        assert!(!context.is_deadline_exceeded());
        tokio::time::advance(std::time::Duration::from_millis(20)).await;
        assert!(context.is_deadline_exceeded());
    }

    #[tokio::test]
    async fn records_and_reads_node_outcome() {
        let deadline = Instant::now() + std::time::Duration::from_secs(1);
        let mut context = FlowContext::new(deadline, 2, None, Vec::new(), Value::Null, 1, QosTier::new("standard"), empty_patch());
        context.record_node_outcome(0, Outcome::ok("OK", Value::from(1)));
        assert_eq!(context.node_outcome(0).unwrap().value, Some(Value::from(1)));
        assert!(context.node_outcome(1).is_none());
    }

    #[tokio::test]
    async fn cancellation_handle_is_observed() {
        let deadline = Instant::now() + std::time::Duration::from_secs(1);
        let context = FlowContext::new(deadline, 1, None, Vec::new(), Value::Null, 1, QosTier::new("standard"), empty_patch());
        let handle = context.cancellation_handle();
        assert!(!context.is_canceled());
        handle.store(true, Ordering::Release);
        assert!(context.is_canceled());
    }
}
