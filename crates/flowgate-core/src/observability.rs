// flowgate-core/src/observability.rs
// ============================================================================
// Module: Observability
// Description: Metrics, trace, and explain sink traits plus in-memory defaults.
// Purpose: Give hosts an extension point without forcing a logging framework.
// Dependencies: std::sync::Mutex
// ============================================================================

//! ## Overview
//! The engine never logs directly; it calls into three optional sinks. This
//! mirrors the teacher's `RunStateStore`/`ArtifactSink` shape: a trait the
//! host implements for production, a cheap no-op default, and an in-memory
//! reference implementation used by tests and the CLI demo. There is no
//! dependency on a logging framework anywhere in this crate — structured
//! records are the unit of observability, not formatted log lines.

use std::sync::Mutex;

use crate::identifiers::FlowName;
use crate::identifiers::NodeName;
use crate::identifiers::StageName;
use crate::outcome::OutcomeKind;

/// Where a fanout module ran: the primary path or the shadow path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// A module counted toward the stage's response.
    Primary,
    /// A module run only for comparison; its outcome never reaches a join.
    Shadow,
}

/// Dimensions attached to a single metrics observation.
#[derive(Debug, Clone)]
pub struct MetricDimensions {
    /// Flow the observation belongs to.
    pub flow: FlowName,
    /// Registered module type, when the observation concerns a module.
    pub module_type: Option<String>,
    /// The recorded outcome kind.
    pub outcome_kind: OutcomeKind,
    /// Whether this was a shadow-path observation.
    pub is_shadow: bool,
}

/// Receives flow/stage/module-type histogram and counter observations.
pub trait MetricsSink: Send + Sync {
    /// Records a single node or fanout-module completion.
    fn record_outcome(&self, dimensions: &MetricDimensions, elapsed_micros: u64);

    /// Records a skip with its reason code.
    fn record_skip(&self, dimensions: &MetricDimensions, reason_code: &str);
}

/// Receives nested trace activity spans.
pub trait TraceSink: Send + Sync {
    /// Records one completed span.
    fn record_span(&self, span: &TraceSpan);
}

/// A single completed trace span.
#[derive(Debug, Clone)]
pub struct TraceSpan {
    /// Owning flow.
    pub flow: FlowName,
    /// Compiled plan hash, hex-encoded.
    pub plan_hash: String,
    /// Config version active for the request.
    pub config_version: u64,
    /// Node name, when the span concerns a plan node.
    pub node_name: Option<NodeName>,
    /// Stage name, when the span concerns stage fanout.
    pub stage_name: Option<StageName>,
    /// Registered module type, when applicable.
    pub module_type: Option<String>,
    /// The recorded outcome kind.
    pub outcome_kind: OutcomeKind,
    /// The recorded outcome code.
    pub outcome_code: String,
    /// Which path produced this span.
    pub execution_path: ExecutionPath,
    /// Configured shadow sampling rate, when applicable.
    pub shadow_sample_bps: Option<u16>,
}

/// A no-op `MetricsSink`; the default when no host backend is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_outcome(&self, _dimensions: &MetricDimensions, _elapsed_micros: u64) {}

    fn record_skip(&self, _dimensions: &MetricDimensions, _reason_code: &str) {}
}

/// A no-op `TraceSink`; the default when no host backend is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn record_span(&self, _span: &TraceSpan) {}
}

/// One row of a per-request explain trail: a node execution or a stage
/// fanout module execution.
#[derive(Debug, Clone)]
pub struct ExplainEntry {
    /// Node or module id this entry describes.
    pub name: String,
    /// Stage name, when this entry came from fanout.
    pub stage_name: Option<StageName>,
    /// Microseconds since the request started when execution began.
    pub started_at_micros: u64,
    /// Microseconds since the request started when execution ended.
    pub ended_at_micros: u64,
    /// The gate decision code, when a gate was evaluated.
    pub gate_code: Option<String>,
    /// The selector name that produced the gate decision, when applicable.
    pub selector_name: Option<String>,
    /// True when the result came from a test override rather than the catalog.
    pub is_override: bool,
    /// True when the result came from the memo table rather than invocation.
    pub is_memo_hit: bool,
    /// The recorded outcome kind.
    pub outcome_kind: OutcomeKind,
    /// The recorded outcome code.
    pub outcome_code: String,
}

/// Per-request ordered explain record, exposed to hosts after execution.
#[derive(Debug, Clone)]
pub struct ExecExplainRecord {
    /// The executed flow.
    pub flow_name: FlowName,
    /// The compiled plan's stable hash, hex-encoded.
    pub plan_hash: String,
    /// Overlays applied to produce this request's patch evaluation, as display strings.
    pub overlays_applied: Vec<String>,
    /// One entry per executed plan node, in execution order.
    pub nodes: Vec<ExplainEntry>,
    /// One entry per stage fanout module (primary and shadow), in execution order.
    pub stage_modules: Vec<ExplainEntry>,
}

/// Receives explain entries as a request executes; active only when attached.
pub trait ExplainSink: Send + Sync {
    /// Appends a node execution entry.
    fn record_node(&self, entry: ExplainEntry);

    /// Appends a stage fanout module entry.
    fn record_stage_module(&self, entry: ExplainEntry);
}

/// In-memory `ExplainSink` used by tests and the CLI demo to print a
/// human-readable run trace after a request completes.
#[derive(Debug, Default)]
pub struct InMemoryExplainCollector {
    nodes: Mutex<Vec<ExplainEntry>>,
    stage_modules: Mutex<Vec<ExplainEntry>>,
}

impl InMemoryExplainCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the collected entries into a finished [`ExecExplainRecord`].
    #[must_use]
    pub fn into_record(self, flow_name: FlowName, plan_hash: String, overlays_applied: Vec<String>) -> ExecExplainRecord {
        ExecExplainRecord {
            flow_name,
            plan_hash,
            overlays_applied,
            nodes: self.nodes.into_inner().unwrap_or_default(),
            stage_modules: self.stage_modules.into_inner().unwrap_or_default(),
        }
    }
}

impl ExplainSink for InMemoryExplainCollector {
    fn record_node(&self, entry: ExplainEntry) {
        if let Ok(mut nodes) = self.nodes.lock() {
            nodes.push(entry);
        }
    }

    fn record_stage_module(&self, entry: ExplainEntry) {
        if let Ok(mut stage_modules) = self.stage_modules.lock() {
            stage_modules.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ExplainEntry {
        ExplainEntry {
            name: name.to_string(),
            stage_name: None,
            started_at_micros: 0,
            ended_at_micros: 1,
            gate_code: None,
            selector_name: None,
            is_override: false,
            is_memo_hit: false,
            outcome_kind: OutcomeKind::Ok,
            outcome_code: "OK".to_string(),
        }
    }

    #[test]
    fn collector_preserves_insertion_order() {
        let collector = InMemoryExplainCollector::new();
        collector.record_node(entry("a"));
        collector.record_node(entry("b"));
        let record = collector.into_record(FlowName::new("checkout"), "deadbeef".to_string(), vec!["Base".to_string()]);
        let names: Vec<_> = record.nodes.iter().map(|node| node.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
