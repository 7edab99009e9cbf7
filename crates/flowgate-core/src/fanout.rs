// flowgate-core/src/fanout.rs
// ============================================================================
// Module: Stage Fanout
// Description: Gate/enable prefilter, priority trim, bulkhead, memo, invoke.
// Purpose: Run a stage's modules the way the engine contract requires.
// Dependencies: futures_util, gate_logic, crate::{patch, limiter, memo, context}
// ============================================================================

//! ## Overview
//! [`run_primary`] and [`run_shadow`] implement the eight-step fanout
//! algorithm: prefilter on enable/gate, stable-sort by priority, trim to
//! `fanoutMax`, acquire a bulkhead lease, consult the memo table, invoke, and
//! record. Primary modules run concurrently once leased; the engine awaits
//! all of them before leaving the stage. Shadow modules run afterward, each
//! gated additionally by deterministic FNV-1a bucket sampling.

use futures_util::future::join_all;
use gate_logic::SelectorEval;
use serde_json::Value;

use crate::context::FlowContext;
use crate::context::TestOverride;
use crate::error::guard_call;
use crate::identifiers::LimitKey;
use crate::identifiers::ModuleId;
use crate::interfaces::ModuleCatalog;
use crate::limiter::LimiterRegistry;
use crate::memo::MemoLookupKey;
use crate::memo::MemoTable;
use crate::module::ModuleContext;
use crate::observability::ExecutionPath;
use crate::observability::ExplainEntry;
use crate::observability::MetricDimensions;
use crate::observability::MetricsSink;
use crate::outcome::CODE_BULKHEAD_REJECTED;
use crate::outcome::CODE_DISABLED;
use crate::outcome::CODE_FANOUT_TRIM;
use crate::outcome::CODE_SHADOW_NOT_SAMPLED;
use crate::outcome::CODE_UNHANDLED_EXCEPTION;
use crate::outcome::Outcome;
use crate::outcome::OutcomeKind;
use crate::patch::StageModulePatch;
use crate::patch::StagePatch;

/// Bulkhead capacity for a limit key, resolved from a `ConfigSnapshot`.
pub trait LimiterCapacities {
    /// Returns the configured capacity for `limit_key`, defaulting to an
    /// unbounded-in-practice value when the key has no explicit entry.
    fn capacity_for(&self, limit_key: &LimitKey) -> usize;
}

/// Flat capacity table used by the CLI demo and tests.
pub struct FixedCapacity(pub usize);

impl LimiterCapacities for FixedCapacity {
    fn capacity_for(&self, _limit_key: &LimitKey) -> usize {
        self.0
    }
}

/// A completed stage fanout's record of which modules ran and which were
/// skipped, with reason codes, for a single execution path.
#[derive(Debug, Default, Clone)]
pub struct StageFanoutSnapshot {
    /// Module ids that were invoked (whether or not they succeeded).
    pub enabled: Vec<ModuleId>,
    /// Module ids that were skipped, with their reason code.
    pub skipped: Vec<(ModuleId, String)>,
}

enum PrefilterResult<'p> {
    Candidate(&'p StageModulePatch),
    Skipped(&'p StageModulePatch, String),
}

fn prefilter<'p>(modules: impl Iterator<Item = &'p StageModulePatch>, ctx: &FlowContext, selectors: &dyn SelectorEval) -> Vec<PrefilterResult<'p>> {
    let gate_ctx = ctx.gate_eval_context();
    modules
        .map(|module| {
            if !module.enabled {
                return PrefilterResult::Skipped(module, CODE_DISABLED.to_string());
            }
            let decision = gate_logic::evaluate(module.gate.as_ref(), selectors, &gate_ctx);
            if decision.allowed {
                PrefilterResult::Candidate(module)
            } else {
                PrefilterResult::Skipped(module, decision.code)
            }
        })
        .collect()
}

/// Runs the primary-path fanout algorithm for one stage.
pub async fn run_primary(
    stage: &StagePatch,
    ctx: &mut FlowContext,
    catalog: &dyn ModuleCatalog,
    selectors: &dyn SelectorEval,
    limiter: &LimiterRegistry,
    capacities: &dyn LimiterCapacities,
    metrics: &dyn MetricsSink,
) -> StageFanoutSnapshot {
    let prefiltered = prefilter(stage.primary_modules(), ctx, selectors);
    let mut snapshot = StageFanoutSnapshot::default();
    let mut candidates: Vec<&StageModulePatch> = Vec::new();
    for result in prefiltered {
        match result {
            PrefilterResult::Candidate(module) => candidates.push(module),
            PrefilterResult::Skipped(module, code) => {
                record_skip(&mut snapshot, metrics, ctx, module, &code, ExecutionPath::Primary);
            }
        }
    }

    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

    let fanout_max = stage.fanout_max.map_or(usize::MAX, usize::from);
    let split_at = candidates.len().min(fanout_max);
    let trimmed = candidates.split_off(split_at);
    for module in trimmed {
        record_skip(&mut snapshot, metrics, ctx, module, CODE_FANOUT_TRIM, ExecutionPath::Primary);
    }

    let started_at = std::time::Instant::now();
    let outcomes = invoke_candidates(candidates.clone(), ctx, catalog, limiter, capacities, false).await;
    for (module, outcome) in candidates.into_iter().zip(outcomes) {
        metrics.record_outcome(
            &MetricDimensions {
                flow: ctx.patch.flow_name.clone(),
                module_type: Some(module.module_type.as_str().to_string()),
                outcome_kind: outcome.kind,
                is_shadow: false,
            },
            0,
        );
        record_module_explain(ctx, &stage.stage_name, module, started_at, &outcome);
        snapshot.enabled.push(module.module_id.clone());
        ctx.record_module_outcome(module.module_id.clone(), outcome);
    }
    snapshot
}

/// Runs the shadow-path fanout algorithm for one stage, after primary has completed.
pub async fn run_shadow(
    stage: &StagePatch,
    ctx: &mut FlowContext,
    catalog: &dyn ModuleCatalog,
    selectors: &dyn SelectorEval,
    limiter: &LimiterRegistry,
    capacities: &dyn LimiterCapacities,
    metrics: &dyn MetricsSink,
) -> StageFanoutSnapshot {
    let prefiltered = prefilter(stage.shadow_modules(), ctx, selectors);
    let mut snapshot = StageFanoutSnapshot::default();
    let mut sampled: Vec<&StageModulePatch> = Vec::new();
    for result in prefiltered {
        match result {
            PrefilterResult::Candidate(module) => {
                if is_sampled(ctx.user_id.as_deref(), module.module_id.as_str(), module.shadow_sample_bps) {
                    sampled.push(module);
                } else {
                    record_skip(&mut snapshot, metrics, ctx, module, CODE_SHADOW_NOT_SAMPLED, ExecutionPath::Shadow);
                }
            }
            PrefilterResult::Skipped(module, code) => {
                record_skip(&mut snapshot, metrics, ctx, module, &code, ExecutionPath::Shadow);
            }
        }
    }

    let started_at = std::time::Instant::now();
    let outcomes = invoke_candidates(sampled.clone(), ctx, catalog, limiter, capacities, true).await;
    for (module, outcome) in sampled.into_iter().zip(outcomes) {
        metrics.record_outcome(
            &MetricDimensions {
                flow: ctx.patch.flow_name.clone(),
                module_type: Some(module.module_type.as_str().to_string()),
                outcome_kind: outcome.kind,
                is_shadow: true,
            },
            0,
        );
        record_module_explain(ctx, &stage.stage_name, module, started_at, &outcome);
        snapshot.enabled.push(module.module_id.clone());
        // Shadow outcomes never feed a join; they are recorded only in the snapshot.
    }
    snapshot
}

fn record_module_explain(ctx: &FlowContext, stage_name: &crate::identifiers::StageName, module: &StageModulePatch, started_at: std::time::Instant, outcome: &Outcome<Value>) {
    let Some(sink) = ctx.explain() else {
        return;
    };
    let ended_at_micros = ctx.elapsed_micros();
    let started_at_micros = ended_at_micros.saturating_sub(u64::try_from(started_at.elapsed().as_micros()).unwrap_or(0));
    sink.record_stage_module(ExplainEntry {
        name: module.module_id.to_string(),
        stage_name: Some(stage_name.clone()),
        started_at_micros,
        ended_at_micros,
        gate_code: None,
        selector_name: None,
        is_override: false,
        is_memo_hit: false,
        outcome_kind: outcome.kind,
        outcome_code: outcome.code.clone(),
    });
}

fn record_skip(snapshot: &mut StageFanoutSnapshot, metrics: &dyn MetricsSink, ctx: &FlowContext, module: &StageModulePatch, code: &str, path: ExecutionPath) {
    metrics.record_skip(
        &MetricDimensions {
            flow: ctx.patch.flow_name.clone(),
            module_type: Some(module.module_type.as_str().to_string()),
            outcome_kind: OutcomeKind::Skipped,
            is_shadow: matches!(path, ExecutionPath::Shadow),
        },
        code,
    );
    snapshot.skipped.push((module.module_id.clone(), code.to_string()));
}

async fn invoke_candidates(
    candidates: Vec<&StageModulePatch>,
    ctx: &FlowContext,
    catalog: &dyn ModuleCatalog,
    limiter: &LimiterRegistry,
    capacities: &dyn LimiterCapacities,
    is_shadow: bool,
) -> Vec<Outcome<Value>> {
    let futures = candidates.into_iter().map(|module| invoke_one(module, ctx, catalog, limiter, capacities, &ctx.memo, is_shadow));
    join_all(futures).await
}

async fn invoke_one(
    module: &StageModulePatch,
    ctx: &FlowContext,
    catalog: &dyn ModuleCatalog,
    limiter: &LimiterRegistry,
    capacities: &dyn LimiterCapacities,
    memo: &MemoTable,
    is_shadow: bool,
) -> Outcome<Value> {
    let limit_key = module.effective_limit_key();
    let capacity = capacities.capacity_for(&limit_key);
    let Some(_lease) = limiter.try_acquire(&limit_key, ctx.config_version, capacity) else {
        return Outcome::skipped(CODE_BULKHEAD_REJECTED);
    };

    let compute = || async { invoke_via_catalog_or_override(module, ctx, catalog).await };

    if let Some(memo_key) = &module.memo_key {
        let lookup_key = MemoLookupKey {
            module_type: module.module_type.clone(),
            memo_key: memo_key.clone(),
            output_type: catalog.signature(&module.module_type).map_or_else(String::new, |signature| signature.output_type),
            is_shadow,
        };
        memo.get_or_compute(&lookup_key, compute).await.as_ref().clone()
    } else {
        compute().await
    }
}

async fn invoke_via_catalog_or_override(module: &StageModulePatch, ctx: &FlowContext, catalog: &dyn ModuleCatalog) -> Outcome<Value> {
    if let Some(test_override) = ctx.override_for(module.module_id.as_str()) {
        return match test_override {
            TestOverride::Fixed(outcome) => outcome,
            TestOverride::Compute(compute) => compute(),
        };
    }
    let Some(instance) = catalog.create(&module.module_type) else {
        return Outcome::error(CODE_UNHANDLED_EXCEPTION);
    };
    let module_context = ModuleContext {
        args: &module.args,
        deadline: ctx.deadline,
        cancel_flag: ctx.cancellation_handle(),
        user_id: ctx.user_id.as_deref(),
        qos_tier: ctx.qos_tier.as_str(),
    };
    match guard_call(instance.execute(&module_context)).await {
        Ok(outcome) => outcome,
        Err(_fault) => crate::engine::translate_deadline_or_cancel(ctx),
    }
}

/// Computes a 0..10000 bucket from `FNV-1a(userId + \0 + moduleId)`, or from a
/// process-seeded counter when no user id is available, and reports whether
/// the bucket falls under the configured sample rate.
fn is_sampled(user_id: Option<&str>, module_id: &str, shadow_sample_bps: u16) -> bool {
    let bucket = match user_id {
        Some(user_id) => fnv1a_bucket(user_id, module_id),
        None => pseudo_random_bucket(),
    };
    bucket < shadow_sample_bps
}

fn fnv1a_bucket(user_id: &str, module_id: &str) -> u16 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET_BASIS;
    for byte in user_id.bytes().chain(std::iter::once(0)).chain(module_id.bytes()) {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    #[expect(clippy::cast_possible_truncation, reason = "modulo 10000 always fits in u16")]
    let bucket = (hash % 10_000) as u16;
    bucket
}

fn pseudo_random_bucket() -> u16 {
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let value = COUNTER.fetch_add(1, Ordering::Relaxed);
    #[expect(clippy::cast_possible_truncation, reason = "modulo 10000 always fits in u16")]
    let bucket = (value.wrapping_mul(2_654_435_761) % 10_000) as u16;
    bucket
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_bucket_is_deterministic() {
        let a = fnv1a_bucket("user-1", "module-a");
        let b = fnv1a_bucket("user-1", "module-a");
        assert_eq!(a, b);
        assert!(a < 10_000);
    }

    #[test]
    fn different_module_ids_usually_differ() {
        let a = fnv1a_bucket("user-1", "module-a");
        let b = fnv1a_bucket("user-1", "module-b");
        assert_ne!(a, b);
    }

    #[test]
    fn zero_sample_rate_never_samples() {
        assert!(!is_sampled(Some("user-1"), "module-a", 0));
    }

    #[test]
    fn full_sample_rate_always_samples() {
        assert!(is_sampled(Some("user-1"), "module-a", 10_000));
    }
}
