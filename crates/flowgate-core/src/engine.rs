// flowgate-core/src/engine.rs
// ============================================================================
// Module: Execution Engine
// Description: Walks a compiled plan template node by node for one request.
// Purpose: The single entry point that turns a request into a total outcome.
// Dependencies: crate::{plan, patch, context, fanout, module, interfaces}
// ============================================================================

//! ## Overview
//! [`execute`] is the only entry point: deadline-check, cancel-check,
//! execute, record, advance, once per node, triggering stage fanout on the
//! first node whose stage differs from the previous one. The engine is
//! single-threaded per request; the only concurrency is inside a stage
//! fanout (see `fanout`).

use std::time::Instant as StdInstant;

use gate_logic::SelectorEval;
use serde_json::Value;

use crate::context::FlowContext;
use crate::context::TestOverride;
use crate::error::guard_call;
use crate::fanout::LimiterCapacities;
use crate::fanout::run_primary;
use crate::fanout::run_shadow;
use crate::interfaces::JoinRegistry;
use crate::interfaces::ModuleCatalog;
use crate::limiter::LimiterRegistry;
use crate::module::ModuleContext;
use crate::observability::ExplainEntry;
use crate::observability::MetricsSink;
use crate::outcome::CODE_UNHANDLED_EXCEPTION;
use crate::outcome::Outcome;
use crate::plan::PlanNodeKind;
use crate::plan::PlanTemplate;

/// The collaborators the engine needs beyond the plan and context.
pub struct EngineServices<'a> {
    /// Resolves step module types to invocable instances.
    pub module_catalog: &'a dyn ModuleCatalog,
    /// Resolves join node names to invocable reductions.
    pub join_registry: &'a dyn JoinRegistry,
    /// Resolves gate selector names.
    pub selectors: &'a dyn SelectorEval,
    /// Process-global bulkhead limiter registry.
    pub limiter: &'a LimiterRegistry,
    /// Bulkhead capacity lookup for the active config snapshot.
    pub capacities: &'a dyn LimiterCapacities,
    /// Metrics sink; pass `&NoopMetricsSink` when unattached.
    pub metrics: &'a dyn MetricsSink,
}

/// Executes `plan` against `ctx`, returning the final node's outcome.
///
/// # Panics
///
/// Panics if the last node has no recorded outcome after the loop — this
/// can only happen if `plan` was not produced by [`PlanTemplate::compile`],
/// which guarantees the last node is a join.
pub async fn execute(plan: &PlanTemplate, ctx: &mut FlowContext, services: &EngineServices<'_>) -> Outcome<Value> {
    let mut current_stage_name = None;

    for (index, node) in plan.nodes().iter().enumerate() {
        if ctx.is_deadline_exceeded() {
            return Outcome::timeout();
        }
        if ctx.is_canceled() {
            return Outcome::canceled();
        }

        if let Some(stage_name) = &node.stage_name {
            if current_stage_name.as_ref() != Some(stage_name) {
                run_stage_fanout(stage_name, ctx, services).await;
                current_stage_name = Some(stage_name.clone());
            }
        }

        let started_at = StdInstant::now();
        let outcome = match &node.kind {
            PlanNodeKind::Step {
                module_type,
            } => execute_step(node.name.as_str(), module_type.as_str(), ctx, services).await,
            PlanNodeKind::Join => execute_join(&node.name, ctx, services).await,
        };

        record_node_explain(ctx, node.name.as_str(), started_at, &outcome);
        ctx.record_node_outcome(index, outcome);
    }

    let last_index = plan.nodes().len().saturating_sub(1);
    ctx.node_outcome(last_index).cloned().unwrap_or_else(|| {
        unreachable!("compiled plans always end in a join whose outcome is recorded")
    })
}

async fn run_stage_fanout(stage_name: &crate::identifiers::StageName, ctx: &mut FlowContext, services: &EngineServices<'_>) {
    let Some(stage) = ctx.patch.stage(stage_name).cloned() else {
        return;
    };
    run_primary(&stage, ctx, services.module_catalog, services.selectors, services.limiter, services.capacities, services.metrics).await;
    run_shadow(&stage, ctx, services.module_catalog, services.selectors, services.limiter, services.capacities, services.metrics).await;
}

async fn execute_step(node_name: &str, module_type: &str, ctx: &FlowContext, services: &EngineServices<'_>) -> Outcome<Value> {
    if let Some(test_override) = ctx.override_for(node_name) {
        return match test_override {
            TestOverride::Fixed(outcome) => outcome,
            TestOverride::Compute(compute) => compute(),
        };
    }
    let module_type = crate::identifiers::ModuleType::new(module_type);
    let Some(instance) = services.module_catalog.create(&module_type) else {
        return Outcome::error(CODE_UNHANDLED_EXCEPTION);
    };
    let module_context = ModuleContext {
        args: &ctx.attrs,
        deadline: ctx.deadline,
        cancel_flag: ctx.cancellation_handle(),
        user_id: ctx.user_id.as_deref(),
        qos_tier: ctx.qos_tier.as_str(),
    };
    match guard_call(instance.execute(&module_context)).await {
        Ok(outcome) => outcome,
        Err(_fault) => translate_deadline_or_cancel(ctx),
    }
}

async fn execute_join(node_name: &crate::identifiers::NodeName, ctx: &FlowContext, services: &EngineServices<'_>) -> Outcome<Value> {
    if let Some(test_override) = ctx.override_for(node_name.as_str()) {
        return match test_override {
            TestOverride::Fixed(outcome) => outcome,
            TestOverride::Compute(compute) => compute(),
        };
    }
    let Some(join) = services.join_registry.join_for(node_name) else {
        return Outcome::error(CODE_UNHANDLED_EXCEPTION);
    };
    match guard_call(join.reduce(ctx)).await {
        Ok(outcome) => outcome,
        Err(_fault) => translate_deadline_or_cancel(ctx),
    }
}

/// Maps a module/join fault that escaped `guard_call` to the outcome it
/// should surface, preferring deadline/cancellation explanations over a
/// generic unhandled-exception code when either applies.
pub(crate) fn translate_deadline_or_cancel(ctx: &FlowContext) -> Outcome<Value> {
    if ctx.is_deadline_exceeded() {
        Outcome::timeout()
    } else if ctx.is_canceled() {
        Outcome::canceled()
    } else {
        Outcome::error(CODE_UNHANDLED_EXCEPTION)
    }
}

fn record_node_explain(ctx: &FlowContext, name: &str, started_at_elapsed: StdInstant, outcome: &Outcome<Value>) {
    let Some(sink) = ctx.explain() else {
        return;
    };
    let started_at_micros = ctx.elapsed_micros().saturating_sub(u64::try_from(started_at_elapsed.elapsed().as_micros()).unwrap_or(0));
    sink.record_node(ExplainEntry {
        name: name.to_string(),
        stage_name: None,
        started_at_micros,
        ended_at_micros: ctx.elapsed_micros(),
        gate_code: None,
        selector_name: None,
        is_override: false,
        is_memo_hit: false,
        outcome_kind: outcome.kind,
        outcome_code: outcome.code.clone(),
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::context::FlowContext;
    use crate::outcome::OutcomeKind;
    use crate::fanout::FixedCapacity;
    use crate::identifiers::FlowName;
    use crate::identifiers::ModuleType;
    use crate::identifiers::NodeName;
    use crate::identifiers::QosTier;
    use crate::interfaces::ModuleSignature;
    use crate::interfaces::StaticJoinRegistry;
    use crate::interfaces::StaticModuleCatalog;
    use crate::module::Join;
    use crate::module::Module;
    use crate::patch::FlowPatchEvaluation;
    use crate::patch::OverlayRecord;
    use crate::plan::FlowBlueprint;
    use crate::plan::PlanNode;

    struct ConstModule(i64);

    #[async_trait::async_trait]
    impl Module for ConstModule {
        async fn execute(&self, _ctx: &ModuleContext<'_>) -> Outcome<Value> {
            Outcome::ok("OK", json!(self.0))
        }
    }

    struct SumJoin;

    #[async_trait::async_trait]
    impl Join for SumJoin {
        async fn reduce(&self, ctx: &FlowContext) -> Outcome<Value> {
            let total = ctx.node_outcome(0).and_then(|o| o.value.as_ref()).and_then(Value::as_i64).unwrap_or(0);
            Outcome::ok("OK", json!(total))
        }
    }

    struct NoopSelectors;

    impl SelectorEval for NoopSelectors {
        fn eval(&self, name: &str, _args: Option<&Value>, _ctx: &gate_logic::GateEvalContext<'_>) -> Result<bool, gate_logic::SelectorFault> {
            Err(gate_logic::SelectorFault {
                name: name.to_string(),
                reason: "no selectors registered".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn executes_step_then_join_and_returns_final_outcome() {
        let blueprint = FlowBlueprint {
            nodes: vec![
                PlanNode {
                    name: NodeName::new("compute"),
                    stage_name: None,
                    kind: PlanNodeKind::Step {
                        module_type: ModuleType::new("const_module"),
                    },
                    args_type: "Unit".to_string(),
                    output_type: "i64".to_string(),
                },
                PlanNode {
                    name: NodeName::new("final"),
                    stage_name: None,
                    kind: PlanNodeKind::Join,
                    args_type: "Unit".to_string(),
                    output_type: "Resp".to_string(),
                },
            ],
            response_type: "Resp".to_string(),
        };
        let plan = PlanTemplate::compile(blueprint).unwrap();

        let catalog = StaticModuleCatalog::new().with_module(
            ModuleType::new("const_module"),
            ModuleSignature {
                args_type: "Unit".to_string(),
                output_type: "i64".to_string(),
            },
            Arc::new(ConstModule(7)),
        );
        let joins = StaticJoinRegistry::new().with_join(NodeName::new("final"), Arc::new(SumJoin));
        let limiter = LimiterRegistry::new();
        let capacities = FixedCapacity(8);
        let metrics = crate::observability::NoopMetricsSink;
        let selectors = NoopSelectors;

        let services = EngineServices {
            module_catalog: &catalog,
            join_registry: &joins,
            selectors: &selectors,
            limiter: &limiter,
            capacities: &capacities,
            metrics: &metrics,
        };

        let patch = Arc::new(FlowPatchEvaluation {
            flow_name: FlowName::new("demo"),
            stages: Vec::new(),
            overlays_applied: vec![OverlayRecord::Base],
        });

        let mut ctx = FlowContext::new(
            Instant::now() + std::time::Duration::from_secs(5),
            plan.nodes().len(),
            None,
            Vec::new(),
            Value::Null,
            1,
            QosTier::new("standard"),
            patch,
        );

        let outcome = execute(&plan, &mut ctx, &services).await;
        assert_eq!(outcome.value, Some(json!(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadline_short_circuits_to_timeout() {
        let blueprint = FlowBlueprint {
            nodes: vec![PlanNode {
                name: NodeName::new("final"),
                stage_name: None,
                kind: PlanNodeKind::Join,
                args_type: "Unit".to_string(),
                output_type: "Resp".to_string(),
            }],
            response_type: "Resp".to_string(),
        };
        let plan = PlanTemplate::compile(blueprint).unwrap();
        let catalog = StaticModuleCatalog::new();
        let joins = StaticJoinRegistry::new().with_join(NodeName::new("final"), Arc::new(SumJoin));
        let limiter = LimiterRegistry::new();
        let capacities = FixedCapacity(8);
        let metrics = crate::observability::NoopMetricsSink;
        let selectors = NoopSelectors;
        let services = EngineServices {
            module_catalog: &catalog,
            join_registry: &joins,
            selectors: &selectors,
            limiter: &limiter,
            capacities: &capacities,
            metrics: &metrics,
        };
        let patch = Arc::new(FlowPatchEvaluation {
            flow_name: FlowName::new("demo"),
            stages: Vec::new(),
            overlays_applied: vec![OverlayRecord::Base],
        });
        let mut ctx = FlowContext::new(Instant::now(), plan.nodes().len(), None, Vec::new(), Value::Null, 1, QosTier::new("standard"), patch);
        tokio::time::advance(std::time::Duration::from_millis(1)).await;
        let outcome = execute(&plan, &mut ctx, &services).await;
        assert_eq!(outcome.kind, OutcomeKind::Timeout);
    }
}
