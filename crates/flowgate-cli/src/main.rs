// flowgate-cli/src/main.rs
// ============================================================================
// Module: Flowgate CLI Entry Point
// Description: Command dispatcher for patch validation and demo flow runs.
// Purpose: Provide a small host binary that wires the static registries and
//          drives a seeded flow end to end.
// Dependencies: clap, flowgate-core, flowgate-config, gate-logic, tokio
// ============================================================================

//! ## Overview
//! This binary is a demo host, not a production server: it registers one
//! seed flow in-memory and either validates a patch document against it or
//! executes it and prints the resulting outcome and explain trace.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use flowgate_config::RuntimeConfig;
use flowgate_core::FlowBlueprint;
use flowgate_core::FlowContext;
use flowgate_core::FlowName;
use flowgate_core::InMemoryExplainCollector;
use flowgate_core::Join;
use flowgate_core::ModuleContext;
use flowgate_core::ModuleSignature;
use flowgate_core::ModuleType;
use flowgate_core::NodeName;
use flowgate_core::NoopMetricsSink;
use flowgate_core::Outcome;
use flowgate_core::PlanNode;
use flowgate_core::PlanNodeKind;
use flowgate_core::PlanTemplate;
use flowgate_core::QosTier;
use flowgate_core::StageName;
use flowgate_core::StaticFlowRegistry;
use flowgate_core::StaticJoinRegistry;
use flowgate_core::StaticModuleCatalog;
use flowgate_core::engine;
use flowgate_core::fanout::FixedCapacity;
use gate_logic::GateEvalContext;
use gate_logic::SelectorEval;
use gate_logic::SelectorFault;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio::time::Instant;

/// Name of the demo flow this binary registers and executes.
const SEED_FLOW: &str = "checkout";
/// Name of the demo flow's single fanout stage.
const SEED_STAGE: &str = "candidate_gen";

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "flowgate", arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a patch document against the seed flow's registrations.
    Validate {
        /// Path to a patch JSON document.
        patch: PathBuf,
    },
    /// Evaluate a patch and execute the seed flow under it.
    Run {
        /// Path to a patch JSON document.
        patch: PathBuf,
        /// Path to a `RuntimeConfig` TOML document; omit to use dev defaults.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    /// The patch or config file at `path` could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The patch document failed structural or semantic validation.
    #[error("patch failed validation: {0} error(s)")]
    Invalid(usize),
    /// The runtime config document failed to load.
    #[error(transparent)]
    RuntimeConfig(#[from] flowgate_config::RuntimeConfigError),
    /// The patch document failed to evaluate against the seed flow.
    #[error(transparent)]
    Patch(#[from] flowgate_core::PatchError),
    /// The seed blueprint failed to compile into a plan template.
    #[error(transparent)]
    Plan(#[from] flowgate_core::PlanError),
    /// Writing a result line failed.
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Validate { patch } => run_validate(&patch),
        Command::Run { patch, config } => run_execute(&patch, config.as_deref()).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = write_stderr_line(&format!("flowgate: {error}"));
            ExitCode::FAILURE
        }
    }
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Validates a patch document against the seed flow and prints each finding.
fn run_validate(patch_path: &std::path::Path) -> Result<(), CliError> {
    let raw = read_file(patch_path)?;
    let flows = seed_flow_registry();
    let modules = seed_module_catalog();
    let report = flowgate_config::validate(&raw, &flows, &modules);
    for finding in &report.findings {
        write_stdout_line(&format!("[{}] {} at {}: {}", format_severity(finding.severity), finding.code, finding.path, finding.message))?;
    }
    if report.has_errors() {
        return Err(CliError::Invalid(report.findings.len()));
    }
    write_stdout_line("patch is valid")?;
    Ok(())
}

/// Evaluates a patch against the seed flow and executes it end to end.
async fn run_execute(patch_path: &std::path::Path, config_path: Option<&std::path::Path>) -> Result<(), CliError> {
    let raw = read_file(patch_path)?;
    let runtime_config = match config_path {
        Some(path) => RuntimeConfig::from_path(path)?,
        None => RuntimeConfig::default(),
    };

    let flow_name = FlowName::new(SEED_FLOW);
    let evaluation = flowgate_core::evaluate_patch(&flow_name, &raw, &std::collections::HashMap::new())?;
    let template = PlanTemplate::compile(seed_blueprint())?;

    let modules = seed_module_catalog();
    let joins = seed_join_registry();
    let limiter = flowgate_core::LimiterRegistry::new();
    let capacities = FixedCapacity(runtime_config.default_limiter_capacity);
    let metrics = NoopMetricsSink;
    let selectors = NoopSelectors;

    let overlays_applied: Vec<String> = evaluation.overlays_applied.iter().map(format_overlay).collect();
    let plan_hash = template.plan_hash.value.clone();
    let explain = Arc::new(InMemoryExplainCollector::new());
    let deadline = Instant::now() + runtime_config.default_deadline();
    let mut ctx = FlowContext::new(deadline, template.blueprint.nodes.len(), None, Vec::new(), json!({}), 1, QosTier::new("standard"), Arc::new(evaluation))
        .with_explain(explain.clone());

    let services = engine::EngineServices {
        module_catalog: &modules,
        join_registry: &joins,
        selectors: &selectors,
        limiter: &limiter,
        capacities: &capacities,
        metrics: &metrics,
    };

    let outcome = engine::execute(&template, &mut ctx, &services).await;
    let value_display = outcome.value.as_ref().map_or_else(|| "null".to_string(), ToString::to_string);
    write_stdout_line(&format!("outcome: {} code={} value={}", format_outcome_kind(outcome.kind), outcome.code, value_display))?;
    drop(ctx);
    if let Ok(collector) = Arc::try_unwrap(explain) {
        let record = collector.into_record(flow_name, plan_hash, overlays_applied);
        write_stdout_line(&format!("nodes recorded: {}", record.nodes.len()))?;
        write_stdout_line(&format!("stage modules recorded: {}", record.stage_modules.len()))?;
    }
    Ok(())
}

/// Renders a validator severity as a short label.
fn format_severity(severity: flowgate_config::Severity) -> &'static str {
    match severity {
        flowgate_config::Severity::Error => "ERROR",
        flowgate_config::Severity::Warn => "WARN",
        flowgate_config::Severity::Info => "INFO",
    }
}

/// Renders an outcome kind as a short label.
fn format_outcome_kind(kind: flowgate_core::OutcomeKind) -> &'static str {
    match kind {
        flowgate_core::OutcomeKind::Ok => "OK",
        flowgate_core::OutcomeKind::Error => "ERROR",
        flowgate_core::OutcomeKind::Timeout => "TIMEOUT",
        flowgate_core::OutcomeKind::Skipped => "SKIPPED",
        flowgate_core::OutcomeKind::Fallback => "FALLBACK",
        flowgate_core::OutcomeKind::Canceled => "CANCELED",
        flowgate_core::OutcomeKind::Unspecified => "UNSPECIFIED",
    }
}

/// Renders an applied overlay record for display.
fn format_overlay(overlay: &flowgate_core::OverlayRecord) -> String {
    match overlay {
        flowgate_core::OverlayRecord::Base => "base".to_string(),
        flowgate_core::OverlayRecord::Experiment { layer, variant } => format!("experiment:{}/{}", layer.as_str(), variant.as_str()),
        flowgate_core::OverlayRecord::Emergency => "emergency".to_string(),
    }
}

/// Reads a file into a string, wrapping I/O failures with its path.
fn read_file(path: &std::path::Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Registers the demo flow's stage list and blueprint.
fn seed_flow_registry() -> StaticFlowRegistry {
    StaticFlowRegistry::new().with_flow(FlowName::new(SEED_FLOW), vec![StageName::new(SEED_STAGE)], seed_blueprint())
}

/// A single-stage, single-join blueprint used to demonstrate a full request.
fn seed_blueprint() -> FlowBlueprint {
    FlowBlueprint {
        nodes: vec![
            PlanNode {
                name: NodeName::new("reduce_candidates"),
                stage_name: Some(StageName::new(SEED_STAGE)),
                kind: PlanNodeKind::Join,
                args_type: "Unit".to_string(),
                output_type: "Candidates".to_string(),
            },
        ],
        response_type: "Candidates".to_string(),
    }
}

/// Registers the demo's single `scorer` module type.
fn seed_module_catalog() -> StaticModuleCatalog {
    StaticModuleCatalog::new().with_module(
        ModuleType::new("scorer"),
        ModuleSignature {
            args_type: "ScorerArgs".to_string(),
            output_type: "Score".to_string(),
        },
        Arc::new(ScorerModule),
    )
}

/// Registers the demo's single join implementation.
fn seed_join_registry() -> StaticJoinRegistry {
    StaticJoinRegistry::new().with_join(NodeName::new("reduce_candidates"), Arc::new(CollectJoin))
}

/// A placeholder scoring module; always succeeds with a constant score.
struct ScorerModule;

#[async_trait::async_trait]
impl flowgate_core::Module for ScorerModule {
    async fn execute(&self, _ctx: &ModuleContext<'_>) -> Outcome<Value> {
        Outcome::ok("OK", json!({"score": 1}))
    }
}

/// A placeholder join; always succeeds with an empty candidate list.
struct CollectJoin;

#[async_trait::async_trait]
impl Join for CollectJoin {
    async fn reduce(&self, _ctx: &FlowContext) -> Outcome<Value> {
        Outcome::ok("OK", json!({"candidates": []}))
    }
}

/// A selector registry with no registered selectors; any gate referencing
/// a selector is reported as a fault rather than silently denying.
struct NoopSelectors;

impl SelectorEval for NoopSelectors {
    fn eval(&self, name: &str, _args: Option<&Value>, _ctx: &GateEvalContext<'_>) -> Result<bool, SelectorFault> {
        Err(SelectorFault {
            name: name.to_string(),
            reason: "this demo host registers no selectors".to_string(),
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::use_debug,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "test-only assertions"
)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_patch(contents: &serde_json::Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp patch file");
        write!(file, "{contents}").expect("write temp patch file");
        file
    }

    fn seed_patch() -> serde_json::Value {
        json!({
            "schemaVersion": "v1",
            "flows": {
                SEED_FLOW: {
                    "stages": {
                        SEED_STAGE: {
                            "fanoutMax": 2,
                            "modules": [
                                {"id": "top_scorer", "use": "scorer", "with": {}},
                            ]
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn validate_accepts_a_well_formed_seed_patch() {
        let file = write_patch(&seed_patch());
        assert!(run_validate(file.path()).is_ok());
    }

    #[test]
    fn validate_rejects_an_unregistered_flow() {
        let file = write_patch(&json!({
            "schemaVersion": "v1",
            "flows": { "unknown_flow": { "stages": {} } }
        }));
        assert!(matches!(run_validate(file.path()), Err(CliError::Invalid(_))));
    }

    #[test]
    fn validate_surfaces_read_failures() {
        let missing = std::path::Path::new("/nonexistent/flowgate-cli-test-patch.json");
        assert!(matches!(run_validate(missing), Err(CliError::Read { .. })));
    }

    #[tokio::test]
    async fn run_executes_the_seed_flow_to_completion() {
        let file = write_patch(&seed_patch());
        assert!(run_execute(file.path(), None).await.is_ok());
    }

    #[test]
    fn format_overlay_renders_each_variant() {
        assert_eq!(format_overlay(&flowgate_core::OverlayRecord::Base), "base");
        assert_eq!(format_overlay(&flowgate_core::OverlayRecord::Emergency), "emergency");
    }
}
