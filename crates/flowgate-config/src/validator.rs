// flowgate-config/src/validator.rs
// ============================================================================
// Module: Config Validator
// Description: Pure structural + semantic validation of patch JSON.
// Purpose: Turn untrusted config-patch documents into a typed report before
//          the patch evaluator ever sees them.
// Dependencies: serde_json, gate_logic, flowgate_core::interfaces
// ============================================================================

//! ## Overview
//! [`validate`] never throws for well-formed JSON: every problem, structural
//! or semantic, becomes one [`Finding`] in the returned [`ValidationReport`].
//! A malformed document (not valid JSON, or not an object) short-circuits to
//! a single `CFG_PARSE_ERROR` finding. This mirrors the teacher's
//! `decision-gate-config` validation passes, which likewise collect findings
//! rather than aborting on the first problem.

use std::collections::HashMap;
use std::collections::HashSet;

use flowgate_core::FlowRegistry;
use flowgate_core::ModuleCatalog;
use flowgate_core::ModuleType;
use serde_json::Value;

/// The document was not valid JSON, or its root was not an object.
pub const CFG_PARSE_ERROR: &str = "CFG_PARSE_ERROR";
/// A field appeared at a position the schema does not recognize.
pub const CFG_UNKNOWN_FIELD: &str = "CFG_UNKNOWN_FIELD";
/// `schemaVersion` was missing or not `"v1"`.
pub const CFG_SCHEMA_VERSION_INVALID: &str = "CFG_SCHEMA_VERSION_INVALID";
/// A `flows` key named a flow the registry does not know.
pub const CFG_FLOW_NOT_REGISTERED: &str = "CFG_FLOW_NOT_REGISTERED";
/// `params` carried a field unknown to the flow's declared patch type.
pub const CFG_PARAMS_UNKNOWN_FIELD: &str = "CFG_PARAMS_UNKNOWN_FIELD";
/// `params` failed to bind to the flow's declared patch type.
pub const CFG_PARAMS_BIND_FAILED: &str = "CFG_PARAMS_BIND_FAILED";
/// A `stages` key named a stage the flow's blueprint does not declare.
pub const CFG_STAGE_NOT_REGISTERED: &str = "CFG_STAGE_NOT_REGISTERED";
/// `fanoutMax` was present but not an integer in `0..=8`.
pub const CFG_FANOUT_MAX_INVALID: &str = "CFG_FANOUT_MAX_INVALID";
/// A module id failed the `[a-z0-9_]{1,64}` pattern.
pub const CFG_MODULE_ID_INVALID: &str = "CFG_MODULE_ID_INVALID";
/// A module id appeared more than once within the flow (same or different stage).
pub const CFG_MODULE_ID_DUPLICATE: &str = "CFG_MODULE_ID_DUPLICATE";
/// `use` named a module type the catalog does not know.
pub const CFG_MODULE_TYPE_NOT_REGISTERED: &str = "CFG_MODULE_TYPE_NOT_REGISTERED";
/// `use` was missing.
pub const CFG_MODULE_USE_MISSING: &str = "CFG_MODULE_USE_MISSING";
/// `with` was missing.
pub const CFG_MODULE_WITH_MISSING: &str = "CFG_MODULE_WITH_MISSING";
/// `priority` fell outside the recommended `-1000..=1000` range.
pub const CFG_PRIORITY_OUT_OF_RANGE: &str = "CFG_PRIORITY_OUT_OF_RANGE";
/// A gate expression failed to parse.
pub const CFG_GATE_PARSE_ERROR: &str = "CFG_GATE_PARSE_ERROR";
/// Two experiments declared the same `(layer, variant)` pair.
pub const CFG_EXPERIMENT_DUPLICATE: &str = "CFG_EXPERIMENT_DUPLICATE";
/// An experiment patch touched a module id its layer does not own.
pub const CFG_LAYER_PARAM_LEAK: &str = "CFG_LAYER_PARAM_LEAK";
/// Two experiment layers both claim ownership of the same module id.
pub const CFG_LAYER_CONFLICT: &str = "CFG_LAYER_CONFLICT";
/// An `emergency` override touched a field outside the audited allow-list.
pub const CFG_EMERGENCY_OVERRIDE_FORBIDDEN: &str = "CFG_EMERGENCY_OVERRIDE_FORBIDDEN";
/// The enabled-module count for a stage is likely to exceed its `fanoutMax`.
pub const CFG_FANOUT_TRIM_LIKELY: &str = "CFG_FANOUT_TRIM_LIKELY";

/// How serious a [`Finding`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The document cannot be applied as written.
    Error,
    /// The document is applicable but likely not what the author intended.
    Warn,
    /// Informational only.
    Info,
}

/// One problem discovered while validating a patch document.
#[derive(Debug, Clone)]
pub struct Finding {
    /// How serious this finding is.
    pub severity: Severity,
    /// Stable `CFG_*` code identifying the rule that fired.
    pub code: String,
    /// JSONPath-like pointer to the offending location.
    pub path: String,
    /// Human-readable explanation.
    pub message: String,
}

/// An ordered collection of validation findings.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Findings in discovery order.
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    /// True when at least one finding is an [`Severity::Error`].
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|finding| finding.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, code: &str, path: impl Into<String>, message: impl Into<String>) {
        self.findings.push(Finding {
            severity,
            code: code.to_string(),
            path: path.into(),
            message: message.into(),
        });
    }

    fn error(&mut self, code: &str, path: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Error, code, path, message);
    }

    fn warn(&mut self, code: &str, path: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Warn, code, path, message);
    }
}

/// Validates a patch document against the flow registry and module catalog.
///
/// Never panics on ill-formed JSON: a document that does not parse, or whose
/// root is not an object, produces a single `CFG_PARSE_ERROR` finding.
#[must_use]
pub fn validate(patch_json: &str, flows: &dyn FlowRegistry, modules: &dyn ModuleCatalog) -> ValidationReport {
    let mut report = ValidationReport::default();
    let root: Value = match serde_json::from_str(patch_json) {
        Ok(value) => value,
        Err(error) => {
            report.error(CFG_PARSE_ERROR, "$", format!("patch document is not valid JSON: {error}"));
            return report;
        }
    };
    let Some(root) = root.as_object() else {
        report.error(CFG_PARSE_ERROR, "$", "patch document root must be an object");
        return report;
    };

    for key in root.keys() {
        if key != "schemaVersion" && key != "flows" {
            report.error(CFG_UNKNOWN_FIELD, format!("$.{key}"), format!("unrecognized root field `{key}`"));
        }
    }

    match root.get("schemaVersion").and_then(Value::as_str) {
        Some("v1") => {}
        _ => report.error(CFG_SCHEMA_VERSION_INVALID, "$.schemaVersion", "schemaVersion must be the string \"v1\""),
    }

    if let Some(flows_value) = root.get("flows") {
        let Some(flows_object) = flows_value.as_object() else {
            report.error(CFG_UNKNOWN_FIELD, "$.flows", "flows must be an object");
            return report;
        };
        for (flow_name_str, flow_patch) in flows_object {
            validate_flow(&mut report, flow_name_str, flow_patch, flows, modules);
        }
    }

    report
}

fn validate_flow(report: &mut ValidationReport, flow_name_str: &str, flow_patch: &Value, flows: &dyn FlowRegistry, modules: &dyn ModuleCatalog) {
    let path_prefix = format!("$.flows.{flow_name_str}");
    let Some(flow_patch) = flow_patch.as_object() else {
        report.error(CFG_UNKNOWN_FIELD, &path_prefix, "a flow patch must be an object");
        return;
    };

    let flow_name = flowgate_core::FlowName::new(flow_name_str);
    let stage_names = flows.stage_names(&flow_name);
    if stage_names.is_none() {
        report.error(CFG_FLOW_NOT_REGISTERED, &path_prefix, format!("flow `{flow_name_str}` is not registered"));
    }

    for key in flow_patch.keys() {
        if !matches!(key.as_str(), "params" | "stages" | "experiments" | "emergency") {
            report.error(CFG_UNKNOWN_FIELD, format!("{path_prefix}.{key}"), format!("unrecognized flow field `{key}`"));
        }
    }

    if let Some(params) = flow_patch.get("params") {
        validate_params(report, &format!("{path_prefix}.params"), params, flows, &flow_name);
    }

    let mut seen_module_ids: HashMap<String, Vec<String>> = HashMap::new();

    if let Some(stages_value) = flow_patch.get("stages") {
        let Some(stages_object) = stages_value.as_object() else {
            report.error(CFG_UNKNOWN_FIELD, format!("{path_prefix}.stages"), "stages must be an object");
            return;
        };
        for (stage_name_str, stage_patch) in stages_object {
            let stage_path = format!("{path_prefix}.stages.{stage_name_str}");
            if let Some(names) = stage_names {
                if !names.iter().any(|name| name.as_str() == stage_name_str) {
                    report.error(CFG_STAGE_NOT_REGISTERED, &stage_path, format!("stage `{stage_name_str}` is not declared by this flow's blueprint"));
                }
            }
            validate_stage(report, &stage_path, stage_patch, modules, &mut seen_module_ids);
        }
    }

    for (module_id, paths) in &seen_module_ids {
        if paths.len() > 1 {
            for path in paths {
                report.error(CFG_MODULE_ID_DUPLICATE, path, format!("module id `{module_id}` is declared more than once in this flow"));
            }
        }
    }

    if let Some(experiments_value) = flow_patch.get("experiments") {
        validate_experiments(report, &path_prefix, experiments_value, flows, &flow_name, modules);
    }

    if let Some(emergency_value) = flow_patch.get("emergency") {
        validate_emergency(report, &path_prefix, emergency_value);
    }
}

fn validate_params(report: &mut ValidationReport, path: &str, params: &Value, flows: &dyn FlowRegistry, flow_name: &flowgate_core::FlowName) {
    if params.is_null() {
        report.error(CFG_PARAMS_BIND_FAILED, path, "params must not be null");
        return;
    }
    let Some(params_object) = params.as_object() else {
        report.error(CFG_PARAMS_BIND_FAILED, path, "params must be an object");
        return;
    };

    let Some(fields) = flows.params_fields(flow_name) else {
        return;
    };
    for key in params_object.keys() {
        if !fields.iter().any(|field| field == key) {
            report.error(CFG_PARAMS_UNKNOWN_FIELD, format!("{path}.{key}"), format!("unrecognized params field `{key}`; declared patch type allows {fields:?}"));
        }
    }
}

fn validate_stage(report: &mut ValidationReport, path: &str, stage_patch: &Value, modules: &dyn ModuleCatalog, seen_module_ids: &mut HashMap<String, Vec<String>>) {
    let Some(stage_object) = stage_patch.as_object() else {
        report.error(CFG_UNKNOWN_FIELD, path, "a stage patch must be an object");
        return;
    };

    for key in stage_object.keys() {
        if key != "fanoutMax" && key != "modules" {
            report.error(CFG_UNKNOWN_FIELD, format!("{path}.{key}"), format!("unrecognized stage field `{key}`"));
        }
    }

    let mut fanout_max = None;
    if let Some(fanout_value) = stage_object.get("fanoutMax") {
        match fanout_value.as_u64() {
            Some(value) if value <= 8 => fanout_max = Some(value),
            _ => report.error(CFG_FANOUT_MAX_INVALID, format!("{path}.fanoutMax"), "fanoutMax must be an integer in 0..=8"),
        }
    }

    let mut enabled_count: u64 = 0;
    if let Some(modules_value) = stage_object.get("modules") {
        let Some(modules_array) = modules_value.as_array() else {
            report.error(CFG_UNKNOWN_FIELD, format!("{path}.modules"), "modules must be an array");
            return;
        };
        for (index, module_patch) in modules_array.iter().enumerate() {
            let module_path = format!("{path}.modules[{index}]");
            if validate_module(report, &module_path, module_patch, modules, seen_module_ids) {
                enabled_count += 1;
            }
        }
    }

    if let Some(max) = fanout_max {
        if enabled_count > max {
            report.warn(CFG_FANOUT_TRIM_LIKELY, path, format!("{enabled_count} enabled modules exceed fanoutMax={max}; excess will be trimmed by priority"));
        }
    }
}

fn validate_module(report: &mut ValidationReport, path: &str, module_patch: &Value, modules: &dyn ModuleCatalog, seen_module_ids: &mut HashMap<String, Vec<String>>) -> bool {
    let Some(module_object) = module_patch.as_object() else {
        report.error(CFG_UNKNOWN_FIELD, path, "a module patch must be an object");
        return false;
    };

    for key in module_object.keys() {
        if !matches!(key.as_str(), "id" | "use" | "with" | "enabled" | "priority" | "gate" | "limitKey" | "memoKey" | "shadowSampleBps") {
            report.error(CFG_UNKNOWN_FIELD, format!("{path}.{key}"), format!("unrecognized module field `{key}`"));
        }
    }

    let mut enabled = true;
    if let Some(id) = module_object.get("id").and_then(Value::as_str) {
        if !is_valid_module_id(id) {
            report.error(CFG_MODULE_ID_INVALID, format!("{path}.id"), "module id must match [a-z0-9_]{1,64}");
        }
        seen_module_ids.entry(id.to_string()).or_default().push(format!("{path}.id"));
    } else {
        report.error(CFG_UNKNOWN_FIELD, format!("{path}.id"), "module patch is missing required field `id`");
    }

    match module_object.get("use").and_then(Value::as_str) {
        Some(module_type) => {
            if modules.signature(&ModuleType::new(module_type)).is_none() {
                report.error(CFG_MODULE_TYPE_NOT_REGISTERED, format!("{path}.use"), format!("module type `{module_type}` is not registered"));
            }
        }
        None => report.error(CFG_MODULE_USE_MISSING, format!("{path}.use"), "module patch is missing required field `use`"),
    }

    if !module_object.contains_key("with") {
        report.error(CFG_MODULE_WITH_MISSING, format!("{path}.with"), "module patch is missing required field `with`");
    }

    if let Some(enabled_value) = module_object.get("enabled") {
        enabled = enabled_value.as_bool().unwrap_or(true);
    }

    if let Some(priority) = module_object.get("priority").and_then(Value::as_i64) {
        if !(-1000..=1000).contains(&priority) {
            report.warn(CFG_PRIORITY_OUT_OF_RANGE, format!("{path}.priority"), "priority outside the recommended -1000..=1000 range");
        }
    }

    if let Some(gate_value) = module_object.get("gate") {
        if let Err(error) = gate_logic::parse_gate(gate_value) {
            report.error(CFG_GATE_PARSE_ERROR, format!("{path}.gate"), error.to_string());
        }
    }

    enabled
}

fn is_valid_module_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.bytes().all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'_')
}

fn validate_experiments(report: &mut ValidationReport, path_prefix: &str, experiments_value: &Value, flows: &dyn FlowRegistry, flow_name: &flowgate_core::FlowName, modules: &dyn ModuleCatalog) {
    let Some(experiments_array) = experiments_value.as_array() else {
        report.error(CFG_UNKNOWN_FIELD, format!("{path_prefix}.experiments"), "experiments must be an array");
        return;
    };

    let contract = flows.experiment_layer_contract(flow_name);
    let mut seen_pairs: HashSet<(String, String)> = HashSet::new();
    let mut owner_of_module_id: HashMap<String, String> = HashMap::new();

    for (index, experiment) in experiments_array.iter().enumerate() {
        let experiment_path = format!("{path_prefix}.experiments[{index}]");
        let Some(experiment_object) = experiment.as_object() else {
            report.error(CFG_UNKNOWN_FIELD, &experiment_path, "an experiment entry must be an object");
            continue;
        };

        for key in experiment_object.keys() {
            if !matches!(key.as_str(), "layer" | "variant" | "patch") {
                report.error(CFG_UNKNOWN_FIELD, format!("{experiment_path}.{key}"), format!("unrecognized experiment field `{key}`"));
            }
        }

        let layer = experiment_object.get("layer").and_then(Value::as_str).unwrap_or_default();
        let variant = experiment_object.get("variant").and_then(Value::as_str).unwrap_or_default();
        if !seen_pairs.insert((layer.to_string(), variant.to_string())) {
            report.error(CFG_EXPERIMENT_DUPLICATE, &experiment_path, format!("duplicate (layer, variant) pair ({layer}, {variant})"));
        }

        let Some(patch) = experiment_object.get("patch").and_then(Value::as_object) else {
            continue;
        };
        for forbidden in ["experiments", "emergency"] {
            if patch.contains_key(forbidden) {
                report.error(CFG_UNKNOWN_FIELD, format!("{experiment_path}.patch.{forbidden}"), format!("an experiment patch may not override `{forbidden}`"));
            }
        }

        let mut local_seen: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(stages) = patch.get("stages").and_then(Value::as_object) {
            for (stage_name, stage_patch) in stages {
                let stage_path = format!("{experiment_path}.patch.stages.{stage_name}");
                validate_stage(report, &stage_path, stage_patch, modules, &mut local_seen);
            }
        }

        if let Some(owned) = contract.map(|c| &c.owned_module_ids) {
            let owned_ids: HashSet<&str> = owned.get(&flowgate_core::LayerName::new(layer)).map(|ids| ids.iter().map(String::as_str).collect()).unwrap_or_default();
            for module_id in local_seen.keys() {
                if !owned_ids.is_empty() && !owned_ids.contains(module_id.as_str()) {
                    report.error(CFG_LAYER_PARAM_LEAK, &experiment_path, format!("layer `{layer}` patches module `{module_id}` it does not own"));
                }
                if let Some(prior_layer) = owner_of_module_id.insert(module_id.clone(), layer.to_string()) {
                    if prior_layer != layer {
                        report.error(CFG_LAYER_CONFLICT, &experiment_path, format!("module `{module_id}` is patched by both layer `{prior_layer}` and layer `{layer}`"));
                    }
                }
            }
        }
    }
}

fn validate_emergency(report: &mut ValidationReport, path_prefix: &str, emergency_value: &Value) {
    let path = format!("{path_prefix}.emergency");
    let Some(emergency_object) = emergency_value.as_object() else {
        report.error(CFG_UNKNOWN_FIELD, &path, "emergency must be an object");
        return;
    };

    for key in emergency_object.keys() {
        if !matches!(key.as_str(), "reason" | "operator" | "ttl_minutes" | "patch") {
            report.error(CFG_UNKNOWN_FIELD, format!("{path}.{key}"), format!("unrecognized emergency field `{key}`"));
        }
    }

    if emergency_object.get("reason").and_then(Value::as_str).is_none_or(str::is_empty) {
        report.error(CFG_EMERGENCY_OVERRIDE_FORBIDDEN, format!("{path}.reason"), "emergency overrides require a non-empty reason");
    }
    if emergency_object.get("operator").and_then(Value::as_str).is_none_or(str::is_empty) {
        report.error(CFG_EMERGENCY_OVERRIDE_FORBIDDEN, format!("{path}.operator"), "emergency overrides require a non-empty operator");
    }
    if emergency_object.get("ttl_minutes").and_then(Value::as_i64).is_none_or(|ttl| ttl <= 0) {
        report.error(CFG_EMERGENCY_OVERRIDE_FORBIDDEN, format!("{path}.ttl_minutes"), "emergency overrides require a positive ttl_minutes");
    }

    let Some(patch) = emergency_object.get("patch").and_then(Value::as_object) else {
        report.error(CFG_EMERGENCY_OVERRIDE_FORBIDDEN, format!("{path}.patch"), "emergency overrides require a patch");
        return;
    };
    if patch.keys().any(|key| key != "stages") {
        report.error(CFG_EMERGENCY_OVERRIDE_FORBIDDEN, format!("{path}.patch"), "emergency patch may only touch `stages`");
    }
    let Some(stages) = patch.get("stages").and_then(Value::as_object) else {
        return;
    };
    for (stage_name, stage_value) in stages {
        let stage_path = format!("{path}.patch.stages.{stage_name}");
        let Some(stage_object) = stage_value.as_object() else {
            report.error(CFG_EMERGENCY_OVERRIDE_FORBIDDEN, &stage_path, "emergency stage patch must be an object");
            continue;
        };
        for key in stage_object.keys() {
            if key != "fanoutMax" && key != "modules" {
                report.error(CFG_EMERGENCY_OVERRIDE_FORBIDDEN, format!("{stage_path}.{key}"), format!("emergency stage patch may not set `{key}`"));
            }
        }
        if let Some(modules) = stage_object.get("modules").and_then(Value::as_array) {
            for (index, module) in modules.iter().enumerate() {
                let module_path = format!("{stage_path}.modules[{index}]");
                let Some(module_object) = module.as_object() else {
                    report.error(CFG_EMERGENCY_OVERRIDE_FORBIDDEN, &module_path, "emergency module patch must be an object");
                    continue;
                };
                for key in module_object.keys() {
                    if key != "id" && key != "enabled" {
                        report.error(CFG_EMERGENCY_OVERRIDE_FORBIDDEN, format!("{module_path}.{key}"), format!("emergency module patch may not set `{key}`"));
                    }
                }
                if module_object.get("enabled").and_then(Value::as_bool) != Some(false) {
                    report.error(CFG_EMERGENCY_OVERRIDE_FORBIDDEN, format!("{module_path}.enabled"), "emergency module patch may only set enabled:false");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use flowgate_core::FlowName;
    use flowgate_core::ModuleSignature;
    use flowgate_core::StageName;
    use flowgate_core::StaticFlowRegistry;
    use flowgate_core::StaticModuleCatalog;
    use std::sync::Arc;

    use super::*;

    struct NoopModule;

    #[async_trait::async_trait]
    impl flowgate_core::Module for NoopModule {
        async fn execute(&self, _ctx: &flowgate_core::ModuleContext<'_>) -> flowgate_core::Outcome<Value> {
            flowgate_core::Outcome::ok("OK", Value::Null)
        }
    }

    fn registry() -> StaticFlowRegistry {
        StaticFlowRegistry::new().with_flow(
            FlowName::new("checkout"),
            vec![StageName::new("candidate_gen")],
            flowgate_core::FlowBlueprint {
                nodes: vec![],
                response_type: "Resp".to_string(),
            },
        )
    }

    fn catalog() -> StaticModuleCatalog {
        StaticModuleCatalog::new().with_module(
            ModuleType::new("scorer"),
            ModuleSignature {
                args_type: "Args".to_string(),
                output_type: "Out".to_string(),
            },
            Arc::new(NoopModule),
        )
    }

    #[test]
    fn rejects_malformed_json() {
        let report = validate("not json", &registry(), &catalog());
        assert!(report.has_errors());
        assert_eq!(report.findings[0].code, CFG_PARSE_ERROR);
    }

    #[test]
    fn accepts_a_well_formed_patch() {
        let patch = r#"{
            "schemaVersion": "v1",
            "flows": {
                "checkout": {
                    "stages": {
                        "candidate_gen": {
                            "fanoutMax": 2,
                            "modules": [
                                { "id": "a", "use": "scorer", "with": {} }
                            ]
                        }
                    }
                }
            }
        }"#;
        let report = validate(patch, &registry(), &catalog());
        assert!(!report.has_errors(), "{:?}", report.findings);
    }

    #[test]
    fn flags_unregistered_flow() {
        let patch = r#"{"schemaVersion": "v1", "flows": {"ghost": {}}}"#;
        let report = validate(patch, &registry(), &catalog());
        assert!(report.findings.iter().any(|f| f.code == CFG_FLOW_NOT_REGISTERED));
    }

    #[test]
    fn flags_duplicate_module_ids_on_every_occurrence() {
        let patch = r#"{
            "schemaVersion": "v1",
            "flows": {
                "checkout": {
                    "stages": {
                        "candidate_gen": {
                            "modules": [
                                { "id": "a", "use": "scorer", "with": {} },
                                { "id": "a", "use": "scorer", "with": {} }
                            ]
                        }
                    }
                }
            }
        }"#;
        let report = validate(patch, &registry(), &catalog());
        let duplicate_count = report.findings.iter().filter(|f| f.code == CFG_MODULE_ID_DUPLICATE).count();
        assert_eq!(duplicate_count, 2);
    }

    #[test]
    fn flags_unknown_params_field_against_the_declared_patch_type() {
        let registry = registry().with_params_fields(FlowName::new("checkout"), vec!["currency".to_string()]);
        let patch = r#"{
            "schemaVersion": "v1",
            "flows": {
                "checkout": {
                    "params": { "currency": "USD", "region": "eu" }
                }
            }
        }"#;
        let report = validate(patch, &registry, &catalog());
        assert!(report.findings.iter().any(|f| f.code == CFG_PARAMS_UNKNOWN_FIELD && f.path.ends_with(".region")));
        assert!(!report.findings.iter().any(|f| f.code == CFG_PARAMS_UNKNOWN_FIELD && f.path.ends_with(".currency")));
    }

    #[test]
    fn flags_emergency_override_outside_allow_list() {
        let patch = r#"{
            "schemaVersion": "v1",
            "flows": {
                "checkout": {
                    "emergency": {
                        "reason": "incident-123",
                        "operator": "oncall",
                        "ttl_minutes": 30,
                        "patch": { "stages": { "candidate_gen": { "modules": [ { "id": "a", "enabled": true } ] } } }
                    }
                }
            }
        }"#;
        let report = validate(patch, &registry(), &catalog());
        assert!(report.findings.iter().any(|f| f.code == CFG_EMERGENCY_OVERRIDE_FORBIDDEN));
    }
}
