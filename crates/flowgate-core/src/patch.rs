// flowgate-core/src/patch.rs
// ============================================================================
// Module: Patch Evaluator
// Description: Composes base/experiment/emergency overlays into a per-request plan.
// Purpose: Turn a raw config snapshot into the immutable plan the engine walks.
// Dependencies: serde_json, gate_logic, crate::{identifiers, error}
// ============================================================================

//! ## Overview
//! [`evaluate`] trusts its input is validator-approved (see `flowgate-config`)
//! and composes three overlays in strict order: base, matched experiments (in
//! document order), then an audit-valid emergency override. The result is an
//! owned, immutable [`FlowPatchEvaluation`] the engine executes against; it
//! never borrows from the source document after returning.

use std::collections::HashMap;

use gate_logic::GateExpr;
use gate_logic::parse_gate;
use serde_json::Value;

use crate::error::PatchError;
use crate::identifiers::FlowName;
use crate::identifiers::LayerName;
use crate::identifiers::LimitKey;
use crate::identifiers::MemoKey;
use crate::identifiers::ModuleId;
use crate::identifiers::ModuleType;
use crate::identifiers::StageName;
use crate::identifiers::VariantName;

/// A single module's fully-resolved patch state for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct StageModulePatch {
    /// Unique module instance id within the flow.
    pub module_id: ModuleId,
    /// Registered module implementation to invoke.
    pub module_type: ModuleType,
    /// Opaque module arguments, already bound by the overlay that last set them.
    pub args: Value,
    /// Whether the module should run at all.
    pub enabled: bool,
    /// Fanout priority; higher runs first when trimming.
    pub priority: i32,
    /// Optional gate; `None` means "always allowed".
    pub gate: Option<GateExpr>,
    /// Bulkhead limiter key; defaults to `module_type` when unset.
    pub limit_key: Option<LimitKey>,
    /// Memo table key; empty/unset means "never memoize".
    pub memo_key: Option<MemoKey>,
    /// Shadow sampling rate in 1/10000ths; zero means this is a primary module.
    pub shadow_sample_bps: u16,
    /// Set when the emergency overlay, not `enabled`, disabled this module.
    pub disabled_by_emergency: bool,
}

impl StageModulePatch {
    /// Returns the limiter key to use, defaulting to the module type.
    #[must_use]
    pub fn effective_limit_key(&self) -> LimitKey {
        self.limit_key.clone().unwrap_or_else(|| LimitKey::new(self.module_type.as_str()))
    }

    fn is_shadow(&self) -> bool {
        self.shadow_sample_bps > 0
    }
}

/// One stage's resolved module set.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePatch {
    /// The stage's name.
    pub stage_name: StageName,
    /// Maximum number of primary modules allowed to run; `None` is unbounded.
    pub fanout_max: Option<u8>,
    modules: Vec<StageModulePatch>,
}

impl StagePatch {
    fn new(stage_name: StageName) -> Self {
        Self {
            stage_name,
            fanout_max: None,
            modules: Vec::new(),
        }
    }

    /// Iterates primary (non-shadow) modules in declared order.
    pub fn primary_modules(&self) -> impl Iterator<Item = &StageModulePatch> {
        self.modules.iter().filter(|module| !module.is_shadow())
    }

    /// Iterates shadow modules in declared order.
    pub fn shadow_modules(&self) -> impl Iterator<Item = &StageModulePatch> {
        self.modules.iter().filter(|module| module.is_shadow())
    }

    fn upsert(&mut self, module: StageModulePatch) {
        if let Some(slot) = self.modules.iter_mut().find(|existing| existing.module_id == module.module_id) {
            *slot = module;
        } else {
            self.modules.push(module);
        }
    }
}

/// One entry in the audit trail of overlays a patch evaluation applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayRecord {
    /// The always-present base overlay.
    Base,
    /// A matched experiment overlay.
    Experiment {
        /// The experiment's layer name.
        layer: LayerName,
        /// The matched variant within that layer.
        variant: VariantName,
    },
    /// The emergency override, when present and audit-valid.
    Emergency,
}

/// The immutable, per-request output of the patch evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowPatchEvaluation {
    /// The flow this evaluation is for.
    pub flow_name: FlowName,
    /// Resolved stages in first-appearance order.
    pub stages: Vec<StagePatch>,
    /// Audit trail of overlays applied, in application order.
    pub overlays_applied: Vec<OverlayRecord>,
}

impl FlowPatchEvaluation {
    /// Looks up a resolved stage by name.
    #[must_use]
    pub fn stage(&self, name: &StageName) -> Option<&StagePatch> {
        self.stages.iter().find(|stage| &stage.stage_name == name)
    }
}

/// Composes base, experiment, and emergency overlays into a `FlowPatchEvaluation`.
///
/// # Errors
///
/// Returns [`PatchError::MalformedJson`] when `patch_json` does not parse, or
/// [`PatchError::MissingUseOrWith`] when a module entry lacks either field.
pub fn evaluate(
    flow_name: &FlowName,
    patch_json: &str,
    variants: &HashMap<LayerName, VariantName>,
) -> Result<FlowPatchEvaluation, PatchError> {
    let document: Value = serde_json::from_str(patch_json).map_err(|err| PatchError::MalformedJson(err.to_string()))?;
    let mut overlays_applied = vec![OverlayRecord::Base];
    let mut stages: Vec<StagePatch> = Vec::new();

    let Some(flow_value) = document.get("flows").and_then(|flows| flows.get(flow_name.as_str())) else {
        return Ok(FlowPatchEvaluation {
            flow_name: flow_name.clone(),
            stages,
            overlays_applied,
        });
    };

    if let Some(stage_entries) = flow_value.get("stages").and_then(Value::as_object) {
        for (stage_name, stage_value) in stage_entries {
            let stage_name = StageName::new(stage_name.as_str());
            let mut stage = StagePatch::new(stage_name);
            apply_stage_overlay(&mut stage, stage_value, None)?;
            stages.push(stage);
        }
    }

    if let Some(experiments) = flow_value.get("experiments").and_then(Value::as_array) {
        for experiment in experiments {
            let layer_raw = experiment.get("layer").and_then(Value::as_str).unwrap_or_default();
            let variant_raw = experiment.get("variant").and_then(Value::as_str).unwrap_or_default();
            let layer = LayerName::new(layer_raw);
            let matched = variants.get(&layer).is_some_and(|active| active.as_str() == variant_raw);
            if !matched {
                continue;
            }
            if let Some(stage_entries) = experiment.get("patch").and_then(|patch| patch.get("stages")).and_then(Value::as_object) {
                for (stage_name, stage_value) in stage_entries {
                    let stage_name = StageName::new(stage_name.as_str());
                    let stage = find_or_insert_stage(&mut stages, stage_name);
                    apply_stage_overlay(stage, stage_value, Some(&layer))?;
                }
            }
            overlays_applied.push(OverlayRecord::Experiment {
                layer,
                variant: VariantName::new(variant_raw),
            });
        }
    }

    if let Some(emergency) = flow_value.get("emergency") {
        if is_audit_valid(emergency) {
            apply_emergency_overlay(&mut stages, emergency);
            overlays_applied.push(OverlayRecord::Emergency);
        }
    }

    Ok(FlowPatchEvaluation {
        flow_name: flow_name.clone(),
        stages,
        overlays_applied,
    })
}

fn find_or_insert_stage(stages: &mut Vec<StagePatch>, stage_name: StageName) -> &mut StagePatch {
    if let Some(index) = stages.iter().position(|stage| stage.stage_name == stage_name) {
        return &mut stages[index];
    }
    stages.push(StagePatch::new(stage_name));
    let last = stages.len() - 1;
    &mut stages[last]
}

fn apply_stage_overlay(stage: &mut StagePatch, stage_value: &Value, _experiment_layer: Option<&LayerName>) -> Result<(), PatchError> {
    if let Some(fanout_max) = stage_value.get("fanoutMax").and_then(Value::as_u64) {
        stage.fanout_max = u8::try_from(fanout_max).ok().or(stage.fanout_max);
    }
    if let Some(modules) = stage_value.get("modules").and_then(Value::as_array) {
        for module_value in modules {
            let overlay = parse_module_overlay(module_value)?;
            let baseline = stage.modules.iter().find(|existing| existing.module_id == overlay.id).cloned();
            let merged = merge_module(baseline.as_ref(), overlay);
            stage.upsert(merged);
        }
    }
    Ok(())
}

fn apply_emergency_overlay(stages: &mut [StagePatch], emergency: &Value) {
    let Some(stage_entries) = emergency.get("patch").and_then(|patch| patch.get("stages")).and_then(Value::as_object) else {
        return;
    };
    for (stage_name, stage_patch) in stage_entries {
        let Some(stage) = stages.iter_mut().find(|stage| stage.stage_name.as_str() == stage_name.as_str()) else {
            continue;
        };
        if let Some(fanout_max) = stage_patch.get("fanoutMax").and_then(Value::as_u64) {
            stage.fanout_max = u8::try_from(fanout_max).ok().or(stage.fanout_max);
        }
        if let Some(modules) = stage_patch.get("modules").and_then(Value::as_array) {
            for module_value in modules {
                let Some(id) = module_value.get("id").and_then(Value::as_str) else {
                    continue;
                };
                if let Some(existing) = stage.modules.iter_mut().find(|module| module.module_id.as_str() == id) {
                    existing.enabled = false;
                    existing.disabled_by_emergency = true;
                }
            }
        }
    }
}

fn is_audit_valid(emergency: &Value) -> bool {
    let non_empty = |field: &str| emergency.get(field).and_then(Value::as_str).is_some_and(|value| !value.is_empty());
    let ttl_positive = emergency.get("ttl_minutes").and_then(Value::as_i64).is_some_and(|ttl| ttl > 0);
    non_empty("reason") && non_empty("operator") && ttl_positive
}

/// A module overlay entry parsed straight off the wire, with `Option`s
/// distinguishing "field omitted" (carry over prior value) from "field
/// explicitly set".
struct ModuleOverlayInput {
    id: ModuleId,
    module_type: ModuleType,
    args: Value,
    enabled: Option<bool>,
    priority: Option<i32>,
    gate_present: bool,
    gate: Option<GateExpr>,
    limit_key: Option<LimitKey>,
    memo_key: Option<MemoKey>,
    shadow_sample_bps: Option<u16>,
}

fn parse_module_overlay(value: &Value) -> Result<ModuleOverlayInput, PatchError> {
    let id = value.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    let module_type = value.get("use").and_then(Value::as_str);
    let with = value.get("with");
    let (Some(module_type), Some(with)) = (module_type, with) else {
        return Err(PatchError::MissingUseOrWith {
            module_id: id,
        });
    };
    Ok(ModuleOverlayInput {
        id: ModuleId::new(id),
        module_type: ModuleType::new(module_type),
        args: with.clone(),
        enabled: value.get("enabled").and_then(Value::as_bool),
        priority: value.get("priority").and_then(Value::as_i64).and_then(|priority| i32::try_from(priority).ok()),
        gate_present: value.get("gate").is_some(),
        gate: value.get("gate").and_then(|gate| parse_gate(gate).ok().flatten()),
        limit_key: value.get("limitKey").and_then(Value::as_str).map(LimitKey::new),
        memo_key: value.get("memoKey").and_then(Value::as_str).map(MemoKey::new),
        shadow_sample_bps: value.get("shadowSampleBps").and_then(Value::as_u64).and_then(|bps| u16::try_from(bps).ok()),
    })
}

fn merge_module(baseline: Option<&StageModulePatch>, overlay: ModuleOverlayInput) -> StageModulePatch {
    let enabled = overlay.enabled.unwrap_or_else(|| baseline.is_none_or(|base| base.enabled));
    let priority = overlay.priority.unwrap_or_else(|| baseline.map_or(0, |base| base.priority));
    let gate = if overlay.gate_present { overlay.gate } else { baseline.and_then(|base| base.gate.clone()) };
    let limit_key = overlay.limit_key.or_else(|| baseline.and_then(|base| base.limit_key.clone()));
    let memo_key = overlay.memo_key.or_else(|| baseline.and_then(|base| base.memo_key.clone()));
    let shadow_sample_bps = overlay.shadow_sample_bps.unwrap_or_else(|| baseline.map_or(0, |base| base.shadow_sample_bps));
    StageModulePatch {
        module_id: overlay.id,
        module_type: overlay.module_type,
        args: overlay.args,
        enabled,
        priority,
        gate,
        limit_key,
        memo_key,
        shadow_sample_bps,
        disabled_by_emergency: false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn base_overlay_only() {
        let document = json!({
            "schemaVersion": "v1",
            "flows": {
                "checkout": {
                    "stages": {
                        "pricing": {
                            "fanoutMax": 2,
                            "modules": [
                                {"id": "tax", "use": "tax_module", "with": {}},
                                {"id": "promo", "use": "promo_module", "with": {}, "priority": 5},
                            ]
                        }
                    }
                }
            }
        });
        let evaluation = evaluate(&FlowName::new("checkout"), &document.to_string(), &HashMap::new()).unwrap();
        assert_eq!(evaluation.overlays_applied, vec![OverlayRecord::Base]);
        let stage = evaluation.stage(&StageName::new("pricing")).unwrap();
        assert_eq!(stage.fanout_max, Some(2));
        let primary: Vec<_> = stage.primary_modules().collect();
        assert_eq!(primary.len(), 2);
        assert_eq!(primary[1].priority, 5);
    }

    #[test]
    fn experiment_overlay_carries_over_unset_fields() {
        let document = json!({
            "schemaVersion": "v1",
            "flows": {
                "checkout": {
                    "stages": {
                        "pricing": {
                            "modules": [
                                {"id": "tax", "use": "tax_module", "with": {}, "priority": 1}
                            ]
                        }
                    },
                    "experiments": [
                        {
                            "layer": "pricing_layer",
                            "variant": "treatment",
                            "patch": {
                                "stages": {
                                    "pricing": {
                                        "modules": [
                                            {"id": "tax", "use": "tax_module_v2", "with": {"rate": 2}}
                                        ]
                                    }
                                }
                            }
                        }
                    ]
                }
            }
        });
        let mut variants = HashMap::new();
        variants.insert(LayerName::new("pricing_layer"), VariantName::new("treatment"));
        let evaluation = evaluate(&FlowName::new("checkout"), &document.to_string(), &variants).unwrap();
        assert_eq!(
            evaluation.overlays_applied,
            vec![
                OverlayRecord::Base,
                OverlayRecord::Experiment {
                    layer: LayerName::new("pricing_layer"),
                    variant: VariantName::new("treatment")
                }
            ]
        );
        let stage = evaluation.stage(&StageName::new("pricing")).unwrap();
        let module = stage.primary_modules().next().unwrap();
        assert_eq!(module.module_type.as_str(), "tax_module_v2");
        assert_eq!(module.priority, 1, "priority must carry over from base when omitted");
    }

    #[test]
    fn emergency_overlay_disables_listed_module() {
        let document = json!({
            "schemaVersion": "v1",
            "flows": {
                "checkout": {
                    "stages": {
                        "pricing": {
                            "modules": [
                                {"id": "tax", "use": "tax_module", "with": {}}
                            ]
                        }
                    },
                    "emergency": {
                        "reason": "incident-42",
                        "operator": "oncall",
                        "ttl_minutes": 30,
                        "patch": {
                            "stages": {
                                "pricing": {
                                    "modules": [{"id": "tax", "enabled": false}]
                                }
                            }
                        }
                    }
                }
            }
        });
        let evaluation = evaluate(&FlowName::new("checkout"), &document.to_string(), &HashMap::new()).unwrap();
        assert!(evaluation.overlays_applied.contains(&OverlayRecord::Emergency));
        let stage = evaluation.stage(&StageName::new("pricing")).unwrap();
        assert_eq!(stage.primary_modules().count(), 0);
    }

    #[test]
    fn missing_use_or_with_is_rejected() {
        let document = json!({
            "schemaVersion": "v1",
            "flows": {
                "checkout": {
                    "stages": {
                        "pricing": {
                            "modules": [{"id": "tax"}]
                        }
                    }
                }
            }
        });
        let result = evaluate(&FlowName::new("checkout"), &document.to_string(), &HashMap::new());
        assert!(matches!(result, Err(PatchError::MissingUseOrWith { .. })));
    }
}
