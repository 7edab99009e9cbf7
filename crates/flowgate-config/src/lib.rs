// flowgate-config/src/lib.rs
// ============================================================================
// Module: Flowgate Config Library
// Description: Public API surface for patch validation and runtime config.
// Purpose: Keep untrusted patch JSON and process-wide knobs out of the core
//          execution crate.
// Dependencies: crate::{validator, runtime_config}
// ============================================================================

//! ## Overview
//! Two independent concerns live here: [`validator`] turns an untrusted patch
//! document into a [`ValidationReport`] before `flowgate_core::patch` ever
//! evaluates it, and [`runtime_config`] loads the process-wide operational
//! knobs (limiter capacities, default deadlines) a host needs at startup.

pub mod runtime_config;
pub mod validator;

pub use runtime_config::RuntimeConfig;
pub use runtime_config::RuntimeConfigError;
pub use validator::CFG_EMERGENCY_OVERRIDE_FORBIDDEN;
pub use validator::CFG_EXPERIMENT_DUPLICATE;
pub use validator::CFG_FANOUT_MAX_INVALID;
pub use validator::CFG_FANOUT_TRIM_LIKELY;
pub use validator::CFG_FLOW_NOT_REGISTERED;
pub use validator::CFG_GATE_PARSE_ERROR;
pub use validator::CFG_LAYER_CONFLICT;
pub use validator::CFG_LAYER_PARAM_LEAK;
pub use validator::CFG_MODULE_ID_DUPLICATE;
pub use validator::CFG_MODULE_ID_INVALID;
pub use validator::CFG_MODULE_TYPE_NOT_REGISTERED;
pub use validator::CFG_MODULE_USE_MISSING;
pub use validator::CFG_MODULE_WITH_MISSING;
pub use validator::CFG_PARAMS_BIND_FAILED;
pub use validator::CFG_PARAMS_UNKNOWN_FIELD;
pub use validator::CFG_PARSE_ERROR;
pub use validator::CFG_PRIORITY_OUT_OF_RANGE;
pub use validator::CFG_SCHEMA_VERSION_INVALID;
pub use validator::CFG_STAGE_NOT_REGISTERED;
pub use validator::CFG_UNKNOWN_FIELD;
pub use validator::Finding;
pub use validator::Severity;
pub use validator::ValidationReport;
pub use validator::validate;
