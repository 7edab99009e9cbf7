// flowgate-config/src/runtime_config.rs
// ============================================================================
// Module: Runtime Configuration
// Description: Process-wide operational knobs, loaded once at host startup.
// Purpose: Separate per-process limiter/deadline defaults from the per-request
//          patch JSON that `flowgate_core::patch` evaluates.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! A [`RuntimeConfig`] carries limiter capacities, the default `fanoutMax`,
//! and deadline defaults: knobs an operator tunes per deployment, not per
//! request. Loading fails closed, mirroring the teacher's own config crate —
//! a missing or malformed file is a startup error, never a silently-applied
//! default. [`RuntimeConfig::default`] exists for dev/test call sites only.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Per-`limitKey` bulkhead capacity and the deadline/fanout defaults applied
/// when a patch omits them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Bulkhead capacity per `limitKey`, in concurrent leases.
    #[serde(default)]
    pub limiter_capacities: HashMap<String, usize>,
    /// Capacity granted to a `limitKey` absent from `limiter_capacities`.
    #[serde(default = "default_capacity")]
    pub default_limiter_capacity: usize,
    /// `fanoutMax` applied to a stage whose patch omits it.
    #[serde(default = "default_fanout_max")]
    pub default_fanout_max: usize,
    /// Request deadline applied when a host does not supply one explicitly.
    #[serde(default = "default_deadline_ms", rename = "default_deadline_ms")]
    default_deadline_ms: u64,
}

impl RuntimeConfig {
    /// The request deadline applied when a host does not supply one explicitly.
    #[must_use]
    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }

    /// Loads a `RuntimeConfig` from a TOML file on disk. Fails closed: a
    /// missing or malformed file is always an error, never silently
    /// substituted with [`RuntimeConfig::default`].
    ///
    /// # Errors
    /// Returns [`RuntimeConfigError::Read`] if the file cannot be read, or
    /// [`RuntimeConfigError::Parse`] if its contents are not valid TOML
    /// matching this shape.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuntimeConfigError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| RuntimeConfigError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses a `RuntimeConfig` from an in-memory TOML document.
    ///
    /// # Errors
    /// Returns [`RuntimeConfigError::Parse`] if `raw` is not valid TOML
    /// matching this shape.
    pub fn from_toml_str(raw: &str) -> Result<Self, RuntimeConfigError> {
        toml::from_str(raw).map_err(RuntimeConfigError::Parse)
    }
}

impl Default for RuntimeConfig {
    /// A permissive configuration for dev and test call sites only; production
    /// hosts must load an explicit file via [`RuntimeConfig::from_path`].
    fn default() -> Self {
        Self {
            limiter_capacities: HashMap::new(),
            default_limiter_capacity: default_capacity(),
            default_fanout_max: default_fanout_max(),
            default_deadline_ms: default_deadline_ms(),
        }
    }
}

fn default_capacity() -> usize {
    8
}

fn default_fanout_max() -> usize {
    8
}

fn default_deadline_ms() -> u64 {
    500
}

/// Failure loading or parsing a [`RuntimeConfig`].
#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    /// The file at `path` could not be read.
    #[error("failed to read runtime config at {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The document did not parse as a valid `RuntimeConfig`.
    #[error("failed to parse runtime config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive_for_dev_use() {
        let config = RuntimeConfig::default();
        assert_eq!(config.default_fanout_max, 8);
        assert_eq!(config.default_deadline(), Duration::from_millis(500));
    }

    #[test]
    fn parses_a_well_formed_document() {
        let raw = r#"
            default_limiter_capacity = 16
            default_fanout_max = 4
            default_deadline_ms = 250

            [limiter_capacities]
            scoring = 32
            enrichment = 4
        "#;
        let config = RuntimeConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.default_fanout_max, 4);
        assert_eq!(config.default_deadline(), Duration::from_millis(250));
        assert_eq!(config.limiter_capacities.get("scoring"), Some(&32));
    }

    #[test]
    fn rejects_unknown_fields() {
        let raw = r#"unexpected_field = true"#;
        assert!(RuntimeConfig::from_toml_str(raw).is_err());
    }

    #[test]
    fn fails_closed_on_missing_file() {
        let result = RuntimeConfig::from_path("/nonexistent/path/runtime.toml");
        assert!(matches!(result, Err(RuntimeConfigError::Read { .. })));
    }
}
