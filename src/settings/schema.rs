//! settings::schema
//!
//! Section types for engine settings.
//!
//! Each section is a plain serde struct with concrete defaults, so an
//! absent section or field silently takes its default and unknown
//! fields are rejected at parse time. Value-level checks live in
//! per-section `validate` methods, invoked after parsing.

use serde::{Deserialize, Serialize};

use super::SettingsError;
use crate::core::types::EvalNamespace;
use crate::scope::DEFAULT_MAX_DEPTH;

/// Script evaluation settings.
///
/// # Example
///
/// ```toml
/// [script]
/// namespace_prefix = "config-script"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptSettings {
    /// Prefix for freshly minted evaluation namespaces. Each script
    /// evaluation gets `<prefix>-<uuid>`.
    pub namespace_prefix: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            namespace_prefix: "config-script".to_string(),
        }
    }
}

impl ScriptSettings {
    /// Validate the section values.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Invalid` if the prefix would not form a
    /// valid evaluation namespace.
    pub fn validate(&self) -> Result<(), SettingsError> {
        EvalNamespace::new(&self.namespace_prefix)
            .map_err(|e| SettingsError::Invalid(format!("script.namespace_prefix: {e}")))?;
        Ok(())
    }
}

/// Context scope settings.
///
/// # Example
///
/// ```toml
/// [scope]
/// max_depth = 64
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ScopeSettings {
    /// Maximum nesting depth of scopes on one thread.
    pub max_depth: usize,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ScopeSettings {
    /// Validate the section values.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Invalid` if the depth limit is zero.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_depth == 0 {
            return Err(SettingsError::Invalid(
                "scope.max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Diagnostic rendering settings.
///
/// # Example
///
/// ```toml
/// [diag]
/// snapshot_entities = 8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DiagSettings {
    /// How many entities a graph snapshot shows in explanations.
    /// Zero omits the snapshot entirely.
    pub snapshot_entities: usize,
}

impl Default for DiagSettings {
    fn default() -> Self {
        Self {
            snapshot_entities: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod script_settings {
        use super::*;

        #[test]
        fn defaults() {
            let settings = ScriptSettings::default();
            assert_eq!(settings.namespace_prefix, "config-script");
            assert!(settings.validate().is_ok());
        }

        #[test]
        fn empty_prefix_rejected() {
            let settings = ScriptSettings {
                namespace_prefix: String::new(),
            };
            assert!(settings.validate().is_err());
        }

        #[test]
        fn prefix_with_slash_rejected() {
            let settings = ScriptSettings {
                namespace_prefix: "config/script".to_string(),
            };
            assert!(settings.validate().is_err());
        }
    }

    mod scope_settings {
        use super::*;

        #[test]
        fn defaults() {
            let settings = ScopeSettings::default();
            assert_eq!(settings.max_depth, DEFAULT_MAX_DEPTH);
            assert!(settings.validate().is_ok());
        }

        #[test]
        fn zero_depth_rejected() {
            let settings = ScopeSettings { max_depth: 0 };
            assert!(settings.validate().is_err());
        }
    }

    mod diag_settings {
        use super::*;

        #[test]
        fn defaults() {
            assert_eq!(DiagSettings::default().snapshot_entities, 8);
        }
    }
}
