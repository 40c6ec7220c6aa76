//! settings
//!
//! Engine settings schema and loading.
//!
//! # Overview
//!
//! Settings tune the engine's ambient behavior: the namespace prefix
//! handed to script evaluations, the scope nesting limit, and how much
//! of the graph diagnostic explanations show. They never change what a
//! configuration program means, so every field has a concrete default
//! and an empty settings file is valid.
//!
//! # Sources
//!
//! Settings come from a TOML file ([`Settings::load`]) or an inline
//! TOML string ([`Settings::from_toml_str`]). Values are validated
//! after parsing; unknown fields are rejected.
//!
//! # Example
//!
//! ```
//! use heddle::settings::Settings;
//!
//! let settings = Settings::from_toml_str(
//!     r#"
//!     [scope]
//!     max_depth = 16
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(settings.scope.max_depth, 16);
//! assert_eq!(settings.script.namespace_prefix, "config-script");
//! ```

pub mod schema;

pub use schema::{DiagSettings, ScopeSettings, ScriptSettings};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors from settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings from {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// The full settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Script evaluation settings.
    pub script: ScriptSettings,

    /// Context scope settings.
    pub scope: ScopeSettings,

    /// Diagnostic rendering settings.
    pub diag: DiagSettings,
}

impl Settings {
    /// Parse settings from an inline TOML string and validate them.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Parse` for malformed TOML or unknown
    /// fields, `SettingsError::Invalid` for out-of-range values.
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(raw).map_err(|e| SettingsError::Parse {
            origin: "inline TOML".to_string(),
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file and validate them.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Read` if the file cannot be read, plus
    /// the same parse and validation errors as [`Settings::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&raw).map_err(|e| SettingsError::Parse {
            origin: format!("'{}'", path.display()),
            message: e.to_string(),
        })?;
        settings.validate()?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.script.validate()?;
        self.scope.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [script]
            namespace_prefix = "site-config"
            "#,
        )
        .unwrap();
        assert_eq!(settings.script.namespace_prefix, "site-config");
        assert_eq!(settings.scope, ScopeSettings::default());
        assert_eq!(settings.diag, DiagSettings::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Settings::from_toml_str(
            r#"
            [scope]
            max_deep = 3
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn invalid_values_are_rejected_after_parsing() {
        let err = Settings::from_toml_str(
            r#"
            [scope]
            max_depth = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }

    #[test]
    fn roundtrip() {
        let settings = Settings::from_toml_str(
            r#"
            [script]
            namespace_prefix = "site-config"

            [scope]
            max_depth = 12

            [diag]
            snapshot_entities = 3
            "#,
        )
        .unwrap();
        let rendered = toml::to_string_pretty(&settings).unwrap();
        let parsed = Settings::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, settings);
    }

    mod files {
        use super::*;

        #[test]
        fn load_reads_and_validates() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("heddle.toml");
            fs::write(&path, "[diag]\nsnapshot_entities = 2\n").unwrap();

            let settings = Settings::load(&path).unwrap();
            assert_eq!(settings.diag.snapshot_entities, 2);
        }

        #[test]
        fn missing_file_is_a_read_error() {
            let dir = tempfile::tempdir().unwrap();
            let err = Settings::load(&dir.path().join("absent.toml")).unwrap_err();
            assert!(matches!(err, SettingsError::Read { .. }));
        }

        #[test]
        fn parse_errors_name_the_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("heddle.toml");
            fs::write(&path, "not valid toml [").unwrap();

            let err = Settings::load(&path).unwrap_err();
            match err {
                SettingsError::Parse { origin, .. } => {
                    assert!(origin.contains("heddle.toml"));
                }
                other => panic!("expected Parse, got {other:?}"),
            }
        }
    }
}
