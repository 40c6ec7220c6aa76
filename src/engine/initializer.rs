//! engine::initializer
//!
//! The tagged initializer forms a build dispatches on.
//!
//! Initializers are plain data. A host can construct them in code,
//! keep them in its own configuration files, or receive them over the
//! wire; the engine only sees the tagged value.

use crate::core::ops::Op;
use crate::core::types::{ModuleName, QualifiedName};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One instruction telling the engine how to populate a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Initializer {
    /// Invoke a registered configuration function.
    Function {
        /// The registered name to invoke.
        name: QualifiedName,
    },

    /// Load a configuration module and its requirements.
    Module {
        /// The module to load.
        name: ModuleName,
    },

    /// Read a script file and evaluate its contents.
    File {
        /// Path to the script source.
        path: PathBuf,
    },

    /// Apply a batch of operations as one transaction.
    Ops {
        /// The batch to apply.
        ops: Vec<Op>,
    },

    /// Evaluate inline script source. Blank source is a no-op.
    Script {
        /// The script text.
        source: String,
    },
}

impl Initializer {
    pub fn function(name: QualifiedName) -> Self {
        Initializer::Function { name }
    }

    pub fn module(name: ModuleName) -> Self {
        Initializer::Module { name }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Initializer::File { path: path.into() }
    }

    pub fn ops(ops: Vec<Op>) -> Self {
        Initializer::Ops { ops }
    }

    pub fn script(source: impl Into<String>) -> Self {
        Initializer::Script {
            source: source.into(),
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Initializer::Function { name } => format!("function {name}"),
            Initializer::Module { name } => format!("module {name}"),
            Initializer::File { path } => format!("script file {}", path.display()),
            Initializer::Ops { ops } => format!("ops batch ({} ops)", ops.len()),
            Initializer::Script { source } if source.trim().is_empty() => {
                "blank inline script".to_string()
            }
            Initializer::Script { source } => format!("inline script ({} bytes)", source.len()),
        }
    }
}
