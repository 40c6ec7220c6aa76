//! script
//!
//! The host seam for evaluating configuration scripts.
//!
//! # Architecture
//!
//! The engine does not embed a script language. Anything that can take
//! a source string and produce side effects, usually DSL calls against
//! the active scope, can act as the script runtime by implementing
//! [`ScriptHost`]. The engine hands every evaluation a fresh
//! [`EvalNamespace`](crate::core::types::EvalNamespace) so definitions
//! from one script run can never collide with another.
//!
//! [`FnScriptHost`] is the in-process implementation used throughout
//! the test suites: it maps known source strings to Rust closures and
//! records every evaluation it is asked to perform.
//!
//! # Example
//!
//! ```
//! use heddle::core::types::EvalNamespace;
//! use heddle::script::{FnScriptHost, ScriptHost};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let host = FnScriptHost::new().with_proc("(configure!)", |_ns| Ok(()));
//! let namespace = EvalNamespace::new("config-script-demo")?;
//! host.eval(&namespace, "(configure!)")?;
//! assert_eq!(host.evaluations().len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::core::types::EvalNamespace;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Errors from reading and evaluating scripts.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// A script file could not be read.
    #[error("failed to read script file {path}: {source}")]
    Read {
        /// The file that was requested.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Script evaluation was requested but no host is configured.
    #[error("no script host is configured")]
    NoHost,

    /// The host does not recognize the supplied source.
    #[error("script host has no procedure for source starting {preview:?}")]
    UnknownSource {
        /// The head of the unrecognized source text.
        preview: String,
    },

    /// The host ran the script and it failed.
    #[error("script evaluation failed in namespace {namespace}: {source}")]
    Eval {
        /// The namespace the script was evaluated under.
        namespace: EvalNamespace,
        /// The script's own error.
        #[source]
        source: anyhow::Error,
    },
}

/// A runtime that can evaluate configuration script source.
///
/// Implementations are expected to route the script's effects through
/// the ambient scope, so `eval` is only called while a scope is
/// active. The namespace is freshly minted per evaluation; hosts that
/// compile definitions should key them under it.
pub trait ScriptHost {
    /// Evaluate `source` under the given namespace.
    fn eval(&self, namespace: &EvalNamespace, source: &str) -> Result<(), ScriptError>;
}

/// A script procedure backing one source string in [`FnScriptHost`].
pub type ScriptProc = Arc<dyn Fn(&EvalNamespace) -> anyhow::Result<()>>;

/// An in-process [`ScriptHost`] mapping source strings to closures.
///
/// Stands in for a real interpreter in tests and embedded setups where
/// the "scripts" are authored in Rust. Every evaluation attempt is
/// recorded and can be inspected afterwards.
#[derive(Default)]
pub struct FnScriptHost {
    procs: BTreeMap<String, ScriptProc>,
    evaluations: RefCell<Vec<(EvalNamespace, String)>>,
}

impl fmt::Debug for FnScriptHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnScriptHost")
            .field("procs", &self.procs.keys().collect::<Vec<_>>())
            .field("evaluations", &self.evaluations.borrow().len())
            .finish()
    }
}

impl FnScriptHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a source string to the procedure that evaluates it.
    pub fn with_proc<F>(mut self, source: impl Into<String>, proc: F) -> Self
    where
        F: Fn(&EvalNamespace) -> anyhow::Result<()> + 'static,
    {
        self.procs.insert(source.into(), Arc::new(proc));
        self
    }

    /// Every evaluation attempted so far, in order.
    pub fn evaluations(&self) -> Vec<(EvalNamespace, String)> {
        self.evaluations.borrow().clone()
    }
}

impl ScriptHost for FnScriptHost {
    fn eval(&self, namespace: &EvalNamespace, source: &str) -> Result<(), ScriptError> {
        trace!(namespace = %namespace, bytes = source.len(), "evaluating script");
        self.evaluations
            .borrow_mut()
            .push((namespace.clone(), source.to_string()));
        let proc = self.procs.get(source).ok_or_else(|| ScriptError::UnknownSource {
            preview: preview(source),
        })?;
        proc(namespace).map_err(|err| ScriptError::Eval {
            namespace: namespace.clone(),
            source: err,
        })
    }
}

/// The first line of the source, truncated for error messages.
fn preview(source: &str) -> String {
    const MAX: usize = 48;
    let line = source.lines().next().unwrap_or("");
    if line.len() <= MAX {
        line.to_string()
    } else {
        let cut = line
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &line[..cut])
    }
}
