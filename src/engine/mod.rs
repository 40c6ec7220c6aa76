//! engine
//!
//! Orchestrates configuration builds: install scope -> dispatch
//! initializer -> collect graph.
//!
//! # Architecture
//!
//! The engine owns everything a build needs: the store, the module
//! registry, the table of registered configuration functions, the
//! optional script host, and the settings. [`Engine::apply_initializer`]
//! is the single entry point:
//!
//! 1. **Install**: a scope is entered for the calling thread, seeded
//!    with the caller's graph and the engine's store
//! 2. **Dispatch**: the initializer runs inside that scope, mutating
//!    the graph through the ambient helpers
//! 3. **Collect**: the scope is torn down and the final graph returned
//!
//! The caller's graph is cloned on the way in, so a failed initializer
//! leaves it untouched; the partially built graph is discarded with the
//! scope.
//!
//! # Invariants
//!
//! - Every entered scope is torn down, whether dispatch succeeds,
//!   fails, or panics
//! - A blank or absent initializer is a no-op, never an error
//! - Unknown functions and modules are rejected without mutating
//!   engine or graph state
//!
//! # Example
//!
//! ```
//! use heddle::core::graph::ConfigGraph;
//! use heddle::core::ops::Op;
//! use heddle::core::types::{AttrName, EntityId};
//! use heddle::engine::{Engine, Initializer};
//!
//! let engine = Engine::new();
//! let batch = Initializer::ops(vec![Op::assert(
//!     EntityId::new(1),
//!     AttrName::new("app/name").unwrap(),
//!     "demo",
//! )]);
//! let graph = engine
//!     .apply_initializer(&ConfigGraph::new(), &batch)
//!     .unwrap();
//! assert_eq!(graph.len(), 1);
//! ```

pub mod initializer;

pub use initializer::Initializer;

use crate::core::graph::{ConfigGraph, Fingerprint};
use crate::core::types::{EvalNamespace, QualifiedName};
use crate::modules::{ModuleDef, ModuleError, ModuleRegistry};
use crate::scope::{self, ScopeError, TransactError};
use crate::script::{ScriptError, ScriptHost};
use crate::settings::Settings;
use crate::store::{ConfigStore, MemoryStore, StoreError};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from applying an initializer.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    /// A function initializer named something never registered.
    #[error("no configuration function named {name} is registered")]
    FunctionNotFound {
        /// The name that was requested.
        name: QualifiedName,
    },

    /// A registered configuration function failed.
    #[error("configuration function {name} failed: {source}")]
    FunctionFailed {
        /// The function that failed.
        name: QualifiedName,
        /// The function's own error.
        #[source]
        source: anyhow::Error,
    },
}

impl From<TransactError> for ApplyError {
    fn from(err: TransactError) -> Self {
        match err {
            TransactError::Scope(e) => ApplyError::Scope(e),
            TransactError::Store(e) => ApplyError::Store(e),
        }
    }
}

/// A registered configuration function: graph in, graph out.
///
/// Bodies run inside the build's scope, so they may also use the
/// ambient helpers; the returned graph is what becomes current.
pub type BuildFn = Arc<dyn Fn(&ConfigGraph) -> anyhow::Result<ConfigGraph>>;

/// The build coordinator.
///
/// An engine is deliberately thread-confined: builds run on the
/// calling thread against that thread's scope stack. Run independent
/// builds on independent threads with their own engines.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn ConfigStore>,
    host: Option<Arc<dyn ScriptHost>>,
    modules: ModuleRegistry,
    functions: BTreeMap<QualifiedName, BuildFn>,
    settings: Settings,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("modules", &self.modules.list())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("script_host", &self.host.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine over the in-memory store, with default settings and no
    /// script host.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            host: None,
            modules: ModuleRegistry::new(),
            functions: BTreeMap::new(),
            settings: Settings::default(),
        }
    }

    /// Replace the store builds run against.
    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = store;
        self
    }

    /// Attach a script host. Without one, non-blank script initializers
    /// fail with [`ScriptError::NoHost`].
    pub fn with_host(mut self, host: Arc<dyn ScriptHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Replace the engine settings.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Register a configuration module.
    pub fn register_module(&mut self, def: ModuleDef) {
        self.modules.register(def);
    }

    /// Register a configuration function under a qualified name.
    pub fn register_function<F>(&mut self, name: QualifiedName, f: F)
    where
        F: Fn(&ConfigGraph) -> anyhow::Result<ConfigGraph> + 'static,
    {
        self.functions.insert(name, Arc::new(f));
    }

    /// The store builds run against.
    pub fn store(&self) -> Arc<dyn ConfigStore> {
        self.store.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The module registry, for discovery and loaded-state queries.
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Names of the registered configuration functions, in order.
    pub fn function_names(&self) -> Vec<QualifiedName> {
        self.functions.keys().cloned().collect()
    }

    /// Apply an optional initializer. Absent means no-op: the graph
    /// comes back unchanged.
    pub fn apply(
        &self,
        graph: &ConfigGraph,
        initializer: Option<&Initializer>,
    ) -> Result<ConfigGraph, ApplyError> {
        match initializer {
            None => {
                debug!("no initializer; graph unchanged");
                Ok(graph.clone())
            }
            Some(init) => self.apply_initializer(graph, init),
        }
    }

    /// Apply one initializer to a graph, returning the resulting graph.
    pub fn apply_initializer(
        &self,
        graph: &ConfigGraph,
        initializer: &Initializer,
    ) -> Result<ConfigGraph, ApplyError> {
        debug!(initializer = %initializer.describe(), "applying initializer");
        let (result, final_graph) = scope::with_scope_limited(
            self.store.clone(),
            graph.clone(),
            self.settings.scope.max_depth,
            || self.dispatch(initializer),
        )?;
        result?;
        Ok(final_graph)
    }

    /// Build a graph from scratch by applying initializers in order.
    ///
    /// Each initializer sees the graph the previous one produced. The
    /// first failure aborts the build.
    pub fn build(&self, initializers: &[Initializer]) -> Result<ConfigGraph, ApplyError> {
        let mut graph = ConfigGraph::new();
        for initializer in initializers {
            graph = self.apply_initializer(&graph, initializer)?;
        }
        info!(
            entities = graph.len(),
            fingerprint = %Fingerprint::compute(&graph),
            "configuration build complete"
        );
        Ok(graph)
    }

    fn dispatch(&self, initializer: &Initializer) -> Result<(), ApplyError> {
        match initializer {
            Initializer::Function { name } => self.run_function(name),
            Initializer::Module { name } => Ok(self.modules.load(name)?),
            Initializer::File { path } => {
                let source = fs::read_to_string(path).map_err(|source| ScriptError::Read {
                    path: path.clone(),
                    source,
                })?;
                self.eval_script(&source)
            }
            Initializer::Ops { ops } => {
                scope::transact(ops, None)?;
                Ok(())
            }
            Initializer::Script { source } => {
                if source.trim().is_empty() {
                    debug!("blank inline script; nothing to do");
                    return Ok(());
                }
                self.eval_script(source)
            }
        }
    }

    fn run_function(&self, name: &QualifiedName) -> Result<(), ApplyError> {
        let f = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| ApplyError::FunctionNotFound { name: name.clone() })?;
        scope::update_graph::<ApplyError, _>(|graph| {
            f(graph).map_err(|source| ApplyError::FunctionFailed {
                name: name.clone(),
                source,
            })
        })?;
        Ok(())
    }

    fn eval_script(&self, source: &str) -> Result<(), ApplyError> {
        let host = self.host.as_ref().ok_or(ScriptError::NoHost)?.clone();
        let namespace = EvalNamespace::fresh(&self.settings.script.namespace_prefix);
        debug!(namespace = %namespace, "evaluating configuration script");
        scope::with_eval_namespace(namespace.clone(), || host.eval(&namespace, source))?;
        Ok(())
    }

    /// Explain a build failure using the engine's diagnostic settings.
    pub fn explain(&self, error: &ApplyError) -> crate::diag::Explanation {
        let options = crate::diag::DiagOptions {
            snapshot_entities: self.settings.diag.snapshot_entities,
        };
        crate::diag::Explain::explain(error, &options)
    }
}
