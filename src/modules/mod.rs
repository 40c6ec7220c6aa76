//! modules
//!
//! Registration and idempotent reloading of configuration modules.
//!
//! # Architecture
//!
//! A configuration module is a named body of host code that contributes
//! to the graph under construction, usually by calling DSL functions.
//! Modules are registered up front in a [`ModuleRegistry`]; the
//! registry is the discovery surface the loader works against.
//!
//! Loading is rebuild-oriented rather than incremental: [`ModuleRegistry::load`]
//! first unloads every module, then loads the requested module and its
//! requirements in dependency order. Stale state from earlier loads
//! can therefore never leak into the result, and loading a module
//! twice converges on the same outcome as loading it once.
//!
//! # Invariants
//!
//! - Unknown names and non-configuration modules are rejected before
//!   any loaded-state changes
//! - The requirement closure is resolved, and cycles detected, before
//!   any loaded-state changes
//! - Requirements load before their dependents, each module at most
//!   once per load

use crate::core::types::ModuleName;
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors from module lookup and loading.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The name is not among the registered modules.
    #[error("module {module} is not registered")]
    NotFound {
        /// The name that was requested.
        module: ModuleName,
    },

    /// The module exists but is not marked as a configuration module.
    #[error("module {module} is not a configuration module")]
    NotConfigModule {
        /// The offending module.
        module: ModuleName,
    },

    /// The requirement graph contains a cycle.
    #[error("module dependency cycle: {}", join_chain(.chain))]
    DependencyCycle {
        /// The cycle, first module repeated at the end.
        chain: Vec<ModuleName>,
    },

    /// A module body failed while loading.
    #[error("module {module} failed to load: {source}")]
    LoadFailed {
        /// The module whose body failed.
        module: ModuleName,
        /// The body's own error.
        #[source]
        source: anyhow::Error,
    },
}

fn join_chain(chain: &[ModuleName]) -> String {
    chain
        .iter()
        .map(ModuleName::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// The body run when a module loads.
pub type ModuleBody = Arc<dyn Fn() -> anyhow::Result<()>>;

/// A registered module definition.
#[derive(Clone)]
pub struct ModuleDef {
    name: ModuleName,
    config_module: bool,
    requires: Vec<ModuleName>,
    body: ModuleBody,
}

impl fmt::Debug for ModuleDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDef")
            .field("name", &self.name)
            .field("config_module", &self.config_module)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}

impl ModuleDef {
    /// Define a configuration module with the given body.
    pub fn config<F>(name: ModuleName, body: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + 'static,
    {
        Self {
            name,
            config_module: true,
            requires: Vec::new(),
            body: Arc::new(body),
        }
    }

    /// Define a module that exists in the discovery surface but is not
    /// a configuration module. Loading it is an error.
    pub fn plain(name: ModuleName) -> Self {
        Self {
            name,
            config_module: false,
            requires: Vec::new(),
            body: Arc::new(|| Ok(())),
        }
    }

    /// Declare a requirement that must load before this module.
    pub fn with_require(mut self, dep: ModuleName) -> Self {
        self.requires.push(dep);
        self
    }

    pub fn name(&self) -> &ModuleName {
        &self.name
    }

    pub fn is_config_module(&self) -> bool {
        self.config_module
    }

    pub fn requires(&self) -> &[ModuleName] {
        &self.requires
    }
}

#[derive(Debug, Clone)]
struct Registered {
    def: ModuleDef,
    loaded: Cell<bool>,
}

/// The discovery surface and loaded-state tracker for modules.
///
/// Loaded flags use interior mutability so module bodies, which hold
/// no reference to the registry, can trigger nested loads through the
/// engine while a load is in progress on the same thread. Clones track
/// loaded state independently.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<ModuleName, Registered>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module definition.
    ///
    /// Re-registering a name replaces the previous definition and
    /// clears its loaded flag, mirroring a module whose source was
    /// redefined.
    pub fn register(&mut self, def: ModuleDef) {
        trace!(module = %def.name, config = def.config_module, "registered module");
        self.modules.insert(
            def.name.clone(),
            Registered {
                def,
                loaded: Cell::new(false),
            },
        );
    }

    pub fn contains(&self, name: &ModuleName) -> bool {
        self.modules.contains_key(name)
    }

    /// All registered module names, in order.
    pub fn list(&self) -> Vec<ModuleName> {
        self.modules.keys().cloned().collect()
    }

    /// Whether a registered module is a configuration module.
    pub fn is_config_module(&self, name: &ModuleName) -> Option<bool> {
        self.modules.get(name).map(|m| m.def.config_module)
    }

    pub fn is_loaded(&self, name: &ModuleName) -> bool {
        self.modules
            .get(name)
            .map(|m| m.loaded.get())
            .unwrap_or(false)
    }

    /// Names of currently loaded modules, in order.
    pub fn loaded(&self) -> Vec<ModuleName> {
        self.modules
            .iter()
            .filter(|(_, m)| m.loaded.get())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Clear one module's loaded flag. Returns whether it was loaded.
    pub fn unload(&self, name: &ModuleName) -> bool {
        match self.modules.get(name) {
            Some(module) => module.loaded.replace(false),
            None => false,
        }
    }

    /// Clear every loaded flag.
    pub fn unload_all(&self) {
        let mut count = 0;
        for module in self.modules.values() {
            if module.loaded.replace(false) {
                count += 1;
            }
        }
        trace!(unloaded = count, "unloaded all modules");
    }

    /// Load a configuration module and its requirements.
    ///
    /// The name is validated and the requirement closure resolved
    /// before any state changes; a failed lookup or cycle leaves the
    /// registry exactly as it was. Then every module is unloaded and
    /// the closure is loaded in dependency order.
    pub fn load(&self, name: &ModuleName) -> Result<(), ModuleError> {
        let entry = self.modules.get(name).ok_or_else(|| ModuleError::NotFound {
            module: name.clone(),
        })?;
        if !entry.def.config_module {
            return Err(ModuleError::NotConfigModule {
                module: name.clone(),
            });
        }
        let order = self.resolve_order(name)?;

        debug!(module = %name, closure = order.len(), "reloading module closure");
        self.unload_all();
        for dep in &order {
            // resolve_order only emits registered names.
            let module = match self.modules.get(dep) {
                Some(module) => module,
                None => {
                    return Err(ModuleError::NotFound {
                        module: dep.clone(),
                    })
                }
            };
            trace!(module = %dep, "loading module");
            (module.def.body)().map_err(|source| ModuleError::LoadFailed {
                module: dep.clone(),
                source,
            })?;
            module.loaded.set(true);
        }
        Ok(())
    }

    /// Postorder of the requirement closure: dependencies first, each
    /// module once. Every name in the closure must be a registered
    /// configuration module, and the walk must be acyclic.
    fn resolve_order(&self, root: &ModuleName) -> Result<Vec<ModuleName>, ModuleError> {
        let mut order = Vec::new();
        let mut done = BTreeSet::new();
        let mut path = Vec::new();
        let mut on_path = BTreeSet::new();
        self.visit(root, &mut order, &mut done, &mut path, &mut on_path)?;
        Ok(order)
    }

    fn visit(
        &self,
        name: &ModuleName,
        order: &mut Vec<ModuleName>,
        done: &mut BTreeSet<ModuleName>,
        path: &mut Vec<ModuleName>,
        on_path: &mut BTreeSet<ModuleName>,
    ) -> Result<(), ModuleError> {
        if done.contains(name) {
            return Ok(());
        }
        if on_path.contains(name) {
            let start = path.iter().position(|m| m == name).unwrap_or(0);
            let mut chain: Vec<ModuleName> = path[start..].to_vec();
            chain.push(name.clone());
            return Err(ModuleError::DependencyCycle { chain });
        }
        let entry = self.modules.get(name).ok_or_else(|| ModuleError::NotFound {
            module: name.clone(),
        })?;
        if !entry.def.config_module {
            return Err(ModuleError::NotConfigModule {
                module: name.clone(),
            });
        }
        path.push(name.clone());
        on_path.insert(name.clone());
        for dep in &entry.def.requires {
            self.visit(dep, order, done, path, on_path)?;
        }
        path.pop();
        on_path.remove(name);
        done.insert(name.clone());
        order.push(name.clone());
        Ok(())
    }
}
