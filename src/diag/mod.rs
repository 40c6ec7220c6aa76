//! diag
//!
//! Structured explanations for build failures.
//!
//! # Architecture
//!
//! Every error family in the crate implements [`Explain`], turning the
//! error into an [`Explanation`]: a headline, labeled details, and
//! remediation hints. Explanations are plain data with a deterministic
//! `Display`, so hosts can print them, log them, or assert on them.
//!
//! Wrapped errors explain through their cause. An apply error carrying
//! a module load failure whose root cause is an unresolved reference
//! explains as the unresolved reference, annotated with the module
//! that was loading when it happened.
//!
//! # Example
//!
//! ```
//! use heddle::diag::{DiagOptions, Explain};
//! use heddle::scope::ScopeError;
//!
//! let err = ScopeError::NoActiveScope {
//!     operation: "transact",
//! };
//! let explanation = err.explain(&DiagOptions::default());
//! assert!(explanation.to_string().contains("no active configuration scope"));
//! ```

use crate::dsl::DslError;
use crate::engine::ApplyError;
use crate::modules::ModuleError;
use crate::scope::provenance::script_frames;
use crate::scope::{ScopeError, TransactError};
use crate::script::ScriptError;
use crate::store::StoreError;
use std::fmt;

/// Rendering options for explanations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagOptions {
    /// How many entities a graph snapshot shows. Zero omits snapshots.
    pub snapshot_entities: usize,
}

impl Default for DiagOptions {
    fn default() -> Self {
        Self {
            snapshot_entities: 8,
        }
    }
}

/// A structured account of one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explanation {
    headline: String,
    details: Vec<(String, String)>,
    remediation: Vec<String>,
}

impl Explanation {
    pub fn new(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            details: Vec::new(),
            remediation: Vec::new(),
        }
    }

    /// Append a labeled detail.
    pub fn detail(mut self, label: impl Into<String>, value: impl fmt::Display) -> Self {
        self.details.push((label.into(), value.to_string()));
        self
    }

    /// Append a remediation hint.
    pub fn advise(mut self, hint: impl Into<String>) -> Self {
        self.remediation.push(hint.into());
        self
    }

    pub fn headline(&self) -> &str {
        &self.headline
    }

    pub fn details(&self) -> &[(String, String)] {
        &self.details
    }

    pub fn remediation(&self) -> &[String] {
        &self.remediation
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.headline)?;
        for (label, value) in &self.details {
            if value.contains('\n') {
                write!(f, "\n  {label}:")?;
                for line in value.lines() {
                    write!(f, "\n  {line}")?;
                }
            } else {
                write!(f, "\n  {label}: {value}")?;
            }
        }
        if !self.remediation.is_empty() {
            write!(f, "\ntry:")?;
            for hint in &self.remediation {
                write!(f, "\n  - {hint}")?;
            }
        }
        Ok(())
    }
}

/// Turn an error into a structured explanation.
pub trait Explain {
    fn explain(&self, options: &DiagOptions) -> Explanation;
}

impl Explain for ScopeError {
    fn explain(&self, _options: &DiagOptions) -> Explanation {
        match self {
            ScopeError::NoActiveScope { operation } => Explanation::new(self.to_string())
                .detail("operation", operation)
                .advise(
                    "Run configuration code through Engine::apply_initializer \
                     or scope::with_scope.",
                ),
            ScopeError::DepthExceeded { depth, limit } => Explanation::new(self.to_string())
                .detail("depth", depth)
                .detail("limit", limit)
                .advise("Break the recursive build, or raise scope.max_depth in the settings."),
        }
    }
}

impl Explain for StoreError {
    fn explain(&self, _options: &DiagOptions) -> Explanation {
        match self {
            StoreError::IdentTaken { ident, existing } => Explanation::new(self.to_string())
                .detail("ident", ident)
                .detail("held by", format!("#{existing}"))
                .advise("Retract the stable id from the holding entity before reassigning it."),
            StoreError::InvalidStableId { .. } => Explanation::new(self.to_string())
                .advise("Stable id values must be idents like \"app/server\"."),
            StoreError::ReservedAttr { attr } => Explanation::new(self.to_string())
                .detail("attribute", attr)
                .advise("Attribute names under heddle/ belong to the store; pick another namespace."),
        }
    }
}

impl Explain for TransactError {
    fn explain(&self, options: &DiagOptions) -> Explanation {
        match self {
            TransactError::Scope(e) => e.explain(options),
            TransactError::Store(e) => e.explain(options),
        }
    }
}

impl Explain for DslError {
    fn explain(&self, options: &DiagOptions) -> Explanation {
        match self {
            DslError::Scope(e) => e.explain(options),
            DslError::Store(e) => e.explain(options),
            DslError::InvalidArguments { function, problems } => {
                let mut explanation =
                    Explanation::new(format!("invalid arguments for {function}"));
                for problem in problems {
                    explanation = explanation.detail("argument", problem);
                }
                explanation
                    .advise("The call was rejected before any side effect; nothing changed.")
                    .advise(format!("Check the declared argument spec of {function}."))
            }
            DslError::UnresolvedReference {
                ident,
                function,
                frames,
                graph,
            } => {
                let mut explanation =
                    Explanation::new(self.to_string()).detail("reference", ident);
                explanation = match function {
                    Some(name) => explanation.detail("consumer", name),
                    None => explanation.detail("consumer", "host code"),
                };
                if !frames.is_empty() {
                    let stack: Vec<String> =
                        frames.iter().map(ToString::to_string).collect();
                    explanation = explanation.detail("call stack", stack.join(" -> "));
                }
                let scripts = script_frames(frames);
                if !scripts.is_empty() {
                    explanation = explanation.detail("script frames", scripts.len());
                }
                if options.snapshot_entities > 0 {
                    explanation = explanation
                        .detail("graph searched", graph.render(options.snapshot_entities));
                }
                explanation.advise(
                    "Create the entity before referencing it, or load the module that defines it.",
                )
            }
            DslError::Other(e) => explain_anyhow(e, options),
        }
    }
}

impl Explain for ModuleError {
    fn explain(&self, options: &DiagOptions) -> Explanation {
        match self {
            ModuleError::NotFound { .. } => Explanation::new(self.to_string())
                .advise("Register the module with the engine before loading it."),
            ModuleError::NotConfigModule { .. } => Explanation::new(self.to_string())
                .advise("Only modules registered as configuration modules can load."),
            ModuleError::DependencyCycle { chain } => {
                let rendered: Vec<String> = chain.iter().map(ToString::to_string).collect();
                Explanation::new("module requirements form a cycle")
                    .detail("cycle", rendered.join(" -> "))
                    .advise("Remove one of the requirements to break the cycle.")
            }
            ModuleError::LoadFailed { module, source } => {
                explain_anyhow(source, options).detail("while loading module", module)
            }
        }
    }
}

impl Explain for ScriptError {
    fn explain(&self, options: &DiagOptions) -> Explanation {
        match self {
            ScriptError::Read { path, .. } => Explanation::new(self.to_string())
                .detail("path", path.display())
                .advise("Check the script file's path and permissions."),
            ScriptError::NoHost => Explanation::new(self.to_string())
                .advise("Attach a script host with Engine::with_host before dispatching scripts."),
            ScriptError::UnknownSource { .. } => Explanation::new(self.to_string())
                .advise("Register the source with the script host, or check the script text."),
            ScriptError::Eval {
                namespace, source, ..
            } => explain_anyhow(source, options).detail("namespace", namespace),
        }
    }
}

impl Explain for ApplyError {
    fn explain(&self, options: &DiagOptions) -> Explanation {
        match self {
            ApplyError::Scope(e) => e.explain(options),
            ApplyError::Store(e) => e.explain(options),
            ApplyError::Module(e) => e.explain(options),
            ApplyError::Script(e) => e.explain(options),
            ApplyError::FunctionNotFound { .. } => Explanation::new(self.to_string())
                .advise("Register the function with Engine::register_function before dispatching it."),
            ApplyError::FunctionFailed { name, source } => {
                explain_anyhow(source, options).detail("while running function", name)
            }
        }
    }
}

/// Explain a host-code error, recovering a structured explanation when
/// the chain bottoms out in one of this crate's error types.
fn explain_anyhow(err: &anyhow::Error, options: &DiagOptions) -> Explanation {
    if let Some(dsl) = err.downcast_ref::<DslError>() {
        return dsl.explain(options);
    }
    if let Some(transact) = err.downcast_ref::<TransactError>() {
        return transact.explain(options);
    }
    if let Some(apply) = err.downcast_ref::<ApplyError>() {
        return apply.explain(options);
    }
    if let Some(scope) = err.downcast_ref::<ScopeError>() {
        return scope.explain(options);
    }
    if let Some(store) = err.downcast_ref::<StoreError>() {
        return store.explain(options);
    }
    let mut explanation = Explanation::new(format!("configuration code failed: {err}"));
    let root = err.root_cause().to_string();
    if root != err.to_string() {
        explanation = explanation.detail("cause", root);
    }
    explanation
}
