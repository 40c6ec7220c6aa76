//! dsl
//!
//! The invocation wrapper that turns host closures into well-behaved
//! configuration DSL functions.
//!
//! # Call protocol
//!
//! Every [`DslFunction::call`] runs the same sequence:
//!
//! 1. Validate the supplied arguments against the declared
//!    [`args::ArgSpec`]. Failures report every offending argument and
//!    happen before any side effect.
//! 2. Conform the arguments into their canonical keyed form.
//! 3. Push a provenance frame (function name, literal arguments, and
//!    the script namespace when one is active) onto the scope.
//! 4. Run the body and pop the frame, success or failure.
//!
//! Bodies receive [`args::ConformedArgs`] and have implicit access to
//! the ambient scope helpers: [`crate::scope::transact`] to change the
//! graph, [`resolve_id`] and [`read_attr`] to query it.
//!
//! # Example
//!
//! ```
//! use heddle::core::graph::ConfigGraph;
//! use heddle::core::ops::Op;
//! use heddle::core::types::{AttrName, QualifiedName, TempId};
//! use heddle::core::value::Value;
//! use heddle::dsl::args::{ArgKind, ArgSpec};
//! use heddle::dsl::DslFunction;
//! use heddle::scope;
//! use heddle::store::MemoryStore;
//! use std::sync::Arc;
//!
//! let server = DslFunction::define(
//!     QualifiedName::new("app.dsl/server").unwrap(),
//!     ArgSpec::empty().required("port", ArgKind::Int),
//!     |args| {
//!         let port = args.int("port").unwrap_or(80);
//!         let tempid = TempId::new("srv").unwrap();
//!         let ops = vec![Op::assert(
//!             tempid.clone(),
//!             AttrName::new("http/port").unwrap(),
//!             port,
//!         )];
//!         let id = scope::transact(&ops, Some(&tempid))?;
//!         Ok(id.map(Value::Ref).unwrap_or(Value::Bool(false)))
//!     },
//! );
//!
//! let store = Arc::new(MemoryStore::new());
//! let (result, graph) = scope::with_scope(store, ConfigGraph::new(), || {
//!     server.call(&[("port", Value::Int(8080))])
//! })
//! .unwrap();
//! assert!(matches!(result.unwrap(), Value::Ref(_)));
//! assert_eq!(graph.len(), 1);
//! ```

pub mod args;

use crate::core::graph::ConfigGraph;
use crate::core::ops::EntityRef;
use crate::core::types::{AttrName, EntityId, Ident, QualifiedName};
use crate::core::value::Value;
use crate::scope::provenance::ProvenanceFrame;
use crate::scope::{self, FrameGuard, ScopeError, TransactError};
use crate::store::StoreError;
use args::{ArgProblem, ArgSpec, ConformedArgs};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Errors from DSL invocation and the ambient resolution helpers.
#[derive(Debug, Error)]
pub enum DslError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The call's arguments did not fit the declared shape.
    #[error("invalid arguments for {function}: {}", args::render_problems(.problems))]
    InvalidArguments {
        /// The function that was called.
        function: QualifiedName,
        /// Every offending argument.
        problems: Vec<ArgProblem>,
    },

    /// A stable ident had no entity in the graph under construction.
    #[error("unresolved reference {ident} required by {}", consumer_label(.function))]
    UnresolvedReference {
        /// The ident that failed to resolve.
        ident: Ident,
        /// The DSL function that asked, when the failure happened
        /// inside a call.
        function: Option<QualifiedName>,
        /// The provenance stack at the point of failure.
        frames: Vec<ProvenanceFrame>,
        /// The graph that was searched.
        graph: Box<ConfigGraph>,
    },

    /// A function body failed for a reason of its own.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn consumer_label(function: &Option<QualifiedName>) -> String {
    match function {
        Some(name) => name.to_string(),
        None => "host code".to_string(),
    }
}

impl From<TransactError> for DslError {
    fn from(err: TransactError) -> Self {
        match err {
            TransactError::Scope(e) => DslError::Scope(e),
            TransactError::Store(e) => DslError::Store(e),
        }
    }
}

/// The callable body of a DSL function.
pub type DslBody = Arc<dyn Fn(&ConformedArgs) -> Result<Value, DslError>>;

/// A named DSL function: declared argument shape plus body.
///
/// Cloning is cheap; clones share the body.
#[derive(Clone)]
pub struct DslFunction {
    name: QualifiedName,
    spec: ArgSpec,
    body: DslBody,
}

impl fmt::Debug for DslFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DslFunction")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl DslFunction {
    /// Declare a new DSL function.
    pub fn define<F>(name: QualifiedName, spec: ArgSpec, body: F) -> Self
    where
        F: Fn(&ConformedArgs) -> Result<Value, DslError> + 'static,
    {
        Self {
            name,
            spec,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    pub fn spec(&self) -> &ArgSpec {
        &self.spec
    }

    /// Invoke the function with named arguments.
    pub fn call<S: AsRef<str>>(&self, call_args: &[(S, Value)]) -> Result<Value, DslError> {
        let conformed = match self.spec.conform(call_args) {
            Ok(conformed) => conformed,
            Err(problems) => {
                return Err(DslError::InvalidArguments {
                    function: self.name.clone(),
                    problems,
                })
            }
        };
        let frame = ProvenanceFrame::new(
            self.name.clone(),
            conformed.to_pairs(),
            scope::current_namespace(),
        );
        let _frame = FrameGuard::push(frame);
        trace!(function = %self.name, "dsl call");
        (self.body)(&conformed)
    }
}

/// Resolve a stable ident against the graph under construction.
///
/// Never creates: an unknown ident fails with
/// [`DslError::UnresolvedReference`] carrying the provenance stack and
/// a snapshot of the graph that was searched.
pub fn resolve_id(ident: &Ident) -> Result<EntityId, DslError> {
    let store = scope::current_store()?;
    let graph = scope::current_graph()?;
    match store.resolve_ref(&graph, &EntityRef::Ident(ident.clone())) {
        Some(id) => Ok(id),
        None => Err(DslError::UnresolvedReference {
            ident: ident.clone(),
            function: scope::current_function(),
            frames: scope::captured_frames(),
            graph: Box::new(graph),
        }),
    }
}

/// Read one attribute of an entity in the graph under construction.
pub fn read_attr(entity: &EntityRef, attr: &AttrName) -> Result<Option<Value>, DslError> {
    let store = scope::current_store()?;
    let graph = scope::current_graph()?;
    Ok(store.attr(&graph, entity, attr))
}
