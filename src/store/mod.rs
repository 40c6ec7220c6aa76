//! store
//!
//! The entity store contract and its in-memory implementation.
//!
//! # Design
//!
//! The engine consumes the store through the narrow [`ConfigStore`]
//! trait: apply a batch, resolve a tempid, resolve an entity ref, read
//! an attribute. Everything else the store may be able to do is out of
//! reach, which keeps the evaluation layer testable against a double
//! and lets richer stores slot in without touching the engine.
//!
//! Stores never mutate a graph in place. `apply` takes a snapshot and
//! returns a new one; the caller decides which snapshot becomes
//! current. A failed apply therefore leaves the caller's graph exactly
//! as it was.
//!
//! # Example
//!
//! ```
//! use heddle::core::graph::ConfigGraph;
//! use heddle::core::ops::{EntityRef, Op};
//! use heddle::core::types::{AttrName, TempId};
//! use heddle::core::value::Value;
//! use heddle::store::{ConfigStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let tempid = TempId::new("srv").unwrap();
//! let port = AttrName::new("http/port").unwrap();
//!
//! let ops = vec![Op::assert(tempid.clone(), port.clone(), 8080i64)];
//! let graph = store.apply(&ConfigGraph::new(), &ops).unwrap();
//!
//! let id = store.resolve_tempid(&graph, &tempid).unwrap();
//! let value = store.attr(&graph, &EntityRef::Id(id), &port);
//! assert_eq!(value, Some(Value::Int(8080)));
//! ```

mod memory;

pub use memory::MemoryStore;

use crate::core::graph::ConfigGraph;
use crate::core::ops::{EntityRef, Op};
use crate::core::types::{AttrName, EntityId, Ident, TempId};
use crate::core::value::Value;
use thiserror::Error;

/// Errors from applying an operation batch.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A stable ident is already carried by a different entity.
    #[error("stable ident {ident} is already bound to entity #{existing}")]
    IdentTaken {
        /// The contested ident.
        ident: Ident,
        /// The entity that already carries it.
        existing: EntityId,
    },

    /// A write to the stable-id attribute was not a valid ident value.
    #[error("invalid stable-id assertion on {handle}: {reason}")]
    InvalidStableId {
        /// The handle the batch wrote to.
        handle: String,
        /// What was wrong with the assertion.
        reason: String,
    },

    /// A write targeted a reserved attribute the store maintains itself.
    #[error("attribute {attr} is reserved")]
    ReservedAttr {
        /// The offending attribute.
        attr: AttrName,
    },
}

/// The narrow contract the evaluation layer holds on the entity store.
pub trait ConfigStore {
    /// Apply a batch of operations to a graph snapshot, returning the
    /// derived snapshot. The input graph is never modified.
    fn apply(&self, graph: &ConfigGraph, ops: &[Op]) -> Result<ConfigGraph, StoreError>;

    /// Resolve a tempid recorded by a previously applied batch.
    fn resolve_tempid(&self, graph: &ConfigGraph, tempid: &TempId) -> Option<EntityId>;

    /// Resolve an entity ref to the id of an existing entity.
    ///
    /// Returns `None` when the entity does not exist. Reads never
    /// create.
    fn resolve_ref(&self, graph: &ConfigGraph, entity: &EntityRef) -> Option<EntityId>;

    /// Read one attribute of an entity.
    fn attr(&self, graph: &ConfigGraph, entity: &EntityRef, attr: &AttrName) -> Option<Value>;
}
