//! store::memory
//!
//! The in-memory reference store.
//!
//! # Semantics
//!
//! `apply` folds a batch over a cloned snapshot:
//!
//! 1. The target handle is resolved to an entity id. Explicit ids
//!    create the entity if absent and raise the watermark; idents
//!    upsert through the ident index; tempids mint once per distinct
//!    tempid per batch.
//! 2. Values are canonicalized. A tempid in value position becomes a
//!    ref to the entity that tempid minted, recursing through lists.
//! 3. The write lands. Writes to the stable-id attribute also maintain
//!    the ident index and reject idents claimed by other entities.
//!
//! After the fold, the batch's tempid resolutions are recorded on the
//! returned graph, replacing earlier resolutions of the same tempid.
//! Entity ids are minted sequentially, so identical batches applied to
//! identical snapshots produce identical graphs.

use super::{ConfigStore, StoreError};
use crate::core::graph::ConfigGraph;
use crate::core::ops::{EntityHandle, EntityRef, Op};
use crate::core::types::{AttrName, EntityId, TempId};
use crate::core::value::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// The in-memory implementation of [`ConfigStore`].
///
/// Stateless: all state lives in the graph snapshots it is handed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStore;

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore
    }
}

impl ConfigStore for MemoryStore {
    fn apply(&self, graph: &ConfigGraph, ops: &[Op]) -> Result<ConfigGraph, StoreError> {
        let mut next = graph.clone();
        let mut batch: BTreeMap<TempId, EntityId> = BTreeMap::new();

        for op in ops {
            trace!(op = %op.describe(), "applying op");
            match op {
                Op::Entity { handle, attrs } => {
                    let id = resolve_handle(&mut next, &mut batch, handle);
                    for (attr, value) in attrs {
                        write_attr(&mut next, &mut batch, id, handle, attr, value)?;
                    }
                }
                Op::Assert {
                    handle,
                    attr,
                    value,
                } => {
                    let id = resolve_handle(&mut next, &mut batch, handle);
                    write_attr(&mut next, &mut batch, id, handle, attr, value)?;
                }
                Op::Retract {
                    handle,
                    attr,
                    value,
                } => {
                    let id = resolve_handle(&mut next, &mut batch, handle);
                    retract_attr(&mut next, &mut batch, id, attr, value.as_ref());
                }
            }
        }

        for (tempid, id) in batch {
            next.record_tempid(tempid, id);
        }
        debug!(ops = ops.len(), entities = next.len(), "applied batch");
        Ok(next)
    }

    fn resolve_tempid(&self, graph: &ConfigGraph, tempid: &TempId) -> Option<EntityId> {
        graph.tempid_entity(tempid)
    }

    fn resolve_ref(&self, graph: &ConfigGraph, entity: &EntityRef) -> Option<EntityId> {
        match entity {
            EntityRef::Id(id) => graph.contains(*id).then_some(*id),
            EntityRef::Ident(ident) => graph.ident_entity(ident),
        }
    }

    fn attr(&self, graph: &ConfigGraph, entity: &EntityRef, attr: &AttrName) -> Option<Value> {
        let id = self.resolve_ref(graph, entity)?;
        graph.get_attr(id, attr).cloned()
    }
}

/// Resolve the entity a handle designates, creating it if needed.
fn resolve_handle(
    graph: &mut ConfigGraph,
    batch: &mut BTreeMap<TempId, EntityId>,
    handle: &EntityHandle,
) -> EntityId {
    match handle {
        EntityHandle::Id(id) => {
            graph.ensure(*id);
            *id
        }
        EntityHandle::Temp(tempid) => resolve_temp(graph, batch, tempid),
        EntityHandle::Ident(ident) => match graph.ident_entity(ident) {
            Some(id) => id,
            None => {
                let id = graph.mint();
                graph.set_attr(id, AttrName::stable_id(), Value::Ident(ident.clone()));
                graph.index_ident(ident.clone(), id);
                id
            }
        },
    }
}

/// One entity per distinct tempid per batch.
fn resolve_temp(
    graph: &mut ConfigGraph,
    batch: &mut BTreeMap<TempId, EntityId>,
    tempid: &TempId,
) -> EntityId {
    if let Some(id) = batch.get(tempid) {
        return *id;
    }
    let id = graph.mint();
    batch.insert(tempid.clone(), id);
    id
}

/// Rewrite tempids in value position into refs, recursing through
/// lists. Everything else passes through unchanged.
fn resolve_value(
    graph: &mut ConfigGraph,
    batch: &mut BTreeMap<TempId, EntityId>,
    value: &Value,
) -> Value {
    match value {
        Value::Tempid(tempid) => Value::Ref(resolve_temp(graph, batch, tempid)),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| resolve_value(graph, batch, item))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn write_attr(
    graph: &mut ConfigGraph,
    batch: &mut BTreeMap<TempId, EntityId>,
    id: EntityId,
    handle: &EntityHandle,
    attr: &AttrName,
    value: &Value,
) -> Result<(), StoreError> {
    if *attr == AttrName::stable_id() {
        return write_stable_id(graph, id, handle, value);
    }
    if attr.is_reserved() {
        return Err(StoreError::ReservedAttr { attr: attr.clone() });
    }
    let resolved = resolve_value(graph, batch, value);
    graph.set_attr(id, attr.clone(), resolved);
    Ok(())
}

/// Write the stable-id attribute, keeping the ident index consistent.
fn write_stable_id(
    graph: &mut ConfigGraph,
    id: EntityId,
    handle: &EntityHandle,
    value: &Value,
) -> Result<(), StoreError> {
    let ident = match value {
        Value::Ident(ident) => ident.clone(),
        other => {
            return Err(StoreError::InvalidStableId {
                handle: handle.to_string(),
                reason: format!("expected an ident value, got {}", other.kind()),
            })
        }
    };
    if let Some(existing) = graph.ident_entity(&ident) {
        if existing != id {
            return Err(StoreError::IdentTaken { ident, existing });
        }
    }
    // Re-identifying an entity releases its previous ident.
    if let Some(Value::Ident(previous)) = graph.get_attr(id, &AttrName::stable_id()).cloned() {
        if previous != ident {
            graph.unindex_ident(&previous);
        }
    }
    graph.set_attr(id, AttrName::stable_id(), Value::Ident(ident.clone()));
    graph.index_ident(ident, id);
    Ok(())
}

fn retract_attr(
    graph: &mut ConfigGraph,
    batch: &mut BTreeMap<TempId, EntityId>,
    id: EntityId,
    attr: &AttrName,
    guard: Option<&Value>,
) {
    if let Some(expected) = guard {
        let resolved = resolve_value(graph, batch, expected);
        if graph.get_attr(id, attr) != Some(&resolved) {
            return;
        }
    }
    if let Some(Value::Ident(ident)) = graph.remove_attr(id, attr) {
        if *attr == AttrName::stable_id() {
            graph.unindex_ident(&ident);
        }
    }
}
