//! core::graph
//!
//! The configuration graph value type.
//!
//! # Architecture
//!
//! A [`ConfigGraph`] is an immutable snapshot of configuration state:
//! - Entities are maps from attribute name to value, keyed by [`EntityId`]
//! - An ident index maps each stable ident to the entity carrying it
//! - A tempid map records the placeholder resolutions of applied batches
//! - A watermark tracks the next id to mint
//!
//! Graphs are plain values. The store never mutates a graph in place;
//! it derives a new one, and callers decide which snapshot to keep.
//! Equality compares entity content, the ident index, and the tempid
//! map, so two builds can be checked for convergence directly.
//!
//! # Invariants
//!
//! - Every ident index entry points at an entity whose stable-id
//!   attribute holds that ident
//! - Entity ids never exceed the watermark
//! - Values never contain tempids once a batch has been applied

use crate::core::types::{AttrName, EntityId, Ident, TempId};
use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// An immutable snapshot of configuration state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigGraph {
    /// Attribute maps keyed by entity id.
    entities: BTreeMap<EntityId, BTreeMap<AttrName, Value>>,
    /// Stable ident to entity index.
    idents: BTreeMap<Ident, EntityId>,
    /// Tempid resolutions from applied batches, last batch wins.
    tempids: BTreeMap<TempId, EntityId>,
    /// The next entity id to mint.
    next_id: u64,
}

impl ConfigGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities in the graph.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// The attribute map of an entity, if it exists.
    pub fn entity(&self, id: EntityId) -> Option<&BTreeMap<AttrName, Value>> {
        self.entities.get(&id)
    }

    /// All entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &BTreeMap<AttrName, Value>)> {
        self.entities.iter().map(|(id, attrs)| (*id, attrs))
    }

    /// The entity carrying a stable ident, if any.
    pub fn ident_entity(&self, ident: &Ident) -> Option<EntityId> {
        self.idents.get(ident).copied()
    }

    /// All stable idents in the graph, in order.
    pub fn idents(&self) -> impl Iterator<Item = (&Ident, EntityId)> {
        self.idents.iter().map(|(ident, id)| (ident, *id))
    }

    /// The resolution of a tempid recorded by an applied batch.
    pub fn tempid_entity(&self, tempid: &TempId) -> Option<EntityId> {
        self.tempids.get(tempid).copied()
    }

    /// The next id the store will mint against this graph.
    pub fn watermark(&self) -> u64 {
        self.next_id
    }

    // Mutators below are crate-private. All graph changes flow through
    // the store's apply path, which maintains the index invariants.

    /// Mint a fresh entity and return its id.
    pub(crate) fn mint(&mut self) -> EntityId {
        let id = EntityId::new(self.next_id);
        self.next_id += 1;
        self.entities.insert(id, BTreeMap::new());
        id
    }

    /// Ensure an entity with this exact id exists, raising the
    /// watermark past it if needed.
    pub(crate) fn ensure(&mut self, id: EntityId) {
        self.entities.entry(id).or_default();
        if id.as_u64() >= self.next_id {
            self.next_id = id.as_u64() + 1;
        }
    }

    pub(crate) fn set_attr(&mut self, id: EntityId, attr: AttrName, value: Value) {
        self.entities.entry(id).or_default().insert(attr, value);
    }

    pub(crate) fn get_attr(&self, id: EntityId, attr: &AttrName) -> Option<&Value> {
        self.entities.get(&id).and_then(|attrs| attrs.get(attr))
    }

    pub(crate) fn remove_attr(&mut self, id: EntityId, attr: &AttrName) -> Option<Value> {
        self.entities.get_mut(&id).and_then(|attrs| attrs.remove(attr))
    }

    pub(crate) fn index_ident(&mut self, ident: Ident, id: EntityId) {
        self.idents.insert(ident, id);
    }

    pub(crate) fn unindex_ident(&mut self, ident: &Ident) {
        self.idents.remove(ident);
    }

    pub(crate) fn record_tempid(&mut self, tempid: TempId, id: EntityId) {
        self.tempids.insert(tempid, id);
    }

    /// Render the first `limit` entities as indented lines, with a
    /// trailing count when entities were elided. Used by diagnostics.
    pub fn render(&self, limit: usize) -> String {
        let mut out = String::new();
        if self.entities.is_empty() {
            out.push_str("  (empty graph)");
            return out;
        }
        for (i, (id, attrs)) in self.entities.iter().enumerate() {
            if i == limit {
                if i > 0 {
                    out.push('\n');
                }
                out.push_str(&format!("  ... ({} more)", self.entities.len() - limit));
                break;
            }
            if i > 0 {
                out.push('\n');
            }
            let rendered: Vec<String> = attrs
                .iter()
                .map(|(attr, value)| format!("{attr}={value}"))
                .collect();
            out.push_str(&format!("  #{id} {{{}}}", rendered.join(", ")));
        }
        out
    }

    /// Compute the fingerprint of this graph.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(self)
    }
}

impl fmt::Display for ConfigGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph of {} entities", self.entities.len())
    }
}

/// A content hash of a graph for convergence checks.
///
/// Two graphs with the same entities and ident index fingerprint
/// identically, independent of the order operations arrived in. The
/// tempid map is deliberately excluded: it is build bookkeeping, not
/// configuration content.
///
/// # Example
///
/// ```
/// use heddle::core::graph::ConfigGraph;
///
/// let a = ConfigGraph::new();
/// let b = ConfigGraph::new();
/// assert_eq!(a.fingerprint(), b.fingerprint());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint over the graph's entities and ident index.
    ///
    /// Entities and attributes are walked in sorted order, and every
    /// value is hashed in a tagged binary form, so the result is
    /// deterministic for a given graph value.
    pub fn compute(graph: &ConfigGraph) -> Self {
        let mut hasher = Sha256::new();
        for (id, attrs) in graph.entities() {
            hasher.update(id.as_u64().to_be_bytes());
            hasher.update(b"\0");
            for (attr, value) in attrs {
                hasher.update(attr.as_str().as_bytes());
                hasher.update(b"\0");
                update_value(&mut hasher, value);
                hasher.update(b"\n");
            }
        }
        for (ident, id) in graph.idents() {
            hasher.update(ident.as_str().as_bytes());
            hasher.update(b"\0");
            hasher.update(id.as_u64().to_be_bytes());
            hasher.update(b"\n");
        }

        let result = hasher.finalize();
        Self(hex::encode(result))
    }

    /// Get the fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Feed one value into the hasher, tagged by kind and length-framed so
/// adjacent values cannot run together. Floats hash by bit pattern:
/// every distinct `f64`, NaN and the infinities included, hashes
/// distinctly.
fn update_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Bool(b) => {
            hasher.update(b"b");
            hasher.update([*b as u8]);
        }
        Value::Int(i) => {
            hasher.update(b"i");
            hasher.update(i.to_be_bytes());
        }
        Value::Float(x) => {
            hasher.update(b"f");
            hasher.update(x.to_bits().to_be_bytes());
        }
        Value::Str(s) => {
            hasher.update(b"s");
            hasher.update((s.len() as u64).to_be_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Ident(ident) => {
            hasher.update(b"d");
            hasher.update((ident.as_str().len() as u64).to_be_bytes());
            hasher.update(ident.as_str().as_bytes());
        }
        Value::Ref(id) => {
            hasher.update(b"r");
            hasher.update(id.as_u64().to_be_bytes());
        }
        Value::Tempid(tempid) => {
            hasher.update(b"t");
            hasher.update((tempid.as_str().len() as u64).to_be_bytes());
            hasher.update(tempid.as_str().as_bytes());
        }
        Value::List(items) => {
            hasher.update(b"l");
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                update_value(hasher, item);
            }
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
