//! core::ops
//!
//! The operation vocabulary applied to the configuration graph.
//!
//! A batch of [`Op`]s is the only way the graph changes. Batches are
//! plain data: they can be built programmatically, carried inside an
//! initializer, serialized, and logged. The store applies a batch as a
//! whole and returns a new graph value.

use crate::core::types::{AttrName, EntityId, Ident, TempId};
use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Designates the entity an operation writes to.
///
/// A handle may name an existing entity directly by id, address an
/// entity by its stable ident (creating it if absent), or use a tempid
/// placeholder minted for the duration of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityHandle {
    Id(EntityId),
    Temp(TempId),
    Ident(Ident),
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityHandle::Id(id) => write!(f, "#{id}"),
            EntityHandle::Temp(t) => write!(f, "?{t}"),
            EntityHandle::Ident(i) => write!(f, "{i}"),
        }
    }
}

impl From<EntityId> for EntityHandle {
    fn from(id: EntityId) -> Self {
        EntityHandle::Id(id)
    }
}

impl From<TempId> for EntityHandle {
    fn from(tempid: TempId) -> Self {
        EntityHandle::Temp(tempid)
    }
}

impl From<Ident> for EntityHandle {
    fn from(ident: Ident) -> Self {
        EntityHandle::Ident(ident)
    }
}

/// Designates an entity for read-side lookups.
///
/// Unlike [`EntityHandle`] there is no tempid form: reads never mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRef {
    Id(EntityId),
    Ident(Ident),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Id(id) => write!(f, "#{id}"),
            EntityRef::Ident(i) => write!(f, "{i}"),
        }
    }
}

impl From<EntityId> for EntityRef {
    fn from(id: EntityId) -> Self {
        EntityRef::Id(id)
    }
}

impl From<Ident> for EntityRef {
    fn from(ident: Ident) -> Self {
        EntityRef::Ident(ident)
    }
}

/// A single declarative change to the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Op {
    /// Create or merge an entity from an attribute map.
    ///
    /// Each entry behaves like an individual [`Op::Assert`] against the
    /// same handle, applied in attribute order.
    Entity {
        /// The entity the map is merged into.
        handle: EntityHandle,
        /// Attribute values to assert.
        attrs: BTreeMap<AttrName, Value>,
    },

    /// Assert a single attribute value, replacing any previous value.
    Assert {
        /// The entity being written.
        handle: EntityHandle,
        /// The attribute to set.
        attr: AttrName,
        /// The new value.
        value: Value,
    },

    /// Retract an attribute.
    ///
    /// With `value: None` the attribute is removed outright. With a
    /// value, the attribute is removed only if it currently holds that
    /// exact value.
    Retract {
        /// The entity being written.
        handle: EntityHandle,
        /// The attribute to remove.
        attr: AttrName,
        /// Optional value guard.
        value: Option<Value>,
    },
}

impl Op {
    pub fn entity(handle: impl Into<EntityHandle>, attrs: BTreeMap<AttrName, Value>) -> Self {
        Op::Entity {
            handle: handle.into(),
            attrs,
        }
    }

    pub fn assert(
        handle: impl Into<EntityHandle>,
        attr: AttrName,
        value: impl Into<Value>,
    ) -> Self {
        Op::Assert {
            handle: handle.into(),
            attr,
            value: value.into(),
        }
    }

    pub fn retract(handle: impl Into<EntityHandle>, attr: AttrName) -> Self {
        Op::Retract {
            handle: handle.into(),
            attr,
            value: None,
        }
    }

    pub fn retract_value(
        handle: impl Into<EntityHandle>,
        attr: AttrName,
        value: impl Into<Value>,
    ) -> Self {
        Op::Retract {
            handle: handle.into(),
            attr,
            value: Some(value.into()),
        }
    }

    /// The entity this operation writes to.
    pub fn handle(&self) -> &EntityHandle {
        match self {
            Op::Entity { handle, .. } => handle,
            Op::Assert { handle, .. } => handle,
            Op::Retract { handle, .. } => handle,
        }
    }

    /// Human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            Op::Entity { handle, attrs } => {
                format!("entity {handle} ({} attrs)", attrs.len())
            }
            Op::Assert { handle, attr, .. } => format!("assert {attr} on {handle}"),
            Op::Retract {
                handle,
                attr,
                value: None,
            } => format!("retract {attr} on {handle}"),
            Op::Retract {
                handle,
                attr,
                value: Some(_),
            } => format!("retract {attr} value on {handle}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(s: &str) -> AttrName {
        AttrName::new(s).unwrap()
    }

    #[test]
    fn handles_display_their_form() {
        assert_eq!(EntityHandle::Id(EntityId::new(3)).to_string(), "#3");
        assert_eq!(
            EntityHandle::Temp(TempId::new("srv").unwrap()).to_string(),
            "?srv"
        );
        assert_eq!(
            EntityHandle::Ident(Ident::new("app/x").unwrap()).to_string(),
            "app/x"
        );
    }

    #[test]
    fn constructors_accept_any_handle_form() {
        let by_id = Op::assert(EntityId::new(1), attr("http/port"), 8080i64);
        assert_eq!(by_id.handle(), &EntityHandle::Id(EntityId::new(1)));

        let by_temp = Op::assert(TempId::new("srv").unwrap(), attr("http/port"), 8080i64);
        assert_eq!(
            by_temp.handle(),
            &EntityHandle::Temp(TempId::new("srv").unwrap())
        );

        let by_ident = Op::retract(Ident::new("app/x").unwrap(), attr("http/port"));
        assert_eq!(
            by_ident.handle(),
            &EntityHandle::Ident(Ident::new("app/x").unwrap())
        );
    }

    #[test]
    fn describe_names_the_shape() {
        let mut attrs = BTreeMap::new();
        attrs.insert(attr("http/port"), Value::Int(80));
        attrs.insert(attr("http/host"), Value::from("0.0.0.0"));
        let op = Op::entity(TempId::new("srv").unwrap(), attrs);
        assert_eq!(op.describe(), "entity ?srv (2 attrs)");

        let op = Op::retract_value(EntityId::new(2), attr("http/port"), 80i64);
        assert_eq!(op.describe(), "retract http/port value on #2");
    }

    #[test]
    fn ops_serde_round_trip() {
        let ops = vec![
            Op::assert(TempId::new("srv").unwrap(), attr("http/port"), 8080i64),
            Op::retract(EntityId::new(4), attr("http/host")),
        ];
        let json = serde_json::to_string(&ops).unwrap();
        assert!(json.contains("\"type\":\"assert\""));
        let back: Vec<Op> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ops);
    }
}
