//! core::value
//!
//! The attribute value union stored in the configuration graph.
//!
//! Values are plain immutable data. The only indirection is
//! [`Value::Tempid`], a forward reference the store rewrites into a
//! [`Value::Ref`] when the batch containing it is applied.

use crate::core::types::{EntityId, Ident, TempId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value stored under an attribute of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A stable ident used as a value, e.g. the stable-id attribute.
    Ident(Ident),
    /// A resolved reference to another entity.
    Ref(EntityId),
    /// A forward reference to an entity minted in the same batch.
    Tempid(TempId),
    List(Vec<Value>),
}

impl Value {
    /// The kind label used in argument validation messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Ident(_) => "ident",
            Value::Ref(_) => "ref",
            Value::Tempid(_) => "tempid",
            Value::List(_) => "list",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&Ident> {
        match self {
            Value::Ident(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<EntityId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// True if this value, or any value nested under it, is a tempid.
    pub fn contains_tempid(&self) -> bool {
        match self {
            Value::Tempid(_) => true,
            Value::List(items) => items.iter().any(Value::contains_tempid),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Ident(i) => write!(f, "{i}"),
            Value::Ref(id) => write!(f, "#{id}"),
            Value::Tempid(t) => write!(f, "?{t}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Ident> for Value {
    fn from(ident: Ident) -> Self {
        Value::Ident(ident)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::Ref(id)
    }
}

impl From<TempId> for Value {
    fn from(tempid: TempId) -> Self {
        Value::Tempid(tempid)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
