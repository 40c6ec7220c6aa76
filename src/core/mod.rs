//! core
//!
//! Core domain types and operations for Heddle.
//!
//! # Modules
//!
//! - [`types`] - Strong types: EntityId, Ident, AttrName, etc.
//! - [`value`] - The attribute value union
//! - [`ops`] - The operation vocabulary applied to the graph
//! - [`graph`] - The immutable configuration graph and its fingerprint
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Graphs are immutable values, never shared mutable state
//! - All derivations are deterministic

pub mod graph;
pub mod ops;
pub mod types;
pub mod value;
