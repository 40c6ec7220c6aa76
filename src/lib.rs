//! Heddle - A configuration-script evaluation engine over an immutable entity graph
//!
//! Heddle treats configuration as data: host code, modules, and scripts
//! declare entities, attributes, and references, and the engine applies
//! them as operation batches against a graph value. A build starts from
//! a graph, dispatches an initializer inside a thread-scoped context,
//! and returns the derived graph; nothing is mutated in place.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`engine`] - Orchestrates install scope → dispatch initializer → collect graph
//! - [`core`] - Domain types, values, operations, and the graph itself
//! - [`store`] - The narrow contract for applying operation batches
//! - [`scope`] - Thread-scoped slot holding the graph under construction
//! - [`dsl`] - Invocation wrapper for configuration DSL functions
//! - [`modules`] - Registration and idempotent reloading of configuration modules
//! - [`script`] - Host seam for evaluating configuration scripts
//! - [`settings`] - Engine settings schema and loading
//! - [`diag`] - Structured explanations for build failures
//!
//! # Correctness Invariants
//!
//! Heddle maintains the following invariants:
//!
//! 1. Graphs are immutable values; every change derives a new graph
//! 2. All graph changes flow through the store's apply path
//! 3. Configuration code runs only inside an installed scope
//! 4. A failed build never leaks partial state into the caller's graph

pub mod core;
pub mod diag;
pub mod dsl;
pub mod engine;
pub mod modules;
pub mod scope;
pub mod script;
pub mod settings;
pub mod store;
