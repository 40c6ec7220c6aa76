//! scope
//!
//! The thread-scoped evaluation context: a single mutable slot holding
//! the configuration graph under construction.
//!
//! # Architecture
//!
//! Configuration scripts call free functions like [`current_graph`],
//! [`update_graph`], and [`transact`] without threading a context
//! value through every call. Those helpers read the top of a
//! thread-local stack of scope cells. A cell holds the graph under
//! construction, the store it is being built against, and diagnostic
//! state (provenance frames, script namespaces).
//!
//! [`with_scope`] installs a cell for the duration of a closure and
//! returns the final graph alongside the closure's result. Nested
//! calls shadow the outer cell: the inner build sees only its own
//! graph, and the outer cell is restored untouched when the inner one
//! finishes. Teardown is guard-based, so the slot is released even
//! when the body panics.
//!
//! # Thread Safety
//!
//! The stack is thread-local. Scopes on different threads are fully
//! independent, and a scope is never visible to any thread but the one
//! that entered it. A single build is a cooperative single-threaded
//! sequence; the slot is not a lock and provides no cross-thread
//! coordination.
//!
//! # Invariants
//!
//! - Helpers fail with [`ScopeError::NoActiveScope`] rather than
//!   guessing when no scope is active
//! - Every entered scope is torn down exactly once, panic or not
//! - The nesting depth is bounded; exceeding it fails the enter, not
//!   the process

use crate::core::graph::ConfigGraph;
use crate::core::ops::Op;
use crate::core::types::{EntityId, EvalNamespace, QualifiedName, TempId};
use crate::store::{ConfigStore, StoreError};
use std::cell::RefCell;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

pub mod provenance;

use provenance::ProvenanceFrame;

/// Default bound on scope nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Errors from scope management and ambient helpers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScopeError {
    /// An ambient helper was called outside any active scope.
    #[error("no active configuration scope for '{operation}'; this helper only works inside a build")]
    NoActiveScope {
        /// The helper that was called.
        operation: &'static str,
    },

    /// Entering another scope would exceed the nesting bound.
    #[error("scope depth {depth} exceeds the limit of {limit}")]
    DepthExceeded {
        /// The depth the new scope would have had.
        depth: usize,
        /// The configured bound.
        limit: usize,
    },
}

/// Errors from [`transact`].
#[derive(Debug, Error)]
pub enum TransactError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One installed scope: the graph under construction plus the
/// collaborators and diagnostic state of the build that owns it.
struct ScopeCell {
    graph: ConfigGraph,
    store: Arc<dyn ConfigStore>,
    frames: Vec<ProvenanceFrame>,
    namespaces: Vec<EvalNamespace>,
}

thread_local! {
    static SCOPES: RefCell<Vec<ScopeCell>> = const { RefCell::new(Vec::new()) };
}

/// Run `body` with a scope installed, using the default depth bound.
///
/// Returns the body's value together with the graph as it stood when
/// the body finished. The caller decides what to do with that graph;
/// on error it is typically discarded.
pub fn with_scope<T>(
    store: Arc<dyn ConfigStore>,
    graph: ConfigGraph,
    body: impl FnOnce() -> T,
) -> Result<(T, ConfigGraph), ScopeError> {
    with_scope_limited(store, graph, DEFAULT_MAX_DEPTH, body)
}

/// Run `body` with a scope installed and an explicit depth bound.
pub fn with_scope_limited<T>(
    store: Arc<dyn ConfigStore>,
    graph: ConfigGraph,
    limit: usize,
    body: impl FnOnce() -> T,
) -> Result<(T, ConfigGraph), ScopeError> {
    let guard = ScopeGuard::enter(store, graph, limit)?;
    let value = body();
    let graph = guard.finish();
    Ok((value, graph))
}

/// Tears the scope down exactly once: either through `finish` on the
/// normal path or through `Drop` when the body unwinds.
struct ScopeGuard {
    depth: usize,
    armed: bool,
}

impl ScopeGuard {
    fn enter(
        store: Arc<dyn ConfigStore>,
        graph: ConfigGraph,
        limit: usize,
    ) -> Result<Self, ScopeError> {
        SCOPES.with(|cells| {
            let mut cells = cells.borrow_mut();
            let depth = cells.len() + 1;
            if depth > limit {
                return Err(ScopeError::DepthExceeded { depth, limit });
            }
            cells.push(ScopeCell {
                graph,
                store,
                frames: Vec::new(),
                namespaces: Vec::new(),
            });
            trace!(depth, "entered scope");
            Ok(ScopeGuard { depth, armed: true })
        })
    }

    fn finish(mut self) -> ConfigGraph {
        self.armed = false;
        SCOPES.with(|cells| match cells.borrow_mut().pop() {
            Some(cell) => {
                trace!(depth = self.depth, "left scope");
                cell.graph
            }
            // The stack cannot be empty while a guard is armed.
            None => ConfigGraph::new(),
        })
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.armed {
            SCOPES.with(|cells| {
                cells.borrow_mut().pop();
            });
            trace!(depth = self.depth, "scope torn down during unwind");
        }
    }
}

/// Whether a scope is active on this thread.
pub fn is_active() -> bool {
    SCOPES.with(|cells| !cells.borrow().is_empty())
}

/// Current nesting depth on this thread.
pub fn depth() -> usize {
    SCOPES.with(|cells| cells.borrow().len())
}

fn read<T>(operation: &'static str, f: impl FnOnce(&ScopeCell) -> T) -> Result<T, ScopeError> {
    SCOPES.with(|cells| {
        let cells = cells.borrow();
        match cells.last() {
            Some(cell) => Ok(f(cell)),
            None => Err(ScopeError::NoActiveScope { operation }),
        }
    })
}

/// A snapshot of the graph under construction.
pub fn current_graph() -> Result<ConfigGraph, ScopeError> {
    read("current_graph", |cell| cell.graph.clone())
}

/// The store the active scope builds against.
pub fn current_store() -> Result<Arc<dyn ConfigStore>, ScopeError> {
    read("current_store", |cell| cell.store.clone())
}

/// Replace the graph under construction with the result of `f`.
///
/// `f` receives a snapshot and returns the graph that becomes current.
/// The returned graph is installed wholesale: writes `f` makes through
/// the scope itself, such as a nested [`transact`], are superseded by
/// the return value, so `f` should derive everything from its
/// snapshot. The slot is only written when `f` succeeds; on error the
/// scope keeps the graph it had.
pub fn update_graph<E, F>(f: F) -> Result<ConfigGraph, E>
where
    E: From<ScopeError>,
    F: FnOnce(&ConfigGraph) -> Result<ConfigGraph, E>,
{
    let snapshot = read("update_graph", |cell| cell.graph.clone())?;
    let next = f(&snapshot)?;
    SCOPES.with(|cells| {
        let mut cells = cells.borrow_mut();
        let cell = cells
            .last_mut()
            .ok_or(ScopeError::NoActiveScope {
                operation: "update_graph",
            })?;
        cell.graph = next.clone();
        Ok(next)
    })
}

/// Apply an operation batch to the graph under construction.
///
/// On success the derived graph becomes current. When `tempid` names a
/// placeholder used by the batch, the entity it minted is returned.
pub fn transact(ops: &[Op], tempid: Option<&TempId>) -> Result<Option<EntityId>, TransactError> {
    let store = current_store()?;
    let post = update_graph::<TransactError, _>(|graph| Ok(store.apply(graph, ops)?))?;
    trace!(ops = ops.len(), entities = post.len(), "transacted batch");
    Ok(tempid.and_then(|t| store.resolve_tempid(&post, t)))
}

/// Pushes a provenance frame onto the active scope, popping it on
/// drop. A no-op outside any scope: frames are diagnostics, and calls
/// that need a scope fail on their own with [`ScopeError`].
pub(crate) struct FrameGuard {
    pushed: bool,
}

impl FrameGuard {
    pub(crate) fn push(frame: ProvenanceFrame) -> Self {
        let pushed = SCOPES.with(|cells| {
            let mut cells = cells.borrow_mut();
            match cells.last_mut() {
                Some(cell) => {
                    cell.frames.push(frame);
                    true
                }
                None => false,
            }
        });
        FrameGuard { pushed }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if self.pushed {
            SCOPES.with(|cells| {
                if let Some(cell) = cells.borrow_mut().last_mut() {
                    cell.frames.pop();
                }
            });
        }
    }
}

/// The function of the innermost provenance frame, if any.
pub fn current_function() -> Option<QualifiedName> {
    read("current_function", |cell| {
        cell.frames.last().map(|frame| frame.function().clone())
    })
    .ok()
    .flatten()
}

/// A copy of the active scope's provenance stack, outermost first.
pub fn captured_frames() -> Vec<ProvenanceFrame> {
    read("captured_frames", |cell| cell.frames.clone()).unwrap_or_default()
}

/// Marks DSL calls made by `body` as originating from the given script
/// namespace. A no-op outside any scope.
pub fn with_eval_namespace<T>(namespace: EvalNamespace, body: impl FnOnce() -> T) -> T {
    let _guard = NamespaceGuard::push(namespace);
    body()
}

/// The script namespace the active scope is currently evaluating, if
/// any.
pub fn current_namespace() -> Option<EvalNamespace> {
    read("current_namespace", |cell| cell.namespaces.last().cloned())
        .ok()
        .flatten()
}

struct NamespaceGuard {
    pushed: bool,
}

impl NamespaceGuard {
    fn push(namespace: EvalNamespace) -> Self {
        let pushed = SCOPES.with(|cells| {
            let mut cells = cells.borrow_mut();
            match cells.last_mut() {
                Some(cell) => {
                    cell.namespaces.push(namespace);
                    true
                }
                None => false,
            }
        });
        NamespaceGuard { pushed }
    }
}

impl Drop for NamespaceGuard {
    fn drop(&mut self) {
        if self.pushed {
            SCOPES.with(|cells| {
                if let Some(cell) = cells.borrow_mut().last_mut() {
                    cell.namespaces.pop();
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AttrName;
    use crate::core::value::Value;
    use crate::store::MemoryStore;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn store() -> Arc<dyn ConfigStore> {
        Arc::new(MemoryStore::new())
    }

    fn attr(s: &str) -> AttrName {
        AttrName::new(s).unwrap()
    }

    fn tempid(s: &str) -> TempId {
        TempId::new(s).unwrap()
    }

    mod ambient_helpers {
        use super::*;

        #[test]
        fn fail_outside_any_scope() {
            assert!(!is_active());
            assert_eq!(
                current_graph().unwrap_err(),
                ScopeError::NoActiveScope {
                    operation: "current_graph"
                }
            );
            assert!(current_store().is_err());
            let err = transact(&[], None).unwrap_err();
            assert!(matches!(err, TransactError::Scope(_)));
        }

        #[test]
        fn current_graph_sees_the_installed_snapshot() {
            let (seen, _) = with_scope(store(), ConfigGraph::new(), || {
                current_graph().unwrap()
            })
            .unwrap();
            assert!(seen.is_empty());
        }

        #[test]
        fn update_graph_advances_the_slot() {
            let s = store();
            let ((), final_graph) = with_scope(s.clone(), ConfigGraph::new(), || {
                let ops = vec![Op::assert(tempid("a"), attr("app/name"), "first")];
                update_graph::<TransactError, _>(|g| Ok(s.apply(g, &ops)?)).unwrap();
                assert_eq!(current_graph().unwrap().len(), 1);
            })
            .unwrap();
            assert_eq!(final_graph.len(), 1);
        }

        #[test]
        fn failed_update_leaves_the_slot_untouched() {
            let ((), final_graph) = with_scope(store(), ConfigGraph::new(), || {
                let bad = vec![Op::assert(tempid("a"), attr("heddle/internal"), 1i64)];
                let result = transact(&bad, None);
                assert!(matches!(result, Err(TransactError::Store(_))));
                assert!(current_graph().unwrap().is_empty());
            })
            .unwrap();
            assert!(final_graph.is_empty());
        }

        #[test]
        fn update_graph_supersedes_scope_writes_made_inside_f() {
            let ((), final_graph) = with_scope(store(), ConfigGraph::new(), || {
                let replaced = update_graph::<TransactError, _>(|snapshot| {
                    // A write through the scope itself, then a return
                    // that does not include it.
                    transact(&[Op::assert(tempid("lost"), attr("app/name"), "lost")], None)?;
                    Ok(snapshot.clone())
                })
                .unwrap();
                assert!(replaced.is_empty());
                assert!(current_graph().unwrap().is_empty());
            })
            .unwrap();
            assert!(final_graph.is_empty());
        }

        #[test]
        fn transact_resolves_the_requested_tempid() {
            let ((), graph) = with_scope(store(), ConfigGraph::new(), || {
                let ops = vec![Op::assert(tempid("srv"), attr("http/port"), 8080i64)];
                let id = transact(&ops, Some(&tempid("srv"))).unwrap();
                assert!(id.is_some());
            })
            .unwrap();
            assert_eq!(graph.len(), 1);
        }
    }

    mod nesting {
        use super::*;

        #[test]
        fn inner_scope_shadows_and_outer_is_restored() {
            let s = store();
            let ((), outer_graph) = with_scope(s.clone(), ConfigGraph::new(), || {
                transact(
                    &[Op::assert(tempid("outer"), attr("app/name"), "outer")],
                    None,
                )
                .unwrap();

                let inner = ConfigGraph::new();
                let ((), inner_graph) = with_scope(s.clone(), inner, || {
                    // The inner build sees only its own graph.
                    assert!(current_graph().unwrap().is_empty());
                    transact(&[Op::assert(tempid("a"), attr("app/name"), "a")], None).unwrap();
                    transact(&[Op::assert(tempid("b"), attr("app/name"), "b")], None).unwrap();
                })
                .unwrap();
                assert_eq!(inner_graph.len(), 2);

                // Back in the outer scope, its graph is unchanged.
                assert_eq!(current_graph().unwrap().len(), 1);
            })
            .unwrap();
            assert_eq!(outer_graph.len(), 1);
        }

        #[test]
        fn depth_limit_rejects_the_enter() {
            let s = store();
            let (result, _) = with_scope_limited(s.clone(), ConfigGraph::new(), 1, || {
                with_scope_limited(s.clone(), ConfigGraph::new(), 1, || {})
            })
            .unwrap();
            assert_eq!(
                result.unwrap_err(),
                ScopeError::DepthExceeded { depth: 2, limit: 1 }
            );
            assert!(!is_active());
        }

        #[test]
        fn depth_tracks_nesting() {
            let s = store();
            assert_eq!(depth(), 0);
            with_scope(s.clone(), ConfigGraph::new(), || {
                assert_eq!(depth(), 1);
                with_scope(s.clone(), ConfigGraph::new(), || {
                    assert_eq!(depth(), 2);
                })
                .unwrap();
                assert_eq!(depth(), 1);
            })
            .unwrap();
            assert_eq!(depth(), 0);
        }
    }

    mod teardown {
        use super::*;

        #[test]
        fn panicking_body_still_releases_the_slot() {
            let result = catch_unwind(AssertUnwindSafe(|| {
                let _ = with_scope(store(), ConfigGraph::new(), || {
                    panic!("script blew up");
                });
            }));
            assert!(result.is_err());
            assert!(!is_active());
        }

        #[test]
        fn panicking_inner_scope_leaves_the_outer_scope_usable() {
            let s = store();
            let ((), _) = with_scope(s.clone(), ConfigGraph::new(), || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    let _ = with_scope(s.clone(), ConfigGraph::new(), || {
                        panic!("inner build failed");
                    });
                }));
                assert!(result.is_err());
                assert_eq!(depth(), 1);
                // The outer slot still works.
                transact(&[Op::assert(tempid("x"), attr("app/name"), "ok")], None).unwrap();
            })
            .unwrap();
            assert!(!is_active());
        }
    }

    mod frames {
        use super::*;
        use provenance::ProvenanceFrame;

        fn frame(function: &str) -> ProvenanceFrame {
            ProvenanceFrame::new(
                QualifiedName::new(function).unwrap(),
                vec![("port".to_string(), Value::Int(1))],
                current_namespace(),
            )
        }

        #[test]
        fn frames_track_the_innermost_call() {
            with_scope(store(), ConfigGraph::new(), || {
                assert_eq!(current_function(), None);
                let _outer = FrameGuard::push(frame("app.dsl/outer"));
                {
                    let _inner = FrameGuard::push(frame("app.dsl/inner"));
                    assert_eq!(
                        current_function(),
                        Some(QualifiedName::new("app.dsl/inner").unwrap())
                    );
                    assert_eq!(captured_frames().len(), 2);
                }
                assert_eq!(
                    current_function(),
                    Some(QualifiedName::new("app.dsl/outer").unwrap())
                );
            })
            .unwrap();
        }

        #[test]
        fn frames_outside_a_scope_are_dropped() {
            let _guard = FrameGuard::push(frame("app.dsl/orphan"));
            assert_eq!(current_function(), None);
            assert!(captured_frames().is_empty());
        }

        #[test]
        fn namespace_marks_script_frames() {
            with_scope(store(), ConfigGraph::new(), || {
                let ns = EvalNamespace::new("config-script-test").unwrap();
                with_eval_namespace(ns.clone(), || {
                    assert_eq!(current_namespace(), Some(ns.clone()));
                    let _guard = FrameGuard::push(frame("app.dsl/from-script"));
                    let frames = captured_frames();
                    assert!(frames[0].is_script());
                });
                assert_eq!(current_namespace(), None);
            })
            .unwrap();
        }
    }

    mod threads {
        use super::*;

        #[test]
        fn scopes_are_invisible_across_threads() {
            let s = store();
            with_scope(s, ConfigGraph::new(), || {
                let handle = std::thread::spawn(|| {
                    assert!(!is_active());
                    current_graph().is_err()
                });
                assert!(handle.join().unwrap());
            })
            .unwrap();
        }

        #[test]
        fn concurrent_builds_do_not_interleave() {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    std::thread::spawn(move || {
                        let s: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new());
                        let ((), graph) = with_scope(s, ConfigGraph::new(), || {
                            for n in 0..10 {
                                let t = TempId::new(format!("t{i}-{n}")).unwrap();
                                transact(
                                    &[Op::assert(t, AttrName::new("app/n").unwrap(), n as i64)],
                                    None,
                                )
                                .unwrap();
                            }
                        })
                        .unwrap();
                        graph.len()
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), 10);
            }
        }
    }
}
