//! Integration tests for initializer dispatch.
//!
//! These tests drive the engine end to end: every initializer variant,
//! the no-op forms, failure surfacing, the explanations the engine
//! renders for build errors, and the events a build emits.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use tempfile::TempDir;

use heddle::core::graph::ConfigGraph;
use heddle::core::ops::{EntityRef, Op};
use heddle::core::types::{AttrName, EntityId, Ident, ModuleName, QualifiedName};
use heddle::core::value::Value;
use heddle::dsl;
use heddle::engine::{ApplyError, Engine, Initializer};
use heddle::modules::ModuleDef;
use heddle::scope;
use heddle::script::{FnScriptHost, ScriptError};
use heddle::store::{ConfigStore, MemoryStore};

// =============================================================================
// Test Helpers
// =============================================================================

fn attr(raw: &str) -> AttrName {
    AttrName::new(raw).expect("valid attribute name")
}

fn ident(raw: &str) -> Ident {
    Ident::new(raw).expect("valid ident")
}

fn qname(raw: &str) -> QualifiedName {
    QualifiedName::new(raw).expect("valid qualified name")
}

fn mname(raw: &str) -> ModuleName {
    ModuleName::new(raw).expect("valid module name")
}

/// A one-op batch asserting an attribute on a stable ident.
fn ident_batch(target: &str, name: &str, value: impl Into<Value>) -> Vec<Op> {
    vec![Op::assert(ident(target), attr(name), value)]
}

/// Register a function whose body applies a fixed batch.
fn register_batch_fn(engine: &mut Engine, name: &str, ops: Vec<Op>) {
    let store = MemoryStore::new();
    engine.register_function(qname(name), move |graph| Ok(store.apply(graph, &ops)?));
}

// =============================================================================
// Initializer Variants
// =============================================================================

mod variants {
    use super::*;

    #[test]
    fn a_function_initializer_runs_the_registered_function() {
        let mut engine = Engine::new();
        register_batch_fn(
            &mut engine,
            "app/init",
            ident_batch("app/server", "http/port", 8080i64),
        );

        let graph = engine
            .build(&[Initializer::function(qname("app/init"))])
            .expect("build");

        let store = engine.store();
        let server = EntityRef::Ident(ident("app/server"));
        assert_eq!(
            store.attr(&graph, &server, &attr("http/port")),
            Some(Value::Int(8080))
        );
    }

    #[test]
    fn a_module_initializer_loads_the_module_and_its_requirements() {
        let mut engine = Engine::new();
        let base = mname("app.base");
        let site = mname("app.site");

        engine.register_module(ModuleDef::config(base.clone(), || {
            scope::transact(&ident_batch("app/base", "app/ready", true), None)?;
            Ok(())
        }));
        engine.register_module(
            ModuleDef::config(site.clone(), || {
                scope::transact(&ident_batch("app/site", "app/ready", true), None)?;
                Ok(())
            })
            .with_require(base.clone()),
        );

        let graph = engine
            .build(&[Initializer::module(site.clone())])
            .expect("build");

        assert_eq!(graph.len(), 2);
        assert!(engine.modules().is_loaded(&base));
        assert!(engine.modules().is_loaded(&site));
    }

    #[test]
    fn a_file_initializer_reads_and_evaluates_the_script() {
        let source = "(server {port: 8080})";
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("site.hdl");
        std::fs::write(&path, source).expect("write script");

        let host = Arc::new(FnScriptHost::new().with_proc(source, |_ns| {
            scope::transact(&ident_batch("app/server", "http/port", 8080i64), None)?;
            Ok(())
        }));
        let engine = Engine::new().with_host(host.clone());

        let graph = engine
            .build(&[Initializer::file(path.clone())])
            .expect("build");

        assert_eq!(graph.len(), 1);
        let recorded = host.evaluations();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].1, source);
    }

    #[test]
    fn an_ops_initializer_applies_the_batch_directly() {
        let engine = Engine::new();
        let graph = engine
            .build(&[Initializer::ops(ident_batch(
                "db/primary",
                "db/host",
                "localhost",
            ))])
            .expect("build");

        let store = engine.store();
        assert_eq!(
            store.attr(
                &graph,
                &EntityRef::Ident(ident("db/primary")),
                &attr("db/host")
            ),
            Some(Value::from("localhost"))
        );
    }

    #[test]
    fn an_ops_batch_can_create_an_entity_with_an_explicit_id() {
        let engine = Engine::new();
        let graph = engine
            .build(&[Initializer::ops(vec![Op::assert(
                EntityId::new(1),
                attr("db/host"),
                "localhost",
            )])])
            .expect("build");

        // The entity is resolvable by the id the batch named.
        let store = engine.store();
        let by_id = EntityRef::Id(EntityId::new(1));
        assert_eq!(store.resolve_ref(&graph, &by_id), Some(EntityId::new(1)));
        assert_eq!(
            store.attr(&graph, &by_id, &attr("db/host")),
            Some(Value::from("localhost"))
        );
    }

    #[test]
    fn an_inline_script_initializer_evaluates_through_the_host() {
        let source = "(cache {size: 64})";
        let host = Arc::new(FnScriptHost::new().with_proc(source, |_ns| {
            scope::transact(&ident_batch("app/cache", "cache/size", 64i64), None)?;
            Ok(())
        }));
        let engine = Engine::new().with_host(host.clone());

        let graph = engine
            .build(&[Initializer::script(source)])
            .expect("build");

        assert_eq!(graph.len(), 1);
        assert_eq!(host.evaluations().len(), 1);
    }

    #[test]
    fn each_script_evaluation_gets_a_fresh_namespace() {
        let source = "(noop)";
        let host = Arc::new(FnScriptHost::new().with_proc(source, |_ns| Ok(())));
        let engine = Engine::new().with_host(host.clone());

        engine
            .build(&[Initializer::script(source), Initializer::script(source)])
            .expect("build");

        let recorded = host.evaluations();
        assert_eq!(recorded.len(), 2);
        assert_ne!(recorded[0].0, recorded[1].0);
        for (namespace, _) in &recorded {
            assert!(namespace.as_str().starts_with("config-script-"));
        }
    }
}

// =============================================================================
// No-ops and Failure Surfacing
// =============================================================================

mod edges {
    use super::*;

    #[test]
    fn an_absent_initializer_is_a_no_op() {
        let engine = Engine::new();
        let seed = engine
            .build(&[Initializer::ops(ident_batch("app/a", "app/ready", true))])
            .expect("seed");

        let out = engine.apply(&seed, None).expect("apply");
        assert_eq!(out, seed);
    }

    #[test]
    fn a_blank_inline_script_is_a_no_op_even_without_a_host() {
        let engine = Engine::new();

        let graph = engine
            .build(&[Initializer::script("   \n\t")])
            .expect("build");

        assert!(graph.is_empty());
    }

    #[test]
    fn a_nonblank_script_without_a_host_is_an_error() {
        let engine = Engine::new();
        let err = engine
            .build(&[Initializer::script("(server {})")])
            .unwrap_err();

        assert!(matches!(err, ApplyError::Script(ScriptError::NoHost)));
    }

    #[test]
    fn a_missing_script_file_fails_with_the_read_error() {
        let dir = TempDir::new().expect("create temp dir");
        let missing = dir.path().join("nope.hdl");

        let engine = Engine::new();
        let err = engine
            .build(&[Initializer::file(missing.clone())])
            .unwrap_err();

        match err {
            ApplyError::Script(ScriptError::Read { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected Read, got {other:?}"),
        }
    }

    #[test]
    fn an_unregistered_function_is_rejected_by_name() {
        let engine = Engine::new();
        let err = engine
            .build(&[Initializer::function(qname("app/ghost"))])
            .unwrap_err();

        match err {
            ApplyError::FunctionNotFound { name } => assert_eq!(name, qname("app/ghost")),
            other => panic!("expected FunctionNotFound, got {other:?}"),
        }
    }

    #[test]
    fn a_script_failure_surfaces_the_evaluation_namespace() {
        let source = "(server {port: -1})";
        let host = Arc::new(
            FnScriptHost::new()
                .with_proc(source, |_ns| Err(anyhow::anyhow!("port out of range"))),
        );
        let engine = Engine::new().with_host(host);

        let err = engine.build(&[Initializer::script(source)]).unwrap_err();
        match err {
            ApplyError::Script(ScriptError::Eval { namespace, source }) => {
                assert!(namespace.as_str().starts_with("config-script-"));
                assert!(source.to_string().contains("port out of range"));
            }
            other => panic!("expected Eval, got {other:?}"),
        }
    }
}

// =============================================================================
// Build Sequencing
// =============================================================================

mod sequencing {
    use super::*;

    #[test]
    fn later_steps_observe_the_graph_left_by_earlier_steps() {
        let mut engine = Engine::new();
        engine.register_function(qname("app/wire"), {
            let store = MemoryStore::new();
            move |graph| {
                let server = dsl::resolve_id(&ident("app/server"))?;
                let ops = vec![Op::assert(
                    ident("app/client"),
                    attr("net/upstream"),
                    Value::Ref(server),
                )];
                Ok(store.apply(graph, &ops)?)
            }
        });

        let graph = engine
            .build(&[
                Initializer::ops(ident_batch("app/server", "http/port", 8080i64)),
                Initializer::function(qname("app/wire")),
            ])
            .expect("build");

        let store = engine.store();
        let server = store
            .resolve_ref(&graph, &EntityRef::Ident(ident("app/server")))
            .expect("server exists");
        assert_eq!(
            store.attr(
                &graph,
                &EntityRef::Ident(ident("app/client")),
                &attr("net/upstream")
            ),
            Some(Value::Ref(server))
        );
    }

    #[test]
    fn a_failing_step_halts_the_build() {
        let ran_last = Rc::new(Cell::new(false));

        let mut engine = Engine::new();
        engine.register_function(qname("app/fail"), |_graph| {
            Err(anyhow::anyhow!("step two refused"))
        });
        engine.register_function(qname("app/after"), {
            let ran_last = ran_last.clone();
            move |graph| {
                ran_last.set(true);
                Ok(graph.clone())
            }
        });

        let err = engine
            .build(&[
                Initializer::ops(ident_batch("app/a", "app/ready", true)),
                Initializer::function(qname("app/fail")),
                Initializer::function(qname("app/after")),
            ])
            .unwrap_err();

        assert!(matches!(err, ApplyError::FunctionFailed { .. }));
        assert!(!ran_last.get());
    }

    #[test]
    fn identical_initializer_lists_build_identical_graphs() {
        let mut engine = Engine::new();
        register_batch_fn(
            &mut engine,
            "app/init",
            ident_batch("app/server", "http/port", 8080i64),
        );
        let initializers = vec![
            Initializer::function(qname("app/init")),
            Initializer::ops(ident_batch("db/primary", "db/host", "localhost")),
        ];

        let first = engine.build(&initializers).expect("first build");
        let second = engine.build(&initializers).expect("second build");

        assert_eq!(first, second);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn an_empty_initializer_list_builds_an_empty_graph() {
        let engine = Engine::new();
        let graph = engine.build(&[]).expect("build");
        assert!(graph.is_empty());
        assert_eq!(graph.fingerprint(), ConfigGraph::new().fingerprint());
    }
}

// =============================================================================
// Explanations
// =============================================================================

mod explanations {
    use super::*;

    #[test]
    fn an_unresolved_reference_is_explained_end_to_end() {
        let mut engine = Engine::new();
        engine.register_function(qname("app/wire"), move |graph| {
            let _ = dsl::resolve_id(&ident("app/ghost"))?;
            Ok(graph.clone())
        });

        let err = engine
            .build(&[Initializer::function(qname("app/wire"))])
            .unwrap_err();
        let text = engine.explain(&err).to_string();

        assert!(text.contains("unresolved reference app/ghost"));
        assert!(text.contains("while running function: app/wire"));
        assert!(text.contains("(empty graph)"));
    }

    #[test]
    fn an_argument_failure_keeps_its_full_problem_list_through_the_build() {
        use heddle::dsl::args::{ArgKind, ArgSpec};
        use heddle::dsl::DslFunction;

        let mut engine = Engine::new();
        engine.register_function(qname("app/init"), move |graph| {
            let server = DslFunction::define(
                qname("app.dsl/server"),
                ArgSpec::empty()
                    .required("port", ArgKind::Int)
                    .required("host", ArgKind::Str),
                |_args| Ok(Value::Bool(true)),
            );
            server.call::<&str>(&[])?;
            Ok(graph.clone())
        });

        let err = engine
            .build(&[Initializer::function(qname("app/init"))])
            .unwrap_err();
        let text = engine.explain(&err).to_string();

        assert!(text.contains("invalid arguments for app.dsl/server"));
        assert!(text.contains("missing required argument 'port'"));
        assert!(text.contains("missing required argument 'host'"));
    }
}

// =============================================================================
// Logging
// =============================================================================

mod logging {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Sink {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("sink lock")).into_owned()
        }
    }

    impl io::Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("sink lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `body` under a subscriber capturing events that match
    /// `filter`, returning everything it wrote.
    fn capture(filter: &str, body: impl FnOnce()) -> String {
        let sink = Sink::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, body);
        sink.contents()
    }

    #[test]
    fn a_build_emits_dispatch_and_completion_events() {
        let engine = Engine::new();
        let logs = capture("heddle=trace", || {
            let graph = engine
                .build(&[Initializer::ops(ident_batch(
                    "app/server",
                    "http/port",
                    8080i64,
                ))])
                .expect("build");
            assert_eq!(graph.len(), 1);
        });

        assert!(
            logs.contains("applying initializer"),
            "dispatch event missing:\n{logs}"
        );
        assert!(
            logs.contains("applied batch"),
            "store event missing:\n{logs}"
        );
        assert!(
            logs.contains("configuration build complete"),
            "completion event missing:\n{logs}"
        );
        assert!(
            logs.contains("entities=1"),
            "entity count missing:\n{logs}"
        );
    }

    #[test]
    fn the_env_filter_caps_the_captured_level() {
        let engine = Engine::new();
        let logs = capture("heddle=info", || {
            engine
                .build(&[Initializer::ops(ident_batch(
                    "app/server",
                    "http/port",
                    8080i64,
                ))])
                .expect("build");
        });

        assert!(logs.contains("configuration build complete"));
        assert!(!logs.contains("applying initializer"));
    }
}
