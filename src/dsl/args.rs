//! dsl::args
//!
//! Declared argument shapes for DSL functions.
//!
//! A function declares its arguments once as an [`ArgSpec`]. At call
//! time the spec validates the supplied arguments and conforms them
//! into a canonical keyed form, so function bodies read typed values
//! instead of re-destructuring ad-hoc maps. Validation reports every
//! offending argument, not just the first.

use crate::core::types::{EntityId, Ident, TempId};
use crate::core::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The kind of value an argument accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Bool,
    Int,
    Float,
    Str,
    Ident,
    Ref,
    Tempid,
    List,
    /// Accepts any value unchanged.
    Any,
}

impl ArgKind {
    pub fn label(&self) -> &'static str {
        match self {
            ArgKind::Bool => "bool",
            ArgKind::Int => "int",
            ArgKind::Float => "float",
            ArgKind::Str => "str",
            ArgKind::Ident => "ident",
            ArgKind::Ref => "ref",
            ArgKind::Tempid => "tempid",
            ArgKind::List => "list",
            ArgKind::Any => "any",
        }
    }

    /// Conform a value to this kind, or `None` if it does not fit.
    ///
    /// The only coercion is int to float for `Float` arguments;
    /// everything else must match exactly.
    fn conform(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ArgKind::Any, v) => Some(v.clone()),
            (ArgKind::Bool, v @ Value::Bool(_)) => Some(v.clone()),
            (ArgKind::Int, v @ Value::Int(_)) => Some(v.clone()),
            (ArgKind::Float, v @ Value::Float(_)) => Some(v.clone()),
            (ArgKind::Float, Value::Int(i)) => Some(Value::Float(*i as f64)),
            (ArgKind::Str, v @ Value::Str(_)) => Some(v.clone()),
            (ArgKind::Ident, v @ Value::Ident(_)) => Some(v.clone()),
            (ArgKind::Ref, v @ Value::Ref(_)) => Some(v.clone()),
            (ArgKind::Tempid, v @ Value::Tempid(_)) => Some(v.clone()),
            (ArgKind::List, v @ Value::List(_)) => Some(v.clone()),
            _ => None,
        }
    }
}

/// One declared argument of a DSL function.
#[derive(Debug, Clone)]
pub struct ArgDecl {
    name: String,
    kind: ArgKind,
    required: bool,
    doc: Option<String>,
}

impl ArgDecl {
    pub fn required(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            doc: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            doc: None,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ArgKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
}

/// The declared argument shape of a DSL function.
#[derive(Debug, Clone, Default)]
pub struct ArgSpec {
    decls: Vec<ArgDecl>,
}

impl ArgSpec {
    /// A spec accepting no arguments.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(decls: Vec<ArgDecl>) -> Self {
        Self { decls }
    }

    /// Append a required argument.
    pub fn required(mut self, name: impl Into<String>, kind: ArgKind) -> Self {
        self.decls.push(ArgDecl::required(name, kind));
        self
    }

    /// Append an optional argument.
    pub fn optional(mut self, name: impl Into<String>, kind: ArgKind) -> Self {
        self.decls.push(ArgDecl::optional(name, kind));
        self
    }

    pub fn decls(&self) -> &[ArgDecl] {
        &self.decls
    }

    pub fn decl(&self, name: &str) -> Option<&ArgDecl> {
        self.decls.iter().find(|decl| decl.name == name)
    }

    /// Validate and conform a call's arguments.
    ///
    /// Returns the canonical keyed form on success, or every problem
    /// found on failure. No side effects happen in either case.
    pub fn conform<S: AsRef<str>>(
        &self,
        args: &[(S, Value)],
    ) -> Result<ConformedArgs, Vec<ArgProblem>> {
        let mut problems = Vec::new();
        let mut values: BTreeMap<String, Value> = BTreeMap::new();
        let mut seen: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();

        for (name, value) in args {
            let name = name.as_ref();
            if !seen.insert(name) {
                problems.push(ArgProblem {
                    name: name.to_string(),
                    kind: ProblemKind::Duplicate,
                });
                continue;
            }
            match self.decl(name) {
                None => problems.push(ArgProblem {
                    name: name.to_string(),
                    kind: ProblemKind::Unexpected,
                }),
                Some(decl) => match decl.kind.conform(value) {
                    Some(conformed) => {
                        values.insert(name.to_string(), conformed);
                    }
                    None => problems.push(ArgProblem {
                        name: name.to_string(),
                        kind: ProblemKind::WrongKind {
                            expected: decl.kind.label(),
                            got: value.kind(),
                        },
                    }),
                },
            }
        }

        for decl in &self.decls {
            let already_flagged = problems.iter().any(|p| p.name == decl.name);
            if decl.required && !values.contains_key(&decl.name) && !already_flagged {
                problems.push(ArgProblem {
                    name: decl.name.clone(),
                    kind: ProblemKind::Missing,
                });
            }
        }

        if problems.is_empty() {
            Ok(ConformedArgs { values })
        } else {
            Err(problems)
        }
    }
}

/// What was wrong with one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProblemKind {
    /// A required argument was not supplied.
    Missing,
    /// An argument was supplied that the spec does not declare.
    Unexpected,
    /// An argument was supplied more than once.
    Duplicate,
    /// The supplied value does not fit the declared kind.
    WrongKind {
        expected: &'static str,
        got: &'static str,
    },
}

/// One offending argument in a failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgProblem {
    pub name: String,
    pub kind: ProblemKind,
}

impl fmt::Display for ArgProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ProblemKind::Missing => write!(f, "missing required argument '{}'", self.name),
            ProblemKind::Unexpected => write!(f, "unexpected argument '{}'", self.name),
            ProblemKind::Duplicate => write!(f, "duplicate argument '{}'", self.name),
            ProblemKind::WrongKind { expected, got } => write!(
                f,
                "argument '{}' expects {expected}, got {got}",
                self.name
            ),
        }
    }
}

/// Render a problem list for an error message.
pub fn render_problems(problems: &[ArgProblem]) -> String {
    problems
        .iter()
        .map(ArgProblem::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The canonical keyed form of a validated call's arguments.
///
/// Only declared names are present, every value fits its declared
/// kind, and required names are guaranteed present.
#[derive(Debug, Clone, Default)]
pub struct ConformedArgs {
    values: BTreeMap<String, Value>,
}

impl ConformedArgs {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_float)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn ident(&self, name: &str) -> Option<&Ident> {
        self.values.get(name).and_then(Value::as_ident)
    }

    pub fn ref_id(&self, name: &str) -> Option<EntityId> {
        self.values.get(name).and_then(Value::as_ref_id)
    }

    pub fn tempid(&self, name: &str) -> Option<&TempId> {
        match self.values.get(name) {
            Some(Value::Tempid(t)) => Some(t),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[Value]> {
        self.values.get(name).and_then(Value::as_list)
    }

    /// The literal `(name, value)` pairs, for provenance frames.
    pub fn to_pairs(&self) -> Vec<(String, Value)> {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}
