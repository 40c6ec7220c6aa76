//! scope::provenance
//!
//! Frames recording which DSL invocation contributed what.
//!
//! Every DSL call executed inside a scope pushes a frame carrying the
//! function name and the literal arguments of the call. Errors capture
//! the frame stack at the point of failure, so a bad value can be
//! traced back to the configuration call that supplied it rather than
//! to engine internals.

use crate::core::types::{EvalNamespace, QualifiedName};
use crate::core::value::Value;
use std::fmt;

/// One DSL invocation on the provenance stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvenanceFrame {
    function: QualifiedName,
    args: Vec<(String, Value)>,
    namespace: Option<EvalNamespace>,
}

impl ProvenanceFrame {
    pub(crate) fn new(
        function: QualifiedName,
        args: Vec<(String, Value)>,
        namespace: Option<EvalNamespace>,
    ) -> Self {
        Self {
            function,
            args,
            namespace,
        }
    }

    pub fn function(&self) -> &QualifiedName {
        &self.function
    }

    pub fn args(&self) -> &[(String, Value)] {
        &self.args
    }

    /// The script evaluation namespace this call ran under, if any.
    pub fn namespace(&self) -> Option<&EvalNamespace> {
        self.namespace.as_ref()
    }

    /// True when the call originated from evaluated script source
    /// rather than host code.
    pub fn is_script(&self) -> bool {
        self.namespace.is_some()
    }
}

impl fmt::Display for ProvenanceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        for (i, (name, value)) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, ")")
    }
}

/// Frames matching a caller-supplied predicate, outermost first.
pub fn filter_frames<'a, P>(frames: &'a [ProvenanceFrame], pred: P) -> Vec<&'a ProvenanceFrame>
where
    P: Fn(&ProvenanceFrame) -> bool,
{
    frames.iter().filter(|frame| pred(frame)).collect()
}

/// Just the script-originated frames, hiding host plumbing.
///
/// This is the default filter diagnostics use when reporting where a
/// failing value came from.
pub fn script_frames(frames: &[ProvenanceFrame]) -> Vec<&ProvenanceFrame> {
    filter_frames(frames, ProvenanceFrame::is_script)
}
