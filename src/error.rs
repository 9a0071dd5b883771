use std::fmt;

use thiserror::Error;

use crate::graph::AttributeKind;

/// Fieldless classification of a [`ConvertError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NameNotFound,
    DuplicateBinding,
    AttributeTypeMismatch,
    MissingAttribute,
    InvalidAttribute,
    UnsupportedElementType,
    MalformedTensorPayload,
    UnsupportedOperator,
    UnresolvedInput,
    InvalidNodeArity,
    UnsupportedOpset,
    Decode,
    Io,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    #[error("name `{name}` is not bound in any enclosing scope")]
    NameNotFound { name: String },

    #[error("name `{name}` is already bound in this scope")]
    DuplicateBinding { name: String },

    #[error("attribute `{key}` holds {actual}, expected {expected}")]
    AttributeTypeMismatch {
        key: String,
        expected: AttributeKind,
        actual: AttributeKind,
    },

    #[error("required attribute `{key}` is missing")]
    MissingAttribute { key: String },

    /// Present with the right tag, but the value makes no sense for the operator.
    #[error("attribute `{key}` is invalid: {reason}")]
    InvalidAttribute { key: String, reason: String },

    #[error("unsupported element type code {code}")]
    UnsupportedElementType { code: i32 },

    #[error("malformed payload for tensor `{tensor}`: {reason}")]
    MalformedTensorPayload { tensor: String, reason: String },

    #[error("no converter registered for operator `{op_type}`")]
    UnsupportedOperator { op_type: String },

    #[error("input `{name}` is not produced by any earlier node, initializer or graph input")]
    UnresolvedInput { name: String },

    #[error("`{op_type}` expects {expected} {what}, got {actual}")]
    InvalidNodeArity {
        op_type: String,
        what: &'static str,
        expected: String,
        actual: usize,
    },

    #[error("model uses opset {opset}, at least {min} is required")]
    UnsupportedOpset { opset: i64, min: i64 },

    #[error("failed to decode model: {0}")]
    Decode(String),

    #[error("failed to read `{path}`: {reason}")]
    Io { path: String, reason: String },

    #[error("conversion cancelled")]
    Cancelled,
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::NameNotFound { .. } => ErrorKind::NameNotFound,
            ConvertError::DuplicateBinding { .. } => ErrorKind::DuplicateBinding,
            ConvertError::AttributeTypeMismatch { .. } => ErrorKind::AttributeTypeMismatch,
            ConvertError::MissingAttribute { .. } => ErrorKind::MissingAttribute,
            ConvertError::InvalidAttribute { .. } => ErrorKind::InvalidAttribute,
            ConvertError::UnsupportedElementType { .. } => ErrorKind::UnsupportedElementType,
            ConvertError::MalformedTensorPayload { .. } => ErrorKind::MalformedTensorPayload,
            ConvertError::UnsupportedOperator { .. } => ErrorKind::UnsupportedOperator,
            ConvertError::UnresolvedInput { .. } => ErrorKind::UnresolvedInput,
            ConvertError::InvalidNodeArity { .. } => ErrorKind::InvalidNodeArity,
            ConvertError::UnsupportedOpset { .. } => ErrorKind::UnsupportedOpset,
            ConvertError::Decode(_) => ErrorKind::Decode,
            ConvertError::Io { .. } => ErrorKind::Io,
            ConvertError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn arity(
        op_type: &str,
        what: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    ) -> Self {
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("at least {min}")
        } else {
            format!("{min} to {max}")
        };
        ConvertError::InvalidNodeArity {
            op_type: op_type.to_string(),
            what,
            expected,
            actual,
        }
    }

    pub(crate) fn invalid_attribute(key: &str, reason: impl Into<String>) -> Self {
        ConvertError::InvalidAttribute {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Identifies where in the source model a diagnostic was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContext {
    /// Slash separated path of graph names, outermost first.
    pub graph: String,
    /// Node name, or its first output when the node is anonymous.
    pub node: String,
    /// Operator kind. Graph inputs, initializers and graph outputs use
    /// `<input>`, `<initializer>` and `<output>`; empty for model-level failures.
    pub op_type: String,
}

impl NodeContext {
    pub fn new(graph: impl Into<String>, node: impl Into<String>, op_type: impl Into<String>) -> Self {
        Self {
            graph: graph.into(),
            node: node.into(),
            op_type: op_type.into(),
        }
    }

    /// Context for failures that are not tied to a node, e.g. decoding.
    pub fn model(source: impl Into<String>) -> Self {
        Self::new(source, "", "")
    }
}

impl fmt::Display for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.node.is_empty(), self.op_type.is_empty()) {
            (true, _) => write!(f, "graph `{}`", self.graph),
            (false, true) => write!(f, "value `{}` in graph `{}`", self.node, self.graph),
            (false, false) => write!(
                f,
                "node `{}` ({}) in graph `{}`",
                self.node, self.op_type, self.graph
            ),
        }
    }
}

/// One accumulated conversion problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub context: NodeContext,
    pub error: ConvertError,
}

impl Diagnostic {
    pub fn new(context: NodeContext, error: ConvertError) -> Self {
        Self { context, error }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}] {}", self.context, self.kind(), self.error)
    }
}

/// Overall failure outcome: every problem found in one pass, in discovery order.
#[derive(Debug, Clone, Error)]
#[error("conversion failed with {} error(s)", .diagnostics.len())]
pub struct ConversionFailed {
    pub diagnostics: Vec<Diagnostic>,
}

impl ConversionFailed {
    pub fn single(context: NodeContext, error: ConvertError) -> Self {
        Self {
            diagnostics: vec![Diagnostic::new(context, error)],
        }
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.diagnostics.iter().map(Diagnostic::kind).collect()
    }
}
