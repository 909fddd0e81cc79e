//! Intermediate representation of superworker bodies
//!
//! The parser and the builder both produce these nodes. A tree never holds
//! concrete argument values, so one tree can be compiled any number of times
//! against different inputs.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod builder;

pub use builder::{batch, call, leaf, sequence, BatchBuilder, CallBuilder, LeafBuilder};

/* ===================== Spans ===================== */

/// Source location span for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Start line (0-indexed)
    pub start_line: usize,
    /// Start column (0-indexed)
    pub start_col: usize,
    /// End line (0-indexed)
    pub end_line: usize,
    /// End column (0-indexed)
    pub end_col: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a span that covers both self and other
    pub fn merge(&self, other: &Span) -> Span {
        let (start_line, start_col) = if self.start <= other.start {
            (self.start_line, self.start_col)
        } else {
            (other.start_line, other.start_col)
        };
        let (end_line, end_col) = if self.end >= other.end {
            (self.end_line, self.end_col)
        } else {
            (other.end_line, other.end_col)
        };

        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }
}

pub(crate) fn is_default_span(span: &Span) -> bool {
    *span == Span::default()
}

/* ===================== Arguments ===================== */

/// Where an argument value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum ArgSource {
    /// Looked up by name in the binding scope at compile time
    Param(String),
    /// Used as-is
    Literal(JsonValue),
}

/// One argument of a worker or superworker invocation.
///
/// `key` becomes the entry in the record's `arg_keys`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgExpr {
    pub key: String,
    pub source: ArgSource,
}

impl ArgExpr {
    /// The `:name` shorthand: keyed by the parameter it reads
    pub fn param(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            source: ArgSource::Param(name),
        }
    }

    /// `key: :name`
    pub fn keyed_param(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source: ArgSource::Param(name.into()),
        }
    }

    /// `key: <literal>`
    pub fn literal(key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            key: key.into(),
            source: ArgSource::Literal(value.into()),
        }
    }

    /// Name of the parameter this argument reads, if any
    pub fn param_name(&self) -> Option<&str> {
        match &self.source {
            ArgSource::Param(name) => Some(name),
            ArgSource::Literal(_) => None,
        }
    }
}

/// `list: :element` inside a batch header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBinding {
    pub list: String,
    pub element: String,
}

impl ListBinding {
    pub fn new(list: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            list: list.into(),
            element: element.into(),
        }
    }
}

/* ===================== Nodes ===================== */

/// IR node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Node {
    /// A direct worker invocation, never resolved against superworkers
    Leaf {
        worker: String,
        args: Vec<ArgExpr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Sequence {
        steps: Vec<Node>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Batch {
        bindings: Vec<ListBinding>,
        body: Box<Node>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// An invocation of a worker or a registered superworker
    Call {
        name: String,
        args: Vec<ArgExpr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nested: Option<Box<Node>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Leaf { span, .. }
            | Node::Sequence { span, .. }
            | Node::Batch { span, .. }
            | Node::Call { span, .. } => *span,
        }
    }

    /// Visit this node and every node below it, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        match self {
            Node::Leaf { .. } => {}
            Node::Sequence { steps, .. } => {
                for step in steps {
                    step.walk(visit);
                }
            }
            Node::Batch { body, .. } => body.walk(visit),
            Node::Call { nested, .. } => {
                if let Some(nested) = nested {
                    nested.walk(visit);
                }
            }
        }
    }

    /// Names of every worker or superworker invoked in this tree, in visit order
    pub fn invoked_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |node| match node {
            Node::Leaf { worker, .. } => names.push(worker.as_str()),
            Node::Call { name, .. } => names.push(name.as_str()),
            _ => {}
        });
        names
    }
}

/* ===================== Definitions ===================== */

/// A named, reusable superworker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Node,
    /// SHA-256 of the source file the definition was loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

impl Definition {
    pub fn new(name: impl Into<String>, parameters: Vec<String>, body: Node) -> Self {
        Self {
            name: name.into(),
            parameters,
            body,
            version: None,
            span: Span::default(),
        }
    }
}
