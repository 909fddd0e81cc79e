//! Builder API for IR trees
//!
//! ```
//! use superworker_core::ir::{batch, call, sequence};
//!
//! let body = batch("first_arguments", "first_argument").body(sequence([
//!     call("Worker1").param("first_argument").build(),
//!     call("Worker2").param("first_argument").build(),
//! ]));
//! ```
//!
//! Builders record exactly what they are told. Structural problems such as an
//! empty sequence are reported by the compiler, not here.

use serde_json::Value as JsonValue;

use super::{ArgExpr, ListBinding, Node, Span};

/// Start a `Call` node (worker or superworker)
pub fn call(name: impl Into<String>) -> CallBuilder {
    CallBuilder {
        name: name.into(),
        args: Vec::new(),
        nested: None,
    }
}

/// Start a `Leaf` node (worker only)
pub fn leaf(worker: impl Into<String>) -> LeafBuilder {
    LeafBuilder {
        worker: worker.into(),
        args: Vec::new(),
    }
}

/// Start a batch over `list`, binding each element to `element`
pub fn batch(list: impl Into<String>, element: impl Into<String>) -> BatchBuilder {
    BatchBuilder {
        bindings: vec![ListBinding::new(list, element)],
    }
}

/// Steps run one after another
pub fn sequence(steps: impl IntoIterator<Item = Node>) -> Node {
    Node::Sequence {
        steps: steps.into_iter().collect(),
        span: Span::default(),
    }
}

pub struct CallBuilder {
    name: String,
    args: Vec<ArgExpr>,
    nested: Option<Box<Node>>,
}

impl CallBuilder {
    /// `:name`
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.args.push(ArgExpr::param(name));
        self
    }

    /// `key: :name`
    pub fn param_as(mut self, key: impl Into<String>, name: impl Into<String>) -> Self {
        self.args.push(ArgExpr::keyed_param(key, name));
        self
    }

    /// `key: <literal>`
    pub fn literal(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.args.push(ArgExpr::literal(key, value));
        self
    }

    /// Attach a nested body that runs beneath this call
    pub fn nested(mut self, body: Node) -> Self {
        self.nested = Some(Box::new(body));
        self
    }

    pub fn build(self) -> Node {
        Node::Call {
            name: self.name,
            args: self.args,
            nested: self.nested,
            span: Span::default(),
        }
    }
}

impl From<CallBuilder> for Node {
    fn from(builder: CallBuilder) -> Self {
        builder.build()
    }
}

pub struct LeafBuilder {
    worker: String,
    args: Vec<ArgExpr>,
}

impl LeafBuilder {
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.args.push(ArgExpr::param(name));
        self
    }

    pub fn literal(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.args.push(ArgExpr::literal(key, value));
        self
    }

    pub fn build(self) -> Node {
        Node::Leaf {
            worker: self.worker,
            args: self.args,
            span: Span::default(),
        }
    }
}

impl From<LeafBuilder> for Node {
    fn from(builder: LeafBuilder) -> Self {
        builder.build()
    }
}

pub struct BatchBuilder {
    bindings: Vec<ListBinding>,
}

impl BatchBuilder {
    /// Zip another list into the same batch
    pub fn bind(mut self, list: impl Into<String>, element: impl Into<String>) -> Self {
        self.bindings.push(ListBinding::new(list, element));
        self
    }

    pub fn body(self, body: impl Into<Node>) -> Node {
        Node::Batch {
            bindings: self.bindings,
            body: Box::new(body.into()),
            span: Span::default(),
        }
    }
}
