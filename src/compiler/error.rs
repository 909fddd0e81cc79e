//! Error types for graph compilation

use thiserror::Error;

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors that abort a compilation. No partial table is ever returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A name resolves to neither a registered worker nor a superworker
    #[error("Unknown worker or superworker '{name}'")]
    UnknownWorker { name: String },

    /// Lists bound by one batch differ in length
    #[error("Batch list '{list}' has {found} elements, expected {expected}")]
    ArgumentCountMismatch {
        list: String,
        expected: usize,
        found: usize,
    },

    /// An argument or batch header reads a name with no binding in scope
    #[error("Parameter ':{name}' is not bound")]
    UnboundParameter { name: String },

    /// A batch list is bound to something other than a JSON array
    #[error("Batch list '{name}' is not a list (found {found})")]
    NotAList { name: String, found: String },

    /// A superworker is called with the wrong number of arguments
    #[error("Superworker '{name}' takes {expected} arguments, {found} given")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// A superworker expands into itself
    #[error("Superworker expands into itself: {chain}")]
    RecursiveDefinition { chain: String },

    /// The tree is structurally invalid
    #[error("Malformed definition: {reason}")]
    MalformedDefinition { reason: String },
}

impl CompileError {
    pub fn unknown_worker(name: impl Into<String>) -> Self {
        Self::UnknownWorker { name: name.into() }
    }

    pub fn unbound(name: impl Into<String>) -> Self {
        Self::UnboundParameter { name: name.into() }
    }

    pub fn recursive(chain: &[String], name: &str) -> Self {
        let mut path = chain.to_vec();
        path.push(name.to_string());
        Self::RecursiveDefinition {
            chain: path.join(" -> "),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDefinition {
            reason: reason.into(),
        }
    }
}
