use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use super::error::{CompileError, CompileResult};

/// Parameter bindings visible at one point of a compilation
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    bindings: BTreeMap<String, JsonValue>,
}

impl Scope {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_args(args: &BTreeMap<String, JsonValue>) -> Self {
        Self {
            bindings: args.clone(),
        }
    }

    pub(crate) fn bind(&mut self, name: impl Into<String>, value: JsonValue) {
        self.bindings.insert(name.into(), value);
    }

    pub(crate) fn lookup(&self, name: &str) -> CompileResult<&JsonValue> {
        self.bindings
            .get(name)
            .ok_or_else(|| CompileError::unbound(name))
    }

    /// A scope for a batch body: everything here plus the element bindings
    pub(crate) fn child(&self) -> Self {
        self.clone()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.bindings.iter()
    }
}
