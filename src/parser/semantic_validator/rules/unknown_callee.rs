//! Rule: Unknown Callee
//!
//! Reports an error when a definition invokes a name that is neither a
//! registered worker nor a registered superworker. Skipped when no registry
//! is available.

use crate::ir::{Definition, Node};
use crate::registry::Registry;

use super::super::{ValidationError, ValidationRule};

pub struct UnknownCalleeRule;

impl ValidationRule for UnknownCalleeRule {
    fn id(&self) -> &'static str {
        "unknown-callee"
    }

    fn description(&self) -> &'static str {
        "Invoked workers and superworkers must be registered"
    }

    fn validate(&self, definition: &Definition, registry: Option<&Registry>) -> Vec<ValidationError> {
        let Some(registry) = registry else {
            return Vec::new();
        };

        let mut errors = Vec::new();
        definition.body.walk(&mut |node| match node {
            Node::Leaf { worker, span, .. } if !registry.has_worker(worker) => {
                errors.push(ValidationError::error(
                    *span,
                    format!("Unknown worker '{}'", worker),
                    self.id(),
                ));
            }
            Node::Call { name, span, .. } if registry.resolve(name).is_none() => {
                errors.push(ValidationError::error(
                    *span,
                    format!("Unknown worker or superworker '{}'", name),
                    self.id(),
                ));
            }
            _ => {}
        });

        errors
    }
}
