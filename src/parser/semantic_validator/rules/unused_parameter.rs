//! Rule: Unused Parameter
//!
//! Warns when a formal parameter or a batch element is never read.

use std::collections::HashSet;

use crate::ir::{Definition, Node};
use crate::registry::Registry;

use super::super::{ValidationError, ValidationRule};

pub struct UnusedParameterRule;

impl ValidationRule for UnusedParameterRule {
    fn id(&self) -> &'static str {
        "unused-parameter"
    }

    fn description(&self) -> &'static str {
        "Parameters and batch elements should be read somewhere"
    }

    fn validate(
        &self,
        definition: &Definition,
        _registry: Option<&Registry>,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let used = reads(&definition.body);
        for param in &definition.parameters {
            if !used.contains(param.as_str()) {
                errors.push(ValidationError::warning(
                    definition.span,
                    format!(
                        "Parameter ':{}' of '{}' is never used",
                        param, definition.name
                    ),
                    self.id(),
                ));
            }
        }

        definition.body.walk(&mut |node| {
            if let Node::Batch {
                bindings,
                body,
                span,
            } = node
            {
                let used = reads(body);
                for binding in bindings {
                    if !used.contains(binding.element.as_str()) {
                        errors.push(ValidationError::warning(
                            *span,
                            format!("Batch element ':{}' is never used", binding.element),
                            self.id(),
                        ));
                    }
                }
            }
        });

        errors
    }
}

/// Every name read by arguments or batch headers in `node`
fn reads(node: &Node) -> HashSet<&str> {
    let mut names = HashSet::new();
    node.walk(&mut |n| match n {
        Node::Leaf { args, .. } | Node::Call { args, .. } => {
            names.extend(args.iter().filter_map(|a| a.param_name()));
        }
        Node::Batch { bindings, .. } => {
            names.extend(bindings.iter().map(|b| b.list.as_str()));
        }
        Node::Sequence { .. } => {}
    });
    names
}
