//! Rule: Undefined Parameter
//!
//! Reports an error when an argument or a batch header reads a name that is
//! neither a formal parameter nor an enclosing batch element.
//!
//! ```text
//! # Error: ':user' is not bound
//! superworker Notify :user_id do
//!   Mailer :user
//! end
//! ```

use std::collections::HashSet;

use crate::ir::{Definition, Node};
use crate::registry::Registry;

use super::super::{ValidationError, ValidationRule};

/// Rule that checks for reads of unbound parameters.
pub struct UndefinedParameterRule;

impl ValidationRule for UndefinedParameterRule {
    fn id(&self) -> &'static str {
        "undefined-parameter"
    }

    fn description(&self) -> &'static str {
        "Arguments may only read formal parameters and enclosing batch elements"
    }

    fn validate(
        &self,
        definition: &Definition,
        _registry: Option<&Registry>,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut scope = Scope::new();
        for param in &definition.parameters {
            scope.define(param);
        }

        check_node(&definition.body, &scope, &mut errors, self.id());

        errors
    }
}

// ============================================================================
// Scope Tracking
// ============================================================================

/// Names bound at one point of the tree
struct Scope {
    defined: HashSet<String>,
}

impl Scope {
    fn new() -> Self {
        Self {
            defined: HashSet::new(),
        }
    }

    fn define(&mut self, name: &str) {
        self.defined.insert(name.to_string());
    }

    fn is_defined(&self, name: &str) -> bool {
        self.defined.contains(name)
    }

    fn child(&self) -> Self {
        Self {
            defined: self.defined.clone(),
        }
    }
}

// ============================================================================
// IR Traversal
// ============================================================================

fn check_node(node: &Node, scope: &Scope, errors: &mut Vec<ValidationError>, rule_id: &'static str) {
    match node {
        Node::Leaf { args, span, .. } | Node::Call { args, span, .. } => {
            for name in args.iter().filter_map(|a| a.param_name()) {
                if !scope.is_defined(name) {
                    errors.push(ValidationError::error(
                        *span,
                        format!("Undefined parameter ':{}'", name),
                        rule_id,
                    ));
                }
            }

            if let Node::Call {
                nested: Some(nested),
                ..
            } = node
            {
                check_node(nested, scope, errors, rule_id);
            }
        }

        Node::Sequence { steps, .. } => {
            for step in steps {
                check_node(step, scope, errors, rule_id);
            }
        }

        Node::Batch {
            bindings,
            body,
            span,
        } => {
            // Lists are read in the enclosing scope
            for binding in bindings {
                if !scope.is_defined(&binding.list) {
                    errors.push(ValidationError::error(
                        *span,
                        format!("Batch list '{}' is not bound", binding.list),
                        rule_id,
                    ));
                }
            }

            let mut body_scope = scope.child();
            for binding in bindings {
                body_scope.define(&binding.element);
            }
            check_node(body, &body_scope, errors, rule_id);
        }
    }
}
