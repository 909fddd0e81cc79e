//! Semantic Validation for superworker definitions
//!
//! This module provides an extensible rule-based validation system that runs
//! after parsing to catch semantic errors that the grammar can't enforce.
//!
//! # Usage
//!
//! ```ignore
//! use superworker_core::parser::{parse_definitions, semantic_validator::validate_definition};
//!
//! let parsed = parse_definitions(source)?;
//! for definition in &parsed.definitions {
//!     for error in validate_definition(definition, Some(&registry)) {
//!         eprintln!("{}", error);
//!     }
//! }
//! ```
//!
//! # Adding a New Rule
//!
//! 1. Create a new file in `semantic_validator/rules/`
//! 2. Implement `ValidationRule` for your struct
//! 3. Add it to the `Validator::new()` constructor

pub mod rules;

use crate::ir::{Definition, Span};
use crate::registry::Registry;

// ============================================================================
// Validation Error Types
// ============================================================================

/// A validation error produced by semantic analysis.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The source location of the issue
    pub span: Span,
    /// Human-readable message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Which rule produced this error
    pub rule_id: &'static str,
}

/// Severity levels for validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Must be fixed before the definition can be compiled
    Error,
    /// Probably a mistake
    Warning,
}

impl ValidationError {
    pub fn error(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Error,
            rule_id,
        }
    }

    pub fn warning(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Warning,
            rule_id,
        }
    }

    /// Check if this is an error (not a warning)
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{} at line {}, col {}: {} [{}]",
            severity,
            self.span.start_line + 1,
            self.span.start_col + 1,
            self.message,
            self.rule_id
        )
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// ValidationRule Trait
// ============================================================================

/// Trait that all validation rules must implement.
///
/// Each rule checks one aspect of a definition and must not depend on other
/// rules' results.
pub trait ValidationRule: Send + Sync {
    /// Unique identifier for this rule (e.g., "undefined-parameter")
    fn id(&self) -> &'static str;

    /// Human-readable description of what this rule checks
    fn description(&self) -> &'static str;

    /// Run the validation and return any errors found.
    ///
    /// `registry` is `None` when a definition is checked in isolation; rules
    /// that need name resolution report nothing in that case.
    fn validate(&self, definition: &Definition, registry: Option<&Registry>)
        -> Vec<ValidationError>;
}

// ============================================================================
// Validator - Runs All Rules
// ============================================================================

/// The main validator that orchestrates all validation rules.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    /// Create a new validator with all built-in rules.
    pub fn new() -> Self {
        Self {
            rules: vec![
                // Error rules
                Box::new(rules::UndefinedParameterRule),
                Box::new(rules::UnknownCalleeRule),
                // Warning rules
                Box::new(rules::UnusedParameterRule),
            ],
        }
    }

    /// Run all validation rules and collect errors.
    pub fn validate(
        &self,
        definition: &Definition,
        registry: Option<&Registry>,
    ) -> Vec<ValidationError> {
        self.rules
            .iter()
            .flat_map(|rule| rule.validate(definition, registry))
            .collect()
    }

    /// (id, description) of every registered rule
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Validate a definition and return all errors and warnings found.
pub fn validate_definition(
    definition: &Definition,
    registry: Option<&Registry>,
) -> Vec<ValidationError> {
    Validator::new().validate(definition, registry)
}

/// Check if a definition has any validation errors (not just warnings).
pub fn has_errors(definition: &Definition, registry: Option<&Registry>) -> bool {
    validate_definition(definition, registry)
        .iter()
        .any(|e| e.is_error())
}
