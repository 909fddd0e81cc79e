//! Validation Rules
//!
//! Each file in this module contains one validation rule:
//!
//! - `undefined_parameter.rs` - Parameters read without being bound
//! - `unknown_callee.rs` - Invocations of names the registry can't resolve
//! - `unused_parameter.rs` - Parameters and batch elements never read

mod undefined_parameter;
mod unknown_callee;
mod unused_parameter;

pub use undefined_parameter::UndefinedParameterRule;
pub use unknown_callee::UnknownCalleeRule;
pub use unused_parameter::UnusedParameterRule;
