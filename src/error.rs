//! Crate-level error

use thiserror::Error;

use crate::compiler::CompileError;
use crate::graph::GraphError;
use crate::parser::ParseError;
use crate::registry::RegistryError;

pub type Result<T> = std::result::Result<T, Error>;

/// Any failure between authored source and a validated graph
#[derive(Debug, Error, Clone)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
