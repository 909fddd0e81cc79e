pub mod cli;
pub mod compiler;
pub mod config;
pub mod definitions;
pub mod error;
pub mod graph;
pub mod init;
pub mod ir;
pub mod parser;
pub mod registry;
pub mod types;

// Re-export main types
pub use types::*;

pub use compiler::{compile, compile_definition, CompileError};
pub use error::{Error, Result};
pub use graph::ExecutionGraph;
pub use registry::Registry;

// Re-export init API for convenience
pub use init::{initialize, InitBuilder, InitOptions};

/// Parse an authored body, compile it, and check the resulting graph
pub fn compile_source(source: &str, args: &Args, registry: &Registry) -> Result<ExecutionGraph> {
    let node = parser::parse(source)?;
    let table = compile(&node, args, registry)?;
    Ok(ExecutionGraph::new(table)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use serde_json::json;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_worker("Worker1").unwrap();
        registry
    }

    #[test]
    fn test_compile_source() {
        let graph = compile_source(
            "batch ids: :id do\n  Worker1 :id\nend",
            &btreemap! {"ids".to_string() => json!([1, 2])},
            &registry(),
        )
        .unwrap();

        assert_eq!(graph.len(), 5);
        assert_eq!(graph.child_branches(graph.root_id()), vec![2, 4]);
    }

    #[test]
    fn test_compile_source_errors_by_stage() {
        let args = Args::new();

        assert!(matches!(
            compile_source("batch do\nend", &args, &registry()),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            compile_source("Missing", &args, &registry()),
            Err(Error::Compile(CompileError::UnknownWorker { .. }))
        ));
    }
}
