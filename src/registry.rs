//! Definition registry
//!
//! Holds the atomic worker namespace and the named superworker definitions a
//! compilation may expand. A registry is filled during initialization and
//! then shared read-only (usually behind an `Arc` via [`Registry::freeze`]);
//! nothing mutates it while compilations are running.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;

use crate::ir::{Definition, Node};
use crate::types::{BATCH, BATCH_CHILD, SUPERWORKER};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("superworker '{name}' is already registered")]
    DuplicateDefinition { name: String },

    #[error("'{name}' is registered both as a worker and as a superworker")]
    NameConflict { name: String },

    #[error("'{name}' is reserved for structural records")]
    ReservedName { name: String },
}

fn check_reserved(name: &str) -> Result<(), RegistryError> {
    if matches!(name, BATCH | BATCH_CHILD | SUPERWORKER) {
        return Err(RegistryError::ReservedName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// What a name resolves to
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Worker(&'a str),
    Superworker(&'a Definition),
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    definitions: HashMap<String, Definition>,
    workers: BTreeSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a superworker from its parts
    pub fn register(
        &mut self,
        name: impl Into<String>,
        parameters: Vec<String>,
        body: Node,
    ) -> Result<(), RegistryError> {
        self.register_definition(Definition::new(name, parameters, body))
    }

    pub fn register_definition(&mut self, definition: Definition) -> Result<(), RegistryError> {
        check_reserved(&definition.name)?;
        if self.workers.contains(&definition.name) {
            return Err(RegistryError::NameConflict {
                name: definition.name,
            });
        }
        if self.definitions.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateDefinition {
                name: definition.name,
            });
        }

        tracing::debug!(
            superworker = %definition.name,
            parameters = definition.parameters.len(),
            "registered superworker"
        );
        self.definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Add an atomic worker name. Registering the same worker twice is a no-op.
    pub fn register_worker(&mut self, name: impl Into<String>) -> Result<(), RegistryError> {
        let name = name.into();
        check_reserved(&name)?;
        if self.definitions.contains_key(&name) {
            return Err(RegistryError::NameConflict { name });
        }
        self.workers.insert(name);
        Ok(())
    }

    /// Superworkers take precedence; names are never both (see `NameConflict`).
    pub fn resolve(&self, name: &str) -> Option<Resolved<'_>> {
        if let Some(definition) = self.definitions.get(name) {
            return Some(Resolved::Superworker(definition));
        }
        self.workers
            .get(name)
            .map(|worker| Resolved::Worker(worker.as_str()))
    }

    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.definitions.get(name)
    }

    pub fn has_worker(&self, name: &str) -> bool {
        self.workers.contains(name)
    }

    /// Superworker names, sorted
    pub fn definition_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Worker names, sorted
    pub fn worker_names(&self) -> impl Iterator<Item = &str> {
        self.workers.iter().map(String::as_str)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.values()
    }

    /// End the registration phase
    pub fn freeze(self) -> Arc<Registry> {
        Arc::new(self)
    }
}
