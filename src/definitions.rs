//! Loading definition files into a registry

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::parser::parse_definitions;
use crate::parser::semantic_validator::{validate_definition, ValidationError};
use crate::registry::Registry;

/// Extension of definition files picked up from directories
pub const DEFINITION_EXTENSION: &str = "sw";

/// One authored definition file
#[derive(Debug, Clone)]
pub struct DefinitionFile {
    pub source: String,
    pub file_path: String,
}

impl DefinitionFile {
    pub fn new(source: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            file_path: file_path.into(),
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read definition file {}", path.display()))?;
        Ok(Self::new(source, path.display().to_string()))
    }
}

/// Read every file in `paths`; directories contribute their `*.sw` files,
/// recursively, in path order.
pub fn discover(paths: &[PathBuf]) -> Result<Vec<DefinitionFile>> {
    let mut found = Vec::new();
    for path in paths {
        collect(path, &mut found)?;
    }
    found.sort();
    found.dedup();

    found.iter().map(|p| DefinitionFile::read(p)).collect()
}

fn collect(path: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    if !path.is_dir() {
        found.push(path.to_path_buf());
        return Ok(());
    }

    let entries = std::fs::read_dir(path)
        .with_context(|| format!("Failed to list definition directory {}", path.display()))?;
    for entry in entries {
        let entry_path = entry
            .with_context(|| format!("Failed to list definition directory {}", path.display()))?
            .path();
        if entry_path.is_dir() {
            collect(&entry_path, found)?;
        } else if entry_path.extension().is_some_and(|e| e == DEFINITION_EXTENSION) {
            found.push(entry_path);
        }
    }
    Ok(())
}

/// A validation finding tied to the file it came from
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub file_path: String,
    pub definition: String,
    pub error: ValidationError,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.error.is_error()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.file_path, self.definition, self.error)
    }
}

#[derive(Debug)]
pub struct LoadedDefinitions {
    pub registry: Registry,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadedDefinitions {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Parse and register every file, then validate each definition against the
/// finished registry.
///
/// Parse and registration failures abort the load; validation findings are
/// returned for the caller to judge.
pub fn load(files: &[DefinitionFile], workers: &[String]) -> Result<LoadedDefinitions> {
    let mut registry = Registry::new();
    for worker in workers {
        registry
            .register_worker(worker.as_str())
            .with_context(|| format!("Failed to register worker '{}'", worker))?;
    }

    // Workers first, so definition names can be checked against all of them
    let mut parsed = Vec::with_capacity(files.len());
    for file in files {
        let source = parse_definitions(&file.source)
            .with_context(|| format!("Failed to parse {}", file.file_path))?;
        for worker in &source.workers {
            registry
                .register_worker(worker.as_str())
                .with_context(|| format!("Failed to register worker '{}' from {}", worker, file.file_path))?;
        }
        parsed.push((file, source.definitions));
    }

    let mut origins = Vec::new();
    for (file, definitions) in parsed {
        let version = hash_source(&file.source);
        for mut definition in definitions {
            definition.version = Some(version.clone());
            info!(
                superworker = %definition.name,
                version = &version[..8],
                file = %file.file_path,
                "registered superworker"
            );
            origins.push((definition.name.clone(), file.file_path.clone()));
            registry
                .register_definition(definition)
                .with_context(|| format!("Failed to register definitions from {}", file.file_path))?;
        }
    }

    let mut diagnostics = Vec::new();
    for (name, file_path) in origins {
        let Some(definition) = registry.get(&name) else {
            continue;
        };
        for error in validate_definition(definition, Some(&registry)) {
            if error.is_error() {
                warn!(superworker = %name, file = %file_path, "{}", error);
            } else {
                info!(superworker = %name, file = %file_path, "{}", error);
            }
            diagnostics.push(Diagnostic {
                file_path: file_path.clone(),
                definition: name.clone(),
                error,
            });
        }
    }

    info!(
        superworkers = registry.definition_names().len(),
        workers = registry.worker_names().count(),
        "loaded definitions"
    );

    Ok(LoadedDefinitions {
        registry,
        diagnostics,
    })
}

/// Like [`load`], but any validation error fails the whole load
pub fn register_definitions(files: &[DefinitionFile], workers: &[String]) -> Result<Registry> {
    let loaded = load(files, workers)?;

    let errors: Vec<String> = loaded
        .diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(ToString::to_string)
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("Definition validation failed:\n  {}", errors.join("\n  "));
    }

    Ok(loaded.registry)
}

/// Hash definition source using SHA256
pub fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}
