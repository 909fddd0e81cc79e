//! Initialization
//!
//! Loads configuration and definition files once, then freezes the registry
//! for the life of the process. Compilation only ever reads the frozen
//! registry.
//!
//! # Example
//!
//! ```no_run
//! use superworker_core::init::{self, InitBuilder};
//!
//! InitBuilder::new()
//!     .definition_path("flows")
//!     .worker("Mailer")
//!     .init()?;
//!
//! let registry = init::registry()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Context, Result};

use crate::config::Config;
use crate::definitions::{self, DefinitionFile};
use crate::registry::Registry;

/// Global initialization state
static INIT_STATE: OnceLock<InitState> = OnceLock::new();

#[derive(Debug)]
struct InitState {
    config: Config,
    registry: Arc<Registry>,
}

/// Options for initializing the process-wide registry
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Config file path (overrides default search)
    pub config_path: Option<PathBuf>,

    /// Files or directories loaded on top of `definitions.paths`
    pub definition_paths: Vec<PathBuf>,

    /// Workers registered on top of `definitions.workers`
    pub workers: Vec<String>,

    /// In-memory definition files
    pub definitions: Vec<DefinitionFile>,
}

/// Builder for constructing InitOptions
#[derive(Default)]
pub struct InitBuilder {
    options: InitOptions,
}

impl InitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn definition_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.definition_paths.push(path.into());
        self
    }

    pub fn worker(mut self, name: impl Into<String>) -> Self {
        self.options.workers.push(name.into());
        self
    }

    pub fn definitions(mut self, files: Vec<DefinitionFile>) -> Self {
        self.options.definitions.extend(files);
        self
    }

    pub fn init(self) -> Result<()> {
        initialize(self.options)
    }
}

/// Load configuration and definitions, then freeze the registry.
///
/// Calling this function multiple times is safe - subsequent calls are no-ops.
pub fn initialize(options: InitOptions) -> Result<()> {
    if INIT_STATE.get().is_some() {
        return Ok(());
    }

    let (config, registry) = load(options)?;

    INIT_STATE
        .set(InitState {
            config,
            registry: registry.freeze(),
        })
        .map_err(|_| anyhow!("Initialization already completed"))?;

    Ok(())
}

/// Everything [`initialize`] does short of storing the result
pub fn load(options: InitOptions) -> Result<(Config, Registry)> {
    let config = Config::builder()
        .config_path(options.config_path)
        .dotenv(true)
        .build()
        .context("Failed to load configuration")?;

    let mut paths = config.definitions.paths.clone();
    paths.extend(options.definition_paths);

    let mut files = definitions::discover(&paths).context("Failed to read definition files")?;
    files.extend(options.definitions);

    let mut workers = config.definitions.workers.clone();
    workers.extend(options.workers);

    let registry = definitions::register_definitions(&files, &workers)
        .context("Failed to register definitions")?;

    Ok((config, registry))
}

/// Check if initialization has completed
pub fn is_initialized() -> bool {
    INIT_STATE.get().is_some()
}

/// The configuration loaded by [`initialize`]
pub fn get_config() -> Result<&'static Config> {
    state().map(|s| &s.config)
}

/// The frozen registry built by [`initialize`]
pub fn registry() -> Result<Arc<Registry>> {
    state().map(|s| Arc::clone(&s.registry))
}

fn state() -> Result<&'static InitState> {
    INIT_STATE
        .get()
        .ok_or_else(|| anyhow!("superworker not initialized - call initialize() first"))
}
