//! Configuration
//!
//! Layered lowest to highest:
//!
//! 1. built-in defaults
//! 2. a TOML file: the explicit path, else `SUPERWORKER_CONFIG_PATH`, else an
//!    optional `superworker.toml` in the working directory
//! 3. environment variables shaped `SUPERWORKER__SECTION__KEY`
//!    (list values are comma separated)
//! 4. builder overrides
//!
//! A `.env` file is loaded into the environment first when present.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH_ENV: &str = "SUPERWORKER_CONFIG_PATH";
const ENV_PREFIX: &str = "SUPERWORKER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub definitions: DefinitionsConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DefinitionsConfig {
    /// Definition files, or directories searched for `*.sw` files
    pub paths: Vec<PathBuf>,
    /// Atomic workers registered before any file is loaded
    pub workers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on concurrently dispatched units of work
    pub max_in_flight: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { max_in_flight: 64 }
    }
}

impl Config {
    /// Load `.env`, then the default search with no overrides
    pub fn load() -> Result<Self> {
        Self::builder().dotenv(true).build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.runtime.max_in_flight == 0 {
            anyhow::bail!("runtime.max_in_flight must be at least 1");
        }
        tracing_subscriber::EnvFilter::try_new(&self.log.filter)
            .with_context(|| format!("Invalid log.filter '{}'", self.log.filter))?;
        Ok(())
    }

    /// The effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    log_filter: Option<String>,
    max_in_flight: Option<usize>,
    load_dotenv: bool,
}

impl ConfigBuilder {
    /// Read this file instead of searching (the file must exist)
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn log_filter(mut self, filter: Option<String>) -> Self {
        self.log_filter = filter;
        self
    }

    pub fn max_in_flight(mut self, max: Option<usize>) -> Self {
        self.max_in_flight = max;
        self
    }

    /// Load `.env` before reading the environment
    pub fn dotenv(mut self, load: bool) -> Self {
        self.load_dotenv = load;
        self
    }

    pub fn build(self) -> Result<Config> {
        if self.load_dotenv {
            dotenvy::dotenv().ok();
        }

        let path = self
            .config_path
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let defaults = Config::default();
        let mut builder = ::config::Config::builder()
            .set_default("log.filter", defaults.log.filter)?
            .set_default("runtime.max_in_flight", defaults.runtime.max_in_flight as i64)?;

        builder = match &path {
            Some(path) => builder.add_source(
                ::config::File::from(path.clone())
                    .format(::config::FileFormat::Toml)
                    .required(true),
            ),
            None => builder.add_source(
                ::config::File::with_name("superworker")
                    .format(::config::FileFormat::Toml)
                    .required(false),
            ),
        };

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("definitions.paths")
                .with_list_parse_key("definitions.workers")
                .try_parsing(true),
        );

        builder = builder
            .set_override_option("log.filter", self.log_filter)?
            .set_override_option("runtime.max_in_flight", self.max_in_flight.map(|n| n as i64))?;

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| match &path {
                Some(path) => format!("Failed to load configuration from {}", path.display()),
                None => "Failed to load configuration".to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }
}
