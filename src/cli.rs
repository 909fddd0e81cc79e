use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::compiler::compile_definition;
use crate::config::Config;
use crate::definitions;
use crate::graph::{ExecutionGraph, Runner, RunnerOptions, SimulatedDispatcher};
use crate::init::{self, InitOptions};
use crate::types::{Args, RunStatus};

#[derive(Parser)]
#[command(name = "superworker")]
#[command(about = "Compile superworker definitions into execution graphs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Extra definition files or directories (repeatable)
    #[arg(short = 'd', long = "definitions", global = true)]
    pub definitions: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate definition files
    Check {
        /// Files or directories to check (default: definitions.paths)
        files: Vec<PathBuf>,
    },

    /// Compile a superworker and print its record table
    Compile {
        /// Superworker to compile
        name: String,

        /// Arguments as a JSON object
        #[arg(short = 'a', long = "args", default_value = "{}")]
        args: String,

        /// Print an indented tree instead of JSON
        #[arg(long)]
        tree: bool,
    },

    /// Compile a superworker and drain it with a simulated dispatcher
    Simulate {
        /// Superworker to run
        name: String,

        /// Arguments as a JSON object
        #[arg(short = 'a', long = "args", default_value = "{}")]
        args: String,

        /// Workers whose dispatches fail (repeatable)
        #[arg(long = "fail")]
        fail: Vec<String>,

        /// Override runtime.max_in_flight
        #[arg(long)]
        max_in_flight: Option<usize>,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

/// Install a stderr subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // A subscriber may already be installed (tests, embedding hosts)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load configuration eagerly so errors surface before any output
    let config = Config::builder()
        .config_path(cli.config.clone())
        .dotenv(true)
        .build()?;
    init_tracing(&config.log.filter);

    match cli.command {
        Commands::Check { files } => {
            let mut paths = if files.is_empty() {
                config.definitions.paths.clone()
            } else {
                files
            };
            paths.extend(cli.definitions);

            let files = definitions::discover(&paths)?;
            let loaded = definitions::load(&files, &config.definitions.workers)?;

            for diagnostic in &loaded.diagnostics {
                println!("{}", diagnostic);
            }

            let errors = loaded.diagnostics.iter().filter(|d| d.is_error()).count();
            if errors > 0 {
                anyhow::bail!("{} error(s) in {} file(s)", errors, files.len());
            }
            println!(
                "✓ {} superworker(s) in {} file(s)",
                loaded.registry.definition_names().len(),
                files.len()
            );
        }

        Commands::Compile { name, args, tree } => {
            let graph = compile_named(&cli.config, cli.definitions, &name, &args)?;

            if tree {
                print!("{}", render_tree(&graph));
            } else {
                println!("{}", graph.table().to_json_pretty()?);
            }
        }

        Commands::Simulate {
            name,
            args,
            fail,
            max_in_flight,
        } => {
            let graph = compile_named(&cli.config, cli.definitions, &name, &args)?;
            let options = RunnerOptions {
                max_in_flight: max_in_flight.unwrap_or(config.runtime.max_in_flight),
            };

            let report = Runner::new(graph, Arc::new(SimulatedDispatcher::failing(fail)))
                .with_options(options)
                .run()
                .await;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status == RunStatus::Failed {
                anyhow::bail!("superjob {} failed", report.superjob_id);
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn compile_named(
    config_path: &Option<PathBuf>,
    definition_paths: Vec<PathBuf>,
    name: &str,
    args: &str,
) -> Result<ExecutionGraph> {
    init::initialize(InitOptions {
        config_path: config_path.clone(),
        definition_paths,
        ..Default::default()
    })?;
    let registry = init::registry()?;

    let args = parse_args(args)?;
    let table = compile_definition(name, &args, &registry)
        .with_context(|| format!("Failed to compile '{}'", name))?;

    Ok(ExecutionGraph::new(table)?)
}

/// Parse `--args`, which must be a JSON object
pub fn parse_args(json: &str) -> Result<Args> {
    serde_json::from_str(json).context("--args must be a JSON object")
}

/// One line per record, children indented under their owner and `next_id`
/// continuations at the same depth.
pub fn render_tree(graph: &ExecutionGraph) -> String {
    let mut out = String::new();
    let mut stack = vec![(graph.root_id(), 0usize)];

    while let Some((id, depth)) = stack.pop() {
        let Some(record) = graph.get(id) else {
            continue;
        };

        let args: Vec<String> = record.arg_values.iter().map(|v| v.to_string()).collect();
        out.push_str(&format!(
            "{}{} {}({})\n",
            "  ".repeat(depth),
            id,
            record.worker_class,
            args.join(", ")
        ));

        // Pushed in reverse: the continuation prints after the whole subtree
        if let Some(next) = record.next_id {
            stack.push((next, depth));
        }
        for child in graph.child_branches(id).into_iter().rev() {
            stack.push((child, depth + 1));
        }
    }

    out
}
