//! Command line driver for the weir pipeline engine.
//!
//! Loads a pipeline definition and its tenant profile, resolves template
//! variables, assembles and validates the flow, executes it, and emits the
//! sensor audit on completion. The circuit-breaker signal is converted
//! into a non-zero process exit here, keeping the engine itself free of
//! process-termination side effects.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use weir::prelude::*;

#[derive(Parser)]
#[command(name = "weir")]
#[command(about = "Run weir data pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline by name
    Run {
        /// Flow name to execute
        flow: String,

        /// Directory of pipeline definitions
        #[arg(long, default_value = "definitions")]
        definitions: PathBuf,

        /// Directory of tenant profiles
        #[arg(long, default_value = "tenants")]
        tenants: PathBuf,

        /// Input data as a JSON string
        #[arg(short, long)]
        input: Option<String>,

        /// Probability of emitting a trace event per walked step
        #[arg(long, default_value_t = 0.001)]
        trace_sample_rate: f64,
    },

    /// Parse a pipeline and resolve its steps without executing it
    Validate {
        /// Flow name to check
        flow: String,

        /// Directory of pipeline definitions
        #[arg(long, default_value = "definitions")]
        definitions: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            flow,
            definitions,
            tenants,
            input,
            trace_sample_rate,
        } => {
            run(
                &flow,
                &definitions,
                &tenants,
                input.as_deref(),
                trace_sample_rate,
            )
            .await
        }
        Commands::Validate { flow, definitions } => validate(&flow, &definitions),
    }
}

fn load_definition(flow_name: &str, definitions: &Path, tenants: &Path) -> Result<PipelineDefinition> {
    let mut definition = FileDefinitionStore::new(definitions).get(flow_name)?;

    let tenant_name = definition
        .tenant
        .clone()
        .context("pipeline definition names no tenant")?;
    let tenant = FileTenantStore::new(tenants).get(&tenant_name)?;

    let secrets = secret_store_from_env(None)?;
    definition.resolve_variables(&tenant.variables, secrets.as_ref())?;
    Ok(definition)
}

async fn run(
    flow_name: &str,
    definitions: &Path,
    tenants: &Path,
    input: Option<&str>,
    trace_sample_rate: f64,
) -> Result<()> {
    let definition = load_definition(flow_name, definitions, tenants)?;
    let mut flow = definition.build_flow()?;
    println!("{flow}");

    let data = match input {
        Some(text) => serde_json::from_str(text).context("input is not valid JSON")?,
        None => serde_json::Value::Null,
    };

    println!("Executing flow: {flow_name}");
    let result = {
        let mut runner = flow.begin()?;
        runner
            .run(Payload::Record(data), ExecutionContext::new(), trace_sample_rate)
            .await
    };

    let errored = result.as_ref().is_err_and(WeirError::is_fatal);
    flow.finalize(errored).await;

    match result {
        Ok(()) => {
            println!("Pipeline execution completed.");
            Ok(())
        }
        Err(err @ WeirError::CircuitBreaker(_)) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}

fn validate(flow_name: &str, definitions: &Path) -> Result<()> {
    let definition = FileDefinitionStore::new(definitions).get(flow_name)?;

    for step in &definition.steps {
        let uses = UsesRef::parse(&step.name, &step.uses)?;
        let descriptor = weir::registry::resolve(&uses.kind, &uses.version)?;
        println!(
            "step '{}' resolves to internal/{}@{}",
            step.name, descriptor.kind, descriptor.version
        );
    }

    println!("{flow_name} is valid");
    Ok(())
}
