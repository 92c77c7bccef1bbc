//! Command-line front-end for `apiloom-core`: builds an instance over a
//! directory of `.json` module files and either prints its shape or
//! invokes a path on it. A demonstration client, not a module system of
//! its own — see [`modules::JsonModuleLoader`] for what "module" means
//! here.

mod modules;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use apiloom_core::{
    ApiShape, BoundApi, HooksConfig, InstanceConfig, Mode, NativeDirectoryProvider, RuntimeKind,
    ScopeConfig,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use modules::JsonModuleLoader;

#[derive(Parser)]
#[command(name = "apiloom")]
#[command(about = "Build a callable API from a directory of modules", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the shape of the assembled API as JSON
    Describe(DescribeArgs),

    /// Invoke a dotted path on the assembled API
    Call(CallArgs),
}

#[derive(clap::Args)]
struct SharedBuildArgs {
    /// Directory to build the API from
    dir: PathBuf,

    /// Build eagerly or lazily
    #[arg(long, value_enum, default_value = "eager")]
    mode: ModeArg,

    /// Context runtime strategy
    #[arg(long, value_enum, default_value = "async")]
    runtime: RuntimeArg,

    /// Maximum directory depth to descend (unlimited if omitted)
    #[arg(long)]
    api_depth: Option<u32>,

    /// JSON object merged into the instance's base context
    #[arg(long)]
    context: Option<String>,
}

#[derive(clap::Args)]
struct DescribeArgs {
    #[command(flatten)]
    shared: SharedBuildArgs,

    /// Materialize every lazy subdirectory before describing it
    #[arg(long)]
    show_all: bool,
}

#[derive(clap::Args)]
struct CallArgs {
    #[command(flatten)]
    shared: SharedBuildArgs,

    /// Dotted path to invoke, e.g. `math.add`
    path: String,

    /// JSON-encoded arguments, one per occurrence
    #[arg(long = "arg")]
    args: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Eager,
    Lazy,
}

impl From<ModeArg> for Mode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Eager => Mode::Eager,
            ModeArg::Lazy => Mode::Lazy,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RuntimeArg {
    Async,
    Live,
}

impl From<RuntimeArg> for RuntimeKind {
    fn from(value: RuntimeArg) -> Self {
        match value {
            RuntimeArg::Async => RuntimeKind::Async,
            RuntimeArg::Live => RuntimeKind::Live,
        }
    }
}

async fn build_instance(shared: &SharedBuildArgs) -> Result<BoundApi> {
    let mut config = InstanceConfig::new(shared.dir.clone())
        .with_mode(shared.mode.into())
        .with_runtime(shared.runtime.into())
        .with_api_shape(ApiShape::Auto)
        .with_hooks(HooksConfig::default())
        .with_scope(ScopeConfig::default());

    if let Some(depth) = shared.api_depth {
        config = config.with_api_depth(depth);
    }
    if let Some(raw) = &shared.context {
        let Value::Object(map) = serde_json::from_str(raw).context("--context must be a JSON object")?
        else {
            anyhow::bail!("--context must be a JSON object");
        };
        config = config.with_context(map);
    }

    let directory_provider = Arc::new(NativeDirectoryProvider::new());
    let module_loader = Arc::new(JsonModuleLoader);

    BoundApi::build(config, directory_provider, module_loader)
        .await
        .context("failed to build api instance")
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Describe(args) => {
            let api = build_instance(&args.shared).await?;
            let described = api.describe(args.show_all).await?;
            println!("{}", serde_json::to_string_pretty(&described)?);
        }
        Commands::Call(args) => {
            let api = build_instance(&args.shared).await?;
            let parsed_args = args
                .args
                .iter()
                .map(|raw| serde_json::from_str::<Value>(raw).context("--arg must be valid JSON"))
                .collect::<Result<Vec<_>>>()?;
            let result = api.call(&args.path, parsed_args).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            api.shutdown().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    run(cli).await
}
