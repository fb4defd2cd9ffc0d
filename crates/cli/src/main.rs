use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use reconcile_cli::{io, FunctionKind};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reconcile")]
#[command(about = "Reconcile owned resources of a KRM package", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Engine config file (TOML); falls back to RECONCILE_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a package and write it back
    Run(RunArgs),

    /// Show the discovered tree, readiness and pending changes without
    /// changing anything
    Inspect(InspectArgs),

    /// Print the JSON schemas of ledger conditions and result diagnostics
    Schema(SchemaArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Function to run
    #[arg(long, value_enum)]
    function: FunctionFlag,

    /// ResourceList to read (defaults to stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Where to write the reconciled ResourceList (defaults to stdout)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct InspectArgs {
    /// Function whose roles are used
    #[arg(long, value_enum)]
    function: FunctionFlag,

    /// ResourceList to read (defaults to stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Where to write the plan (defaults to stdout)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct SchemaArgs {
    /// Where to write the schemas (defaults to stdout)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Copy, Clone, ValueEnum)]
enum FunctionFlag {
    Interface,
    Nad,
}

impl FunctionFlag {
    const fn as_domain(self) -> FunctionKind {
        match self {
            FunctionFlag::Interface => FunctionKind::Interface,
            FunctionFlag::Nad => FunctionKind::Nad,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config_path = io::resolve_config_path(cli.config);
    let config = io::load_config(config_path.as_deref())?;

    match cli.command {
        Commands::Run(args) => run(args, config),
        Commands::Inspect(args) => inspect(args, config),
        Commands::Schema(args) => schema(args),
    }
}

fn run(args: RunArgs, config: reconcile_core::EngineConfig) -> Result<()> {
    let kind = args.function.as_domain();
    let mut engine = kind.engine(config)?;
    let mut package = io::read_package(args.input.as_deref())?;

    let report = engine
        .run(&mut package)
        .with_context(|| format!("Failed to reconcile with the {} function", kind.as_str()))?;
    log::info!(
        "{}: {} changes applied, {} generated",
        kind.as_str(),
        report.changes.len(),
        report.generated
    );

    let json = package.to_json_pretty()?;
    io::write_json(&json, args.output.as_deref())?;

    if package.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

fn inspect(args: InspectArgs, config: reconcile_core::EngineConfig) -> Result<()> {
    let kind = args.function.as_domain();
    let mut engine = kind.engine(config)?;
    let package = io::read_package(args.input.as_deref())?;

    let plan = engine.plan(&package);
    let json = serde_json::to_string_pretty(&plan.to_json()?)?;
    io::write_json(&json, args.output.as_deref())
}

fn schema(args: SchemaArgs) -> Result<()> {
    let schemas = reconcile_document::wire_schemas()?;
    let json = serde_json::to_string_pretty(&schemas)?;
    io::write_json(&json, args.output.as_deref())
}
