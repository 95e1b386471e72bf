//! Pinecone Migration CLI
//!
//! Copies every vector of one Pinecone index into another.
//! Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pinecone_migrate::config::EXAMPLE_CONFIG;
use pinecone_migrate::namespaces::enumerate_namespaces;
use pinecone_migrate::progress::MigrationProgress;
use pinecone_migrate::wizard::{Wizard, WizardUI};
use pinecone_migrate::{
    create_store, Error, MigrationConfig, MigrationContext, MigrationReport, Orchestrator,
};

#[derive(Parser)]
#[command(name = "pinecone-migrate")]
#[command(version)]
#[command(about = "Copy vectors, metadata and namespaces between Pinecone indexes", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Which indexes to work on.
#[derive(Args, Clone, Default)]
struct Target {
    /// Source index name
    source_index: Option<String>,

    /// Destination index name (defaults to the source index name)
    dest_index: Option<String>,

    /// Source project API key
    #[arg(long, env = "PINECONE_SOURCE_API_KEY", hide_env_values = true)]
    source_api_key: Option<String>,

    /// Destination project API key
    #[arg(long, env = "PINECONE_DEST_API_KEY", hide_env_values = true)]
    dest_api_key: Option<String>,

    /// Configuration file path (instead of index names)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    #[command(flatten)]
    target: Target,

    /// Batch size override
    #[arg(long)]
    batch_size: Option<usize>,

    /// Namespaces migrated in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// Dry run mode (read everything, don't write to destination)
    #[arg(long)]
    dry_run: bool,

    /// Ignore stored checkpoints and start over
    #[arg(long)]
    reset_checkpoints: bool,

    /// Write the JSON report to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration (default)
    Run(RunArgs),

    /// Compare source and destination schemas without writing
    Check(Target),

    /// List the source's namespaces and approximate counts
    Namespaces(Target),

    /// Generate example configuration
    Init {
        /// Output file path
        #[arg(short, long, default_value = "pinecone-migrate.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Failed to initialise logging: {e}");
    }

    let result = match cli.command {
        Some(Commands::Run(args)) => run_migration(args).await,
        Some(Commands::Check(target)) => check_schemas(target).await,
        Some(Commands::Namespaces(target)) => list_namespaces(target).await,
        Some(Commands::Init { output, force }) => generate_config(&output, force),
        None => run_migration(cli.run).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            WizardUI::new().print_error(&format!("{e:#}"));
            ExitCode::from(failure_code(&e))
        }
    }
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Exit status for an error that escaped the run.
fn failure_code(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<Error>() {
        Some(err) if !err.is_fatal_precondition() => 1,
        _ => 2,
    }
}

fn interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Builds the config from a file, index names, or the wizard.
fn resolve_config(target: &Target, wizard: Option<&Wizard>) -> anyhow::Result<MigrationConfig> {
    let source_key = target.source_api_key.as_deref();
    let dest_key = target.dest_api_key.as_deref();

    let mut config = if let Some(path) = &target.config {
        info!("Loading configuration from {:?}", path);
        MigrationConfig::from_file(path)?
    } else if let Some(source) = &target.source_index {
        let destination = target.dest_index.clone().unwrap_or_else(|| source.clone());
        MigrationConfig::between_indexes(source.clone(), "", destination, "")
    } else if let Some(wizard) = wizard {
        wizard.collect(source_key, dest_key)?
    } else {
        return Err(Error::Config(
            "no source index given; pass SOURCE_INDEX [DEST_INDEX] or --config <FILE>".to_string(),
        )
        .into());
    };

    config.apply_api_keys(source_key, dest_key);
    Ok(config)
}

async fn run_migration(args: RunArgs) -> anyhow::Result<ExitCode> {
    let wizard = Wizard::new();
    let prompting = args.target.source_index.is_none() && args.target.config.is_none() && interactive();
    let mut config = resolve_config(&args.target, prompting.then_some(&wizard))?;

    if let Some(bs) = args.batch_size {
        config.options.batch_size = bs;
    }
    if let Some(c) = args.concurrency {
        config.options.concurrency = c;
    }
    if args.dry_run {
        config.options.dry_run = true;
    }
    if args.reset_checkpoints {
        config.options.reset_checkpoints = true;
    }
    config.validate()?;

    let source_index = config.source.index_name();
    let destination_index = config.destination.index_name();
    let ui = wizard.ui();

    let context = MigrationContext::from_config(&config).await?;
    let orchestrator = Orchestrator::new(context).with_progress(MigrationProgress::new());

    if prompting && !args.yes {
        let preview = async {
            let compat = orchestrator.check().await?;
            let namespaces = enumerate_namespaces(
                orchestrator.context().source.as_ref(),
                &config.options.namespaces,
                &config.options.retry.to_retry_config(),
            )
            .await?;
            Ok::<_, Error>((compat, namespaces))
        };
        match preview.await {
            Ok((compat, namespaces)) => {
                if !wizard.confirm(&config, &compat, &namespaces)? {
                    return Ok(ExitCode::SUCCESS);
                }
            }
            Err(e) => return finish_fatal(ui, &source_index, &destination_index, e, args.report.as_deref()),
        }
    }

    ui.print_starting_migration();
    let stop = spawn_stop_signal();

    let report = match orchestrator.run(stop).await {
        Ok(report) => report,
        Err(e) => return finish_fatal(ui, &source_index, &destination_index, e, args.report.as_deref()),
    };

    ui.print_report(&report);
    if let Some(path) = &args.report {
        report.write_json(path)?;
        info!("Report written to {:?}", path);
    }
    Ok(ExitCode::from(report.outcome.exit_code()))
}

/// Emits the report of a run stopped by a precondition failure.
fn finish_fatal(
    ui: &WizardUI,
    source_index: &str,
    destination_index: &str,
    e: Error,
    report_path: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    error!("{}", e);
    let report = MigrationReport::fatal(source_index, destination_index, &e);
    ui.print_report(&report);
    if let Some(path) = report_path {
        report.write_json(path)?;
    }
    Ok(ExitCode::from(report.outcome.exit_code()))
}

/// Sends `true` on Ctrl-C or SIGTERM; a second Ctrl-C exits at once.
fn spawn_stop_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        warn!("Stop requested; finishing in-flight batches and saving checkpoints (Ctrl-C again to abort)");
        let _ = tx.send(true);

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Aborting; unsaved pages will be copied again on the next run");
            std::process::exit(130);
        }
    });
    rx
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn check_schemas(target: Target) -> anyhow::Result<ExitCode> {
    let mut config = resolve_config(&target, None)?;
    config.options.checkpoint_enabled = false;
    config.validate()?;

    let ui = WizardUI::new();
    let source_index = config.source.index_name();
    let destination_index = config.destination.index_name();
    let orchestrator = Orchestrator::new(MigrationContext::from_config(&config).await?);

    match orchestrator.check().await {
        Ok(compat) => {
            ui.print_compatibility(&source_index, &destination_index, &compat);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => finish_fatal(&ui, &source_index, &destination_index, e, None),
    }
}

async fn list_namespaces(target: Target) -> anyhow::Result<ExitCode> {
    let config = resolve_config(&target, None)?;
    config.validate_source()?;

    let source = create_store(&config.source)?;
    let namespaces = enumerate_namespaces(
        source.as_ref(),
        &config.options.namespaces,
        &config.options.retry.to_retry_config(),
    )
    .await?;
    WizardUI::new().print_namespaces(source.index_name(), &namespaces);
    Ok(ExitCode::SUCCESS)
}

fn generate_config(output: &Path, force: bool) -> anyhow::Result<ExitCode> {
    if output.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            output.display()
        ))
        .into());
    }
    std::fs::write(output, EXAMPLE_CONFIG)?;
    println!("✅ Generated configuration: {:?}", output);
    println!(
        "   Edit the file and run: pinecone-migrate run --config {:?}",
        output
    );
    Ok(ExitCode::SUCCESS)
}
