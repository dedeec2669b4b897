//! Command-line interface for the shiplog vessel data logger.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shiplog_core::config::{defaults, env_vars, AppConfig};
use shiplog_devices::PollScheduler;
use shiplog_storage::{open_catalog, CatalogStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// shiplog - Poll shipboard Modbus devices and log readings to CSV.
#[derive(Parser, Debug)]
#[command(name = "shiplog")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file.
    #[arg(short, long, global = true, env = env_vars::CONFIG, default_value = defaults::CONFIG_FILE)]
    config: PathBuf,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Poll devices every reading interval until interrupted.
    Run,
    /// Run a single polling cycle and print its report.
    Once,
    /// Persisted catalog management.
    Catalog {
        #[command(subcommand)]
        catalog_cmd: CatalogCommand,
    },
    /// Configuration commands.
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommand,
    },
}

/// Catalog subcommands.
#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Create the catalog database and its tables.
    Init,
    /// Copy the sources, equipment and variables of the configuration file
    /// into the catalog.
    Seed,
    /// Print the stored hierarchy.
    List,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration, then print a summary.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    match args.command {
        Command::Run => run(&args.config).await,
        Command::Once => run_once(&args.config).await,
        Command::Catalog { catalog_cmd } => run_catalog_cmd(&args.config, catalog_cmd),
        Command::Config { config_cmd } => match config_cmd {
            ConfigCommand::Check => check_config(&args.config),
        },
    }
}

fn init_tracing(verbose: bool) {
    // JSON for container and service deployments
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "shiplog=debug" } else { "shiplog=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("warn,{}", default_level)));

    // Logs go to stderr; stdout carries command output.
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}

fn build_scheduler(config: &AppConfig) -> Result<PollScheduler> {
    let catalog = open_catalog(config).context("Failed to open catalog")?;
    Ok(PollScheduler::from_config(config, catalog))
}

/// Poll until Ctrl-C.
async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let scheduler = build_scheduler(&config)?;

    info!(
        client = %config.ship.client_id,
        ship = %config.ship.ship_id,
        version = shiplog_core::VERSION,
        "shiplog starting"
    );

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested, finishing current cycle"),
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C, stopping"),
        }
        shutdown.cancel();
    });

    let cycles = scheduler.run(token).await;
    println!("Stopped after {} cycles", cycles);
    Ok(())
}

async fn run_once(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let scheduler = build_scheduler(&config)?;

    let report = scheduler.run_cycle().await;
    println!("{}", report);

    if report.catalog_failed {
        anyhow::bail!("Catalog unavailable, no devices polled");
    }
    Ok(())
}

fn run_catalog_cmd(config_path: &Path, cmd: CatalogCommand) -> Result<()> {
    let config = load_config(config_path)?;
    let path = &config.storage.catalog_path;
    let store = CatalogStore::open(path)
        .with_context(|| format!("Failed to open catalog {}", path.display()))?;

    match cmd {
        CatalogCommand::Init => {
            println!("Catalog ready at {}", store.path().display());
        }
        CatalogCommand::Seed => {
            let counts = store
                .seed(&config.equipment)
                .context("Failed to seed catalog")?;
            println!(
                "Seeded {} sources, {} equipment, {} variables into {}",
                counts.sources,
                counts.equipment,
                counts.variables,
                store.path().display()
            );
        }
        CatalogCommand::List => list_catalog(&store)?,
    }
    Ok(())
}

fn list_catalog(store: &CatalogStore) -> Result<()> {
    let counts = store.counts()?;
    println!(
        "{}: {} sources, {} equipment, {} variables",
        store.path().display(),
        counts.sources,
        counts.equipment,
        counts.variables
    );

    for source in store.sources()? {
        println!("[{}] {} ({})", source.id, source.name, source.endpoint());
        for equipment in store.equipment_of(source.id)? {
            println!("  [{}] {} {}", equipment.id, equipment.name, equipment.alias);
            for variable in store.variables_of(equipment.id)? {
                println!(
                    "    [{}] {} @{} x{}",
                    variable.id, variable.name, variable.start_address, variable.register_count
                );
            }
        }
    }
    Ok(())
}

fn check_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("Configuration OK: {}", config_path.display());
    println!("  Ship:     {}/{}", config.ship.client_id, config.ship.ship_id);
    println!(
        "  Catalog:  {}",
        if config.ship.db_source {
            format!("persisted ({})", config.storage.catalog_path.display())
        } else {
            format!(
                "static ({} sources, {} equipment, {} variables)",
                config.equipment.data_sources.len(),
                config.equipment.equipment.len(),
                config.equipment.variables.len()
            )
        }
    );
    println!("  Interval: {:?}", config.ship.reading_interval);
    println!(
        "  Protocol: unit {} timeout {:?}",
        config.protocol.unit_id, config.protocol.timeout
    );
    println!("  Output:   {}", config.storage.output_dir.display());
    Ok(())
}
