//! foldersync entry point.
//!
//! Parses arguments, assembles and validates configuration, installs logging
//! and the pause/quit controls, then runs the mirror loop or a single cycle.

mod keys;
mod logging;
mod signals;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use foldersync_core::config::{expand_tilde, MirrorConfig};
use foldersync_core::control::SyncControl;
use foldersync_core::cycle::MirrorEngine;
use foldersync_core::models::Operation;
use foldersync_core::notify::{Notify, TracingNotifier};

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// One-way folder mirror.
#[derive(Parser, Debug)]
#[command(
    name = "foldersync",
    version,
    about = "Keep a replica folder identical to a source folder"
)]
struct Cli {
    /// Path to a TOML configuration file. Command-line values override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mirror continuously until interrupted.
    Run(MirrorArgs),

    /// Run a single synchronization cycle and exit.
    Once(MirrorArgs),

    /// Print a configuration template.
    Init {
        /// Write the template to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
struct MirrorArgs {
    /// Folder to mirror from.
    source: Option<PathBuf>,

    /// Folder to mirror into.
    destination: Option<PathBuf>,

    /// Seconds between synchronization cycles.
    #[arg(short, long)]
    interval: Option<u64>,

    /// Append log output to this file (created if missing).
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Compare file content digests as well as size and modification time.
    #[arg(long)]
    verify: bool,

    /// Seconds to wait before retrying a failed filesystem step.
    #[arg(long)]
    retry_delay: Option<u64>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init { output } => cmd_init(output.as_deref()),
        Commands::Run(args) => cmd_mirror(&cli, args, true).await,
        Commands::Once(args) => cmd_mirror(&cli, args, false).await,
    }
}

fn cmd_init(output: Option<&Path>) -> Result<()> {
    let template = MirrorConfig::default_template();
    match output {
        Some(path) => {
            let path = expand_tilde(path);
            if path.exists() {
                bail!("refusing to overwrite existing file {}", path.display());
            }
            std::fs::write(&path, template)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote configuration template to {}", path.display());
        }
        None => print!("{template}"),
    }
    Ok(())
}

/// Merge the optional config file with command-line values, then validate.
fn build_config(config_path: Option<&PathBuf>, args: &MirrorArgs) -> Result<MirrorConfig> {
    let mut config = match config_path {
        Some(path) => MirrorConfig::load_from_file(expand_tilde(path))
            .context("failed to load configuration file")?,
        None => {
            let (Some(source), Some(destination)) = (&args.source, &args.destination) else {
                bail!("SOURCE and DESTINATION are required unless --config is given");
            };
            MirrorConfig::new(source, destination, 30)
        }
    };

    if let Some(ref source) = args.source {
        config.mirror.source = source.clone();
    }
    if let Some(ref destination) = args.destination {
        config.mirror.destination = destination.clone();
    }
    if let Some(interval) = args.interval {
        config.mirror.poll_interval_secs = interval;
    }
    if let Some(retry_delay) = args.retry_delay {
        config.mirror.retry_delay_secs = retry_delay;
    }
    if args.verify {
        config.mirror.verify = true;
    }
    if let Some(ref log_file) = args.log_file {
        config.logging.log_file = Some(log_file.clone());
    }

    config.resolve_paths();
    config.validate().context("configuration validation failed")?;
    Ok(config)
}

async fn cmd_mirror(cli: &Cli, args: &MirrorArgs, continuous: bool) -> Result<()> {
    let config = build_config(cli.config.as_ref(), args)?;

    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.logging.log_level);
    let log_guard = logging::init(log_level, config.logging.log_file.as_deref())?;

    // Startup banner
    info!("========================================");
    info!("  foldersync v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Source        : {}", config.mirror.source.display());
    info!("Destination   : {}", config.mirror.destination.display());
    info!("Poll interval : {}s", config.mirror.poll_interval_secs);
    info!("Retry delay   : {}s", config.mirror.retry_delay_secs);
    if let Some(ref log_file) = config.logging.log_file {
        info!("Log file      : {}", log_file.display());
    }
    info!("Log level     : {}", log_level);
    info!("========================================");

    let notifier: Arc<dyn Notify> = Arc::new(TracingNotifier);
    logging::report_created(&log_guard, notifier.as_ref());
    if config.mirror.verify {
        notifier.notify(
            Operation::Info,
            "Verification enabled, synchronization is going to take longer.",
        );
    }

    let control = SyncControl::new();
    signals::install(control.clone(), notifier.clone());

    let mut engine = MirrorEngine::new(config.engine_settings(), control.clone(), notifier.clone());

    if continuous {
        keys::spawn(control, notifier);
        info!("Press p (or space) then Enter to pause or resume, q then Enter to quit.");
        let cycles = engine.run().await.context("mirror loop failed")?;
        info!(cycles, "foldersync stopped");
    } else {
        match engine.run_cycle().await {
            Ok(stats) => info!(
                copied = stats.files_copied,
                updated = stats.files_updated,
                deleted = stats.files_deleted,
                "single cycle finished"
            ),
            Err(e) if e.is_cancelled() => info!("cycle cancelled"),
            Err(e) => return Err(e).context("synchronization cycle failed"),
        }
    }

    Ok(())
}
