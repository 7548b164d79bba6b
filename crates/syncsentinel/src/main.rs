//! SyncSentinel command-line entry point
//!
//! - `watch`: follow the log directory until Ctrl-C
//! - `rescan`: process every existing log once
//! - `parse`: print the records of a single log without touching the CSV
//! - `config`: write or show the configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use syncsentinel::sinks::TabularRecord;
use syncsentinel::{
    parse_file, Command, NativeWatcher, Pipeline, RescanSummary, SentinelConfig, TransferRecord,
    WatchCoordinator,
};
use syncsentinel_logging::{init_logging, LogConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "syncsentinel", about = "Turn FreeFileSync logs into a media asset CSV")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Configuration file (default: ~/.syncsentinel/config.toml)
    #[arg(long, global = true, env = "SYNCSENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Override the CSV target from the configuration
    #[arg(long, global = true)]
    csv: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the log directory and export new logs as they finish
    Watch {
        /// Process logs already in the directory before watching
        #[arg(long)]
        rescan_first: bool,
    },

    /// Process every log in a directory once
    Rescan {
        /// Directory to scan (default: configured watch_dir)
        dir: Option<PathBuf>,
    },

    /// Parse one log and print its records
    Parse {
        /// Log file (.log or .html)
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "syncsentinel",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: logging disabled: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(1)
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(SentinelConfig::default_path);

    if let Commands::Config { action } = &cli.command {
        return run_config(action, &config_path);
    }

    let mut config = SentinelConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    if let Some(csv) = cli.csv {
        config.csv_path = Some(csv);
    }

    match cli.command {
        Commands::Watch { rescan_first } => run_watch(config, rescan_first),
        Commands::Rescan { dir } => run_rescan(&config, dir),
        Commands::Parse { file, json } => run_parse(file, json),
        Commands::Config { .. } => Ok(()),
    }
}

fn run_config(action: &ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            SentinelConfig::default()
                .save(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Show => {
            let config = SentinelConfig::load_or_default(path)?;
            let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
            println!("# {}", path.display());
            print!("{}", rendered);
            println!("# effective csv_path = {}", config.csv_path().display());
        }
    }
    Ok(())
}

fn run_rescan(config: &SentinelConfig, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| config.watch_dir.clone());
    let mut pipeline = Pipeline::from_config(config).context("Failed to open CSV target")?;
    let summary = pipeline
        .rescan(&dir, config.recursive)
        .with_context(|| format!("Failed to rescan {}", dir.display()))?;
    let csv = pipeline.store().path().to_path_buf();
    pipeline.shutdown();

    print_rescan(&summary);
    println!("CSV: {}", csv.display());
    Ok(())
}

fn run_parse(file: PathBuf, json: bool) -> Result<()> {
    let parsed = parse_file(&file).with_context(|| format!("Failed to parse {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
        return Ok(());
    }

    let mut writer = csv::WriterBuilder::new().from_writer(std::io::stdout());
    writer.write_record(TransferRecord::HEADER)?;
    for record in &parsed.records {
        writer.write_record(record.to_row())?;
    }
    writer.flush()?;

    eprintln!(
        "{} format, {} record(s), {} skipped line(s), {} non-creation operation(s)",
        parsed.format,
        parsed.records.len(),
        parsed.skipped,
        parsed.ignored_operations
    );
    Ok(())
}

fn run_watch(config: SentinelConfig, rescan_first: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let pipeline = Pipeline::from_config(&config).context("Failed to open CSV target")?;
        let coordinator = WatchCoordinator::new(pipeline, config.debounce(), config.recursive);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(8);

        let _watcher = NativeWatcher::start(&config.watch_dir, config.recursive, event_tx)
            .with_context(|| format!("Failed to watch {}", config.watch_dir.display()))?;
        let task = tokio::spawn(coordinator.run(event_rx, command_rx));

        if rescan_first {
            let (reply, response) = oneshot::channel();
            command_tx
                .send(Command::Rescan {
                    dir: config.watch_dir.clone(),
                    reply,
                })
                .await
                .map_err(|_| anyhow::anyhow!("Coordinator stopped before rescan"))?;
            let summary = response
                .await
                .context("Coordinator dropped the rescan request")??;
            print_rescan(&summary);
        }

        println!(
            "Watching {} -> {} (Ctrl-C to stop)",
            config.watch_dir.display(),
            config.csv_path().display()
        );
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        info!("Shutdown requested");

        let _ = command_tx.send(Command::Stop).await;
        let coordinator = task.await.context("Coordinator task panicked")?;
        tokio::task::spawn_blocking(move || coordinator.shutdown())
            .await
            .context("Mirror shutdown panicked")?;
        Ok::<(), anyhow::Error>(())
    })
}

fn print_rescan(summary: &RescanSummary) {
    println!(
        "Scanned {} log(s): {} processed, {} new row(s), {} duplicate(s)",
        summary.files_seen,
        summary.processed.len(),
        summary.appended,
        summary.duplicates
    );
    for (path, reason) in &summary.failures {
        println!("  skipped {}: {}", path.display(), reason);
    }
}
