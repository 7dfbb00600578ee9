use crate::api::ApiClient;
use crate::backup::{BackupOrchestrator, CheckpointStore, LogProgress};
use crate::config::{Config, load_config};
use crate::utils::safe_filename;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;

#[derive(Parser)]
#[command(name = "chanvault")]
#[command(about = "Back up chat channel history and attachments", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up all configured channels, or a single one
    Run {
        /// Back up only this configured channel
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List configured channels and their checkpoints
    Channels {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show per-channel backup artifact summary
    Status {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { channel, config } => run_backup(channel, config.as_deref()).await,
        Commands::Channels { config } => list_channels(config.as_deref()),
        Commands::Status { config } => show_status(config.as_deref()),
    }
}

async fn run_backup(only_channel: Option<String>, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let channels = select_channels(&config, only_channel.as_deref())?;

    let token = config.resolve_token()?;
    let api = Arc::new(ApiClient::new(token, &config.api_base));
    let orchestrator = BackupOrchestrator::new(api, &config, Arc::new(LogProgress));

    let mut failures = 0usize;
    for (name, id) in &channels {
        // One channel failing must not stop the remaining ones.
        if let Err(e) = orchestrator.backup_channel(name, id).await {
            error!(channel = %name, error = %e, "channel backup aborted");
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{} of {} channel backups failed", failures, channels.len());
    }
    Ok(())
}

fn select_channels(
    config: &Config,
    only_channel: Option<&str>,
) -> Result<Vec<(String, String)>> {
    if config.channels.is_empty() {
        bail!("No channels configured. Add a `channels` map to the config file.");
    }
    match only_channel {
        Some(name) => {
            let id = config
                .channels
                .get(name)
                .with_context(|| format!("Channel '{}' is not configured", name))?;
            Ok(vec![(name.to_string(), id.clone())])
        }
        None => Ok(config
            .channels
            .iter()
            .map(|(name, id)| (name.clone(), id.clone()))
            .collect()),
    }
}

fn list_channels(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    if config.channels.is_empty() {
        println!("No channels configured.");
        return Ok(());
    }

    for (name, id) in &config.channels {
        let channel_dir = Path::new(&config.backup_root).join(safe_filename(name));
        let checkpoint = CheckpointStore::new(&channel_dir)
            .read(name)?
            .unwrap_or_else(|| "(none)".to_string());
        println!("{name}  id={id}  checkpoint={checkpoint}");
    }
    Ok(())
}

fn show_status(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    if config.channels.is_empty() {
        println!("No channels configured.");
        return Ok(());
    }

    for name in config.channels.keys() {
        let channel_dir = Path::new(&config.backup_root).join(safe_filename(name));
        let log_path = channel_dir.join(format!("{}_messages.txt", safe_filename(name)));

        let logged = match std::fs::read_to_string(&log_path) {
            Ok(content) => content.lines().count(),
            Err(_) => 0,
        };
        let attachments = std::fs::read_dir(channel_dir.join("attachments"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        let checkpoint = CheckpointStore::new(&channel_dir)
            .read(name)?
            .unwrap_or_else(|| "(none)".to_string());

        println!(
            "{name}  log lines: {logged}  attachments: {attachments}  checkpoint: {checkpoint}"
        );
    }
    Ok(())
}
