//! Command-line interface: argument definitions and command handlers.

use crate::browser::ChromiumLauncher;
use crate::config::Config;
use crate::engine::{CaptureEngine, EngineConfig};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "meetscribe",
    about = "Self-hosted meeting capture agent",
    version
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand)]
pub enum CliCommand {
    /// Join a meeting and capture until Ctrl-C, then finalize artifacts
    Join(JoinArgs),
    /// Finalize sessions orphaned by a previous crash
    Recover,
}

#[derive(Args)]
pub struct JoinArgs {
    /// Meeting URL (Zoom, Google Meet, Microsoft Teams, or Webex)
    pub url: String,

    /// Logical meeting identifier; generated when omitted
    #[arg(long)]
    pub meeting_id: Option<String>,

    /// Display name to join under, overriding the configured bot name
    #[arg(long)]
    pub name: Option<String>,
}

pub async fn handle_join_command(args: JoinArgs) -> Result<()> {
    let config = Config::load()?;
    let mut engine_config = EngineConfig::from_app_config(&config)?;
    if let Some(name) = args.name {
        engine_config.bot_name = name;
    }

    let launcher = Arc::new(ChromiumLauncher::new(
        config.browser.chrome_path.clone(),
        config.browser.headless,
    ));
    let engine = CaptureEngine::new(engine_config, launcher)?;

    let meeting_id = args
        .meeting_id
        .unwrap_or_else(|| format!("meeting-{}", Uuid::new_v4()));

    let joined = engine.join(&meeting_id, &args.url).await?;
    info!(
        "Joined {} meeting {} (session {})",
        joined.platform, meeting_id, joined.session_id
    );
    info!("Recording. Press Ctrl-C to leave and finalize.");

    tokio::signal::ctrl_c().await?;
    info!("Leaving meeting {}...", meeting_id);

    let result = engine.leave(&meeting_id).await?;

    println!("Meeting capture complete");
    println!("  duration: {}s", result.duration_seconds);
    println!("  frames:   {}", result.frame_count);
    match &result.video_path {
        Some(path) => println!("  video:    {}", path.display()),
        None => println!("  video:    (encoding failed, frames kept on disk)"),
    }
    println!("  captions: {} segment(s)", result.transcript_segments.len());

    Ok(())
}

pub async fn handle_recover_command() -> Result<()> {
    let config = Config::load()?;
    let engine_config = EngineConfig::from_app_config(&config)?;
    let launcher = Arc::new(ChromiumLauncher::new(
        config.browser.chrome_path.clone(),
        config.browser.headless,
    ));
    let engine = CaptureEngine::new(engine_config, launcher)?;

    let orphans = engine.orphans().await?;
    if orphans.is_empty() {
        info!("No orphaned sessions to recover");
        return Ok(());
    }

    info!("Found {} orphaned session(s)", orphans.len());
    for record in orphans {
        let meeting_id = record.meeting_id.clone();
        match engine.recover_orphan(record).await {
            Ok(result) => match result.video_path {
                Some(path) => {
                    println!("recovered {meeting_id}: {} ({}s)", path.display(), result.duration_seconds)
                }
                None => println!("recovered {meeting_id}: no video produced"),
            },
            Err(e) => warn!("Could not recover {}: {}", meeting_id, e),
        }
    }

    Ok(())
}
