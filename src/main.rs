use anyhow::Result;
use clap::Parser;
use meetscribe::cli::{handle_join_command, handle_recover_command, Cli, CliCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        CliCommand::Join(args) => handle_join_command(args).await,
        CliCommand::Recover => handle_recover_command().await,
    }
}
