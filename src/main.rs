use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use voicecheck::{
    app,
    cli::{handle_check_command, handle_config_command, handle_formats_command, Cli, CliCommand},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("voicecheck {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Check(args)) => {
            handle_check_command(args).await?;
            return Ok(());
        }
        Some(CliCommand::Config(args)) => {
            handle_config_command(args)?;
            return Ok(());
        }
        Some(CliCommand::Formats) => {
            handle_formats_command()?;
            return Ok(());
        }
        Some(CliCommand::Serve) | None => {}
    }

    app::run_service().await
}
