use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "voicecheck")]
#[command(about = "Microphone check: record, watch voice levels, play back", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Record a short clip with a live level meter, then play it back
    Check(CheckCliArgs),
    /// Run the local HTTP control service (default when no command is given)
    Serve,
    /// Show or locate the configuration file
    Config(ConfigCliArgs),
    /// List the recording format used on each platform
    Formats,
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct CheckCliArgs {
    /// Maximum recording length in seconds
    #[arg(short, long, default_value = "5")]
    pub seconds: u64,
    /// Stop as soon as sustained silence is detected
    #[arg(long)]
    pub stop_on_silence: bool,
    /// Skip playing the recording back
    #[arg(long)]
    pub no_playback: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ConfigCliArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}
