//! CLI handler for inspecting the configuration file.

use crate::config::Config;
use anyhow::Result;

use super::args::{ConfigCliArgs, ConfigCommand};

pub fn handle_config_command(args: ConfigCliArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", Config::config_path()?.display());
        }
        ConfigCommand::Show => {
            let config = Config::load()?;
            println!("# {}", Config::config_path()?.display());
            println!("# recordings: {}\n", config.recordings_dir()?.display());
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
