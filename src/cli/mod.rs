pub mod args;
pub mod check;
pub mod config;
pub mod formats;

pub use args::{CheckCliArgs, Cli, CliCommand, ConfigCliArgs, ConfigCommand};
pub use check::handle_check_command;
pub use config::handle_config_command;
pub use formats::handle_formats_command;
