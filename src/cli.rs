use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay incoming SMS to REST and Telegram destinations")]
pub struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Resume the saved running state and forward until interrupted (default)
    Run,
    /// Start forwarding, save that state, and forward until interrupted
    Start,
    /// Mark forwarding as stopped for the next launch; an already running process keeps forwarding
    Stop,
    /// Show running state, configuration validity and forwarded count
    Status,
    /// Check the saved Telegram bot token
    VerifyTelegram,
}
