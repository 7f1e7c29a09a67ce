use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "modproxy", version, about = "Caching reverse-proxy for module registries")]
pub struct Cli {
    /// Configuration file (TOML). Defaults to config.toml in the user config directory.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Increase log verbosity (-v for debug, -vv for trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
    /// Write logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}
