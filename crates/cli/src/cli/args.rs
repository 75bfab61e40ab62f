pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "b2up")]
#[command(about = "Upload and delete files in a B2 bucket")]
pub struct Args {
    /// Path to the b2up config directory (defaults to ~/.b2up)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log level (overrides the config file; RUST_LOG overrides both)
    #[arg(long, global = true)]
    pub log_level: Option<tracing::Level>,

    #[command(subcommand)]
    pub command: crate::Command,
}
