//! CLI argument parsing for skiff-scaler.

use std::path::PathBuf;

use clap::Parser;
use skiff::SkiffConfig;

#[derive(Parser, Debug)]
#[command(name = "skiff-scaler", about = "Leader-elected function scalers")]
pub struct Args {
    /// Path to TOML configuration file.
    #[arg(long, env = "SKIFF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Function to scale. Repeat for several; replaces the configured list.
    #[arg(long = "function")]
    pub functions: Vec<String>,

    /// TTL of the leader bucket in milliseconds.
    #[arg(long)]
    pub bucket_ttl_ms: Option<u64>,
}

impl Args {
    /// CLI flags take precedence over file and environment values.
    pub fn apply(&self, config: &mut SkiffConfig) {
        if !self.functions.is_empty() {
            config.scaler.functions = self.functions.clone();
        }
        if let Some(ttl_ms) = self.bucket_ttl_ms {
            config.bucket.ttl_ms = ttl_ms;
        }
    }
}
