//! Configuration error types

use std::path::PathBuf;

use snafu::Snafu;

/// Configuration error types
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[snafu(display("failed to parse config file {}: {source}", path.display()))]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A configuration value is invalid.
    #[snafu(display("invalid configuration for {key}: '{value}' ({reason})"))]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
