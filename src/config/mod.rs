//! Scaler configuration
//!
//! Layered, lowest to highest precedence:
//! 1. Hardcoded defaults
//! 2. TOML file (explicit path, otherwise `./skiff.toml` if present)
//! 3. `SKIFF_*` environment variables
//! 4. CLI flags (applied by the binary)

pub mod error;

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use skiff_election::ElectionConfig;
use skiff_kv::BucketConfig;
use snafu::ResultExt;
use tracing::info;

pub use error::ConfigError;

/// File probed when no explicit config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "./skiff.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkiffConfig {
    pub bucket: BucketSettings,
    pub election: ElectionSettings,
    pub scaler: ScalerSettings,
}

/// The TTL-scoped bucket holding leader keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketSettings {
    pub name: String,
    /// Leases not renewed within this window expire. Must be positive.
    pub ttl_ms: u64,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            name: "scalers".into(),
            ttl_ms: 2_000,
        }
    }
}

/// Election timing. Unset intervals are derived from the bucket TTL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionSettings {
    pub update_interval_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub op_timeout_ms: Option<u64>,
}

/// Which functions to scale and how the leader loop behaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerSettings {
    pub functions: Vec<String>,
    /// Period of the leader-only reconcile loop.
    pub scale_interval_ms: u64,
    /// Start a fresh election after a store failure instead of exiting.
    pub recreate_on_error: bool,
    pub retry_delay_ms: u64,
}

impl Default for ScalerSettings {
    fn default() -> Self {
        Self {
            functions: Vec::new(),
            scale_interval_ms: 1_000,
            recreate_on_error: true,
            retry_delay_ms: 1_000,
        }
    }
}

impl ScalerSettings {
    pub fn scale_interval(&self) -> Duration {
        Duration::from_millis(self.scale_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl SkiffConfig {
    /// Load defaults, then the TOML file, then environment overrides.
    ///
    /// An explicit `path` must exist. Without one, `./skiff.toml` is used
    /// when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                info!(path = %path.display(), "loading configuration");
                Self::from_toml_file(path)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!(path = DEFAULT_CONFIG_FILE, "loading configuration");
                Self::from_toml_file(DEFAULT_CONFIG_FILE)?
            }
            None => {
                info!("no configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(error::ReadSnafu { path })?;
        Self::from_toml_str(&contents, path)
    }

    fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).context(error::ParseSnafu {
            path: PathBuf::from(origin),
        })
    }

    /// Apply `SKIFF_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(name) = lookup("SKIFF_BUCKET") {
            self.bucket.name = name;
        }
        if let Some(ttl_ms) = parse_var(&lookup, "SKIFF_BUCKET_TTL_MS")? {
            self.bucket.ttl_ms = ttl_ms;
        }
        if let Some(ms) = parse_var(&lookup, "SKIFF_UPDATE_INTERVAL_MS")? {
            self.election.update_interval_ms = Some(ms);
        }
        if let Some(ms) = parse_var(&lookup, "SKIFF_POLL_INTERVAL_MS")? {
            self.election.poll_interval_ms = Some(ms);
        }
        if let Some(ms) = parse_var(&lookup, "SKIFF_OP_TIMEOUT_MS")? {
            self.election.op_timeout_ms = Some(ms);
        }
        if let Some(functions) = lookup("SKIFF_FUNCTIONS") {
            self.scaler.functions = functions
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(ms) = parse_var(&lookup, "SKIFF_SCALE_INTERVAL_MS")? {
            self.scaler.scale_interval_ms = ms;
        }
        if let Some(recreate) = parse_var(&lookup, "SKIFF_RECREATE_ON_ERROR")? {
            self.scaler.recreate_on_error = recreate;
        }
        if let Some(ms) = parse_var(&lookup, "SKIFF_RETRY_DELAY_MS")? {
            self.scaler.retry_delay_ms = ms;
        }
        Ok(())
    }

    /// Check the values that the election and scaler depend on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.name.is_empty() {
            return Err(invalid("bucket.name", "", "must not be empty"));
        }
        if self.bucket.ttl_ms == 0 {
            return Err(invalid("bucket.ttl_ms", "0", "a bucket without TTL never fails over"));
        }
        if self.scaler.scale_interval_ms == 0 {
            return Err(invalid("scaler.scale_interval_ms", "0", "must be positive"));
        }
        if self.scaler.functions.is_empty() {
            return Err(invalid("scaler.functions", "[]", "at least one function is required"));
        }
        for (i, function) in self.scaler.functions.iter().enumerate() {
            if function.is_empty() {
                return Err(invalid("scaler.functions", "", "function names must not be empty"));
            }
            if self.scaler.functions[..i].contains(function) {
                return Err(invalid("scaler.functions", function, "duplicate function"));
            }
        }

        // Same checks Election::new applies.
        let ttl = self.bucket_config().ttl;
        self.election_config("validate-leader")
            .validate(ttl)
            .map_err(|e| invalid("election", &format!("{:?}", self.election), &e.to_string()))
    }

    pub fn bucket_config(&self) -> BucketConfig {
        BucketConfig::new(self.bucket.name.clone(), Duration::from_millis(self.bucket.ttl_ms))
    }

    /// Election settings for `key` with a freshly generated candidate ID.
    pub fn election_config(&self, key: impl Into<String>) -> ElectionConfig {
        let mut config = ElectionConfig::for_ttl(key, Duration::from_millis(self.bucket.ttl_ms));
        if let Some(ms) = self.election.update_interval_ms {
            config.update_interval_ms = ms;
        }
        if let Some(ms) = self.election.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        config.op_timeout_ms = self.election.op_timeout_ms;
        config
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(key, &raw, "cannot be parsed")),
        None => Ok(None),
    }
}
