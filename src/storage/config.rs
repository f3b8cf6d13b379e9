//! Configuration file loading and resolution.
//!
//! Loads configuration from `config.toml` in the platform config directory
//! (`~/.config/realm-assets/config.toml` on Linux).
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `REALM_ASSETS_CONFIG`: Override config file path
//! - `REALM_ASSETS_RPC_URL`: RPC endpoint for any cluster
//! - `MAINNET_RPC` / `DEVNET_RPC`: RPC endpoint for that cluster only
//! - `REALM_ASSETS_CLUSTER`: Cluster (mainnet, devnet, localnet)
//! - `REALM_ASSETS_RPS`: Requests per second

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::ConnectionArgs;
use crate::core::classifier::{ClassifierConfig, DEFAULT_NATIVE_SOL_MINT, DEFAULT_NFT_MARKER_MINT, Markers};
use crate::core::pricing::DEFAULT_PRICE_ENDPOINT;
use crate::core::pubkey::Pubkey;
use crate::core::rate_limiter::{DEFAULT_REQUESTS_PER_SECOND, MIN_REQUESTS_PER_SECOND};
use crate::core::resolver::{BatchConfig, DEFAULT_ACCOUNT_BATCH_SIZE, DEFAULT_TOKEN_BATCH_SIZE};
use crate::core::rpc::Commitment;
use crate::error::{AssetError, Result};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "REALM_ASSETS_CONFIG";
/// Environment variable for the RPC endpoint.
pub const ENV_RPC_URL: &str = "REALM_ASSETS_RPC_URL";
/// Mainnet-only RPC endpoint.
pub const ENV_MAINNET_RPC: &str = "MAINNET_RPC";
/// Devnet-only RPC endpoint.
pub const ENV_DEVNET_RPC: &str = "DEVNET_RPC";
/// Environment variable for the cluster.
pub const ENV_CLUSTER: &str = "REALM_ASSETS_CLUSTER";
/// Environment variable for requests per second.
pub const ENV_RPS: &str = "REALM_ASSETS_RPS";

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_CHUNK_DELAY_MS: u64 = 200;

// =============================================================================
// Cluster
// =============================================================================

/// Solana cluster with a well-known public endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cluster {
    #[default]
    Mainnet,
    Devnet,
    Localnet,
}

impl Cluster {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" | "mainnet-beta" => Some(Self::Mainnet),
            "devnet" => Some(Self::Devnet),
            "localnet" | "localhost" => Some(Self::Localnet),
            _ => None,
        }
    }

    #[must_use]
    pub const fn default_endpoint(self) -> &'static str {
        match self {
            Self::Mainnet => "https://api.dao.solana.com/",
            Self::Devnet => "https://api.devnet.solana.com",
            Self::Localnet => "http://127.0.0.1:8899",
        }
    }

    /// Cluster-specific endpoint override variable, if any.
    #[must_use]
    pub const fn endpoint_env(self) -> Option<&'static str> {
        match self {
            Self::Mainnet => Some(ENV_MAINNET_RPC),
            Self::Devnet => Some(ENV_DEVNET_RPC),
            Self::Localnet => None,
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Devnet => write!(f, "devnet"),
            Self::Localnet => write!(f, "localnet"),
        }
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub cluster: Cluster,
    pub endpoint: String,
    pub commitment: Commitment,
    pub requests_per_second: f64,
    pub timeout: Duration,
    pub batch: BatchConfig,
    pub classifier: ClassifierConfig,
    /// Price endpoint, or `None` when price lookups are off.
    pub price_endpoint: Option<String>,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub cluster: ConfigSource,
    pub endpoint: ConfigSource,
    pub commitment: ConfigSource,
    pub requests_per_second: ConfigSource,
    pub timeout: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI flags, environment variables, and
    /// the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but is invalid, or any
    /// resolved value is invalid.
    pub fn resolve(args: &ConnectionArgs) -> Result<Self> {
        let config = Self::load_config()?;
        Self::from_config(&config, args)
    }

    /// Resolve against an already loaded config file.
    ///
    /// # Errors
    ///
    /// Returns an error if any resolved value is invalid.
    pub fn from_config(config: &Config, args: &ConnectionArgs) -> Result<Self> {
        config.validate()?;
        let mut sources = ConfigSources::default();

        let cluster = Self::resolve_cluster(args, config, &mut sources.cluster)?;
        let endpoint = Self::resolve_endpoint(args, config, cluster, &mut sources.endpoint);
        let commitment = Self::resolve_commitment(args, config, &mut sources.commitment)?;
        let requests_per_second =
            Self::resolve_requests_per_second(args, config, &mut sources.requests_per_second)?;
        let timeout = Self::resolve_timeout(args, config, &mut sources.timeout)?;

        let price_endpoint = (config.prices.enabled && !args.no_prices).then(|| {
            config
                .prices
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_PRICE_ENDPOINT.to_string())
        });

        tracing::debug!(
            cluster = %cluster,
            cluster_source = %sources.cluster,
            endpoint_source = %sources.endpoint,
            rps = requests_per_second,
            "Resolved configuration"
        );

        Ok(Self {
            cluster,
            endpoint,
            commitment,
            requests_per_second,
            timeout,
            batch: config.batch.to_batch_config(),
            classifier: config.classifier_config()?,
            price_endpoint,
            sources,
        })
    }

    /// Load config file, respecting the `REALM_ASSETS_CONFIG` override.
    fn load_config() -> Result<Config> {
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            Config::load_from(Path::new(&path))
        } else {
            Config::load()
        }
    }

    fn resolve_cluster(args: &ConnectionArgs, config: &Config, source: &mut ConfigSource) -> Result<Cluster> {
        // 1. CLI flag
        if let Some(ref name) = args.cluster {
            *source = ConfigSource::Cli;
            return Self::parse_cluster("--cluster", name);
        }

        // 2. Environment variable
        if let Ok(name) = std::env::var(ENV_CLUSTER) {
            *source = ConfigSource::Env;
            return Self::parse_cluster(ENV_CLUSTER, &name);
        }

        // 3. Config file
        if let Some(cluster) = config.rpc.cluster {
            *source = ConfigSource::ConfigFile;
            return Ok(cluster);
        }

        *source = ConfigSource::Default;
        Ok(Cluster::default())
    }

    fn parse_cluster(key: &str, value: &str) -> Result<Cluster> {
        Cluster::from_arg(value).ok_or_else(|| AssetError::ConfigInvalid {
            key: key.to_string(),
            value: value.to_string(),
            message: "expected mainnet, devnet, or localnet".to_string(),
        })
    }

    fn resolve_endpoint(
        args: &ConnectionArgs,
        config: &Config,
        cluster: Cluster,
        source: &mut ConfigSource,
    ) -> String {
        // 1. CLI flag
        if let Some(ref url) = args.rpc_url {
            *source = ConfigSource::Cli;
            return url.clone();
        }

        // 2. Environment variables, generic first
        let from_env = std::env::var(ENV_RPC_URL)
            .ok()
            .or_else(|| cluster.endpoint_env().and_then(|var| std::env::var(var).ok()))
            .filter(|url| !url.trim().is_empty());
        if let Some(url) = from_env {
            *source = ConfigSource::Env;
            return url;
        }

        // 3. Config file
        if let Some(ref url) = config.rpc.endpoint {
            *source = ConfigSource::ConfigFile;
            return url.clone();
        }

        *source = ConfigSource::Default;
        cluster.default_endpoint().to_string()
    }

    fn resolve_commitment(args: &ConnectionArgs, config: &Config, source: &mut ConfigSource) -> Result<Commitment> {
        let (value, from) = match (&args.commitment, &config.rpc.commitment) {
            (Some(value), _) => (value, ConfigSource::Cli),
            (None, Some(value)) => (value, ConfigSource::ConfigFile),
            (None, None) => {
                *source = ConfigSource::Default;
                return Ok(Commitment::default());
            }
        };
        *source = from;
        Commitment::from_arg(value).ok_or_else(|| AssetError::ConfigInvalid {
            key: "commitment".to_string(),
            value: value.clone(),
            message: "expected processed, confirmed, or finalized".to_string(),
        })
    }

    fn resolve_requests_per_second(
        args: &ConnectionArgs,
        config: &Config,
        source: &mut ConfigSource,
    ) -> Result<f64> {
        let rps = if let Some(rps) = args.rps {
            *source = ConfigSource::Cli;
            rps
        } else if let Ok(value) = std::env::var(ENV_RPS) {
            *source = ConfigSource::Env;
            value.trim().parse::<f64>().map_err(|_| AssetError::ConfigInvalid {
                key: ENV_RPS.to_string(),
                value: value.clone(),
                message: "expected a number".to_string(),
            })?
        } else if let Some(rps) = config.rpc.requests_per_second {
            *source = ConfigSource::ConfigFile;
            rps
        } else {
            *source = ConfigSource::Default;
            DEFAULT_REQUESTS_PER_SECOND
        };

        if !rps.is_finite() || rps < MIN_REQUESTS_PER_SECOND {
            return Err(AssetError::ConfigInvalid {
                key: "requests_per_second".to_string(),
                value: rps.to_string(),
                message: format!("must be a number of at least {MIN_REQUESTS_PER_SECOND}"),
            });
        }
        Ok(rps)
    }

    fn resolve_timeout(args: &ConnectionArgs, config: &Config, source: &mut ConfigSource) -> Result<Duration> {
        let seconds = if let Some(seconds) = args.timeout {
            *source = ConfigSource::Cli;
            seconds
        } else if let Some(seconds) = config.rpc.timeout_seconds {
            *source = ConfigSource::ConfigFile;
            seconds
        } else {
            *source = ConfigSource::Default;
            DEFAULT_TIMEOUT_SECONDS
        };
        validate_timeout(seconds)?;
        Ok(Duration::from_secs(seconds))
    }
}

fn validate_timeout(seconds: u64) -> Result<()> {
    if seconds == 0 || seconds > 300 {
        return Err(AssetError::ConfigInvalid {
            key: "timeout_seconds".to_string(),
            value: seconds.to_string(),
            message: "must be between 1 and 300 seconds".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Config File
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcConfig,
    pub batch: BatchFileConfig,
    pub filters: FiltersConfig,
    pub markers: MarkersConfig,
    pub prices: PricesConfig,
}

/// Node connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub cluster: Option<Cluster>,
    /// Custom RPC endpoint (overrides the cluster default).
    pub endpoint: Option<String>,
    /// processed, confirmed, or finalized.
    pub commitment: Option<String>,
    pub requests_per_second: Option<f64>,
    pub timeout_seconds: Option<u64>,
}

/// Chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchFileConfig {
    /// Owners per token-account query chunk.
    pub token_batch_size: usize,
    /// Addresses per account query chunk.
    pub account_batch_size: usize,
    /// Pause between chunks in milliseconds.
    pub chunk_delay_ms: u64,
}

impl Default for BatchFileConfig {
    fn default() -> Self {
        Self {
            token_batch_size: DEFAULT_TOKEN_BATCH_SIZE,
            account_batch_size: DEFAULT_ACCOUNT_BATCH_SIZE,
            chunk_delay_ms: DEFAULT_CHUNK_DELAY_MS,
        }
    }
}

impl BatchFileConfig {
    #[must_use]
    pub const fn to_batch_config(&self) -> BatchConfig {
        BatchConfig {
            token_batch_size: self.token_batch_size,
            account_batch_size: self.account_batch_size,
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
        }
    }
}

/// Addresses to hide or surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    pub hidden_accounts: Vec<String>,
    pub hidden_governances: Vec<String>,
    /// Owners whose token accounts are listed without a governance.
    pub auxiliary_owners: Vec<String>,
}

/// Marker mints used by token classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkersConfig {
    pub nft_mint: String,
    pub native_sol_mint: String,
}

impl Default for MarkersConfig {
    fn default() -> Self {
        Self {
            nft_mint: DEFAULT_NFT_MARKER_MINT.to_string(),
            native_sol_mint: DEFAULT_NATIVE_SOL_MINT.to_string(),
        }
    }
}

/// Token price lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricesConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
        }
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AssetError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| AssetError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Validate configuration values.
    ///
    /// Checks that batch sizes are non-zero, the timeout is within 1-300
    /// seconds, and every address parses.
    pub fn validate(&self) -> Result<()> {
        if self.batch.token_batch_size == 0 || self.batch.account_batch_size == 0 {
            return Err(AssetError::Config("Batch sizes must be at least 1".to_string()));
        }
        if let Some(seconds) = self.rpc.timeout_seconds {
            validate_timeout(seconds)?;
        }
        if let Some(ref url) = self.rpc.endpoint {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AssetError::ConfigInvalid {
                    key: "rpc.endpoint".to_string(),
                    value: url.clone(),
                    message: "must be an http(s) URL".to_string(),
                });
            }
        }
        self.classifier_config().map(|_| ())
    }

    /// Classification settings with every address parsed.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::ConfigInvalid`] naming the first bad address.
    pub fn classifier_config(&self) -> Result<ClassifierConfig> {
        let markers = Markers {
            nft_mint: parse_key("markers.nft_mint", &self.markers.nft_mint)?,
            native_sol_mint: parse_key("markers.native_sol_mint", &self.markers.native_sol_mint)?,
        };
        Ok(ClassifierConfig {
            markers,
            hidden_accounts: parse_keys("filters.hidden_accounts", &self.filters.hidden_accounts)?,
            hidden_governances: parse_keys("filters.hidden_governances", &self.filters.hidden_governances)?,
            auxiliary_owners: parse_keys("filters.auxiliary_owners", &self.filters.auxiliary_owners)?,
        })
    }
}

fn parse_key(key: &str, value: &str) -> Result<Pubkey> {
    value.trim().parse().map_err(|e: AssetError| AssetError::ConfigInvalid {
        key: key.to_string(),
        value: value.to_string(),
        message: e.to_string(),
    })
}

fn parse_keys(key: &str, values: &[String]) -> Result<HashSet<Pubkey>> {
    values.iter().map(|value| parse_key(key, value)).collect()
}
