//! Configuration storage.

pub mod config;
pub mod paths;

pub use config::{
    Cluster, Config, ConfigSource, ConfigSources, ResolvedConfig, ENV_CLUSTER, ENV_CONFIG,
    ENV_DEVNET_RPC, ENV_MAINNET_RPC, ENV_RPC_URL, ENV_RPS,
};
pub use paths::AppPaths;
