//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Governed-asset scanner for SPL Governance realms.
#[derive(Parser, Debug)]
#[command(name = "realm-assets")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }

    /// Connection flags of the selected command, if it talks to a node.
    #[must_use]
    pub const fn connection(&self) -> Option<&ConnectionArgs> {
        match &self.command {
            Commands::Scan(args) => Some(&args.connection),
            Commands::Refresh(args) => Some(&args.scan.connection),
            Commands::TreasuryAddress(_) => None,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover every asset governed by a realm
    Scan(ScanArgs),

    /// Rediscover the assets of one governance
    Refresh(RefreshArgs),

    /// Print the native treasury address of a governance
    TreasuryAddress(TreasuryArgs),
}

/// Node connection overrides shared by the network commands.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// RPC endpoint URL (overrides --cluster)
    #[arg(long, value_name = "URL")]
    pub rpc_url: Option<String>,

    /// Cluster (mainnet, devnet, localnet)
    #[arg(long, value_name = "CLUSTER")]
    pub cluster: Option<String>,

    /// Commitment level (processed, confirmed, finalized)
    #[arg(long, value_name = "LEVEL")]
    pub commitment: Option<String>,

    /// Maximum requests per second
    #[arg(long, value_name = "N")]
    pub rps: Option<f64>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Skip the token price lookup
    #[arg(long)]
    pub no_prices: bool,
}

/// Arguments for the `scan` command.
#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Realm address
    #[arg(value_name = "REALM")]
    pub realm: String,

    /// Governance program id (defaults to the SPL Governance program)
    #[arg(long, value_name = "PROGRAM_ID")]
    pub program: Option<String>,

    /// Only print accounts of this kind (e.g. token, nft, sol)
    #[arg(long, value_name = "KIND")]
    pub kind: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Arguments for the `refresh` command.
#[derive(Args, Debug, Clone)]
pub struct RefreshArgs {
    #[command(flatten)]
    pub scan: ScanArgs,

    /// Governance to rediscover
    #[arg(long, value_name = "GOVERNANCE")]
    pub governance: String,
}

/// Arguments for the `treasury-address` command.
#[derive(Args, Debug, Clone)]
pub struct TreasuryArgs {
    /// Governance address
    #[arg(value_name = "GOVERNANCE")]
    pub governance: String,

    /// Governance program id (defaults to the SPL Governance program)
    #[arg(long, value_name = "PROGRAM_ID")]
    pub program: Option<String>,
}

/// Output format options.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table output.
    #[default]
    Human,
    /// JSON output for scripts and agents.
    Json,
}
