//! Core data models, RPC plumbing, and the discovery pipeline.

pub mod aggregator;
pub mod classifier;
pub mod clock;
pub mod http;
pub mod layout;
pub mod logging;
pub mod models;
pub mod pricing;
pub mod pubkey;
pub mod rate_limiter;
pub mod realm;
pub mod resolver;
pub mod rpc;
pub mod store;

pub use aggregator::{AggregationReport, AggregationStep, AssetAggregator, StepFailure};
pub use classifier::{ClassifierConfig, Markers, TokenClass};
pub use clock::{Clock, TokioClock};
pub use http::{HttpTransport, RpcEndpoint};
pub use layout::{MintState, StakeAccountState, StakeState, TokenAccountState};
pub use models::{
    AccountKind, Governance, GovernanceContext, GovernanceKind, GovernedAccount, MintInfo,
    RealmInfo,
};
pub use pricing::{PriceService, TokenPrice};
pub use pubkey::{Pubkey, native_treasury_address};
pub use rate_limiter::{BackoffPolicy, RateLimiter};
pub use realm::{load_governances, load_realm};
pub use resolver::{BatchConfig, BatchResolver, FetchWarning, Partial};
pub use rpc::{Commitment, RpcClient, RpcTransport};
pub use store::{AssetSnapshot, AssetStore};
