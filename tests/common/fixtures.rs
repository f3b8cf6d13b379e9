//! Realm fixtures over the in-memory cluster.
#![allow(dead_code)]

use std::sync::Arc;

use realm_assets::core::aggregator::AssetAggregator;
use realm_assets::core::classifier::ClassifierConfig;
use realm_assets::core::models::{Governance, GovernanceContext, GovernanceKind, RealmInfo};
use realm_assets::core::pubkey::{Pubkey, programs};
use realm_assets::core::rate_limiter::RateLimiter;
use realm_assets::core::resolver::{BatchConfig, BatchResolver};
use realm_assets::core::rpc::{Commitment, RpcClient};
use realm_assets::core::store::AssetStore;
use realm_assets::test_utils::{ManualClock, MockCluster, make_test_pubkey};

/// Governance account tag (V2) used for every fixture governance.
pub const GOVERNANCE_V2_TAG: u8 = 18;

/// A realm with `n` governances stored in a [`MockCluster`].
pub struct RealmFixture {
    pub cluster: Arc<MockCluster>,
    pub clock: Arc<ManualClock>,
    pub realm: RealmInfo,
    pub governances: Vec<Governance>,
    pub contexts: Vec<GovernanceContext>,
}

impl RealmFixture {
    pub fn new(governance_count: u32) -> Self {
        let cluster = Arc::new(MockCluster::new());
        let clock = Arc::new(ManualClock::new());
        let program: Pubkey = programs::GOVERNANCE_PROGRAM.parse().unwrap();

        let realm = RealmInfo {
            address: make_test_pubkey(1),
            program_id: program,
            community_mint: make_test_pubkey(2),
            council_mint: None,
        };
        cluster.insert_realm(&program, &realm.address, &realm.community_mint, None);
        cluster.insert_mint(&realm.community_mint, None, 1_000_000_000, 6);

        let governances: Vec<Governance> = (0..governance_count)
            .map(|i| Governance {
                address: make_test_pubkey(100 + i),
                realm: realm.address,
                governed_account: make_test_pubkey(200 + i),
                kind: GovernanceKind::Account,
            })
            .collect();
        for g in &governances {
            cluster.insert_governance(&program, &g.address, GOVERNANCE_V2_TAG, &realm.address, &g.governed_account);
        }
        let contexts = governances
            .iter()
            .map(|g| GovernanceContext::derive(g.clone(), &program).unwrap())
            .collect();

        Self {
            cluster,
            clock,
            realm,
            governances,
            contexts,
        }
    }

    /// RPC client over the mock cluster with a fast limiter.
    pub fn client(&self) -> Arc<RpcClient> {
        let limiter = Arc::new(RateLimiter::new(1_000.0, self.clock.clone()));
        Arc::new(RpcClient::new(self.cluster.clone(), limiter, Commitment::Confirmed))
    }

    pub fn resolver(&self, config: BatchConfig) -> Arc<BatchResolver> {
        Arc::new(BatchResolver::new(self.client(), self.clock.clone(), config).unwrap())
    }

    pub fn aggregator(&self) -> AssetAggregator {
        self.aggregator_with(ClassifierConfig::with_defaults().unwrap())
    }

    pub fn aggregator_with(&self, config: ClassifierConfig) -> AssetAggregator {
        let store = Arc::new(AssetStore::new(config.hidden_governances.clone()));
        AssetAggregator::new(self.resolver(BatchConfig::default()), store, config)
    }

    /// Native treasury of governance `i`.
    pub fn treasury(&self, i: usize) -> Pubkey {
        self.contexts[i].native_treasury
    }

    pub fn governance(&self, i: usize) -> Pubkey {
        self.governances[i].address
    }
}
