//! The process-wide `Engine` value (spec §9 Design Notes): composes every
//! capability and cache C1-C5 need, constructed once at startup and shared
//! by reference/clone with the Trade Executor, Strategy Runtime, Always-On
//! Monitors, and Supervisor. Each cache owns its own sweep task rather than
//! one central janitor, matching the teacher's per-registry sweep style
//! (`bot_coordinator.rs`, `error_recovery_manager.rs`).

use std::sync::Arc;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::alerts::AlertSink;
use crate::arm_cache::ArmSessionCache;
use crate::caches::{CoolOffMap, DecimalsCache, DecimalsSource, IdempotencyGate, PriceCache, UsdPriceSource};
use crate::config::KillSwitch;
use crate::repository::Repository;
use crate::rpc_pool::{QuorumOptions, RpcPool};
use crate::safety::SafetyEngine;
use crate::swap_adapter::SwapAdapter;

/// Cool-off duration for a mint after a failed swap (spec §4.6 step 4, §8).
pub const COOL_OFF: Duration = Duration::from_secs(7);
/// Idempotency de-dup window (spec §4.6 step 3, §8 "30s time-bucket hash").
pub const IDEMPOTENCY_WINDOW: Duration = Duration::from_secs(30);
/// How long a successfully executed trade's signature stays retrievable.
pub const IDEMPOTENCY_RESULT_TTL: Duration = Duration::from_secs(60);

pub struct Engine {
    pub arm_cache: ArmSessionCache,
    pub kill_switch: KillSwitch,
    pub repo: Arc<dyn Repository>,
    pub swap_adapter: Arc<SwapAdapter>,
    pub safety_engine: Arc<SafetyEngine>,
    pub rpc_pool: Option<Arc<RpcPool>>,
    pub quorum_opts: QuorumOptions,
    pub alerts: Arc<dyn AlertSink>,
    pub cool_off: CoolOffMap,
    pub idempotency: IdempotencyGate,
    pub decimals: DecimalsCache,
    pub price: PriceCache,
    pub legacy_key: Option<Zeroizing<[u8; 32]>>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn Repository>,
        swap_adapter: Arc<SwapAdapter>,
        safety_engine: Arc<SafetyEngine>,
        rpc_pool: Option<Arc<RpcPool>>,
        quorum_opts: QuorumOptions,
        alerts: Arc<dyn AlertSink>,
        decimals_source: Arc<dyn DecimalsSource>,
        price_source: Arc<dyn UsdPriceSource>,
    ) -> Self {
        Self {
            arm_cache: ArmSessionCache::new(),
            kill_switch: KillSwitch::default(),
            repo,
            swap_adapter,
            safety_engine,
            rpc_pool,
            quorum_opts,
            alerts,
            cool_off: CoolOffMap::new(COOL_OFF),
            idempotency: IdempotencyGate::new(),
            decimals: DecimalsCache::new(decimals_source),
            price: PriceCache::new(price_source),
            legacy_key: crate::config::legacy_wallet_key_from_env().map(Zeroizing::new),
        }
    }

    /// Spawns each cache's own sweep task (spec §5). Returns the join
    /// handles so a caller can abort them on shutdown alongside the arm
    /// cache sweeper.
    pub fn spawn_background_tasks(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = vec![self.arm_cache.spawn_sweeper()];

        let engine = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                engine.cool_off.sweep();
                engine.idempotency.sweep();
            }
        }));

        handles
    }
}
