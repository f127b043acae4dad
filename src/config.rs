//! Process configuration (spec §6). Env-first with explicit defaults,
//! matching the teacher's `SharedConfig::from_env()` / `DynamicConfigManager`
//! split between env-loaded and file-backed runtime knobs.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::rpc_pool::QuorumOptions;

#[derive(Debug, Clone)]
pub struct RpcPoolEnvConfig {
    pub endpoints: Vec<String>,
    pub quorum: usize,
    pub max_fanout: Option<usize>,
    pub stagger_ms: u64,
    pub timeout_ms: u64,
}

impl RpcPoolEnvConfig {
    pub fn from_env() -> Self {
        let endpoints: Vec<String> = env::var("RPC_POOL_ENDPOINTS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let quorum = env_parse("RPC_POOL_QUORUM", 1usize);
        let max_fanout = env::var("RPC_POOL_MAX_FANOUT").ok().and_then(|s| s.parse().ok());
        let stagger_ms = env_parse("RPC_POOL_STAGGER_MS", 50u64);
        let timeout_ms = env_parse("RPC_POOL_TIMEOUT_MS", 10_000u64);
        Self {
            endpoints,
            quorum,
            max_fanout,
            stagger_ms,
            timeout_ms,
        }
    }

    pub fn to_quorum_options(&self) -> QuorumOptions {
        QuorumOptions {
            quorum: self.quorum,
            max_fanout: self.max_fanout,
            stagger_ms: self.stagger_ms,
            timeout_ms: self.timeout_ms,
            treat_already_processed_as_ok: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Process-wide kill switch (spec §6): `KILL_SWITCH=1` rejects all
/// non-simulated trades. Modeled as a shared atomic so it can be flipped
/// at runtime (e.g. by an operator control surface) without restarting.
#[derive(Clone)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    pub fn from_env() -> Self {
        let active = env::var("KILL_SWITCH").map(|v| v == "1").unwrap_or(false);
        Self(Arc::new(AtomicBool::new(active)))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::Relaxed);
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }
}

/// Process-wide key for decrypting pre-envelope legacy wallet ciphertexts
/// (spec §4.6 step 5). `LEGACY_WALLET_KEY` is 32 bytes, base64-encoded.
pub fn legacy_wallet_key_from_env() -> Option<[u8; 32]> {
    let raw = env::var("LEGACY_WALLET_KEY").ok()?;
    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD.decode(raw.trim()).ok()?;
    bytes.try_into().ok()
}
