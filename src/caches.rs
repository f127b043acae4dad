//! Process-wide shared caches used by the Trade Executor (C6): per-mint
//! cool-off, the idempotency gate, and the decimals/price lookup caches
//! (spec §4.6, §5). All are O(1) and bounded by time-based sweeps, backed
//! by `parking_lot::RwLock` for hot, short-hold access (spec §9 Design
//! Notes), the same shape as the teacher's `bot_coordinator.rs` registries
//! and `token_decimal_cache.rs`'s `Arc<RwLock<HashMap>>`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::model::Unit;

/// Per-mint back-off after a failed swap (spec §4.6 step 4, §8 "Cool-off").
pub struct CoolOffMap {
    entries: RwLock<HashMap<String, Instant>>,
    duration: Duration,
}

impl CoolOffMap {
    pub fn new(duration: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            duration,
        }
    }

    pub fn trigger(&self, mint: &str) {
        self.entries.write().insert(mint.to_string(), Instant::now() + self.duration);
    }

    pub fn is_active(&self, mint: &str) -> bool {
        match self.entries.read().get(mint) {
            Some(until) => Instant::now() < *until,
            None => false,
        }
    }

    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, until| *until > now);
    }
}

#[derive(Clone)]
struct IdempotencyEntry {
    window_expires_at: Instant,
    cached_tx_hash: Option<(String, Instant)>,
}

/// Time-bucketed deduplication of trade attempts (spec §4.6 step 3, §8).
pub struct IdempotencyGate {
    entries: RwLock<HashMap<String, IdempotencyEntry>>,
}

pub enum IdempotencyCheck {
    /// Key not seen before, or its window already elapsed: proceed.
    Fresh,
    /// Key within its window and a cached result exists: return it.
    CachedResult(String),
    /// Key within its window but no cached result yet: suppress (return null).
    Suppressed,
}

impl IdempotencyGate {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Checks and, if fresh, opens a new window of `gate_ttl`.
    pub fn check_and_open(&self, key: &str, gate_ttl: Duration) -> IdempotencyCheck {
        let now = Instant::now();
        let mut guard = self.entries.write();
        match guard.get(key) {
            Some(entry) if entry.window_expires_at > now => {
                if let Some((hash, _)) = &entry.cached_tx_hash {
                    IdempotencyCheck::CachedResult(hash.clone())
                } else {
                    IdempotencyCheck::Suppressed
                }
            }
            _ => {
                guard.insert(
                    key.to_string(),
                    IdempotencyEntry {
                        window_expires_at: now + gate_ttl,
                        cached_tx_hash: None,
                    },
                );
                IdempotencyCheck::Fresh
            }
        }
    }

    /// Caches a live result for `result_ttl` (spec: default 60s).
    pub fn cache_result(&self, key: &str, tx_hash: String, result_ttl: Duration) {
        let now = Instant::now();
        let mut guard = self.entries.write();
        let entry = guard.entry(key.to_string()).or_insert(IdempotencyEntry {
            window_expires_at: now + result_ttl,
            cached_tx_hash: None,
        });
        entry.cached_tx_hash = Some((tx_hash, now + result_ttl));
        if entry.window_expires_at < now + result_ttl {
            entry.window_expires_at = now + result_ttl;
        }
    }

    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, e| {
            let result_live = e.cached_tx_hash.as_ref().is_some_and(|(_, exp)| *exp > now);
            e.window_expires_at > now || result_live
        });
    }
}

impl Default for IdempotencyGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Token decimals source (spec §4.6 step 8). Grounded on the teacher's
/// `token_decimal_cache.rs`, which decodes this from the SPL mint account.
#[async_trait]
pub trait DecimalsSource: Send + Sync {
    async fn get_decimals(&self, mint: &str) -> Result<u8, String>;
}

pub struct DecimalsCache {
    inner: RwLock<HashMap<String, (u8, Instant)>>,
    ttl: Duration,
    source: std::sync::Arc<dyn DecimalsSource>,
}

impl DecimalsCache {
    pub fn new(source: std::sync::Arc<dyn DecimalsSource>) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(3600),
            source,
        }
    }

    pub async fn get(&self, mint: &str) -> Result<u8, String> {
        if let Some((decimals, fetched_at)) = self.inner.read().get(mint).copied() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(decimals);
            }
        }
        let decimals = self.source.get_decimals(mint).await?;
        self.inner.write().insert(mint.to_string(), (decimals, Instant::now()));
        Ok(decimals)
    }

    pub fn unit_for(mint: &str) -> Unit {
        Unit::from_input_mint(mint)
    }
}

/// USD price source (spec §4.6 step 8), cached 30s per user+mint.
#[async_trait]
pub trait UsdPriceSource: Send + Sync {
    async fn get_usd_price(&self, mint: &str) -> Result<f64, String>;
}

pub struct PriceCache {
    inner: RwLock<HashMap<(uuid::Uuid, String), (f64, Instant)>>,
    ttl: Duration,
    source: std::sync::Arc<dyn UsdPriceSource>,
}

impl PriceCache {
    pub fn new(source: std::sync::Arc<dyn UsdPriceSource>) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(30),
            source,
        }
    }

    pub async fn get(&self, user_id: uuid::Uuid, mint: &str) -> Result<f64, String> {
        let key = (user_id, mint.to_string());
        if let Some((price, fetched_at)) = self.inner.read().get(&key).copied() {
            if fetched_at.elapsed() < self.ttl {
                return Ok(price);
            }
        }
        let price = self.source.get_usd_price(mint).await?;
        self.inner.write().insert(key, (price, Instant::now()));
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooloff_triggers_and_expires() {
        let map = CoolOffMap::new(Duration::from_millis(30));
        assert!(!map.is_active("MINT"));
        map.trigger("MINT");
        assert!(map.is_active("MINT"));
        std::thread::sleep(Duration::from_millis(50));
        assert!(!map.is_active("MINT"));
    }

    #[test]
    fn idempotency_suppresses_within_window_then_returns_cached() {
        let gate = IdempotencyGate::new();
        let ttl = Duration::from_secs(30);
        assert!(matches!(gate.check_and_open("k1", ttl), IdempotencyCheck::Fresh));
        assert!(matches!(gate.check_and_open("k1", ttl), IdempotencyCheck::Suppressed));
        gate.cache_result("k1", "SIG1".into(), Duration::from_secs(60));
        match gate.check_and_open("k1", ttl) {
            IdempotencyCheck::CachedResult(sig) => assert_eq!(sig, "SIG1"),
            _ => panic!("expected cached result"),
        }
    }
}
