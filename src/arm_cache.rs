//! Arm Session Cache (C2): process-local, TTL-bounded store of unwrapped
//! DEKs per `(userId, walletId)`, spec §4.2.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

pub type WalletKey = (Uuid, Uuid);

struct ArmEntry {
    dek: Zeroizing<[u8; 32]>,
    expires_at: DateTime<Utc>,
    armed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmStatus {
    Armed,
    NotArmed,
}

/// Snapshot of an arm session's bookkeeping fields, without the key material.
#[derive(Debug, Clone)]
pub struct ArmSessionInfo {
    pub expires_at: DateTime<Utc>,
    pub armed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ArmSessionCache {
    entries: Arc<RwLock<HashMap<WalletKey, ArmEntry>>>,
}

impl ArmSessionCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Spawns the 30s sweep task described in spec §4.2/§5. Returns a handle
    /// the caller can abort on shutdown.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                cache.sweep_expired();
            }
        })
    }

    fn sweep_expired(&self) {
        let now = Utc::now();
        let mut guard = self.entries.write();
        let before = guard.len();
        guard.retain(|_, entry| entry.expires_at > now);
        let swept = before - guard.len();
        if swept > 0 {
            debug!(swept, "arm cache sweep removed expired sessions");
        }
    }

    /// `arm(userId, walletId, dek, ttl)`. Replaces any prior entry.
    pub fn arm(&self, user_id: Uuid, wallet_id: Uuid, dek: [u8; 32], ttl: Duration) {
        let now = Utc::now();
        let entry = ArmEntry {
            dek: Zeroizing::new(dek),
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            armed_at: now,
        };
        self.entries.write().insert((user_id, wallet_id), entry);
        info!(%user_id, %wallet_id, "wallet armed");
    }

    /// `extend(ttl)`: pushes `expiresAt` forward, keeps `armedAt`.
    pub fn extend(&self, user_id: Uuid, wallet_id: Uuid, ttl: Duration) -> bool {
        let mut guard = self.entries.write();
        if let Some(entry) = guard.get_mut(&(user_id, wallet_id)) {
            entry.expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
            true
        } else {
            false
        }
    }

    /// Resets `armedAt` without touching `expiresAt` (used after re-auth grace).
    pub fn update_armed_at(&self, user_id: Uuid, wallet_id: Uuid) -> bool {
        let mut guard = self.entries.write();
        if let Some(entry) = guard.get_mut(&(user_id, wallet_id)) {
            entry.armed_at = Utc::now();
            true
        } else {
            false
        }
    }

    /// Zeroises and removes the entry.
    pub fn disarm(&self, user_id: Uuid, wallet_id: Uuid) {
        self.entries.write().remove(&(user_id, wallet_id));
    }

    /// Returns a copy of the DEK if armed and unexpired, purging lazily on expiry.
    pub fn get_dek(&self, user_id: Uuid, wallet_id: Uuid) -> Option<Zeroizing<[u8; 32]>> {
        let key = (user_id, wallet_id);
        let mut guard = self.entries.write();
        match guard.get(&key) {
            Some(entry) if entry.expires_at > Utc::now() => Some(entry.dek.clone()),
            Some(_) => {
                guard.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn get_session(&self, user_id: Uuid, wallet_id: Uuid) -> Option<ArmSessionInfo> {
        let key = (user_id, wallet_id);
        let mut guard = self.entries.write();
        match guard.get(&key) {
            Some(entry) if entry.expires_at > Utc::now() => Some(ArmSessionInfo {
                expires_at: entry.expires_at,
                armed_at: entry.armed_at,
            }),
            Some(_) => {
                guard.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn status(&self, user_id: Uuid, wallet_id: Uuid) -> ArmStatus {
        if self.get_session(user_id, wallet_id).is_some() {
            ArmStatus::Armed
        } else {
            ArmStatus::NotArmed
        }
    }

    /// Best-effort zeroise of every session, for signal handling (spec §5).
    pub fn disarm_all(&self) {
        let mut guard = self.entries.write();
        let n = guard.len();
        guard.clear();
        if n > 0 {
            info!(n, "zeroised all arm sessions on shutdown");
        }
    }
}

impl Default for ArmSessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn arm_ttl_expiry() {
        let cache = ArmSessionCache::new();
        let user = Uuid::new_v4();
        let wallet = Uuid::new_v4();
        cache.arm(user, wallet, [7u8; 32], Duration::from_millis(50));
        assert!(cache.get_dek(user, wallet).is_some());
        sleep(Duration::from_millis(80));
        assert!(cache.get_dek(user, wallet).is_none());
        assert_eq!(cache.status(user, wallet), ArmStatus::NotArmed);
    }

    #[test]
    fn disarm_removes_immediately() {
        let cache = ArmSessionCache::new();
        let user = Uuid::new_v4();
        let wallet = Uuid::new_v4();
        cache.arm(user, wallet, [1u8; 32], Duration::from_secs(60));
        cache.disarm(user, wallet);
        assert!(cache.get_dek(user, wallet).is_none());
    }

    #[test]
    fn extend_pushes_expiry_without_resetting_armed_at() {
        let cache = ArmSessionCache::new();
        let user = Uuid::new_v4();
        let wallet = Uuid::new_v4();
        cache.arm(user, wallet, [1u8; 32], Duration::from_millis(50));
        let armed_at_before = cache.get_session(user, wallet).unwrap().armed_at;
        cache.extend(user, wallet, Duration::from_secs(60));
        sleep(Duration::from_millis(80));
        let session = cache.get_session(user, wallet).unwrap();
        assert_eq!(session.armed_at, armed_at_before);
    }
}
