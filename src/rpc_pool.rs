//! RPC Pool (C3): round-robin and quorum-fanout broadcast of signed
//! transactions to N endpoints, spec §4.3/§6/§8.
//!
//! Grounded on the teacher's `jito_bundle_manager.rs` (per-endpoint
//! success/error counters) and the rate-gated submission loop in
//! `jito_submitter.rs`, generalized from a single Jito endpoint to an
//! ordered list of RPC endpoints.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Low-level per-endpoint transport. Production implementations wrap a
/// JSON-RPC HTTP client (injected adapter, spec §1/§9); the core only
/// depends on this trait.
#[async_trait]
pub trait RawTxSender: Send + Sync {
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, String>;
}

struct Endpoint {
    label: String,
    sender: Arc<dyn RawTxSender>,
    successes: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct QuorumOptions {
    pub quorum: usize,
    pub max_fanout: Option<usize>,
    pub stagger_ms: u64,
    pub timeout_ms: u64,
    pub treat_already_processed_as_ok: bool,
}

impl Default for QuorumOptions {
    fn default() -> Self {
        Self {
            quorum: 1,
            max_fanout: None,
            stagger_ms: 50,
            timeout_ms: 10_000,
            treat_already_processed_as_ok: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointCounters {
    pub label: String,
    pub successes: u64,
    pub errors: u64,
}

pub struct RpcPool {
    endpoints: Vec<Endpoint>,
    cursor: AtomicUsize,
}

fn is_already_processed(msg: &str) -> bool {
    let m = msg.to_ascii_lowercase();
    m.contains("already processed")
        || m.contains("already known")
        || m.contains("transaction signature already")
        || m.contains("in block")
}

impl RpcPool {
    pub fn new(endpoints: Vec<(String, Arc<dyn RawTxSender>)>) -> Self {
        Self {
            endpoints: endpoints
                .into_iter()
                .map(|(label, sender)| Endpoint {
                    label,
                    sender,
                    successes: AtomicU64::new(0),
                    errors: AtomicU64::new(0),
                })
                .collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Round-robin cursor; `None` if the pool is empty.
    pub fn get(&self) -> Option<usize> {
        if self.endpoints.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        Some(idx)
    }

    pub fn counters(&self) -> Vec<EndpointCounters> {
        self.endpoints
            .iter()
            .map(|e| EndpointCounters {
                label: e.label.clone(),
                successes: e.successes.load(Ordering::Relaxed),
                errors: e.errors.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Quorum-fanout broadcast (spec §4.3, §8 scenario 2).
    pub async fn send_raw_transaction_quorum(&self, raw: &[u8], opts: &QuorumOptions) -> Result<String, EngineError> {
        if self.endpoints.is_empty() {
            return Err(EngineError::SwapFailed {
                class: crate::error::SwapFailureClass::Net,
                detail: "rpc pool has no endpoints".into(),
            });
        }

        let start_idx = self.get().unwrap_or(0);
        let fanout = opts.max_fanout.unwrap_or(self.endpoints.len()).min(self.endpoints.len());
        let needed = opts.quorum.min(fanout).max(1);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(usize, Result<String, String>)>();

        let mut handles = Vec::with_capacity(fanout);
        for i in 0..fanout {
            let idx = (start_idx + i) % self.endpoints.len();
            let delay = Duration::from_millis(i as u64 * opts.stagger_ms + fastrand::u64(0..=5));
            let tx = tx.clone();
            let sender = self.endpoints[idx].sender.clone();
            let raw = raw.to_vec();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let result = sender.send_raw_transaction(&raw).await;
                let _ = tx.send((idx, result));
            }));
        }
        drop(tx);

        let deadline = Instant::now() + Duration::from_millis(opts.timeout_ms);
        let mut acks: Vec<String> = Vec::new();
        let mut first_err: Option<String> = None;
        let mut remaining = fanout;

        loop {
            if acks.len() >= needed {
                break;
            }
            let possible_successes_left = remaining;
            if acks.len() + possible_successes_left < needed {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match timeout(deadline - now, rx.recv()).await {
                Ok(Some((idx, Ok(sig)))) => {
                    self.endpoints[idx].successes.fetch_add(1, Ordering::Relaxed);
                    acks.push(sig);
                    remaining -= 1;
                }
                Ok(Some((idx, Err(e)))) => {
                    remaining -= 1;
                    if opts.treat_already_processed_as_ok && is_already_processed(&e) {
                        self.endpoints[idx].successes.fetch_add(1, Ordering::Relaxed);
                        acks.push(e);
                    } else {
                        self.endpoints[idx].errors.fetch_add(1, Ordering::Relaxed);
                        if first_err.is_none() {
                            first_err = Some(e);
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => break, // deadline hit
            }
        }

        for h in handles {
            h.abort();
        }

        debug!(acks = acks.len(), needed, "rpc quorum round complete");

        if acks.len() >= needed {
            Ok(acks.into_iter().next().unwrap())
        } else if !acks.is_empty() {
            // Partial success by deadline still resolves per spec §4.3.
            warn!(acked = acks.len(), needed, "quorum not reached by deadline, resolving with partial success");
            Ok(acks.into_iter().next().unwrap())
        } else if let Some(e) = first_err {
            Err(EngineError::SwapFailed {
                class: crate::error::SwapFailureClass::classify(&e),
                detail: e,
            })
        } else {
            Err(EngineError::QuorumTimeout { acked: 0, needed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSender {
        delay_ms: u64,
        result: Result<&'static str, &'static str>,
        calls: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl RawTxSender for FakeSender {
        async fn send_raw_transaction(&self, _raw: &[u8]) -> Result<String, String> {
            *self.calls.lock().unwrap() += 1;
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.result.map(|s| s.to_string()).map_err(|s| s.to_string())
        }
    }

    fn endpoint(label: &str, delay_ms: u64, result: Result<&'static str, &'static str>) -> (String, Arc<dyn RawTxSender>) {
        (
            label.to_string(),
            Arc::new(FakeSender {
                delay_ms,
                result,
                calls: Arc::new(Mutex::new(0)),
            }),
        )
    }

    #[tokio::test]
    async fn quorum_happy_path_resolves_with_first_signature() {
        let pool = RpcPool::new(vec![
            endpoint("a", 20, Ok("S1")),
            endpoint("b", 30, Err("already processed")),
            endpoint("c", 40, Err("other error")),
        ]);
        let opts = QuorumOptions {
            quorum: 2,
            max_fanout: Some(3),
            stagger_ms: 0,
            timeout_ms: 2_000,
            treat_already_processed_as_ok: true,
        };
        let sig = pool.send_raw_transaction_quorum(b"raw", &opts).await.unwrap();
        assert_eq!(sig, "S1");
    }

    #[tokio::test]
    async fn two_of_three_errors_fails() {
        // The success endpoint is deliberately much slower than the two
        // errors so the quorum gives up before it could possibly help,
        // independent of scheduling jitter between the two fast endpoints.
        let pool = RpcPool::new(vec![
            endpoint("a", 5, Err("boom")),
            endpoint("b", 5, Err("boom2")),
            endpoint("c", 500, Ok("S1")),
        ]);
        let opts = QuorumOptions {
            quorum: 2,
            max_fanout: Some(3),
            stagger_ms: 0,
            timeout_ms: 2_000,
            treat_already_processed_as_ok: true,
        };
        let err = pool.send_raw_transaction_quorum(b"raw", &opts).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn counters_reflect_all_acks_when_quorum_needs_full_fanout() {
        // quorum == fanout, so the round can't resolve until every endpoint's
        // result (success or already-processed) has been counted.
        let pool = RpcPool::new(vec![
            endpoint("a", 0, Ok("S1")),
            endpoint("b", 10, Ok("S2")),
            endpoint("c", 20, Err("already processed")),
        ]);
        let opts = QuorumOptions {
            quorum: 3,
            max_fanout: Some(3),
            stagger_ms: 0,
            timeout_ms: 2_000,
            treat_already_processed_as_ok: true,
        };
        pool.send_raw_transaction_quorum(b"raw", &opts).await.unwrap();

        let counters = pool.counters();
        assert_eq!(counters[0].successes, 1);
        assert_eq!(counters[1].successes, 1);
        assert_eq!(counters[2].successes, 1, "already-processed treated as a success");
        assert!(counters.iter().all(|c| c.errors == 0));
    }

    #[tokio::test]
    async fn counters_reflect_hard_error_before_quorum_resolves() {
        // The error responds first but can't resolve the round by itself;
        // both successes must still be awaited, so its error is counted
        // deterministically before the round completes.
        let pool = RpcPool::new(vec![
            endpoint("a", 0, Err("boom")),
            endpoint("b", 50, Ok("S1")),
            endpoint("c", 100, Ok("S2")),
        ]);
        let opts = QuorumOptions {
            quorum: 2,
            max_fanout: Some(3),
            stagger_ms: 0,
            timeout_ms: 2_000,
            treat_already_processed_as_ok: true,
        };
        pool.send_raw_transaction_quorum(b"raw", &opts).await.unwrap();

        let counters = pool.counters();
        assert_eq!(counters[0].successes, 0);
        assert_eq!(counters[0].errors, 1, "endpoint a's hard error counted");
        assert_eq!(counters[1].successes, 1);
        assert_eq!(counters[2].successes, 1);
    }

    #[test]
    fn round_robin_cycles() {
        let pool = RpcPool::new(vec![
            endpoint("a", 0, Ok("S1")),
            endpoint("b", 0, Ok("S2")),
        ]);
        assert_eq!(pool.get(), Some(0));
        assert_eq!(pool.get(), Some(1));
        assert_eq!(pool.get(), Some(0));
    }

    #[test]
    fn empty_pool_get_returns_none() {
        let pool = RpcPool::new(vec![]);
        assert_eq!(pool.get(), None);
    }
}
