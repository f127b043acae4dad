//! Swap Adapter (C4), spec §4.4. Fetches an aggregator quote, then builds,
//! signs, and broadcasts the swap transaction with optional MEV knobs.
//!
//! Grounded on the teacher's `jupiter_executor.rs` (quote/execute split,
//! `ExecutionParams`/`ExecutionResult` shapes), generalized from the
//! Jupiter-specific Ultra API to the spec's generic `QuoteSource` /
//! `SwapTransactionSource` capabilities (spec §9 Design Notes).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bs58;
use parking_lot::RwLock;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::{Transaction, VersionedTransaction};

use crate::error::{EngineError, SwapFailureClass};
use crate::rpc_pool::{QuorumOptions, RawTxSender, RpcPool};

const ROUTE_CACHE_TTL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub slippage_bps: Option<u16>,
    pub allowed_dexes: Option<Vec<String>>,
    pub excluded_dexes: Option<Vec<String>>,
    pub force_fresh: bool,
}

pub fn create_quote_request(input_mint: String, output_mint: String, amount: u64) -> QuoteRequest {
    QuoteRequest {
        input_mint,
        output_mint,
        amount,
        slippage_bps: None,
        allowed_dexes: None,
        excluded_dexes: None,
        force_fresh: false,
    }
}

const DEFAULT_SLIPPAGE_BPS: u16 = 100;

impl QuoteRequest {
    /// Slippage defaults to 100 bps when missing/≤0 (spec §4.4).
    pub fn effective_slippage_bps(&self) -> u16 {
        match self.slippage_bps {
            Some(bps) if bps > 0 => bps,
            _ => DEFAULT_SLIPPAGE_BPS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    pub price_impact_pct: f64,
    pub route_plan: serde_json::Value,
}

/// The injected aggregator quote capability (spec §1/§9: HTTP client is
/// out of scope, the core only depends on this trait).
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn get_quote(&self, req: &QuoteRequest) -> Result<Quote, EngineError>;
}

pub enum SwapTransactionBytes {
    Versioned(Vec<u8>),
    Legacy(Vec<u8>),
}

pub struct SwapTransactionResponse {
    pub transaction: SwapTransactionBytes,
    pub last_valid_block_height: u64,
}

/// The injected aggregator swap-transaction-building capability.
#[async_trait]
pub trait SwapTransactionSource: Send + Sync {
    async fn get_swap_transaction(
        &self,
        quote: &Quote,
        wallet_pubkey: &str,
        compute_unit_price_micro_lamports: Option<u64>,
    ) -> Result<SwapTransactionResponse, EngineError>;
}

pub struct ExecutionParams<'a> {
    pub quote: Quote,
    pub wallet_keypair: &'a Keypair,
    pub shared: bool,
    pub compute_unit_price_micro_lamports: Option<u64>,
    pub tip_lamports: u64,
    pub private_rpc_url: Option<String>,
    pub skip_preflight: bool,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub signature: String,
}

/// Short-lived cache of `getQuote` responses keyed on the route shape,
/// grounded on the teacher's `route_cache.rs` (route lookups reused
/// across near-simultaneous quote requests for the same pair/amount).
/// `force_fresh` on the request always bypasses it.
type RouteCacheKey = (String, String, u64);

struct RouteCache {
    entries: RwLock<HashMap<RouteCacheKey, (Quote, Instant)>>,
}

impl RouteCache {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, req: &QuoteRequest) -> Option<Quote> {
        let key = (req.input_mint.clone(), req.output_mint.clone(), req.amount);
        let entries = self.entries.read();
        let (quote, fetched_at) = entries.get(&key)?;
        if fetched_at.elapsed() < ROUTE_CACHE_TTL {
            Some(quote.clone())
        } else {
            None
        }
    }

    fn put(&self, req: &QuoteRequest, quote: Quote) {
        let key = (req.input_mint.clone(), req.output_mint.clone(), req.amount);
        self.entries.write().insert(key, (quote, Instant::now()));
    }
}

pub struct SwapAdapter {
    quote_source: Arc<dyn QuoteSource>,
    swap_source: Arc<dyn SwapTransactionSource>,
    default_sender: Arc<dyn RawTxSender>,
    route_cache: RouteCache,
}

impl SwapAdapter {
    pub fn new(
        quote_source: Arc<dyn QuoteSource>,
        swap_source: Arc<dyn SwapTransactionSource>,
        default_sender: Arc<dyn RawTxSender>,
    ) -> Self {
        Self {
            quote_source,
            swap_source,
            default_sender,
            route_cache: RouteCache::new(),
        }
    }

    pub async fn get_quote(&self, req: &QuoteRequest) -> Result<Quote, EngineError> {
        if !req.force_fresh {
            if let Some(quote) = self.route_cache.get(req) {
                return Ok(quote);
            }
        }
        let quote = self.quote_source.get_quote(req).await?;
        self.route_cache.put(req, quote.clone());
        Ok(quote)
    }

    /// `executeSwap`: builds, signs, and broadcasts. `quorum_pool` carries
    /// the optional injected quorum sender (§4.4: "via the injected
    /// sendRawTransaction (quorum pool) or the default connection").
    pub async fn execute_swap(
        &self,
        params: ExecutionParams<'_>,
        quorum_pool: Option<&RpcPool>,
        quorum_opts: &QuorumOptions,
    ) -> Result<ExecutionResult, EngineError> {
        self.execute_swap_inner(params, quorum_pool, quorum_opts, false).await
    }

    /// Turbo variant: defaults `skipPreflight=true` and may use a private RPC.
    pub async fn execute_swap_turbo(
        &self,
        mut params: ExecutionParams<'_>,
        quorum_pool: Option<&RpcPool>,
        quorum_opts: &QuorumOptions,
    ) -> Result<ExecutionResult, EngineError> {
        params.skip_preflight = true;
        self.execute_swap_inner(params, quorum_pool, quorum_opts, true).await
    }

    async fn execute_swap_inner(
        &self,
        params: ExecutionParams<'_>,
        quorum_pool: Option<&RpcPool>,
        quorum_opts: &QuorumOptions,
        _turbo: bool,
    ) -> Result<ExecutionResult, EngineError> {
        let wallet_pubkey = params.wallet_keypair.pubkey().to_string();
        let response = self
            .swap_source
            .get_swap_transaction(&params.quote, &wallet_pubkey, params.compute_unit_price_micro_lamports)
            .await?;

        let (raw, sig_hint) = match response.transaction {
            SwapTransactionBytes::Versioned(bytes) => {
                let mut tx: VersionedTransaction = bincode::deserialize(&bytes).map_err(|e| EngineError::SwapFailed {
                    class: SwapFailureClass::Unknown,
                    detail: format!("failed to deserialize versioned tx: {e}"),
                })?;
                tx.signatures[0] = params.wallet_keypair.sign_message(&tx.message.serialize());
                let hint = bs58::encode(tx.signatures[0].as_ref()).into_string();
                let raw = bincode::serialize(&tx).map_err(|e| EngineError::SwapFailed {
                    class: SwapFailureClass::Unknown,
                    detail: format!("failed to serialize versioned tx: {e}"),
                })?;
                (raw, hint)
            }
            SwapTransactionBytes::Legacy(bytes) => {
                let mut tx: Transaction = bincode::deserialize(&bytes).map_err(|e| EngineError::SwapFailed {
                    class: SwapFailureClass::Unknown,
                    detail: format!("failed to deserialize legacy tx: {e}"),
                })?;
                tx.sign(&[params.wallet_keypair], tx.message.recent_blockhash);
                let hint = bs58::encode(tx.signatures[0].as_ref()).into_string();
                let raw = bincode::serialize(&tx).map_err(|e| EngineError::SwapFailed {
                    class: SwapFailureClass::Unknown,
                    detail: format!("failed to serialize legacy tx: {e}"),
                })?;
                (raw, hint)
            }
        };

        let signature = if let Some(pool) = quorum_pool {
            match pool.send_raw_transaction_quorum(&raw, quorum_opts).await {
                Ok(sig) if sig.len() >= 32 => sig,
                _ => sig_hint,
            }
        } else {
            match self.default_sender.send_raw_transaction(&raw).await {
                Ok(sig) => sig,
                Err(e) => {
                    return Err(EngineError::SwapFailed {
                        class: SwapFailureClass::classify(&e),
                        detail: e,
                    })
                }
            }
        };

        Ok(ExecutionResult { signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc as StdArc;

    struct CountingQuoteSource {
        calls: StdArc<AtomicU32>,
    }

    #[async_trait]
    impl QuoteSource for CountingQuoteSource {
        async fn get_quote(&self, req: &QuoteRequest) -> Result<Quote, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Quote {
                input_mint: req.input_mint.clone(),
                output_mint: req.output_mint.clone(),
                in_amount: req.amount,
                out_amount: req.amount,
                price_impact_pct: 0.0,
                route_plan: serde_json::json!([]),
            })
        }
    }

    struct UnusedSwapSource;

    #[async_trait]
    impl SwapTransactionSource for UnusedSwapSource {
        async fn get_swap_transaction(
            &self,
            _quote: &Quote,
            _wallet_pubkey: &str,
            _compute_unit_price_micro_lamports: Option<u64>,
        ) -> Result<SwapTransactionResponse, EngineError> {
            unimplemented!("not exercised by route-cache tests")
        }
    }

    struct UnusedSender;

    #[async_trait]
    impl RawTxSender for UnusedSender {
        async fn send_raw_transaction(&self, _raw: &[u8]) -> Result<String, String> {
            unimplemented!("not exercised by route-cache tests")
        }
    }

    fn test_adapter(calls: StdArc<AtomicU32>) -> SwapAdapter {
        SwapAdapter::new(
            Arc::new(CountingQuoteSource { calls }),
            Arc::new(UnusedSwapSource),
            Arc::new(UnusedSender),
        )
    }

    #[tokio::test]
    async fn repeated_quote_within_ttl_hits_cache() {
        let calls = StdArc::new(AtomicU32::new(0));
        let adapter = test_adapter(calls.clone());
        let req = create_quote_request("A".into(), "B".into(), 1_000);

        adapter.get_quote(&req).await.unwrap();
        adapter.get_quote(&req).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1, "second lookup served from the route cache");
    }

    #[tokio::test]
    async fn force_fresh_bypasses_cache() {
        let calls = StdArc::new(AtomicU32::new(0));
        let adapter = test_adapter(calls.clone());
        let mut req = create_quote_request("A".into(), "B".into(), 1_000);

        adapter.get_quote(&req).await.unwrap();
        req.force_fresh = true;
        adapter.get_quote(&req).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn default_slippage_applied_when_missing() {
        let req = create_quote_request("A".into(), "B".into(), 1_000);
        assert_eq!(req.effective_slippage_bps(), DEFAULT_SLIPPAGE_BPS);
    }

    #[test]
    fn default_slippage_applied_when_zero() {
        let mut req = create_quote_request("A".into(), "B".into(), 1_000);
        req.slippage_bps = Some(0);
        assert_eq!(req.effective_slippage_bps(), DEFAULT_SLIPPAGE_BPS);
    }

    #[test]
    fn explicit_slippage_is_kept() {
        let mut req = create_quote_request("A".into(), "B".into(), 1_000);
        req.slippage_bps = Some(250);
        assert_eq!(req.effective_slippage_bps(), 250);
    }
}
