//! Safety Engine (C5), spec §4.5. A composable pre-trade evaluator; each
//! check returns a structured verdict, and an upstream oracle being
//! unreachable soft-passes rather than blocking trading.
//!
//! The authority check's mint-account byte layout is grounded directly on
//! the teacher's `token_decimal_cache.rs`, which decodes `decimals` at
//! byte offset 44 of the same SPL Token mint account; this module decodes
//! the two `COption<Pubkey>` authority fields framing it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::swap_adapter::{QuoteRequest, QuoteSource};

#[derive(Debug, Clone, Copy)]
pub struct SafetyFlags {
    pub simulation: bool,
    pub liquidity: bool,
    pub authority: bool,
    pub top_holders: bool,
    pub verified: bool,
}

impl Default for SafetyFlags {
    fn default() -> Self {
        Self {
            simulation: true,
            liquidity: true,
            authority: true,
            top_holders: true,
            verified: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub key: &'static str,
    pub label: &'static str,
    pub passed: bool,
    pub reason: Option<String>,
    pub detail: Option<String>,
    pub source: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct SafetyVerdict {
    pub passed: bool,
    pub checks: Vec<CheckResult>,
}

/// Price/liquidity oracle capability (spec §9 Design Notes).
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_usd_liquidity(&self, mint: &str) -> Result<f64, String>;
    async fn get_top_holder_concentration_pct(&self, mint: &str) -> Result<f64, String>;
    async fn has_verified_metadata(&self, mint: &str) -> Result<bool, String>;
}

/// Raw mint-account bytes for the authority fallback decode path.
#[async_trait]
pub trait MintAccountSource: Send + Sync {
    async fn get_mint_account_data(&self, mint: &str) -> Result<Vec<u8>, String>;
}

#[derive(Debug, Clone)]
pub struct SafetyThresholds {
    pub max_price_impact_pct: f64,
    pub min_output_tokens: f64,
    pub min_liquidity_usd: f64,
    pub max_top_holder_pct: f64,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            max_price_impact_pct: 5.0,
            min_output_tokens: 5.0,
            min_liquidity_usd: 5_000.0,
            max_top_holder_pct: 50.0,
        }
    }
}

struct LiquidityCacheEntry {
    value: f64,
    fetched_at: Instant,
}

pub struct SafetyEngine {
    quote_source: Arc<dyn QuoteSource>,
    price_oracle: Arc<dyn PriceOracle>,
    mint_account_source: Arc<dyn MintAccountSource>,
    thresholds: SafetyThresholds,
    liquidity_cache: RwLock<HashMap<String, LiquidityCacheEntry>>,
}

const LIQUIDITY_CACHE_TTL: Duration = Duration::from_secs(30);
const SIMULATION_PROBE_LAMPORTS: u64 = 5_000_000; // 0.005 SOL
const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

impl SafetyEngine {
    pub fn new(
        quote_source: Arc<dyn QuoteSource>,
        price_oracle: Arc<dyn PriceOracle>,
        mint_account_source: Arc<dyn MintAccountSource>,
        thresholds: SafetyThresholds,
    ) -> Self {
        Self {
            quote_source,
            price_oracle,
            mint_account_source,
            thresholds,
            liquidity_cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn evaluate(&self, mint: &str, flags: SafetyFlags) -> SafetyVerdict {
        let mut checks = Vec::new();

        if flags.simulation {
            checks.push(self.check_simulation(mint).await);
        }
        if flags.liquidity {
            checks.push(self.check_liquidity(mint).await);
        }
        if flags.authority {
            checks.push(self.check_authority(mint).await);
        }
        if flags.top_holders {
            checks.push(self.check_top_holders(mint).await);
        }
        if flags.verified {
            checks.push(self.check_verified(mint).await);
        }

        let passed = checks.iter().all(|c| c.passed);
        SafetyVerdict { passed, checks }
    }

    async fn check_simulation(&self, mint: &str) -> CheckResult {
        let req = QuoteRequest {
            input_mint: SOL_MINT.to_string(),
            output_mint: mint.to_string(),
            amount: SIMULATION_PROBE_LAMPORTS,
            slippage_bps: None,
            allowed_dexes: None,
            excluded_dexes: None,
            force_fresh: true,
        };
        match self.quote_source.get_quote(&req).await {
            Ok(quote) => {
                let passed = quote.price_impact_pct <= self.thresholds.max_price_impact_pct
                    && quote.out_amount as f64 >= self.thresholds.min_output_tokens;
                CheckResult {
                    key: "simulation",
                    label: "Simulated swap",
                    passed,
                    reason: if passed {
                        None
                    } else {
                        Some(format!(
                            "price impact {:.2}% / output {} below thresholds",
                            quote.price_impact_pct, quote.out_amount
                        ))
                    },
                    detail: None,
                    source: Some("aggregator"),
                }
            }
            Err(e) => {
                // Soft-pass: an unreachable oracle must never block trading.
                warn!(mint, error = %e, "simulation probe unreachable, soft-passing");
                CheckResult {
                    key: "simulation",
                    label: "Simulated swap",
                    passed: true,
                    reason: Some(format!("probe unavailable: {e}")),
                    detail: None,
                    source: Some("aggregator"),
                }
            }
        }
    }

    async fn check_liquidity(&self, mint: &str) -> CheckResult {
        if let Some(cached) = self.liquidity_cache.read().get(mint) {
            if cached.fetched_at.elapsed() < LIQUIDITY_CACHE_TTL {
                let passed = cached.value >= self.thresholds.min_liquidity_usd;
                return CheckResult {
                    key: "liquidity",
                    label: "USD liquidity",
                    passed,
                    reason: (!passed).then(|| format!("liquidity ${:.2} below minimum", cached.value)),
                    detail: None,
                    source: Some("cache"),
                };
            }
        }

        match self.price_oracle.get_usd_liquidity(mint).await {
            Ok(value) => {
                self.liquidity_cache.write().insert(
                    mint.to_string(),
                    LiquidityCacheEntry {
                        value,
                        fetched_at: Instant::now(),
                    },
                );
                let passed = value >= self.thresholds.min_liquidity_usd;
                CheckResult {
                    key: "liquidity",
                    label: "USD liquidity",
                    passed,
                    reason: (!passed).then(|| format!("liquidity ${value:.2} below minimum")),
                    detail: None,
                    source: Some("oracle"),
                }
            }
            Err(e) => {
                warn!(mint, error = %e, "liquidity oracle unreachable, soft-passing");
                CheckResult {
                    key: "liquidity",
                    label: "USD liquidity",
                    passed: true,
                    reason: Some(format!("oracle unavailable: {e}")),
                    detail: None,
                    source: Some("oracle"),
                }
            }
        }
    }

    async fn check_authority(&self, mint: &str) -> CheckResult {
        match self.mint_account_source.get_mint_account_data(mint).await {
            Ok(data) => match decode_mint_authorities(&data) {
                Ok((mint_renounced, freeze_renounced)) => {
                    let passed = mint_renounced && freeze_renounced;
                    CheckResult {
                        key: "authority",
                        label: "Mint/freeze authority renounced",
                        passed,
                        reason: (!passed).then(|| "mint or freeze authority still held".to_string()),
                        detail: None,
                        source: Some("rpc"),
                    }
                }
                Err(e) => {
                    warn!(mint, error = %e, "suspicious mint account decode, soft-passing");
                    CheckResult {
                        key: "authority",
                        label: "Mint/freeze authority renounced",
                        passed: true,
                        reason: Some(format!("decode unavailable: {e}")),
                        detail: None,
                        source: Some("rpc"),
                    }
                }
            },
            Err(e) => {
                warn!(mint, error = %e, "mint account fetch unreachable, soft-passing");
                CheckResult {
                    key: "authority",
                    label: "Mint/freeze authority renounced",
                    passed: true,
                    reason: Some(format!("fetch unavailable: {e}")),
                    detail: None,
                    source: Some("rpc"),
                }
            }
        }
    }

    async fn check_top_holders(&self, mint: &str) -> CheckResult {
        match self.price_oracle.get_top_holder_concentration_pct(mint).await {
            Ok(pct) => {
                let passed = pct <= self.thresholds.max_top_holder_pct;
                CheckResult {
                    key: "top_holders",
                    label: "Top holder concentration",
                    passed,
                    reason: (!passed).then(|| format!("top holders own {pct:.1}%")),
                    detail: None,
                    source: Some("oracle"),
                }
            }
            Err(e) => {
                warn!(mint, error = %e, "holder distribution unreachable, soft-passing");
                CheckResult {
                    key: "top_holders",
                    label: "Top holder concentration",
                    passed: true,
                    reason: Some(format!("oracle unavailable: {e}")),
                    detail: None,
                    source: Some("oracle"),
                }
            }
        }
    }

    async fn check_verified(&self, mint: &str) -> CheckResult {
        match self.price_oracle.has_verified_metadata(mint).await {
            Ok(passed) => CheckResult {
                key: "verified",
                label: "Verified metadata",
                passed,
                reason: (!passed).then(|| "no verified metadata extension found".to_string()),
                detail: None,
                source: Some("oracle"),
            },
            Err(e) => {
                warn!(mint, error = %e, "metadata oracle unreachable, soft-passing");
                CheckResult {
                    key: "verified",
                    label: "Verified metadata",
                    passed: true,
                    reason: Some(format!("oracle unavailable: {e}")),
                    detail: None,
                    source: Some("oracle"),
                }
            }
        }
    }
}

/// SPL Token mint account layout: `mintAuthority: COption<Pubkey>` at byte
/// 0 (4-byte tag + 32-byte pubkey), `supply: u64` at 36, `decimals: u8` at
/// 44, `isInitialized: bool` at 45, `freezeAuthority: COption<Pubkey>` at
/// 46. Returns `(mint_authority_renounced, freeze_authority_renounced)`.
fn decode_mint_authorities(data: &[u8]) -> Result<(bool, bool), String> {
    if data.len() < 82 {
        return Err(format!("mint account too short: {} bytes", data.len()));
    }
    let mint_tag = u32::from_le_bytes(data[0..4].try_into().unwrap());
    let freeze_tag = u32::from_le_bytes(data[46..50].try_into().unwrap());
    Ok((mint_tag == 0, freeze_tag == 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_authorities_renounced() {
        let mut data = vec![0u8; 82];
        // tags already zero == COption::None
        assert_eq!(decode_mint_authorities(&data).unwrap(), (true, true));
        data[0] = 1; // mint authority present
        assert_eq!(decode_mint_authorities(&data).unwrap(), (false, true));
    }

    #[test]
    fn short_account_errors() {
        assert!(decode_mint_authorities(&[0u8; 10]).is_err());
    }
}
