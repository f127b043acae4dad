//! Strategy Runtime (C7), spec §4.7. Each bot is a supervised, single actor
//! loop: a `StrategyKind` tagged union carries mode-specific config, a
//! shared guard pipeline filters scan candidates, and `BotRuntime` drives
//! the tick loop with trade caps, halt-on-failures, and Health Metric
//! emission.
//!
//! Grounded on `mempool_monitor.rs`'s `MonitorConfig`/engine-composition
//! pattern (cooldown map, per-tick scan-and-filter loop) and
//! `config_cli.rs`'s typed, named config structs in place of untyped JSON
//! maps at this layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::executor::{self, ExecTradeRequest, TradeMeta};
use crate::model::{BotState, HealthMetric, Side};
use crate::rpc_pool::QuorumOptions;
use crate::swap_adapter::QuoteRequest;

/// Fields common to every strategy mode (spec §6 "Strategy config schema").
#[derive(Debug, Clone)]
pub struct CommonConfig {
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub slippage_bps: u16,
    pub max_slippage_bps: u16,
    pub interval: Duration,
    pub max_trades: Option<u32>,
    pub amount_to_spend_lamports: u64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub halt_on_failures: u32,
    pub max_daily_volume_usd: f64,
    pub disable_safety: bool,
    pub dry_run: bool,
}

/// Shared scan-guard config for universe-scanning modes (sniper, scalper,
/// breakout, dip, chad, trend, rotation): cooldown/age/threshold knobs
/// interpreted per mode by the injected `CandidateSource`.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub common: CommonConfig,
    pub max_token_age_minutes: Option<u32>,
    pub price_window: Duration,
    pub volume_window: Duration,
    pub entry_threshold_pct: f64,
    pub volume_threshold_usd: f64,
    pub limit_price: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DcaConfig {
    pub common: CommonConfig,
    pub mint: String,
    pub side: Side,
    pub num_buys: u32,
    pub freq: Duration,
    pub stop_above: Option<f64>,
    pub stop_below: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LimitOrderConfig {
    pub common: CommonConfig,
    pub mint: String,
    pub side: Side,
    pub target_price: f64,
}

#[derive(Debug, Clone)]
pub struct TpSlConfig {
    pub common: CommonConfig,
    pub mint: String,
    pub tp_percent: f64,
    pub sl_percent: f64,
    pub sell_pct: f64,
}

#[derive(Debug, Clone)]
pub struct StealthConfig {
    pub common: ScanConfig,
    pub wallet_ids: Vec<Uuid>,
    pub size_jitter_pct: f64,
    pub slippage_jitter_pct: f64,
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub auto_forward: AutoForward,
    pub cold_destination: Option<String>,
    pub sol_floor_lamports: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoForward {
    Off,
    OnEachBuy,
    OnFinish,
}

#[derive(Debug, Clone)]
pub struct RebalancerConfig {
    pub common: ScanConfig,
    pub target_weights: Vec<(String, f64)>,
}

/// Tagged union per mode (spec §9 Design Notes: "a tagged union per mode
/// rather than untyped maps").
#[derive(Debug, Clone)]
pub enum StrategyKind {
    Sniper(ScanConfig),
    Scalper(ScanConfig),
    Breakout(ScanConfig),
    Dca(DcaConfig),
    LimitOrder(LimitOrderConfig),
    TpSl(TpSlConfig),
    Stealth(StealthConfig),
    Rebalancer(RebalancerConfig),
    Rotation(ScanConfig),
    Dip(ScanConfig),
    Chad(ScanConfig),
    Trend(ScanConfig),
}

impl StrategyKind {
    pub fn common(&self) -> &CommonConfig {
        match self {
            StrategyKind::Sniper(c) | StrategyKind::Scalper(c) | StrategyKind::Breakout(c) | StrategyKind::Rotation(c) | StrategyKind::Dip(c) | StrategyKind::Chad(c) | StrategyKind::Trend(c) => &c.common,
            StrategyKind::Dca(c) => &c.common,
            StrategyKind::LimitOrder(c) => &c.common,
            StrategyKind::TpSl(c) => &c.common,
            StrategyKind::Stealth(c) => &c.common.common,
            StrategyKind::Rebalancer(c) => &c.common.common,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Sniper(_) => "sniper",
            StrategyKind::Scalper(_) => "scalper",
            StrategyKind::Breakout(_) => "breakout",
            StrategyKind::Dca(_) => "dca",
            StrategyKind::LimitOrder(_) => "limitOrder",
            StrategyKind::TpSl(_) => "tpSl",
            StrategyKind::Stealth(_) => "stealth",
            StrategyKind::Rebalancer(_) => "rebalancer",
            StrategyKind::Rotation(_) => "rotation",
            StrategyKind::Dip(_) => "dip",
            StrategyKind::Chad(_) => "chad",
            StrategyKind::Trend(_) => "trend",
        }
    }
}

/// A scan-universe candidate, blind to mode-specific filtering (spec §4.7
/// tick scan step). Injected so the core never depends on a concrete
/// listings feed, mempool stream, or portfolio reader.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub mint: String,
    pub price: f64,
    pub price_change_pct: f64,
    pub volume_usd: f64,
    pub age_minutes: Option<u32>,
}

#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn scan(&self) -> Result<Vec<Candidate>, String>;
}

#[async_trait]
pub trait SpotPriceSource: Send + Sync {
    async fn get_spot_price(&self, mint: &str) -> Result<f64, String>;
}

/// Sweeps a wallet's balance of `mint` to `destination` for the Stealth
/// sub-variant's `autoForward` policy (spec §4.7). For native SOL,
/// `floor_lamports` is left behind; other mints sweep in full. The on-chain
/// transfer mechanics (ATA lookups, token-program instructions) are an
/// adapter concern, mirroring how `QuoteSource`/`SwapTransactionSource` keep
/// the aggregator's wire format out of this crate.
#[async_trait]
pub trait FundsForwarder: Send + Sync {
    async fn forward(
        &self,
        wallet_keypair: &solana_sdk::signature::Keypair,
        mint: &str,
        destination: &str,
        floor_lamports: u64,
    ) -> Result<String, String>;
}

const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Ordered forward legs for one wallet: purchased SPL, then USDC, then SOL
/// above the floor (spec §4.7 "forwards purchased SPL, then USDC, then SOL").
fn forward_legs(mint: &str, sol_floor_lamports: u64) -> [(String, u64); 3] {
    [(mint.to_string(), 0), (USDC_MINT.to_string(), 0), (SOL_MINT.to_string(), sol_floor_lamports)]
}

/// Jitters `base` by up to `pct` percent in either direction (spec §4.7
/// `sizeJitterPct`/`slippageJitterPct`). `pct <= 0.0` is a no-op.
fn jitter_pct(base: u64, pct: f64) -> u64 {
    if pct <= 0.0 {
        return base;
    }
    let factor = 1.0 + (fastrand::f64() * 2.0 - 1.0) * (pct / 100.0);
    ((base as f64) * factor).max(0.0).round() as u64
}

/// Picks a random delay in `[min, max]` (spec §4.7 `delayMin..MaxMs`).
fn jitter_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    min + Duration::from_millis(fastrand::u64(0..=(max - min).as_millis() as u64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Traded,
    Skipped,
    NoCandidates,
    Crashed,
}

/// Per-bot local guard state (spec §4.7: "per-bot guards are local").
struct LocalGuards {
    cooldowns: HashMap<String, Instant>,
    daily_volume_usd: f64,
    daily_volume_reset_at: Instant,
}

impl LocalGuards {
    fn new() -> Self {
        Self {
            cooldowns: HashMap::new(),
            daily_volume_usd: 0.0,
            daily_volume_reset_at: Instant::now() + Duration::from_secs(86_400),
        }
    }

    fn roll_daily_volume(&mut self) {
        if Instant::now() >= self.daily_volume_reset_at {
            self.daily_volume_usd = 0.0;
            self.daily_volume_reset_at = Instant::now() + Duration::from_secs(86_400);
        }
    }
}

/// Runs the shared guard pipeline (spec §4.7 tick steps 1-8) against one
/// candidate for a `ScanConfig`-driven mode, executing through C6 on success.
#[allow(clippy::too_many_arguments)]
async fn evaluate_candidate(
    engine: &Arc<Engine>,
    cfg: &ScanConfig,
    bot_id: &str,
    candidate: &Candidate,
    guards: &mut LocalGuards,
    quote_source: &dyn crate::swap_adapter::QuoteSource,
    quorum_opts: &QuorumOptions,
) -> Result<TickOutcome, EngineError> {
    // 1. cooldown
    if let Some(last_seen) = guards.cooldowns.get(&candidate.mint) {
        if last_seen.elapsed() < cfg.common.interval {
            return Ok(TickOutcome::Skipped);
        }
    }
    guards.cooldowns.insert(candidate.mint.clone(), Instant::now());

    // 2. age filter
    if let Some(max_age) = cfg.max_token_age_minutes {
        if candidate.age_minutes.is_none_or(|age| age > max_age) {
            return Ok(TickOutcome::Skipped);
        }
    }

    // 3. price/volume thresholds
    if candidate.price_change_pct.abs() < cfg.entry_threshold_pct || candidate.volume_usd < cfg.volume_threshold_usd {
        return Ok(TickOutcome::Skipped);
    }

    // 4. limit-price predicate
    if let Some(limit) = cfg.limit_price {
        if candidate.price > limit {
            return Ok(TickOutcome::Skipped);
        }
    }

    // 5. safety
    if !cfg.common.disable_safety {
        let verdict = engine
            .safety_engine
            .evaluate(&candidate.mint, crate::safety::SafetyFlags::default())
            .await;
        if !verdict.passed {
            return Ok(TickOutcome::Skipped);
        }
    }

    // 6. daily volume cap
    guards.roll_daily_volume();
    if guards.daily_volume_usd >= cfg.common.max_daily_volume_usd {
        return Ok(TickOutcome::Skipped);
    }

    // 7. quote + max-slippage check on priceImpactPct
    let quote_req = QuoteRequest {
        input_mint: SOL_MINT.to_string(),
        output_mint: candidate.mint.clone(),
        amount: cfg.common.amount_to_spend_lamports,
        slippage_bps: Some(cfg.common.slippage_bps),
        allowed_dexes: None,
        excluded_dexes: None,
        force_fresh: false,
    };
    let quote = match quote_source.get_quote(&quote_req).await {
        Ok(q) => q,
        Err(_) => return Ok(TickOutcome::Skipped),
    };
    if quote.price_impact_pct > cfg.common.max_slippage_bps as f64 / 100.0 {
        return Ok(TickOutcome::Skipped);
    }

    // 8. execute (dry-run routes through exec_trade with simulated=true so it
    // still persists a Trade row and installs TP/SL, per spec §8 scenario 1) + bookkeeping
    let req = ExecTradeRequest {
        quote,
        mint: candidate.mint.clone(),
        meta: TradeMeta {
            user_id: cfg.common.user_id,
            wallet_id: cfg.common.wallet_id,
            strategy: bot_id.to_string(),
            side: Side::Buy,
            tp: cfg.common.take_profit_pct,
            sl: cfg.common.stop_loss_pct,
            tp_percent: cfg.common.take_profit_pct,
            sl_percent: cfg.common.stop_loss_pct,
            sell_pct: 1.0,
            priority_fee_lamports: None,
            idempotency_key: None,
            idempotency_ttl: None,
            bot_id: Some(bot_id.to_string()),
        },
        simulated: cfg.common.dry_run,
    };

    executor::exec_trade(engine, req, quorum_opts).await?;
    guards.daily_volume_usd += candidate.volume_usd.min(cfg.common.amount_to_spend_lamports as f64);
    Ok(TickOutcome::Traded)
}

/// Stealth sub-variant (spec §4.7): applies guards 1-6 once per candidate,
/// then rotates through `wallet_ids`, buying with each wallet through a
/// jittered size/slippage/delay and forwarding per `auto_forward`.
#[allow(clippy::too_many_arguments)]
async fn evaluate_candidate_stealth(
    engine: &Arc<Engine>,
    cfg: &StealthConfig,
    bot_id: &str,
    candidate: &Candidate,
    guards: &mut LocalGuards,
    quote_source: &dyn crate::swap_adapter::QuoteSource,
    quorum_opts: &QuorumOptions,
    forwarder: &dyn FundsForwarder,
) -> Result<TickOutcome, EngineError> {
    let scan = &cfg.common;

    // 1. cooldown
    if let Some(last_seen) = guards.cooldowns.get(&candidate.mint) {
        if last_seen.elapsed() < scan.common.interval {
            return Ok(TickOutcome::Skipped);
        }
    }
    guards.cooldowns.insert(candidate.mint.clone(), Instant::now());

    // 2. age filter
    if let Some(max_age) = scan.max_token_age_minutes {
        if candidate.age_minutes.is_none_or(|age| age > max_age) {
            return Ok(TickOutcome::Skipped);
        }
    }

    // 3. price/volume thresholds
    if candidate.price_change_pct.abs() < scan.entry_threshold_pct || candidate.volume_usd < scan.volume_threshold_usd {
        return Ok(TickOutcome::Skipped);
    }

    // 4. limit-price predicate
    if let Some(limit) = scan.limit_price {
        if candidate.price > limit {
            return Ok(TickOutcome::Skipped);
        }
    }

    // 5. safety
    if !scan.common.disable_safety {
        let verdict = engine.safety_engine.evaluate(&candidate.mint, crate::safety::SafetyFlags::default()).await;
        if !verdict.passed {
            return Ok(TickOutcome::Skipped);
        }
    }

    // 6. daily volume cap
    guards.roll_daily_volume();
    if guards.daily_volume_usd >= scan.common.max_daily_volume_usd {
        return Ok(TickOutcome::Skipped);
    }

    if cfg.wallet_ids.is_empty() {
        return Ok(TickOutcome::Skipped);
    }

    let mut traded = false;
    for (i, wallet_id) in cfg.wallet_ids.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(jitter_delay(cfg.delay_min, cfg.delay_max)).await;
        }

        let jittered_amount = jitter_pct(scan.common.amount_to_spend_lamports, cfg.size_jitter_pct);
        let jittered_slippage_bps = jitter_pct(scan.common.slippage_bps as u64, cfg.slippage_jitter_pct) as u16;

        // 7. quote + max-slippage check on priceImpactPct, per wallet
        let quote_req = QuoteRequest {
            input_mint: SOL_MINT.to_string(),
            output_mint: candidate.mint.clone(),
            amount: jittered_amount,
            slippage_bps: Some(jittered_slippage_bps),
            allowed_dexes: None,
            excluded_dexes: None,
            force_fresh: false,
        };
        let quote = match quote_source.get_quote(&quote_req).await {
            Ok(q) => q,
            Err(_) => continue,
        };
        if quote.price_impact_pct > scan.common.max_slippage_bps as f64 / 100.0 {
            continue;
        }

        // 8. execute + bookkeeping
        let req = ExecTradeRequest {
            quote,
            mint: candidate.mint.clone(),
            meta: TradeMeta {
                user_id: scan.common.user_id,
                wallet_id: *wallet_id,
                strategy: bot_id.to_string(),
                side: Side::Buy,
                tp: scan.common.take_profit_pct,
                sl: scan.common.stop_loss_pct,
                tp_percent: scan.common.take_profit_pct,
                sl_percent: scan.common.stop_loss_pct,
                sell_pct: 1.0,
                priority_fee_lamports: None,
                idempotency_key: None,
                idempotency_ttl: None,
                bot_id: Some(bot_id.to_string()),
            },
            simulated: scan.common.dry_run,
        };

        match executor::exec_trade(engine, req, quorum_opts).await {
            Ok(Some(_)) => {
                traded = true;
                guards.daily_volume_usd += candidate.volume_usd.min(jittered_amount as f64);
                if cfg.auto_forward == AutoForward::OnEachBuy {
                    forward_stealth_wallet(engine, forwarder, *wallet_id, &candidate.mint, cfg).await;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(bot_id, wallet_id = %wallet_id, error = %e, "stealth buy failed"),
        }
    }

    if traded && cfg.auto_forward == AutoForward::OnFinish {
        for wallet_id in &cfg.wallet_ids {
            forward_stealth_wallet(engine, forwarder, *wallet_id, &candidate.mint, cfg).await;
        }
    }

    Ok(if traded { TickOutcome::Traded } else { TickOutcome::Skipped })
}

/// Sweeps one wallet's SPL/USDC/SOL legs to `cfg.cold_destination`, if set
/// (spec §4.7 `autoForward`). A missing destination is a silent no-op: there
/// is nowhere to forward to.
async fn forward_stealth_wallet(engine: &Arc<Engine>, forwarder: &dyn FundsForwarder, wallet_id: Uuid, mint: &str, cfg: &StealthConfig) {
    let Some(destination) = cfg.cold_destination.as_deref() else {
        return;
    };
    let wallet = match engine.repo.get_wallet(wallet_id).await {
        Ok(w) => w,
        Err(e) => {
            warn!(error = %e, wallet_id = %wallet_id, "stealth forward: wallet lookup failed");
            return;
        }
    };
    let keypair = match executor::acquire_signing_key(engine, &wallet).await {
        Ok(k) => k,
        Err(e) => {
            warn!(error = %e, wallet_id = %wallet_id, "stealth forward: key unavailable");
            return;
        }
    };
    for (leg_mint, floor_lamports) in forward_legs(mint, cfg.sol_floor_lamports) {
        if let Err(e) = forwarder.forward(&keypair, &leg_mint, destination, floor_lamports).await {
            warn!(error = %e, mint = %leg_mint, wallet_id = %wallet_id, "stealth forward leg failed");
        }
    }
}

pub struct BotStatusSnapshot {
    pub bot_id: String,
    pub state: BotState,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub last_tick_at: Option<chrono::DateTime<chrono::Utc>>,
    pub loop_duration_ms: u64,
    pub restart_count: u32,
    pub trades_executed: u32,
    pub consecutive_errors: u32,
}

/// Shared, lock-protected bot state the Supervisor (C10) reads for
/// `status()`/`detailedStatus()` without synchronizing with the tick loop.
pub struct BotHandleState {
    pub inner: RwLock<BotStatusSnapshot>,
}

impl BotHandleState {
    pub fn new(bot_id: String) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(BotStatusSnapshot {
                bot_id,
                state: BotState::Starting,
                started_at: chrono::Utc::now(),
                last_tick_at: None,
                loop_duration_ms: 0,
                restart_count: 0,
                trades_executed: 0,
                consecutive_errors: 0,
            }),
        })
    }

    pub fn set_state(&self, state: BotState) {
        self.inner.write().state = state;
    }

    pub fn state(&self) -> BotState {
        self.inner.read().state
    }

    /// Records one tick's result and returns the data needed to emit a
    /// health line and evaluate caps, without leaking the lock guard to
    /// the caller (parking_lot guards are not `Send` and must never be
    /// held across an `.await`).
    fn record_tick(&self, loop_duration_ms: u64, outcome: &Result<TickOutcome, EngineError>) -> (HealthMetric, u32, u32) {
        let mut snapshot = self.inner.write();
        snapshot.last_tick_at = Some(chrono::Utc::now());
        snapshot.loop_duration_ms = loop_duration_ms;
        match outcome {
            Ok(TickOutcome::Traded) => {
                snapshot.trades_executed += 1;
                snapshot.consecutive_errors = 0;
            }
            Ok(_) => {
                snapshot.consecutive_errors = 0;
            }
            Err(_) => {
                snapshot.consecutive_errors += 1;
            }
        }
        let metric = HealthMetric {
            bot_id: snapshot.bot_id.clone(),
            last_tick_at: snapshot.last_tick_at.unwrap(),
            loop_duration_ms,
            restart_count: snapshot.restart_count,
            status: snapshot.state,
        };
        (metric, snapshot.trades_executed, snapshot.consecutive_errors)
    }
}

#[derive(Serialize)]
struct HealthLine<'a> {
    #[serde(rename = "botId")]
    bot_id: &'a str,
    #[serde(rename = "lastTickAt")]
    last_tick_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "loopDurationMs")]
    loop_duration_ms: u64,
    #[serde(rename = "restartCount")]
    restart_count: u32,
    status: BotState,
}

fn emit_health(bot_id: &str, metric: &HealthMetric) {
    let line = HealthLine {
        bot_id,
        last_tick_at: metric.last_tick_at,
        loop_duration_ms: metric.loop_duration_ms,
        restart_count: metric.restart_count,
        status: metric.status,
    };
    if let Ok(json) = serde_json::to_string(&line) {
        info!(target: "health", "[HEALTH]{json}");
    }
}

/// Runs one bot's tick loop until `cancel` fires or the bot self-transitions
/// to `stopped`/`crashed` (spec §4.7, §5 "Supervisor pause/stop is
/// cooperative: the runtime checks state after each suspension point").
#[allow(clippy::too_many_arguments)]
pub async fn run_bot_loop(
    engine: Arc<Engine>,
    bot_id: String,
    kind: StrategyKind,
    candidate_source: Arc<dyn CandidateSource>,
    quote_source: Arc<dyn crate::swap_adapter::QuoteSource>,
    forwarder: Arc<dyn FundsForwarder>,
    quorum_opts: QuorumOptions,
    handle: Arc<BotHandleState>,
    cancel: CancellationToken,
) {
    handle.set_state(BotState::Running);
    let mut guards = LocalGuards::new();
    let interval = kind.common().interval;
    let max_trades = kind.common().max_trades;
    let halt_on_failures = kind.common().halt_on_failures;

    loop {
        if cancel.is_cancelled() {
            handle.set_state(BotState::Stopped);
            return;
        }
        if handle.state() == BotState::Paused {
            tokio::time::sleep(Duration::from_millis(200)).await;
            continue;
        }

        let tick_started = Instant::now();
        let outcome = tick_once(
            &engine,
            &kind,
            &bot_id,
            &candidate_source,
            quote_source.as_ref(),
            forwarder.as_ref(),
            &mut guards,
            &quorum_opts,
        )
        .await;
        let loop_duration_ms = tick_started.elapsed().as_millis() as u64;
        if let Err(ref e) = outcome {
            warn!(bot_id = %bot_id, error = %e, "strategy tick failed");
        }

        let (metric, trades_executed, consecutive_errors) = handle.record_tick(loop_duration_ms, &outcome);
        emit_health(&bot_id, &metric);

        if let Some(cap) = max_trades {
            if trades_executed >= cap {
                handle.set_state(BotState::Stopped);
                info!(bot_id = %bot_id, "max-trades reached, stopping");
                return;
            }
        }
        if consecutive_errors >= halt_on_failures {
            handle.set_state(BotState::Crashed);
            warn!(bot_id = %bot_id, "error-limit reached, crashed");
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => {
                handle.set_state(BotState::Stopped);
                return;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn tick_once(
    engine: &Arc<Engine>,
    kind: &StrategyKind,
    bot_id: &str,
    candidate_source: &Arc<dyn CandidateSource>,
    quote_source: &dyn crate::swap_adapter::QuoteSource,
    forwarder: &dyn FundsForwarder,
    guards: &mut LocalGuards,
    quorum_opts: &QuorumOptions,
) -> Result<TickOutcome, EngineError> {
    if let StrategyKind::Dca(_) | StrategyKind::LimitOrder(_) | StrategyKind::TpSl(_) = kind {
        // Delegated to the Always-On Monitors (C8); the runtime just idles.
        return Ok(TickOutcome::NoCandidates);
    }

    let candidates = candidate_source.scan().await.map_err(EngineError::QuoteUnavailable)?;
    if candidates.is_empty() {
        return Ok(TickOutcome::NoCandidates);
    }

    if let StrategyKind::Stealth(stealth_cfg) = kind {
        for candidate in &candidates {
            match evaluate_candidate_stealth(engine, stealth_cfg, bot_id, candidate, guards, quote_source, quorum_opts, forwarder).await? {
                TickOutcome::Traded => return Ok(TickOutcome::Traded),
                _ => continue,
            }
        }
        return Ok(TickOutcome::Skipped);
    }

    let scan_cfg = match kind {
        StrategyKind::Sniper(c) | StrategyKind::Scalper(c) | StrategyKind::Breakout(c) | StrategyKind::Rotation(c) | StrategyKind::Dip(c) | StrategyKind::Chad(c) | StrategyKind::Trend(c) => c,
        StrategyKind::Rebalancer(c) => &c.common,
        StrategyKind::Stealth(_) | StrategyKind::Dca(_) | StrategyKind::LimitOrder(_) | StrategyKind::TpSl(_) => unreachable!("handled above"),
    };

    for candidate in &candidates {
        match evaluate_candidate(engine, scan_cfg, bot_id, candidate, guards, quote_source, quorum_opts).await? {
            TickOutcome::Traded => return Ok(TickOutcome::Traded),
            _ => continue,
        }
    }
    Ok(TickOutcome::Skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_common() -> CommonConfig {
        CommonConfig {
            user_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            slippage_bps: 100,
            max_slippage_bps: 500,
            interval: Duration::from_secs(1),
            max_trades: Some(1),
            amount_to_spend_lamports: 10_000_000,
            take_profit_pct: 10.0,
            stop_loss_pct: 5.0,
            halt_on_failures: 3,
            max_daily_volume_usd: 1_000_000.0,
            disable_safety: true,
            dry_run: true,
        }
    }

    fn base_scan_config() -> ScanConfig {
        ScanConfig {
            common: base_common(),
            max_token_age_minutes: None,
            price_window: Duration::from_secs(60),
            volume_window: Duration::from_secs(60),
            entry_threshold_pct: 3.0,
            volume_threshold_usd: 50_000.0,
            limit_price: None,
        }
    }

    #[test]
    fn strategy_kind_name_matches_mode() {
        assert_eq!(StrategyKind::Sniper(base_scan_config()).name(), "sniper");
        assert_eq!(StrategyKind::Chad(base_scan_config()).name(), "chad");
    }

    #[test]
    fn cooldown_guard_flags_recently_seen_mint() {
        let cfg = base_scan_config();
        let mut guards = LocalGuards::new();
        guards.cooldowns.insert("MINT".to_string(), Instant::now());

        let still_cooling = guards
            .cooldowns
            .get("MINT")
            .is_some_and(|last_seen| last_seen.elapsed() < cfg.common.interval);
        assert!(still_cooling);
    }

    #[test]
    fn age_filter_rejects_candidates_without_age_when_max_age_set() {
        let mut cfg = base_scan_config();
        cfg.max_token_age_minutes = Some(30);
        let candidate = Candidate {
            mint: "MINT".to_string(),
            price: 1.0,
            price_change_pct: 10.0,
            volume_usd: 100_000.0,
            age_minutes: None,
        };
        let fails_age_filter = cfg
            .max_token_age_minutes
            .is_some_and(|max_age| candidate.age_minutes.is_none_or(|age| age > max_age));
        assert!(fails_age_filter);
    }

    #[test]
    fn daily_volume_guard_resets_after_window() {
        let mut guards = LocalGuards::new();
        guards.daily_volume_usd = 500.0;
        guards.daily_volume_reset_at = Instant::now();
        guards.roll_daily_volume();
        assert_eq!(guards.daily_volume_usd, 0.0);
    }

    #[test]
    fn jitter_pct_zero_is_a_no_op() {
        assert_eq!(jitter_pct(1_000_000, 0.0), 1_000_000);
    }

    #[test]
    fn jitter_pct_stays_within_bound() {
        for _ in 0..200 {
            let jittered = jitter_pct(1_000_000, 10.0);
            assert!((900_000..=1_100_000).contains(&jittered), "{jittered} out of bound");
        }
    }

    #[test]
    fn jitter_delay_stays_within_range() {
        let min = Duration::from_millis(100);
        let max = Duration::from_millis(500);
        for _ in 0..50 {
            let delay = jitter_delay(min, max);
            assert!(delay >= min && delay <= max);
        }
    }

    #[test]
    fn jitter_delay_collapses_when_max_not_greater_than_min() {
        let fixed = Duration::from_millis(250);
        assert_eq!(jitter_delay(fixed, fixed), fixed);
    }

    #[test]
    fn forward_legs_order_spl_then_usdc_then_sol_with_floor_on_sol_only() {
        let legs = forward_legs("SOME_SPL_MINT", 5_000_000);
        assert_eq!(legs[0], ("SOME_SPL_MINT".to_string(), 0));
        assert_eq!(legs[1], (USDC_MINT.to_string(), 0));
        assert_eq!(legs[2], (SOL_MINT.to_string(), 5_000_000));
    }
}
