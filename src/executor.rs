//! Trade Executor (C6), spec §4.6 — the arm-aware core. `exec_trade()`
//! composes twelve small, independently testable steps, mirroring the
//! teacher's `jupiter_executor.rs::execute_swap` calling into
//! `build_order_request`/`extract_output_amount`/`calculate_actual_profit`.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::alerts::AlertEvent;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::model::{MevMode, Side, TpSlRule, Trade, Unit, Wallet, WalletKeyMaterial};
use crate::swap_adapter::{ExecutionParams, Quote};

const DUPLICATE_GUARD_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct TradeMeta {
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub strategy: String,
    pub side: Side,
    pub tp: f64,
    pub sl: f64,
    pub tp_percent: f64,
    pub sl_percent: f64,
    pub sell_pct: f64,
    pub priority_fee_lamports: Option<u64>,
    pub idempotency_key: Option<String>,
    pub idempotency_ttl: Option<Duration>,
    pub bot_id: Option<String>,
}

pub struct ExecTradeRequest {
    pub quote: Quote,
    pub mint: String,
    pub meta: TradeMeta,
    pub simulated: bool,
}

/// Strategies exempt from automatic TP/SL rule installation (spec §4.6 step 10).
fn exempt_from_tpsl(strategy: &str) -> bool {
    matches!(strategy, "rotationBot" | "rebalancer")
}

/// Step 1.
fn check_kill_switch(engine: &Engine) -> Result<(), EngineError> {
    if engine.kill_switch.is_active() {
        return Err(EngineError::KillSwitchActive);
    }
    Ok(())
}

/// Step 2: returns `Some(tx_hash)` to short-circuit unchanged, no new alert.
async fn check_duplicate(engine: &Engine, meta: &TradeMeta, mint: &str) -> Result<Option<String>, EngineError> {
    if meta.side != Side::Buy {
        return Ok(None);
    }
    let recent = engine
        .repo
        .find_recent_trade(meta.user_id, meta.wallet_id, mint, &meta.strategy, DUPLICATE_GUARD_WINDOW)
        .await
        .map_err(EngineError::Repository)?;
    Ok(recent.map(|t| t.tx_hash))
}

enum IdempotencyOutcome {
    Proceed { key: String, ttl: Duration },
    CachedResult(String),
    Suppressed,
}

/// Step 3.
fn derive_idempotency_key(engine: &Engine, meta: &TradeMeta, mint: &str, in_amount: u64) -> IdempotencyOutcome {
    let ttl = meta.idempotency_ttl.unwrap_or(crate::engine::IDEMPOTENCY_RESULT_TTL);
    let key = meta.idempotency_key.clone().unwrap_or_else(|| {
        use sha2::{Digest, Sha256};
        let bucket = chrono::Utc::now().timestamp() / crate::engine::IDEMPOTENCY_WINDOW.as_secs() as i64;
        let mut hasher = Sha256::new();
        hasher.update(meta.user_id.as_bytes());
        hasher.update(meta.wallet_id.as_bytes());
        hasher.update(meta.strategy.as_bytes());
        hasher.update(mint.as_bytes());
        hasher.update(in_amount.to_le_bytes());
        hasher.update(bucket.to_le_bytes());
        hex::encode(hasher.finalize())
    });

    match engine.idempotency.check_and_open(&key, crate::engine::IDEMPOTENCY_WINDOW) {
        crate::caches::IdempotencyCheck::Fresh => IdempotencyOutcome::Proceed { key, ttl },
        crate::caches::IdempotencyCheck::CachedResult(tx_hash) => IdempotencyOutcome::CachedResult(tx_hash),
        crate::caches::IdempotencyCheck::Suppressed => IdempotencyOutcome::Suppressed,
    }
}

/// Step 4.
fn check_cooloff(engine: &Engine, mint: &str) -> Result<(), EngineError> {
    if engine.cool_off.is_active(mint) {
        return Err(EngineError::CoolOffActive(mint.to_string()));
    }
    Ok(())
}

/// Step 5 (arm-aware). Returns a signing keypair; secret intermediates are
/// held only in `Zeroizing` buffers.
pub(crate) async fn acquire_signing_key(engine: &Engine, wallet: &Wallet) -> Result<solana_sdk::signature::Keypair, EngineError> {
    let aad = format!("user:{}:wallet:{}", wallet.user_id, wallet.id);

    let pk: Zeroizing<Vec<u8>> = match &wallet.key_material {
        WalletKeyMaterial::Envelope(blob) => {
            let dek = engine
                .arm_cache
                .get_dek(wallet.user_id, wallet.id)
                .ok_or(EngineError::AutomationNotArmed)?;
            crate::crypto::decrypt_pk(blob, dek.as_ref(), &aad)?
        }
        WalletKeyMaterial::Legacy(ciphertext) => {
            let key = engine.legacy_key.as_ref().ok_or(EngineError::AutomationNotArmed)?;
            crate::crypto::decrypt_legacy(ciphertext, key, &aad)?
        }
    };

    if pk.len() != 64 {
        return Err(EngineError::AuthFailed);
    }
    <solana_sdk::signature::Keypair as std::convert::TryFrom<&[u8]>>::try_from(pk.as_ref()).map_err(|e| {
        tracing::warn!(error = %e, "keypair reconstruction failed");
        EngineError::AuthFailed
    })
}

struct MevParams {
    shared: bool,
    priority_fee_lamports: u64,
    bribery_amount_lamports: u64,
}

/// Step 6.
fn resolve_mev_params(prefs: &crate::model::UserPreferences, meta: &TradeMeta) -> MevParams {
    MevParams {
        shared: prefs.mev_mode == MevMode::Secure,
        priority_fee_lamports: meta.priority_fee_lamports.unwrap_or(prefs.default_priority_fee_lamports),
        bribery_amount_lamports: prefs.bribery_amount_lamports,
    }
}

/// Step 7. Only called when not simulated.
async fn broadcast(
    engine: &Engine,
    quote: Quote,
    keypair: &solana_sdk::signature::Keypair,
    mev: &MevParams,
    quorum_opts: &crate::rpc_pool::QuorumOptions,
) -> Result<String, EngineError> {
    let params = ExecutionParams {
        quote,
        wallet_keypair: keypair,
        shared: mev.shared,
        compute_unit_price_micro_lamports: None,
        tip_lamports: mev.bribery_amount_lamports,
        private_rpc_url: None,
        skip_preflight: false,
    };
    engine
        .swap_adapter
        .execute_swap(params, engine.rpc_pool.as_deref(), quorum_opts)
        .await
        .map(|result| result.signature)
}

struct Enrichment {
    decimals: u8,
    entry_price: f64,
    entry_price_usd: f64,
    usd_value: f64,
}

/// Step 8.
async fn enrich(engine: &Engine, user_id: Uuid, quote: &Quote) -> Result<Enrichment, EngineError> {
    let in_decimals = engine.decimals.get(&quote.input_mint).await.map_err(EngineError::QuoteUnavailable)?;
    let out_decimals = engine.decimals.get(&quote.output_mint).await.map_err(EngineError::QuoteUnavailable)?;
    let in_price_usd = engine.price.get(user_id, &quote.input_mint).await.map_err(EngineError::QuoteUnavailable)?;

    let in_ui = quote.in_amount as f64 / 10f64.powi(in_decimals as i32);
    let out_ui = quote.out_amount as f64 / 10f64.powi(out_decimals as i32);
    let entry_price = if out_ui > 0.0 { in_ui / out_ui } else { 0.0 };
    let entry_price_usd = entry_price * in_price_usd;
    let usd_value = in_ui * in_price_usd;

    Ok(Enrichment {
        decimals: out_decimals,
        entry_price,
        entry_price_usd,
        usd_value,
    })
}

/// Steps 9-11 bundled into one repository write: persist the Trade row,
/// conditionally upsert the TP/SL rule, and return the populated Trade.
#[allow(clippy::too_many_arguments)]
async fn persist_trade(
    engine: &Engine,
    wallet: &Wallet,
    meta: &TradeMeta,
    quote: &Quote,
    tx_hash: &str,
    simulated: bool,
    mev: &MevParams,
    enrichment: &Enrichment,
) -> Result<Trade, EngineError> {
    let trade = Trade {
        id: Uuid::new_v4(),
        mint: quote.output_mint.clone(),
        user_id: meta.user_id,
        wallet_id: meta.wallet_id,
        wallet_label: wallet.label.clone(),
        strategy: meta.strategy.clone(),
        bot_id: meta.bot_id.clone(),
        side: meta.side,
        in_amount: quote.in_amount,
        out_amount: quote.out_amount,
        closed_out_amount: 0,
        entry_price: enrichment.entry_price,
        entry_price_usd: enrichment.entry_price_usd,
        unit: Unit::from_input_mint(&quote.input_mint),
        decimals: enrichment.decimals,
        usd_value: enrichment.usd_value,
        slippage_bps: 0,
        mev_mode: if mev.shared { MevMode::Secure } else { MevMode::Fast },
        priority_fee_lamports: mev.priority_fee_lamports,
        bribery_amount_lamports: mev.bribery_amount_lamports,
        input_mint: quote.input_mint.clone(),
        output_mint: quote.output_mint.clone(),
        tx_hash: tx_hash.to_string(),
        simulated,
        created_at: chrono::Utc::now(),
    };

    engine.repo.insert_trade(trade.clone()).await.map_err(EngineError::Repository)?;

    if (meta.tp != 0.0 || meta.sl != 0.0) && !exempt_from_tpsl(&meta.strategy) {
        engine
            .repo
            .upsert_tp_sl_rule(TpSlRule {
                user_id: meta.user_id,
                wallet_id: meta.wallet_id,
                mint: trade.mint.clone(),
                strategy: meta.strategy.clone(),
                tp: Some(meta.tp).filter(|v| *v != 0.0),
                sl: Some(meta.sl).filter(|v| *v != 0.0),
                tp_percent: meta.tp_percent,
                sl_percent: meta.sl_percent,
                sell_pct: meta.sell_pct,
                entry_price: enrichment.entry_price,
                force: false,
                enabled: true,
                status: "active".to_string(),
                fail_count: 0,
            })
            .await
            .map_err(EngineError::Repository)?;
    }

    Ok(trade)
}

/// Step 12.
async fn emit_alert(engine: &Engine, trade: &Trade) {
    engine
        .alerts
        .notify(AlertEvent::TradeExecuted {
            user_id: trade.user_id,
            wallet_id: trade.wallet_id,
            mint: trade.mint.clone(),
            tx_hash: trade.tx_hash.clone(),
        })
        .await;
}

/// `execTrade`: the single entrypoint orchestrating steps 1-12 in order
/// (spec §4.6). Returns `Ok(Some(tx_hash))`, `Ok(None)` on idempotency
/// suppression, or `Err` otherwise.
pub async fn exec_trade(
    engine: &Arc<Engine>,
    req: ExecTradeRequest,
    quorum_opts: &crate::rpc_pool::QuorumOptions,
) -> Result<Option<String>, EngineError> {
    check_kill_switch(engine)?;

    if let Some(tx_hash) = check_duplicate(engine, &req.meta, &req.mint).await? {
        return Ok(Some(tx_hash));
    }

    let idempotency = derive_idempotency_key(engine, &req.meta, &req.mint, req.quote.in_amount);
    let (idem_key, idem_ttl) = match idempotency {
        IdempotencyOutcome::CachedResult(tx_hash) => return Ok(Some(tx_hash)),
        IdempotencyOutcome::Suppressed => return Ok(None),
        IdempotencyOutcome::Proceed { key, ttl } => (key, ttl),
    };

    check_cooloff(engine, &req.mint)?;

    let wallet = engine.repo.get_wallet(req.meta.wallet_id).await.map_err(EngineError::Repository)?;
    let keypair = acquire_signing_key(engine, &wallet).await?;

    let prefs = engine.repo.get_user_preferences(req.meta.user_id).await.map_err(EngineError::Repository)?;
    let mev = resolve_mev_params(&prefs, &req.meta);

    let tx_hash = if req.simulated {
        format!("SIMULATED-{}", Uuid::new_v4())
    } else {
        match broadcast(engine, req.quote.clone(), &keypair, &mev, quorum_opts).await {
            Ok(sig) => sig,
            Err(e) => {
                engine.cool_off.trigger(&req.mint);
                crate::metrics::record_cool_off(&req.mint);
                return Err(e);
            }
        }
    };

    let enrichment = enrich(engine, req.meta.user_id, &req.quote).await?;
    let trade = persist_trade(engine, &wallet, &req.meta, &req.quote, &tx_hash, req.simulated, &mev, &enrichment).await?;

    engine.idempotency.cache_result(&idem_key, tx_hash.clone(), idem_ttl);
    emit_alert(engine, &trade).await;
    crate::metrics::record_trade_outcome(if req.simulated { "simulated" } else { "live" });

    info!(tx_hash = %tx_hash, mint = %req.mint, simulated = req.simulated, "trade executed");
    Ok(Some(tx_hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exempt_strategies_skip_tpsl() {
        assert!(exempt_from_tpsl("rotationBot"));
        assert!(exempt_from_tpsl("rebalancer"));
        assert!(!exempt_from_tpsl("sniper"));
    }
}
