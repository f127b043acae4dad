//! Always-On Monitors (C8), spec §4.8. Four independent loops, each on its
//! own `tokio::time::interval`, cancelled through a shared
//! `CancellationToken` sourced from the Supervisor. Every firing is
//! idempotent: a monitor marks the underlying row before handing off to C6
//! or C9, using the Repository's compare-and-set methods so a missed
//! cancellation never double-fires a trade.
//!
//! Grounded on the teacher's `mempool_monitor.rs` poll-loop shape
//! (interval ticker + cancellation-aware `tokio::select!`); the
//! `CancellationToken` itself is an ecosystem enrichment the teacher does
//! not use but is the standard primitive for this coordination pattern.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::executor::{self, ExecTradeRequest, TradeMeta};
use crate::fifo_reducer::{self, ReduceAmount, ReduceRequest};
use crate::model::{Side, TpSlRule, TriggerType};
use crate::rpc_pool::QuorumOptions;
use crate::swap_adapter::QuoteRequest;

const LIMIT_MONITOR_INTERVAL: Duration = Duration::from_secs(15);
const DCA_MONITOR_INTERVAL: Duration = Duration::from_secs(60);
const TPSL_MONITOR_INTERVAL: Duration = Duration::from_secs(60);
const SCHEDULE_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

async fn tick_guard(interval: &mut tokio::time::Interval, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = interval.tick() => true,
        _ = cancel.cancelled() => false,
    }
}

/// Limit-order monitor: ~15s cadence, fires a buy/sell through C6 when an
/// order's target price is crossed (spec §4.8).
pub async fn run_limit_monitor(engine: Arc<Engine>, quorum_opts: QuorumOptions, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(LIMIT_MONITOR_INTERVAL);
    loop {
        if !tick_guard(&mut ticker, &cancel).await {
            return;
        }
        let due = match engine.repo.list_due_limit_orders(chrono::Utc::now()).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "limit monitor: failed to list due orders");
                continue;
            }
        };
        for order in due {
            let price = match engine.price.get(order.user_id, &order.mint).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, order_id = %order.id, "limit monitor: price unavailable");
                    continue;
                }
            };
            if !limit_order_crossed(order.side, price, order.target_price) {
                continue;
            }

            match engine.repo.mark_limit_order_filled(order.id).await {
                Ok(true) => {}
                Ok(false) => continue, // already claimed by a concurrent firing
                Err(e) => {
                    warn!(error = %e, order_id = %order.id, "limit monitor: mark failed, skipping");
                    continue;
                }
            }

            let quote_req = QuoteRequest {
                input_mint: sol_or_mint(order.side, &order.mint, true),
                output_mint: sol_or_mint(order.side, &order.mint, false),
                amount: order.amount,
                slippage_bps: None,
                allowed_dexes: None,
                excluded_dexes: None,
                force_fresh: true,
            };
            let quote = match engine.swap_adapter.get_quote(&quote_req).await {
                Ok(q) => q,
                Err(e) => {
                    warn!(error = %e, order_id = %order.id, "limit monitor: quote failed");
                    continue;
                }
            };

            let req = ExecTradeRequest {
                quote,
                mint: order.mint.clone(),
                meta: TradeMeta {
                    user_id: order.user_id,
                    wallet_id: order.wallet_id,
                    strategy: "limitOrder".to_string(),
                    side: order.side,
                    tp: 0.0,
                    sl: 0.0,
                    tp_percent: 0.0,
                    sl_percent: 0.0,
                    sell_pct: 1.0,
                    priority_fee_lamports: None,
                    idempotency_key: None,
                    idempotency_ttl: None,
                    bot_id: None,
                },
                simulated: false,
            };
            if let Err(e) = executor::exec_trade(&engine, req, &quorum_opts).await {
                warn!(error = %e, order_id = %order.id, "limit monitor: execution failed");
            }
        }
    }
}

fn sol_or_mint(side: Side, mint: &str, is_input: bool) -> String {
    const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
    match (side, is_input) {
        (Side::Buy, true) | (Side::Sell, false) => SOL_MINT.to_string(),
        _ => mint.to_string(),
    }
}

/// Decides whether a limit order's target price has crossed (spec §4.8:
/// "fire when side=buy ∧ price ≤ target or side=sell ∧ price ≥ target").
fn limit_order_crossed(side: Side, price: f64, target_price: f64) -> bool {
    match side {
        Side::Buy => price <= target_price,
        Side::Sell => price >= target_price,
    }
}

/// Decides whether a DCA order's price-band guard should skip this slot
/// (spec §4.8: "check price-band guards (stopAbove/Below)").
fn dca_outside_band(price: f64, stop_above: Option<f64>, stop_below: Option<f64>) -> bool {
    stop_above.is_some_and(|stop| price > stop) || stop_below.is_some_and(|stop| price < stop)
}

/// DCA monitor: ~60s cadence, fires the next scheduled buy/sell leg and
/// advances or closes the order (spec §4.8).
pub async fn run_dca_monitor(engine: Arc<Engine>, quorum_opts: QuorumOptions, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(DCA_MONITOR_INTERVAL);
    loop {
        if !tick_guard(&mut ticker, &cancel).await {
            return;
        }
        let due = match engine.repo.list_due_dca_orders(chrono::Utc::now()).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "dca monitor: failed to list due orders");
                continue;
            }
        };
        for order in due {
            let price = match engine.price.get(order.user_id, &order.mint).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, order_id = %order.id, "dca monitor: price unavailable");
                    continue;
                }
            };
            if dca_outside_band(price, order.stop_above, order.stop_below) {
                continue; // outside the price band this slot; retry next tick without consuming a tranche
            }

            let next_fire_at = chrono::Utc::now() + chrono::Duration::hours(order.freq_hours as i64);
            if let Err(e) = engine.repo.advance_dca_order(order.id, next_fire_at).await {
                warn!(error = %e, order_id = %order.id, "dca monitor: advance failed, skipping firing");
                continue;
            }

            let tranche_amount = order.amount / order.num_buys.max(1) as u64;
            let quote_req = QuoteRequest {
                input_mint: sol_or_mint(order.side, &order.mint, true),
                output_mint: sol_or_mint(order.side, &order.mint, false),
                amount: tranche_amount,
                slippage_bps: None,
                allowed_dexes: None,
                excluded_dexes: None,
                force_fresh: true,
            };
            let quote = match engine.swap_adapter.get_quote(&quote_req).await {
                Ok(q) => q,
                Err(e) => {
                    warn!(error = %e, order_id = %order.id, "dca monitor: quote failed");
                    continue;
                }
            };

            let req = ExecTradeRequest {
                quote,
                mint: order.mint.clone(),
                meta: TradeMeta {
                    user_id: order.user_id,
                    wallet_id: order.wallet_id,
                    strategy: "dca".to_string(),
                    side: order.side,
                    tp: 0.0,
                    sl: 0.0,
                    tp_percent: 0.0,
                    sl_percent: 0.0,
                    sell_pct: 1.0,
                    priority_fee_lamports: None,
                    idempotency_key: None,
                    idempotency_ttl: None,
                    bot_id: None,
                },
                simulated: false,
            };
            if let Err(e) = executor::exec_trade(&engine, req, &quorum_opts).await {
                warn!(error = %e, order_id = %order.id, "dca monitor: execution failed");
                continue;
            }

            if order.completed_buys + 1 >= order.num_buys {
                if let Err(e) = engine.repo.close_dca_order(order.id).await {
                    warn!(error = %e, order_id = %order.id, "dca monitor: close failed");
                }
            }
        }
    }
}

/// TP/SL monitor: ~60s cadence, delegates to the FIFO Position Reducer
/// (C9) for any rule whose entry price has moved past its trigger (spec
/// §4.8, §4.9).
pub async fn run_tpsl_monitor(engine: Arc<Engine>, quorum_opts: QuorumOptions, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(TPSL_MONITOR_INTERVAL);
    loop {
        if !tick_guard(&mut ticker, &cancel).await {
            return;
        }
        let rules = match engine.repo.list_enabled_tp_sl_rules().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "tpsl monitor: failed to list rules");
                continue;
            }
        };
        for rule in rules {
            let current_price = match engine.price.get(rule.user_id, &rule.mint).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, mint = %rule.mint, "tpsl monitor: price unavailable");
                    continue;
                }
            };

            let Some(trigger_type) = tp_sl_trigger(&rule, current_price) else { continue };

            let open_lots = match engine
                .repo
                .load_open_lots(rule.user_id, rule.wallet_id, &rule.mint, &rule.strategy)
                .await
            {
                Ok(lots) => lots,
                Err(e) => {
                    warn!(error = %e, mint = %rule.mint, "tpsl monitor: failed to load open lots");
                    continue;
                }
            };
            if open_lots.is_empty() {
                continue;
            }
            let decimals = open_lots[0].decimals;

            let quote_req = QuoteRequest {
                input_mint: rule.mint.clone(),
                output_mint: "So11111111111111111111111111111111111111112".to_string(),
                amount: (open_lots.iter().map(|t| t.out_amount as f64 * rule.sell_pct).sum::<f64>()) as u64,
                slippage_bps: None,
                allowed_dexes: None,
                excluded_dexes: None,
                force_fresh: true,
            };
            let quote = match engine.swap_adapter.get_quote(&quote_req).await {
                Ok(q) => q,
                Err(e) => {
                    warn!(error = %e, mint = %rule.mint, "tpsl monitor: quote failed");
                    if let Err(e) = engine.repo.increment_tp_sl_fail_count(rule.user_id, rule.wallet_id, &rule.mint, &rule.strategy).await {
                        warn!(error = %e, "tpsl monitor: failed to record fail count");
                    }
                    continue;
                }
            };
            let req = ExecTradeRequest {
                quote,
                mint: rule.mint.clone(),
                meta: TradeMeta {
                    user_id: rule.user_id,
                    wallet_id: rule.wallet_id,
                    strategy: rule.strategy.clone(),
                    side: Side::Sell,
                    tp: 0.0,
                    sl: 0.0,
                    tp_percent: 0.0,
                    sl_percent: 0.0,
                    sell_pct: rule.sell_pct,
                    priority_fee_lamports: None,
                    idempotency_key: None,
                    idempotency_ttl: None,
                    bot_id: None,
                },
                simulated: false,
            };

            match executor::exec_trade(&engine, req, &quorum_opts).await {
                Ok(Some(tx_hash)) => {
                    let reduce_req = ReduceRequest {
                        user_id: rule.user_id,
                        wallet_id: rule.wallet_id,
                        mint: rule.mint.clone(),
                        strategy: rule.strategy.clone(),
                        amount: ReduceAmount::Percent(rule.sell_pct),
                        exit_price: current_price,
                        exit_price_usd: current_price,
                        tx_hash,
                        trigger_type,
                        decimals,
                    };
                    if let Err(e) = fifo_reducer::reduce_position(engine.repo.as_ref(), reduce_req).await {
                        warn!(error = %e, mint = %rule.mint, "tpsl monitor: position reduction failed");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, mint = %rule.mint, "tpsl monitor: execution failed");
                    if let Err(e) = engine.repo.increment_tp_sl_fail_count(rule.user_id, rule.wallet_id, &rule.mint, &rule.strategy).await {
                        warn!(error = %e, "tpsl monitor: failed to record fail count");
                    }
                }
            }
        }
    }
}

/// Decides whether a rule's TP or SL has crossed (spec §4.9): an absolute
/// `tp`/`sl` price target takes precedence over the percent-from-entry form.
fn tp_sl_trigger(rule: &TpSlRule, current_price: f64) -> Option<TriggerType> {
    let tp_hit = match rule.tp {
        Some(tp) => current_price >= tp,
        None => rule.tp_percent > 0.0 && current_price >= rule.entry_price * (1.0 + rule.tp_percent / 100.0),
    };
    if tp_hit {
        return Some(TriggerType::Tp);
    }
    let sl_hit = match rule.sl {
        Some(sl) => current_price <= sl,
        None => rule.sl_percent > 0.0 && current_price <= rule.entry_price * (1.0 - rule.sl_percent / 100.0),
    };
    if sl_hit {
        return Some(TriggerType::Sl);
    }
    None
}

/// Schedule watchdog: ~10s cadence, promotes due scheduled strategies by
/// asking the Supervisor to start them (spec §4.8, §4.10).
pub async fn run_schedule_monitor<F>(engine: Arc<Engine>, cancel: CancellationToken, mut promote: F)
where
    F: FnMut(crate::model::ScheduledStrategy) + Send,
{
    let mut ticker = tokio::time::interval(SCHEDULE_MONITOR_INTERVAL);
    loop {
        if !tick_guard(&mut ticker, &cancel).await {
            return;
        }
        let due = match engine.repo.list_due_schedules(chrono::Utc::now()).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "schedule monitor: failed to list due schedules");
                continue;
            }
        };
        for schedule in due {
            match engine.repo.mark_schedule_promoted(schedule.id).await {
                Ok(true) => {
                    info!(schedule_id = %schedule.id, "promoting scheduled strategy");
                    promote(schedule);
                }
                Ok(false) => continue,
                Err(e) => warn!(error = %e, schedule_id = %schedule.id, "schedule monitor: mark failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_buy_crosses_at_or_below_target() {
        assert!(limit_order_crossed(Side::Buy, 0.99, 1.0));
        assert!(limit_order_crossed(Side::Buy, 1.0, 1.0));
        assert!(!limit_order_crossed(Side::Buy, 1.01, 1.0));
    }

    #[test]
    fn limit_sell_crosses_at_or_above_target() {
        assert!(limit_order_crossed(Side::Sell, 1.0, 1.0));
        assert!(limit_order_crossed(Side::Sell, 1.01, 1.0));
        assert!(!limit_order_crossed(Side::Sell, 0.99, 1.0));
    }

    #[test]
    fn dca_band_rejects_above_stop_above() {
        assert!(dca_outside_band(2.0, Some(1.5), None));
        assert!(!dca_outside_band(1.0, Some(1.5), None));
    }

    #[test]
    fn dca_band_rejects_below_stop_below() {
        assert!(dca_outside_band(0.5, None, Some(0.8)));
        assert!(!dca_outside_band(1.0, None, Some(0.8)));
    }

    #[test]
    fn dca_band_passes_when_no_guards_set() {
        assert!(!dca_outside_band(999.0, None, None));
    }
}
