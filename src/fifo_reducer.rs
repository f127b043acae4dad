//! FIFO Position Reducer (C9), spec §4.9. Closes or trims a position for
//! `(userId, walletId, mint, strategy)`, oldest lot first.

use chrono::Utc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{ClosedTrade, Trade, TriggerType};
use crate::repository::{PositionReductionBatch, Repository};

#[derive(Debug, Clone, Copy)]
pub enum ReduceAmount {
    Percent(f64),
    Amount(u64),
}

pub struct ReduceRequest {
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub mint: String,
    pub strategy: String,
    pub amount: ReduceAmount,
    pub exit_price: f64,
    pub exit_price_usd: f64,
    pub tx_hash: String,
    pub trigger_type: TriggerType,
    pub decimals: u8,
}

fn dust_threshold(decimals: u8) -> u64 {
    let base = 10u64.saturating_pow(decimals as u32);
    ((base as f64) * 0.01) as u64
}

/// Runs the pure slicing algorithm over the currently open lots and returns
/// the batch to apply plus the achieved `toSell`. Split out from the
/// repository round-trip so the slicing logic itself is unit-testable.
pub fn plan_reduction(open_lots: &[Trade], req: &ReduceRequest) -> Result<(PositionReductionBatch, u64), EngineError> {
    let total: u64 = open_lots.iter().map(|l| l.out_amount).sum();
    let mut to_sell = match req.amount {
        ReduceAmount::Amount(a) => a,
        ReduceAmount::Percent(p) => ((total as f64) * p) as u64,
    };
    if to_sell > total {
        to_sell = total;
    }
    let requested = to_sell;

    let dust = dust_threshold(req.decimals);
    let mut updated = Vec::new();
    let mut deleted = Vec::new();
    let mut closed = Vec::new();

    for lot in open_lots {
        if to_sell == 0 {
            break;
        }
        let slice = lot.out_amount.min(to_sell);
        if slice == 0 {
            continue;
        }
        let ratio = slice as f64 / lot.out_amount as f64;
        let cost_trim = (lot.in_amount as f64 * ratio).round() as u64;

        let mut lot = lot.clone();
        lot.out_amount -= slice;
        lot.in_amount = lot.in_amount.saturating_sub(cost_trim);
        lot.closed_out_amount += cost_trim;
        let usd_unit_value = slice as f64 / 10f64.powi(req.decimals as i32) * lot.entry_price_usd;
        lot.usd_value -= usd_unit_value;

        closed.push(ClosedTrade {
            id: Uuid::new_v4(),
            source_trade_id: lot.id,
            mint: req.mint.clone(),
            user_id: req.user_id,
            wallet_id: req.wallet_id,
            wallet_label: lot.wallet_label.clone(),
            strategy: req.strategy.clone(),
            out_amount: slice,
            in_amount: cost_trim,
            exit_price: req.exit_price,
            exit_price_usd: req.exit_price_usd,
            exited_at: Utc::now(),
            trigger_type: req.trigger_type,
            decimals: req.decimals,
            tx_hash: format!("{}-{}", req.tx_hash, Uuid::new_v4()),
        });

        to_sell -= slice;

        if lot.out_amount < dust {
            deleted.push(lot.id);
        } else {
            updated.push(lot);
        }
    }

    let achieved = requested - to_sell;
    let sold_fraction = if total > 0 { achieved as f64 / total as f64 } else { 0.0 };
    let remaining_open = total - achieved;

    let batch = PositionReductionBatch {
        updated_trades: updated,
        deleted_trade_ids: deleted,
        closed_trades: closed,
        rule_sell_pct_scale: Some(1.0 - sold_fraction),
        delete_rules: remaining_open == 0,
        rule_key: (req.user_id, req.wallet_id, req.mint.clone(), req.strategy.clone()),
    };

    Ok((batch, achieved))
}

/// Closes or trims a position, loading state and committing atomically
/// through the repository (spec §4.9: "all in a single repository transaction").
pub async fn reduce_position(repo: &dyn Repository, req: ReduceRequest) -> Result<u64, EngineError> {
    let open_lots = repo
        .load_open_lots(req.user_id, req.wallet_id, &req.mint, &req.strategy)
        .await
        .map_err(EngineError::Repository)?;

    if open_lots.is_empty() {
        return Err(EngineError::InvariantViolation("no open lots to reduce".into()));
    }

    let (batch, achieved) = plan_reduction(&open_lots, &req)?;
    let delete_rules = batch.delete_rules;
    repo.commit_position_reduction(batch).await.map_err(EngineError::Repository)?;

    if delete_rules {
        repo.delete_tp_sl_rules_for(req.user_id, req.wallet_id, &req.mint, &req.strategy)
            .await
            .map_err(EngineError::Repository)?;
    }

    Ok(achieved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MevMode, Side, Unit};

    fn lot(out: u64, inp: u64, created_offset_secs: i64) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            mint: "MINT".into(),
            user_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            wallet_label: "main".into(),
            strategy: "sniper".into(),
            bot_id: None,
            side: Side::Buy,
            in_amount: inp,
            out_amount: out,
            closed_out_amount: 0,
            entry_price: 1.0,
            entry_price_usd: 1.0,
            unit: Unit::Sol,
            decimals: 6,
            usd_value: out as f64,
            slippage_bps: 100,
            mev_mode: MevMode::Fast,
            priority_fee_lamports: 0,
            bribery_amount_lamports: 0,
            input_mint: "So11111111111111111111111111111111111111112".into(),
            output_mint: "MINT".into(),
            tx_hash: "SIG".into(),
            simulated: false,
            created_at: Utc::now() + chrono::Duration::seconds(created_offset_secs),
        }
    }

    #[test]
    fn quarter_close_across_three_lots() {
        // Amounts are scaled well above the 6-decimal dust threshold
        // (1% of 10^6) so the remaining 150_000 units of the second lot
        // stays open instead of being swept up as dust.
        let lots = vec![lot(100_000, 100_000, 0), lot(200_000, 200_000, 1), lot(300_000, 300_000, 2)];
        let req = ReduceRequest {
            user_id: lots[0].user_id,
            wallet_id: lots[0].wallet_id,
            mint: "MINT".into(),
            strategy: "sniper".into(),
            amount: ReduceAmount::Percent(0.25),
            exit_price: 2.0,
            exit_price_usd: 2.0,
            tx_hash: "SIG".into(),
            trigger_type: TriggerType::Manual,
            decimals: 6,
        };
        let (batch, achieved) = plan_reduction(&lots, &req).unwrap();
        assert_eq!(achieved, 150_000);
        assert_eq!(batch.closed_trades.len(), 2);
        assert_eq!(batch.closed_trades[0].out_amount, 100_000);
        assert_eq!(batch.closed_trades[1].out_amount, 50_000);
        assert_eq!(batch.deleted_trade_ids.len(), 1, "first lot fully drained and under dust");
        assert_eq!(batch.updated_trades.len(), 1);
        assert_eq!(batch.updated_trades[0].out_amount, 150_000);
        assert!((batch.rule_sell_pct_scale.unwrap() - 0.75).abs() < 1e-9);
        assert!(!batch.delete_rules);
    }

    #[test]
    fn full_close_deletes_all_lots_and_rules() {
        let lots = vec![lot(10, 10, 0), lot(20, 20, 1)];
        let req = ReduceRequest {
            user_id: lots[0].user_id,
            wallet_id: lots[0].wallet_id,
            mint: "MINT".into(),
            strategy: "sniper".into(),
            amount: ReduceAmount::Percent(1.0),
            exit_price: 2.0,
            exit_price_usd: 2.0,
            tx_hash: "SIG".into(),
            trigger_type: TriggerType::Tp,
            decimals: 6,
        };
        let (batch, achieved) = plan_reduction(&lots, &req).unwrap();
        assert_eq!(achieved, 30);
        assert_eq!(batch.deleted_trade_ids.len(), 2);
        assert!(batch.updated_trades.is_empty());
        assert!(batch.delete_rules);
    }

    #[test]
    fn sold_slices_sum_matches_achieved() {
        let lots = vec![lot(7, 7, 0), lot(13, 13, 1)];
        let req = ReduceRequest {
            user_id: lots[0].user_id,
            wallet_id: lots[0].wallet_id,
            mint: "MINT".into(),
            strategy: "sniper".into(),
            amount: ReduceAmount::Amount(10),
            exit_price: 1.0,
            exit_price_usd: 1.0,
            tx_hash: "SIG".into(),
            trigger_type: TriggerType::Sl,
            decimals: 6,
        };
        let (batch, achieved) = plan_reduction(&lots, &req).unwrap();
        let summed: u64 = batch.closed_trades.iter().map(|c| c.out_amount).sum();
        assert_eq!(summed, achieved);
        assert_eq!(achieved, 10);
    }
}
