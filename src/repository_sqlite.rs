//! SQLite `Repository` adapter. The production, HTTP-facing database is
//! out of scope (spec §1); this is the one concrete implementation that
//! exercises the trait, following the teacher's `database_tracker.rs`
//! shape: a `rusqlite::Connection` behind a blocking `Mutex`, schema
//! loaded once via `include_str!`.

use std::str::FromStr;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::crypto::EnvelopeBlob;
use crate::model::{
    DcaOrder, LimitOrder, MevMode, ScheduledStrategy, Side, Trade, TpSlRule, Unit, UserPreferences, Wallet, WalletKeyMaterial,
};
use crate::repository::{PositionReductionBatch, Repository};

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open sqlite database")?;
        conn.execute_batch(include_str!("../schema.sql")).context("failed to apply schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite database")?;
        conn.execute_batch(include_str!("../schema.sql")).context("failed to apply schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn parse_side(s: &str) -> Result<Side> {
    match s {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(anyhow::anyhow!("unknown side {other}")),
    }
}

fn unit_str(unit: Unit) -> &'static str {
    match unit {
        Unit::Sol => "sol",
        Unit::Usdc => "usdc",
        Unit::Spl => "spl",
    }
}

fn parse_unit(s: &str) -> Result<Unit> {
    match s {
        "sol" => Ok(Unit::Sol),
        "usdc" => Ok(Unit::Usdc),
        "spl" => Ok(Unit::Spl),
        other => Err(anyhow::anyhow!("unknown unit {other}")),
    }
}

fn mev_mode_str(mode: MevMode) -> &'static str {
    match mode {
        MevMode::Secure => "secure",
        MevMode::Fast => "fast",
    }
}

fn parse_mev_mode(s: &str) -> Result<MevMode> {
    match s {
        "secure" => Ok(MevMode::Secure),
        "fast" => Ok(MevMode::Fast),
        other => Err(anyhow::anyhow!("unknown mev mode {other}")),
    }
}

fn trigger_type_str(t: crate::model::TriggerType) -> &'static str {
    use crate::model::TriggerType::*;
    match t {
        Manual => "manual",
        Tp => "tp",
        Sl => "sl",
        Limit => "limit",
        Dca => "dca",
    }
}

fn row_to_trade(row: &rusqlite::Row) -> rusqlite::Result<Trade> {
    let side_s: String = row.get("side")?;
    let unit_s: String = row.get("unit")?;
    let mev_s: String = row.get("mev_mode")?;
    let created_at_s: String = row.get("created_at")?;
    Ok(Trade {
        id: Uuid::from_str(&row.get::<_, String>("id")?).unwrap_or_default(),
        mint: row.get("mint")?,
        user_id: Uuid::from_str(&row.get::<_, String>("user_id")?).unwrap_or_default(),
        wallet_id: Uuid::from_str(&row.get::<_, String>("wallet_id")?).unwrap_or_default(),
        wallet_label: row.get("wallet_label")?,
        strategy: row.get("strategy")?,
        bot_id: row.get("bot_id")?,
        side: parse_side(&side_s).unwrap_or(Side::Buy),
        in_amount: row.get::<_, i64>("in_amount")? as u64,
        out_amount: row.get::<_, i64>("out_amount")? as u64,
        closed_out_amount: row.get::<_, i64>("closed_out_amount")? as u64,
        entry_price: row.get("entry_price")?,
        entry_price_usd: row.get("entry_price_usd")?,
        unit: parse_unit(&unit_s).unwrap_or(Unit::Spl),
        decimals: row.get::<_, i64>("decimals")? as u8,
        usd_value: row.get("usd_value")?,
        slippage_bps: row.get::<_, i64>("slippage_bps")? as u16,
        mev_mode: parse_mev_mode(&mev_s).unwrap_or(MevMode::Fast),
        priority_fee_lamports: row.get::<_, i64>("priority_fee_lamports")? as u64,
        bribery_amount_lamports: row.get::<_, i64>("bribery_amount_lamports")? as u64,
        input_mint: row.get("input_mint")?,
        output_mint: row.get("output_mint")?,
        tx_hash: row.get("tx_hash")?,
        simulated: row.get("simulated")?,
        created_at: created_at_s.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
    })
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn get_user_preferences(&self, user_id: Uuid) -> Result<UserPreferences> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT default_slippage_bps, mev_mode, default_priority_fee_lamports, bribery_amount_lamports,
                    require_confirmations, auto_buy_amount_lamports, require_arm_to_trade
             FROM users WHERE id = ?1",
            params![user_id.to_string()],
            |row| {
                let mev_s: String = row.get(1)?;
                Ok(UserPreferences {
                    default_slippage_bps: row.get::<_, i64>(0)? as u16,
                    mev_mode: parse_mev_mode(&mev_s).unwrap_or(MevMode::Fast),
                    default_priority_fee_lamports: row.get::<_, i64>(2)? as u64,
                    bribery_amount_lamports: row.get::<_, i64>(3)? as u64,
                    require_confirmations: row.get(4)?,
                    auto_buy_amount_lamports: row.get::<_, i64>(5)? as u64,
                    require_arm_to_trade: row.get(6)?,
                })
            },
        )
        .context("user preferences not found")
    }

    async fn get_active_wallet(&self, user_id: Uuid) -> Result<Wallet> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, user_id, label, public_key, is_protected, key_kind, key_material
             FROM wallets WHERE user_id = ?1 AND is_active = 1 LIMIT 1",
            params![user_id.to_string()],
            row_to_wallet,
        )
        .context("no active wallet for user")
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Wallet> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, user_id, label, public_key, is_protected, key_kind, key_material
             FROM wallets WHERE id = ?1",
            params![wallet_id.to_string()],
            row_to_wallet,
        )
        .context("wallet not found")
    }

    async fn find_recent_trade(
        &self,
        user_id: Uuid,
        wallet_id: Uuid,
        mint: &str,
        strategy: &str,
        window: std::time::Duration,
    ) -> Result<Option<Trade>> {
        let conn = self.conn.lock().unwrap();
        let cutoff = (Utc::now() - chrono::Duration::from_std(window).unwrap_or_default()).to_rfc3339();
        conn.query_row(
            "SELECT * FROM trades
             WHERE user_id = ?1 AND wallet_id = ?2 AND mint = ?3 AND strategy = ?4 AND side = 'buy' AND created_at >= ?5
             ORDER BY created_at DESC LIMIT 1",
            params![user_id.to_string(), wallet_id.to_string(), mint, strategy, cutoff],
            row_to_trade,
        )
        .optional()
        .context("failed to query recent trade")
    }

    async fn insert_trade(&self, trade: Trade) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO trades (
                id, mint, user_id, wallet_id, wallet_label, strategy, bot_id, side, in_amount, out_amount,
                closed_out_amount, entry_price, entry_price_usd, unit, decimals, usd_value, slippage_bps,
                mev_mode, priority_fee_lamports, bribery_amount_lamports, input_mint, output_mint, tx_hash,
                simulated, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25)",
            params![
                trade.id.to_string(),
                trade.mint,
                trade.user_id.to_string(),
                trade.wallet_id.to_string(),
                trade.wallet_label,
                trade.strategy,
                trade.bot_id,
                side_str(trade.side),
                trade.in_amount as i64,
                trade.out_amount as i64,
                trade.closed_out_amount as i64,
                trade.entry_price,
                trade.entry_price_usd,
                unit_str(trade.unit),
                trade.decimals as i64,
                trade.usd_value,
                trade.slippage_bps as i64,
                mev_mode_str(trade.mev_mode),
                trade.priority_fee_lamports as i64,
                trade.bribery_amount_lamports as i64,
                trade.input_mint,
                trade.output_mint,
                trade.tx_hash,
                trade.simulated,
                trade.created_at.to_rfc3339(),
            ],
        )
        .context("failed to insert trade")?;
        Ok(())
    }

    async fn upsert_tp_sl_rule(&self, rule: TpSlRule) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tp_sl_rules (user_id, wallet_id, mint, strategy, tp, sl, tp_percent, sl_percent, sell_pct, entry_price, force, enabled, status, fail_count)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
             ON CONFLICT(user_id, wallet_id, mint, strategy) DO UPDATE SET
                tp = excluded.tp, sl = excluded.sl, tp_percent = excluded.tp_percent, sl_percent = excluded.sl_percent,
                sell_pct = excluded.sell_pct, entry_price = excluded.entry_price, force = excluded.force,
                enabled = excluded.enabled, status = excluded.status, fail_count = excluded.fail_count",
            params![
                rule.user_id.to_string(),
                rule.wallet_id.to_string(),
                rule.mint,
                rule.strategy,
                rule.tp,
                rule.sl,
                rule.tp_percent,
                rule.sl_percent,
                rule.sell_pct,
                rule.entry_price,
                rule.force,
                rule.enabled,
                rule.status,
                rule.fail_count,
            ],
        )
        .context("failed to upsert tp/sl rule")?;
        Ok(())
    }

    async fn list_enabled_tp_sl_rules(&self) -> Result<Vec<TpSlRule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM tp_sl_rules WHERE enabled = 1")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TpSlRule {
                    user_id: Uuid::from_str(&row.get::<_, String>("user_id")?).unwrap_or_default(),
                    wallet_id: Uuid::from_str(&row.get::<_, String>("wallet_id")?).unwrap_or_default(),
                    mint: row.get("mint")?,
                    strategy: row.get("strategy")?,
                    tp: row.get("tp")?,
                    sl: row.get("sl")?,
                    tp_percent: row.get("tp_percent")?,
                    sl_percent: row.get("sl_percent")?,
                    sell_pct: row.get("sell_pct")?,
                    entry_price: row.get("entry_price")?,
                    force: row.get("force")?,
                    enabled: row.get("enabled")?,
                    status: row.get("status")?,
                    fail_count: row.get::<_, i64>("fail_count")? as u32,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list tp/sl rules")?;
        Ok(rows)
    }

    async fn increment_tp_sl_fail_count(&self, user_id: Uuid, wallet_id: Uuid, mint: &str, strategy: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tp_sl_rules SET fail_count = fail_count + 1 WHERE user_id = ?1 AND wallet_id = ?2 AND mint = ?3 AND strategy = ?4",
            params![user_id.to_string(), wallet_id.to_string(), mint, strategy],
        )
        .context("failed to increment tp/sl fail count")?;
        Ok(())
    }

    async fn list_due_limit_orders(&self, _now: DateTime<Utc>) -> Result<Vec<LimitOrder>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM limit_orders WHERE filled = 0")?;
        let rows = stmt
            .query_map([], |row| {
                let side_s: String = row.get("side")?;
                Ok(LimitOrder {
                    id: Uuid::from_str(&row.get::<_, String>("id")?).unwrap_or_default(),
                    user_id: Uuid::from_str(&row.get::<_, String>("user_id")?).unwrap_or_default(),
                    wallet_id: Uuid::from_str(&row.get::<_, String>("wallet_id")?).unwrap_or_default(),
                    mint: row.get("mint")?,
                    side: parse_side(&side_s).unwrap_or(Side::Buy),
                    target_price: row.get("target_price")?,
                    amount: row.get::<_, i64>("amount")? as u64,
                    force: row.get("force")?,
                    filled: row.get("filled")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list due limit orders")?;
        Ok(rows)
    }

    async fn mark_limit_order_filled(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute("UPDATE limit_orders SET filled = 1 WHERE id = ?1 AND filled = 0", params![id.to_string()])
            .context("failed to mark limit order filled")?;
        Ok(updated == 1)
    }

    async fn list_due_dca_orders(&self, now: DateTime<Utc>) -> Result<Vec<DcaOrder>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM dca_orders WHERE closed = 0 AND next_fire_at <= ?1")?;
        let rows = stmt
            .query_map(params![now.to_rfc3339()], |row| {
                let side_s: String = row.get("side")?;
                let unit_s: String = row.get("unit")?;
                let next_fire_s: String = row.get("next_fire_at")?;
                Ok(DcaOrder {
                    id: Uuid::from_str(&row.get::<_, String>("id")?).unwrap_or_default(),
                    user_id: Uuid::from_str(&row.get::<_, String>("user_id")?).unwrap_or_default(),
                    wallet_id: Uuid::from_str(&row.get::<_, String>("wallet_id")?).unwrap_or_default(),
                    mint: row.get("mint")?,
                    side: parse_side(&side_s).unwrap_or(Side::Buy),
                    amount: row.get::<_, i64>("amount")? as u64,
                    unit: parse_unit(&unit_s).unwrap_or(Unit::Spl),
                    num_buys: row.get::<_, i64>("num_buys")? as u32,
                    freq_hours: row.get::<_, i64>("freq_hours")? as u32,
                    stop_above: row.get("stop_above")?,
                    stop_below: row.get("stop_below")?,
                    completed_buys: row.get::<_, i64>("completed_buys")? as u32,
                    next_fire_at: next_fire_s.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list due dca orders")?;
        Ok(rows)
    }

    async fn advance_dca_order(&self, id: Uuid, next_fire_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE dca_orders SET completed_buys = completed_buys + 1, next_fire_at = ?2 WHERE id = ?1",
            params![id.to_string(), next_fire_at.to_rfc3339()],
        )
        .context("failed to advance dca order")?;
        Ok(())
    }

    async fn close_dca_order(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE dca_orders SET closed = 1 WHERE id = ?1", params![id.to_string()])
            .context("failed to close dca order")?;
        Ok(())
    }

    async fn list_due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledStrategy>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM schedules WHERE promoted = 0 AND launch_at <= ?1")?;
        let rows = stmt
            .query_map(params![now.to_rfc3339()], |row| {
                let config_s: String = row.get("config")?;
                let launch_at_s: String = row.get("launch_at")?;
                let wallet_id_s: Option<String> = row.get("wallet_id")?;
                Ok(ScheduledStrategy {
                    id: Uuid::from_str(&row.get::<_, String>("id")?).unwrap_or_default(),
                    user_id: Uuid::from_str(&row.get::<_, String>("user_id")?).unwrap_or_default(),
                    mode: row.get("mode")?,
                    config: serde_json::from_str(&config_s).unwrap_or(serde_json::Value::Null),
                    launch_at: launch_at_s.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
                    wallet_id: wallet_id_s.and_then(|s| Uuid::from_str(&s).ok()),
                    wallet_label: row.get("wallet_label")?,
                    limit: row.get::<_, Option<i64>>("trade_limit")?.map(|v| v as u32),
                    promoted: row.get("promoted")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list due schedules")?;
        Ok(rows)
    }

    async fn mark_schedule_promoted(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn
            .execute("UPDATE schedules SET promoted = 1 WHERE id = ?1 AND promoted = 0", params![id.to_string()])
            .context("failed to mark schedule promoted")?;
        Ok(updated == 1)
    }

    async fn load_open_lots(&self, user_id: Uuid, wallet_id: Uuid, mint: &str, strategy: &str) -> Result<Vec<Trade>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM trades WHERE user_id = ?1 AND wallet_id = ?2 AND mint = ?3 AND strategy = ?4 AND out_amount > 0 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id.to_string(), wallet_id.to_string(), mint, strategy], row_to_trade)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load open lots")?;
        Ok(rows)
    }

    async fn commit_position_reduction(&self, batch: PositionReductionBatch) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().context("failed to begin reduction transaction")?;

        for trade in &batch.updated_trades {
            tx.execute(
                "UPDATE trades SET out_amount = ?2, in_amount = ?3, closed_out_amount = ?4, usd_value = ?5 WHERE id = ?1",
                params![
                    trade.id.to_string(),
                    trade.out_amount as i64,
                    trade.in_amount as i64,
                    trade.closed_out_amount as i64,
                    trade.usd_value,
                ],
            )
            .context("failed to update trimmed lot")?;
        }
        for id in &batch.deleted_trade_ids {
            tx.execute("DELETE FROM trades WHERE id = ?1", params![id.to_string()])
                .context("failed to delete drained lot")?;
        }
        for closed in &batch.closed_trades {
            tx.execute(
                "INSERT INTO closed_trades (
                    id, source_trade_id, mint, user_id, wallet_id, wallet_label, strategy,
                    out_amount, in_amount, exit_price, exit_price_usd, exited_at, trigger_type, decimals, tx_hash
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
                params![
                    closed.id.to_string(),
                    closed.source_trade_id.to_string(),
                    closed.mint,
                    closed.user_id.to_string(),
                    closed.wallet_id.to_string(),
                    closed.wallet_label,
                    closed.strategy,
                    closed.out_amount as i64,
                    closed.in_amount as i64,
                    closed.exit_price,
                    closed.exit_price_usd,
                    closed.exited_at.to_rfc3339(),
                    trigger_type_str(closed.trigger_type),
                    closed.decimals as i64,
                    closed.tx_hash,
                ],
            )
            .context("failed to insert closed trade")?;
        }

        let (user_id, wallet_id, mint, strategy) = &batch.rule_key;
        if batch.delete_rules {
            tx.execute(
                "DELETE FROM tp_sl_rules WHERE user_id = ?1 AND wallet_id = ?2 AND mint = ?3 AND strategy = ?4",
                params![user_id.to_string(), wallet_id.to_string(), mint, strategy],
            )
            .context("failed to delete tp/sl rule after full close")?;
        } else if let Some(scale) = batch.rule_sell_pct_scale {
            tx.execute(
                "UPDATE tp_sl_rules SET sell_pct = sell_pct * ?5 WHERE user_id = ?1 AND wallet_id = ?2 AND mint = ?3 AND strategy = ?4",
                params![user_id.to_string(), wallet_id.to_string(), mint, strategy, scale],
            )
            .context("failed to rescale tp/sl rule")?;
        }

        tx.commit().context("failed to commit position reduction")?;
        Ok(())
    }

    async fn has_open_lot(&self, user_id: Uuid, wallet_id: Uuid, mint: &str, strategy: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM trades WHERE user_id = ?1 AND wallet_id = ?2 AND mint = ?3 AND strategy = ?4 AND out_amount > 0",
            params![user_id.to_string(), wallet_id.to_string(), mint, strategy],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn delete_tp_sl_rules_for(&self, user_id: Uuid, wallet_id: Uuid, mint: &str, strategy: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM tp_sl_rules WHERE user_id = ?1 AND wallet_id = ?2 AND mint = ?3 AND strategy = ?4",
            params![user_id.to_string(), wallet_id.to_string(), mint, strategy],
        )
        .context("failed to delete tp/sl rules")?;
        Ok(())
    }
}

fn row_to_wallet(row: &rusqlite::Row) -> rusqlite::Result<Wallet> {
    let key_kind: String = row.get("key_kind")?;
    let key_material_raw: String = row.get("key_material")?;
    let key_material = if key_kind == "legacy" {
        WalletKeyMaterial::Legacy(key_material_raw)
    } else {
        let blob: EnvelopeBlob = serde_json::from_str(&key_material_raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        WalletKeyMaterial::Envelope(Box::new(blob))
    };
    Ok(Wallet {
        id: Uuid::from_str(&row.get::<_, String>("id")?).unwrap_or_default(),
        user_id: Uuid::from_str(&row.get::<_, String>("user_id")?).unwrap_or_default(),
        label: row.get("label")?,
        public_key: row.get("public_key")?,
        is_protected: row.get("is_protected")?,
        key_material,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_user(repo: &SqliteRepository, user_id: Uuid) {
        let conn = repo.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (id, default_slippage_bps, mev_mode, default_priority_fee_lamports, bribery_amount_lamports, require_confirmations, auto_buy_amount_lamports, require_arm_to_trade)
             VALUES (?1, 100, 'fast', 5000, 0, 0, 1000000, 1)",
            params![user_id.to_string()],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn round_trips_user_preferences() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        seed_user(&repo, user_id);
        let prefs = repo.get_user_preferences(user_id).await.unwrap();
        assert_eq!(prefs.default_slippage_bps, 100);
        assert_eq!(prefs.mev_mode, MevMode::Fast);
    }

    #[tokio::test]
    async fn limit_order_fill_is_compare_and_set() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        {
            let conn = repo.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO limit_orders (id, user_id, wallet_id, mint, side, target_price, amount, force, filled)
                 VALUES (?1, ?2, ?3, 'MINT', 'buy', 1.0, 1000, 0, 0)",
                params![id.to_string(), Uuid::new_v4().to_string(), Uuid::new_v4().to_string()],
            )
            .unwrap();
        }
        assert!(repo.mark_limit_order_filled(id).await.unwrap());
        assert!(!repo.mark_limit_order_filled(id).await.unwrap());
    }
}
