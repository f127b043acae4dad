//! Repository capability (spec §9 Design Notes): the core never depends on
//! a concrete database client. One concrete adapter (`repository_sqlite`)
//! is shipped so the trait is exercisable in tests; the production,
//! HTTP-facing database remains out of scope per spec §1.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{ClosedTrade, DcaOrder, LimitOrder, ScheduledStrategy, Trade, TpSlRule, UserPreferences, Wallet};

/// Everything the FIFO reducer (C9) needs applied atomically: lot
/// mutations/deletions, new closed-trade rows, and the TP/SL rebalance.
/// The concrete adapter applies this batch inside one transaction so the
/// "all or nothing" invariant in spec §4.9 holds without leaking a
/// connection-specific transaction type across the trait boundary.
#[derive(Debug, Clone, Default)]
pub struct PositionReductionBatch {
    pub updated_trades: Vec<Trade>,
    pub deleted_trade_ids: Vec<Uuid>,
    pub closed_trades: Vec<ClosedTrade>,
    pub rule_sell_pct_scale: Option<f64>,
    pub delete_rules: bool,
    pub rule_key: (Uuid, Uuid, String, String),
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_user_preferences(&self, user_id: Uuid) -> anyhow::Result<UserPreferences>;
    async fn get_active_wallet(&self, user_id: Uuid) -> anyhow::Result<Wallet>;
    async fn get_wallet(&self, wallet_id: Uuid) -> anyhow::Result<Wallet>;

    /// Step 2 of C6: look for a buy-side trade for the same key within `window`.
    async fn find_recent_trade(
        &self,
        user_id: Uuid,
        wallet_id: Uuid,
        mint: &str,
        strategy: &str,
        window: std::time::Duration,
    ) -> anyhow::Result<Option<Trade>>;

    async fn insert_trade(&self, trade: Trade) -> anyhow::Result<()>;

    async fn upsert_tp_sl_rule(&self, rule: TpSlRule) -> anyhow::Result<()>;
    async fn list_enabled_tp_sl_rules(&self) -> anyhow::Result<Vec<TpSlRule>>;
    async fn increment_tp_sl_fail_count(&self, user_id: Uuid, wallet_id: Uuid, mint: &str, strategy: &str) -> anyhow::Result<()>;

    async fn list_due_limit_orders(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<LimitOrder>>;
    /// Compare-and-set: marks an order filled iff it is still unfilled.
    async fn mark_limit_order_filled(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn list_due_dca_orders(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<DcaOrder>>;
    async fn advance_dca_order(&self, id: Uuid, next_fire_at: DateTime<Utc>) -> anyhow::Result<()>;
    async fn close_dca_order(&self, id: Uuid) -> anyhow::Result<()>;

    async fn list_due_schedules(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<ScheduledStrategy>>;
    /// Compare-and-set: marks a schedule promoted iff it is still pending.
    async fn mark_schedule_promoted(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Ascending-creation-time open lots for a position key (spec §4.9 step 1).
    async fn load_open_lots(&self, user_id: Uuid, wallet_id: Uuid, mint: &str, strategy: &str) -> anyhow::Result<Vec<Trade>>;

    /// Applies a FIFO reduction batch inside a single transaction.
    async fn commit_position_reduction(&self, batch: PositionReductionBatch) -> anyhow::Result<()>;

    /// True if any open lot remains for the key, used by the TP/SL deletion invariant.
    async fn has_open_lot(&self, user_id: Uuid, wallet_id: Uuid, mint: &str, strategy: &str) -> anyhow::Result<bool>;
    async fn delete_tp_sl_rules_for(&self, user_id: Uuid, wallet_id: Uuid, mint: &str, strategy: &str) -> anyhow::Result<()>;
}
