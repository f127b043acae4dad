//! Entity types shared by the engine (spec §3). Storage schema is an
//! implementation detail of the `Repository` adapter (§6, §9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MevMode {
    Secure,
    Fast,
}

#[derive(Debug, Clone)]
pub struct UserPreferences {
    pub default_slippage_bps: u16,
    pub mev_mode: MevMode,
    pub default_priority_fee_lamports: u64,
    pub bribery_amount_lamports: u64,
    pub require_confirmations: bool,
    pub auto_buy_amount_lamports: u64,
    pub require_arm_to_trade: bool,
}

/// Sum type for wallet key material (spec §9 Design Notes).
#[derive(Debug, Clone)]
pub enum WalletKeyMaterial {
    Envelope(Box<crate::crypto::EnvelopeBlob>),
    Legacy(String),
}

#[derive(Debug, Clone)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub public_key: String,
    pub is_protected: bool,
    pub key_material: WalletKeyMaterial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Sol,
    Usdc,
    Spl,
}

impl Unit {
    pub fn from_input_mint(mint: &str) -> Self {
        const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
        const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        match mint {
            SOL_MINT => Unit::Sol,
            USDC_MINT => Unit::Usdc,
            _ => Unit::Spl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerType {
    Manual,
    Tp,
    Sl,
    Limit,
    Dca,
}

/// An open position lot (spec §3 "Trade").
#[derive(Debug, Clone)]
pub struct Trade {
    pub id: Uuid,
    pub mint: String,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub wallet_label: String,
    pub strategy: String,
    pub bot_id: Option<String>,
    pub side: Side,
    pub in_amount: u64,
    pub out_amount: u64,
    pub closed_out_amount: u64,
    pub entry_price: f64,
    pub entry_price_usd: f64,
    pub unit: Unit,
    pub decimals: u8,
    pub usd_value: f64,
    pub slippage_bps: u16,
    pub mev_mode: MevMode,
    pub priority_fee_lamports: u64,
    pub bribery_amount_lamports: u64,
    pub input_mint: String,
    pub output_mint: String,
    pub tx_hash: String,
    pub simulated: bool,
    pub created_at: DateTime<Utc>,
}

impl Trade {
    /// Invariant (spec §3): a lot is open iff `outAmount > 0`.
    pub fn is_open(&self) -> bool {
        self.out_amount > 0
    }
}

#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub id: Uuid,
    pub source_trade_id: Uuid,
    pub mint: String,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub wallet_label: String,
    pub strategy: String,
    pub out_amount: u64,
    pub in_amount: u64,
    pub exit_price: f64,
    pub exit_price_usd: f64,
    pub exited_at: DateTime<Utc>,
    pub trigger_type: TriggerType,
    pub decimals: u8,
    pub tx_hash: String,
}

#[derive(Debug, Clone)]
pub struct TpSlRule {
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub mint: String,
    pub strategy: String,
    pub tp: Option<f64>,
    pub sl: Option<f64>,
    pub tp_percent: f64,
    pub sl_percent: f64,
    pub sell_pct: f64,
    pub entry_price: f64,
    pub force: bool,
    pub enabled: bool,
    pub status: String,
    pub fail_count: u32,
}

#[derive(Debug, Clone)]
pub struct LimitOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub mint: String,
    pub side: Side,
    pub target_price: f64,
    pub amount: u64,
    pub force: bool,
    pub filled: bool,
}

#[derive(Debug, Clone)]
pub struct DcaOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub mint: String,
    pub side: Side,
    pub amount: u64,
    pub unit: Unit,
    pub num_buys: u32,
    pub freq_hours: u32,
    pub stop_above: Option<f64>,
    pub stop_below: Option<f64>,
    pub completed_buys: u32,
    pub next_fire_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ScheduledStrategy {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mode: String,
    pub config: serde_json::Value,
    pub launch_at: DateTime<Utc>,
    pub wallet_id: Option<Uuid>,
    pub wallet_label: Option<String>,
    pub limit: Option<u32>,
    pub promoted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotState {
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
    Crashed,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthMetric {
    pub bot_id: String,
    pub last_tick_at: DateTime<Utc>,
    pub loop_duration_ms: u64,
    pub restart_count: u32,
    pub status: BotState,
}
