//! End-to-end coverage of the FIFO Position Reducer (C9) driven through
//! the concrete SQLite repository adapter, rather than the in-memory
//! fakes the unit tests use. Exercises insert -> load -> reduce -> commit
//! as one multi-table round trip.

use chrono::Utc;
use strategy_engine::fifo_reducer::{reduce_position, ReduceAmount, ReduceRequest};
use strategy_engine::model::{MevMode, Side, Trade, TriggerType, Unit};
use strategy_engine::repository::Repository;
use strategy_engine::repository_sqlite::SqliteRepository;
use uuid::Uuid;

fn open_lot(user_id: Uuid, wallet_id: Uuid, out_amount: u64, in_amount: u64) -> Trade {
    Trade {
        id: Uuid::new_v4(),
        mint: "MINT".into(),
        user_id,
        wallet_id,
        wallet_label: "main".into(),
        strategy: "sniper".into(),
        bot_id: None,
        side: Side::Buy,
        in_amount,
        out_amount,
        closed_out_amount: 0,
        entry_price: 1.0,
        entry_price_usd: 1.0,
        unit: Unit::Sol,
        decimals: 6,
        usd_value: out_amount as f64,
        slippage_bps: 100,
        mev_mode: MevMode::Fast,
        priority_fee_lamports: 0,
        bribery_amount_lamports: 0,
        input_mint: "So11111111111111111111111111111111111111112".into(),
        output_mint: "MINT".into(),
        tx_hash: "SIG".into(),
        simulated: false,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn reduce_position_trims_oldest_lot_through_sqlite() {
    let repo = SqliteRepository::open_in_memory().expect("open in-memory db");
    let user_id = Uuid::new_v4();
    let wallet_id = Uuid::new_v4();

    repo.insert_trade(open_lot(user_id, wallet_id, 100_000, 100_000)).await.unwrap();
    repo.insert_trade(open_lot(user_id, wallet_id, 200_000, 200_000)).await.unwrap();

    let achieved = reduce_position(
        &repo,
        ReduceRequest {
            user_id,
            wallet_id,
            mint: "MINT".into(),
            strategy: "sniper".into(),
            amount: ReduceAmount::Percent(0.5),
            exit_price: 2.0,
            exit_price_usd: 2.0,
            tx_hash: "EXIT".into(),
            trigger_type: TriggerType::Manual,
            decimals: 6,
        },
    )
    .await
    .unwrap();

    assert_eq!(achieved, 150_000);

    let remaining = repo.load_open_lots(user_id, wallet_id, "MINT", "sniper").await.unwrap();
    assert_eq!(remaining.len(), 1, "oldest lot fully drained, second lot trimmed and kept open");
    assert_eq!(remaining[0].out_amount, 150_000);
    assert!(repo.has_open_lot(user_id, wallet_id, "MINT", "sniper").await.unwrap());
}

#[tokio::test]
async fn reduce_position_full_close_drops_tp_sl_rules() {
    let repo = SqliteRepository::open_in_memory().expect("open in-memory db");
    let user_id = Uuid::new_v4();
    let wallet_id = Uuid::new_v4();

    repo.insert_trade(open_lot(user_id, wallet_id, 50_000, 50_000)).await.unwrap();
    repo.upsert_tp_sl_rule(strategy_engine::model::TpSlRule {
        user_id,
        wallet_id,
        mint: "MINT".into(),
        strategy: "sniper".into(),
        tp: Some(2.0),
        sl: Some(0.5),
        tp_percent: 100.0,
        sl_percent: 50.0,
        sell_pct: 1.0,
        entry_price: 1.0,
        force: false,
        enabled: true,
        status: "active".into(),
        fail_count: 0,
    })
    .await
    .unwrap();

    reduce_position(
        &repo,
        ReduceRequest {
            user_id,
            wallet_id,
            mint: "MINT".into(),
            strategy: "sniper".into(),
            amount: ReduceAmount::Percent(1.0),
            exit_price: 3.0,
            exit_price_usd: 3.0,
            tx_hash: "EXIT".into(),
            trigger_type: TriggerType::Tp,
            decimals: 6,
        },
    )
    .await
    .unwrap();

    assert!(!repo.has_open_lot(user_id, wallet_id, "MINT", "sniper").await.unwrap());
    let rules = repo.list_enabled_tp_sl_rules().await.unwrap();
    assert!(rules.iter().all(|r| r.user_id != user_id), "rule deleted once position fully closed");
}
