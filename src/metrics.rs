//! Prometheus metric registration (spec §6 ambient stack). Exposition over
//! HTTP is out of scope; this registers the counters/gauges the rest of the
//! engine updates, grounded on the teacher's `monitoring_alerting.rs`
//! `SystemMetrics` field list, narrowed to the engine's own concerns.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec, HistogramVec};

pub static TRADES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("engine_trades_total", "Trade executions by outcome", &["outcome"]).expect("metric registration")
});

pub static QUORUM_ACKS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!("engine_quorum_acks", "Endpoints acked per quorum broadcast", &["result"]).expect("metric registration")
});

pub static ARM_SESSIONS_ACTIVE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("engine_arm_sessions_active", "Currently armed wallet sessions", &["scope"]).expect("metric registration")
});

pub static COOL_OFFS_TRIGGERED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("engine_cool_offs_triggered_total", "Cool-off windows opened", &["mint"]).expect("metric registration")
});

pub static STRATEGY_TICKS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("engine_strategy_ticks_total", "Strategy runtime ticks by bot", &["bot_id", "outcome"]).expect("metric registration")
});

pub fn record_trade_outcome(outcome: &str) {
    TRADES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_cool_off(mint: &str) {
    COOL_OFFS_TRIGGERED.with_label_values(&[mint]).inc();
}

pub fn record_strategy_tick(bot_id: &str, outcome: &str) {
    STRATEGY_TICKS.with_label_values(&[bot_id, outcome]).inc();
}
