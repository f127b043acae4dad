//! Alert sink capability (spec §1/§9: concrete Telegram/Slack/Discord
//! delivery is out of scope; the core only depends on this trait).
//!
//! Grounded on the teacher's `monitoring_alerting.rs` (`Alert`/`AlertSeverity`
//! shapes, webhook fan-out), generalized from a fixed Slack/Discord/PagerDuty
//! trio to a single injected sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub enum AlertEvent {
    TradeExecuted {
        user_id: Uuid,
        wallet_id: Uuid,
        mint: String,
        tx_hash: String,
    },
    TradeFailed {
        user_id: Uuid,
        wallet_id: Uuid,
        mint: String,
        reason: String,
    },
    SafetyRejected {
        user_id: Uuid,
        mint: String,
        reason: String,
    },
    PositionClosed {
        user_id: Uuid,
        mint: String,
        trigger: String,
    },
    StrategyCrashed {
        bot_id: String,
        reason: String,
    },
    KillSwitchToggled {
        active: bool,
    },
}

impl AlertEvent {
    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertEvent::TradeExecuted { .. } | AlertEvent::PositionClosed { .. } => AlertSeverity::Info,
            AlertEvent::TradeFailed { .. } | AlertEvent::SafetyRejected { .. } => AlertSeverity::Warning,
            AlertEvent::StrategyCrashed { .. } | AlertEvent::KillSwitchToggled { .. } => AlertSeverity::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    pub event: AlertEvent,
    pub triggered_at: DateTime<Utc>,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, event: AlertEvent);
}

/// No-op sink for tests and environments with no configured channel.
pub struct NullAlertSink;

#[async_trait]
impl AlertSink for NullAlertSink {
    async fn notify(&self, _event: AlertEvent) {}
}

/// Records every alert in memory; used by tests asserting on notifications.
#[derive(Default)]
pub struct RecordingAlertSink {
    sent: parking_lot::Mutex<Vec<Alert>>,
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn notify(&self, event: AlertEvent) {
        self.sent.lock().push(Alert {
            id: Uuid::new_v4(),
            severity: event.severity(),
            event,
            triggered_at: Utc::now(),
        });
    }
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Alert> {
        self.sent.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sink_captures_severity() {
        let sink = RecordingAlertSink::new();
        sink.notify(AlertEvent::KillSwitchToggled { active: true }).await;
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].severity, AlertSeverity::Critical);
    }
}
