//! Supervisor (C10), spec §4.10. Owns the `botId -> BotHandle` registry,
//! starts/pauses/resumes/deletes bots, and auto-restarts a crashed bot with
//! bounded exponential backoff.
//!
//! Grounded on the teacher's `bot_coordinator.rs` registry pattern
//! (`Arc<RwLock<HashMap<String, _>>>` plus a background task driving state
//! transitions); generalized from its single bot-coordination queue to a
//! per-bot actor handle with its own `CancellationToken`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::model::BotState;
use crate::rpc_pool::QuorumOptions;
use crate::strategy::{self, BotHandleState, CandidateSource, FundsForwarder, StrategyKind};
use crate::swap_adapter::QuoteSource;

const MAX_RESTART_BACKOFF: Duration = Duration::from_secs(60);
const BASE_RESTART_BACKOFF: Duration = Duration::from_secs(1);

/// One `start()` request: strategy kind, its candidate/quote sources, and
/// whether a crash should auto-restart it.
pub type StartRequest = (StrategyKind, Arc<dyn CandidateSource>, Arc<dyn QuoteSource>, bool);

struct BotHandle {
    state: Arc<BotHandleState>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

#[derive(Debug, Clone)]
pub struct BotStatusView {
    pub bot_id: String,
    pub state: BotState,
    pub restart_count: u32,
    pub trades_executed: u32,
}

#[derive(Debug, Clone)]
pub struct DetailedBotStatusView {
    pub bot_id: String,
    pub state: BotState,
    pub restart_count: u32,
    pub trades_executed: u32,
    pub consecutive_errors: u32,
    pub last_tick_at: Option<chrono::DateTime<chrono::Utc>>,
    pub loop_duration_ms: u64,
}

/// Registry of running bots (spec §4.10). One process holds exactly one
/// `Supervisor`, composed alongside the `Engine`.
pub struct Supervisor {
    engine: Arc<Engine>,
    quorum_opts: QuorumOptions,
    forwarder: Arc<dyn FundsForwarder>,
    bots: RwLock<HashMap<String, BotHandle>>,
}

impl Supervisor {
    pub fn new(engine: Arc<Engine>, quorum_opts: QuorumOptions, forwarder: Arc<dyn FundsForwarder>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            quorum_opts,
            forwarder,
            bots: RwLock::new(HashMap::new()),
        })
    }

    /// Starts one bot, auto-restarting it on crash when `auto_restart` is
    /// set (spec §4.10 "crash capture with bounded exponential backoff").
    pub fn start(
        self: &Arc<Self>,
        kind: StrategyKind,
        candidate_source: Arc<dyn CandidateSource>,
        quote_source: Arc<dyn QuoteSource>,
        auto_restart: bool,
    ) -> String {
        let bot_id = format!("bot-{}", Uuid::new_v4());
        self.spawn_bot(bot_id.clone(), kind, candidate_source, quote_source, auto_restart);
        bot_id
    }

    /// Atomic-list start: if any bot in the batch fails to spawn, every bot
    /// already started in this call is torn down (spec §4.10
    /// "rollback on partial failure").
    pub fn start_multi(
        self: &Arc<Self>,
        requests: Vec<StartRequest>,
    ) -> Result<Vec<String>, String> {
        let mut started: Vec<String> = Vec::with_capacity(requests.len());
        for (kind, candidate_source, quote_source, auto_restart) in requests {
            let bot_id = self.start(kind, candidate_source, quote_source, auto_restart);
            if self.status(&bot_id).is_none() {
                for id in &started {
                    self.delete(id);
                }
                return Err(format!("failed to start bot during startMulti, rolled back {} bots", started.len()));
            }
            started.push(bot_id);
        }
        Ok(started)
    }

    fn spawn_bot(
        self: &Arc<Self>,
        bot_id: String,
        kind: StrategyKind,
        candidate_source: Arc<dyn CandidateSource>,
        quote_source: Arc<dyn QuoteSource>,
        auto_restart: bool,
    ) {
        let state = BotHandleState::new(bot_id.clone());
        let cancel = CancellationToken::new();
        let sup = Arc::clone(self);
        let id_for_task = bot_id.clone();
        let state_for_task = Arc::clone(&state);
        let cancel_for_task = cancel.clone();

        let task = tokio::spawn(async move {
            let mut backoff = BASE_RESTART_BACKOFF;
            loop {
                strategy::run_bot_loop(
                    Arc::clone(&sup.engine),
                    id_for_task.clone(),
                    kind.clone(),
                    Arc::clone(&candidate_source),
                    Arc::clone(&quote_source),
                    Arc::clone(&sup.forwarder),
                    sup.quorum_opts.clone(),
                    Arc::clone(&state_for_task),
                    cancel_for_task.clone(),
                )
                .await;

                if cancel_for_task.is_cancelled() || state_for_task.state() != BotState::Crashed || !auto_restart {
                    return;
                }

                {
                    let mut snapshot = state_for_task.inner.write();
                    snapshot.restart_count += 1;
                    snapshot.consecutive_errors = 0;
                }
                warn!(bot_id = %id_for_task, backoff_secs = backoff.as_secs(), "bot crashed, restarting after backoff");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = cancel_for_task.cancelled() => return,
                }
                backoff = (backoff * 2).min(MAX_RESTART_BACKOFF);
            }
        });

        self.bots.write().insert(bot_id.clone(), BotHandle { state, cancel, task });
        info!(bot_id = %bot_id, "bot started");
    }

    pub fn pause(&self, bot_id: &str) -> bool {
        let bots = self.bots.read();
        match bots.get(bot_id) {
            Some(handle) if handle.state.state() == BotState::Running => {
                handle.state.set_state(BotState::Paused);
                true
            }
            _ => false,
        }
    }

    pub fn resume(&self, bot_id: &str) -> bool {
        let bots = self.bots.read();
        match bots.get(bot_id) {
            Some(handle) if handle.state.state() == BotState::Paused => {
                handle.state.set_state(BotState::Running);
                true
            }
            _ => false,
        }
    }

    /// Cancels and removes a bot; idempotent on an unknown `bot_id`.
    pub fn delete(&self, bot_id: &str) -> bool {
        let removed = self.bots.write().remove(bot_id);
        match removed {
            Some(handle) => {
                handle.state.set_state(BotState::Stopping);
                handle.cancel.cancel();
                handle.task.abort();
                info!(bot_id, "bot deleted");
                true
            }
            None => false,
        }
    }

    pub fn status(&self, bot_id: &str) -> Option<BotStatusView> {
        let bots = self.bots.read();
        let handle = bots.get(bot_id)?;
        let snapshot = handle.state.inner.read();
        Some(BotStatusView {
            bot_id: snapshot.bot_id.clone(),
            state: snapshot.state,
            restart_count: snapshot.restart_count,
            trades_executed: snapshot.trades_executed,
        })
    }

    pub fn detailed_status(&self, bot_id: &str) -> Option<DetailedBotStatusView> {
        let bots = self.bots.read();
        let handle = bots.get(bot_id)?;
        let snapshot = handle.state.inner.read();
        Some(DetailedBotStatusView {
            bot_id: snapshot.bot_id.clone(),
            state: snapshot.state,
            restart_count: snapshot.restart_count,
            trades_executed: snapshot.trades_executed,
            consecutive_errors: snapshot.consecutive_errors,
            last_tick_at: snapshot.last_tick_at,
            loop_duration_ms: snapshot.loop_duration_ms,
        })
    }

    pub fn list_statuses(&self) -> Vec<BotStatusView> {
        let bots = self.bots.read();
        bots.values()
            .map(|handle| {
                let snapshot = handle.state.inner.read();
                BotStatusView {
                    bot_id: snapshot.bot_id.clone(),
                    state: snapshot.state,
                    restart_count: snapshot.restart_count,
                    trades_executed: snapshot.trades_executed,
                }
            })
            .collect()
    }

    /// Shuts down every registered bot (process shutdown path).
    pub fn shutdown_all(&self) {
        let ids: Vec<String> = self.bots.read().keys().cloned().collect();
        for id in ids {
            self.delete(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        let mut backoff = BASE_RESTART_BACKOFF;
        for _ in 0..10 {
            backoff = (backoff * 2).min(MAX_RESTART_BACKOFF);
        }
        assert_eq!(backoff, MAX_RESTART_BACKOFF);
    }
}
