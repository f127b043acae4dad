//! Error taxonomy shared across the engine (spec §7).

use thiserror::Error;

/// Coarse classification of a failed swap, used to decide whether a
/// strategy should retry, cool off, or halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapFailureClass {
    /// Caller-side cause: insufficient funds, slippage exceeded.
    User,
    /// Network-side cause: stale blockhash, rate limit, timeout.
    Net,
    Unknown,
}

impl SwapFailureClass {
    pub fn classify(detail: &str) -> Self {
        let lower = detail.to_ascii_lowercase();
        if lower.contains("slippage") || lower.contains("insufficient") {
            SwapFailureClass::User
        } else if lower.contains("blockhash")
            || lower.contains("rate limit")
            || lower.contains("timeout")
            || lower.contains("429")
        {
            SwapFailureClass::Net
        } else {
            SwapFailureClass::Unknown
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("kill switch active")]
    KillSwitchActive,

    #[error("automation not armed for wallet")]
    AutomationNotArmed,

    #[error("cool-off active for mint {0}")]
    CoolOffActive(String),

    #[error("safety check failed: {0}")]
    SafetyFailed(String),

    #[error("quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("swap failed ({class:?}): {detail}")]
    SwapFailed {
        class: SwapFailureClass,
        detail: String,
    },

    #[error("rpc quorum timeout: {acked}/{needed} endpoints acked")]
    QuorumTimeout { acked: usize, needed: usize },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("bad input: {0}")]
    BadInput(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error(transparent)]
    Repository(#[from] anyhow::Error),
}

impl EngineError {
    /// True for failures that must never be retried by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::KillSwitchActive | EngineError::AutomationNotArmed)
    }

    /// Stable error code surfaced to users (spec §7: "terse message and a stable error code").
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::KillSwitchActive => "KILL_SWITCH_ACTIVE",
            EngineError::AutomationNotArmed => "AUTOMATION_NOT_ARMED",
            EngineError::CoolOffActive(_) => "COOL_OFF_ACTIVE",
            EngineError::SafetyFailed(_) => "SAFETY_FAILED",
            EngineError::QuoteUnavailable(_) => "QUOTE_UNAVAILABLE",
            EngineError::SwapFailed { .. } => "SWAP_FAILED",
            EngineError::QuorumTimeout { .. } => "QUORUM_TIMEOUT",
            EngineError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            EngineError::BadInput(_) => "BAD_INPUT",
            EngineError::AuthFailed => "AUTH_FAILED",
            EngineError::Repository(_) => "REPOSITORY_ERROR",
        }
    }
}
