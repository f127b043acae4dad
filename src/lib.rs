//! Multi-tenant strategy execution engine for a Solana DEX-aggregator
//! trading backend.
//!
//! The HTTP API, persistent database exposed to callers, notification
//! delivery, and concrete aggregator/RPC-node clients are out of scope;
//! this crate owns the trading core (C1-C10) behind injected capability
//! traits (`Repository`, `QuoteSource`, `SwapTransactionSource`,
//! `RawTxSender`, `PriceOracle`, `AlertSink`, ...).

pub mod alerts;
pub mod arm_cache;
pub mod caches;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fifo_reducer;
pub mod metrics;
pub mod model;
pub mod monitors;
pub mod repository;
pub mod repository_sqlite;
pub mod rpc_pool;
pub mod safety;
pub mod strategy;
pub mod supervisor;
pub mod swap_adapter;

pub use engine::Engine;
pub use error::EngineError;
pub use repository::Repository;
pub use supervisor::Supervisor;
