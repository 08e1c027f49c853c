//! Grid Core - durable state and execution plumbing for a grid trading bot
//!
//! Owns everything a grid strategy instance needs that isn't the strategy
//! decision logic itself (that lives in `grid-strategies`):
//!
//! - `domain`: the data model (`GridConfig`, `GridLevel`, `GridState`) and
//!   its error taxonomy.
//! - `geometry`: builds a level ladder from a `GridConfig`.
//! - `exchange`: the venue-agnostic `Exchange` trait plus a deterministic
//!   in-memory mock for tests and simulated runs.
//! - `persistence`: atomic, crash-safe snapshotting of `GridState`.
//! - `reconciliation`: phantom/orphan/matched order reconciliation against
//!   an `Exchange`.
//! - `engine`: the per-instance control loop tying all of the above
//!   together.
//! - `resilience`: exponential backoff for exchange-call retries.
//! - `config`: runtime engine settings (persistence directory, timeouts,
//!   backoff policy), loaded from TOML with environment overrides.

pub mod config;
pub mod domain;
pub mod engine;
pub mod exchange;
pub mod geometry;
pub mod persistence;
pub mod reconciliation;
pub mod resilience;

pub use domain::{GridConfig, GridError, GridLevel, GridState, SpacingMode};
pub use engine::{EngineEvent, GridEngine, OperatorCommand};
pub use exchange::Exchange;

pub use anyhow::{Error, Result};

/// Convenience re-exports for crates building on top of `grid-core`.
pub mod prelude {
    pub use crate::config::EngineSettings;
    pub use crate::domain::{
        BoundOrder, EngineStatus, ExchangeError, GridConfig, GridError, GridLevel, GridState,
        GridStatistics, GridStatusView, OrderId, Side, SpacingMode, StopReason,
    };
    pub use crate::engine::{EngineEvent, GridEngine, OperatorCommand};
    pub use crate::exchange::{Exchange, ExchangeOrderId, FillEvent, Ticker};
    pub use crate::{Error, Result};
}
