//! Domain error taxonomy for the grid engine.
//!
//! Mirrors the split used elsewhere in this crate: small, data-carrying
//! enums for precise failures (`GridError`), with `anyhow::Result`
//! reserved for the engine/IO boundary where a caller only needs to
//! propagate, log, and possibly retry.

use crate::domain::types::Side;
use rust_decimal::Decimal;
use thiserror::Error;

/// Failures that can occur while building or mutating grid state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid config infeasible: {reason}")]
    ConfigInfeasible { reason: String },

    #[error("invariant violated at level {level}: {reason}")]
    InvariantViolation { level: usize, reason: String },

    #[error("level {level} already has a bound {side:?} order")]
    LevelAlreadyBound { level: usize, side: Side },

    #[error("level {level} has no bound {side:?} order to clear")]
    LevelNotBound { level: usize, side: Side },

    #[error(
        "persisted snapshot schema version {found} is newer than supported version {supported}"
    )]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    #[error("persisted snapshot is corrupt: {reason}")]
    CorruptSnapshot { reason: String },

    #[error("reconciliation could not resolve order {client_order_id}: {reason}")]
    ReconciliationUnresolved {
        client_order_id: String,
        reason: String,
    },

    #[error("engine is not in a state that permits this operation: {reason}")]
    InvalidState { reason: String },
}

/// Failures surfaced by an [`crate::exchange::Exchange`] implementation.
///
/// Each variant is tagged with whether retrying the same request is safe,
/// matching the transient / ambiguous / permanent split used for retry
/// bookkeeping in the engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("transient exchange error: {reason}")]
    Transient { reason: String },

    #[error("ambiguous exchange error (result unknown, do not blindly retry): {reason}")]
    Ambiguous { reason: String },

    #[error("order rejected: {reason}")]
    Rejected { reason: String },

    #[error("order not found: {client_order_id}")]
    OrderNotFound { client_order_id: String },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },
}

impl ExchangeError {
    /// Whether the same request can be safely retried verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Transient { .. })
    }

    /// Whether the outcome of the request is unknown (neither confirmed
    /// placed/cancelled nor confirmed rejected) and must be resolved via
    /// reconciliation rather than blind retry.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, ExchangeError::Ambiguous { .. })
    }
}
