//! The capability boundary a binary actually drives.
//!
//! Grounded on this workspace's own module-split style (one trait per
//! capability, implementations kept in sibling files) but shaped as a
//! dynamic-dispatch `async_trait` rather than the const-generic strategy
//! traits the rest of the pack favors for hot-path dispatch: a grid
//! instance's decision loop runs once per tick or fill, not once per
//! market-data message, so the cost of a vtable call is immaterial next to
//! the awaited exchange round trip it usually triggers.

use async_trait::async_trait;
use grid_core::prelude::*;

/// Identifying context a strategy is constructed with. Kept separate from
/// `GridConfig` because a future strategy might not be grid-shaped at all
/// (e.g. a single-sided market maker) while still needing an instance id
/// and symbol to log and persist under.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub instance_id: String,
    pub symbol: String,
}

/// One running strategy instance. `grid-bins` holds a `Box<dyn Strategy>`
/// per instance and drives it from a single event loop; which concrete
/// strategy backs a given symbol is a runtime choice, not a compile-time
/// one.
///
/// `ctx` is threaded through every call rather than stored once at
/// construction so a future multi-instance runner can move a strategy
/// between contexts (e.g. a paper-trading rehearsal re-run under a
/// different instance id) without reconstructing it.
#[async_trait]
pub trait Strategy: Send {
    /// Reconciles against the exchange and places any missing initial
    /// orders. Must be called once before any `on_tick`/`on_fill`, and
    /// again after a detected reconnect.
    async fn on_start(&mut self, ctx: &mut EngineContext) -> Result<(), GridError>;

    async fn on_tick(&mut self, ctx: &mut EngineContext, ticker: Ticker) -> Result<(), GridError>;

    async fn on_fill(&mut self, ctx: &mut EngineContext, fill: FillEvent) -> Result<(), GridError>;

    /// Cancels all open orders and transitions to the terminal status named
    /// by `reason`.
    async fn on_stop(&mut self, ctx: &mut EngineContext, reason: StopReason) -> Result<(), GridError>;

    /// Stops the instance (if not already stopped) and deletes its
    /// persisted snapshot. Irreversible — there is no `on_resume`; a new
    /// instance must be started from a fresh `GridConfig`.
    async fn on_teardown(&mut self, ctx: &mut EngineContext) -> Result<(), GridError>;

    /// A read-only summary suitable for the status CLI or a future API
    /// surface. Never blocks on I/O.
    fn snapshot(&self) -> GridStatusView;
}
