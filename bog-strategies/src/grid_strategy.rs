//! The grid strategy: delegates every [`Strategy`] method straight into a
//! [`GridEngine`], which already implements the full reconcile / place /
//! fill-react / risk-trigger logic. This wrapper exists so `grid-bins` can
//! hold a `Box<dyn Strategy>` without knowing which exchange type backs it.

use crate::strategy::{EngineContext, Strategy};
use async_trait::async_trait;
use grid_core::engine::OperatorCommand;
use grid_core::prelude::*;
use std::sync::Arc;

pub struct GridStrategy<E: Exchange + 'static> {
    engine: GridEngine<E>,
}

impl<E: Exchange + 'static> GridStrategy<E> {
    pub fn new(state: GridState, exchange: Arc<E>, settings: EngineSettings) -> Self {
        Self {
            engine: GridEngine::new(state, exchange, settings),
        }
    }

    /// Access to the underlying engine's event queue runner, for binaries
    /// that want to drive the engine directly rather than through the
    /// `Strategy` boundary (e.g. a single-strategy simulation).
    pub fn engine_mut(&mut self) -> &mut GridEngine<E> {
        &mut self.engine
    }
}

#[async_trait]
impl<E: Exchange + 'static> Strategy for GridStrategy<E> {
    async fn on_start(&mut self, ctx: &mut EngineContext) -> Result<(), GridError> {
        let _ = ctx;
        self.engine.start().await?;
        Ok(())
    }

    async fn on_tick(&mut self, ctx: &mut EngineContext, ticker: Ticker) -> Result<(), GridError> {
        let _ = ctx;
        self.engine.on_tick(ticker).await
    }

    async fn on_fill(&mut self, ctx: &mut EngineContext, fill: FillEvent) -> Result<(), GridError> {
        let _ = ctx;
        self.engine.on_fill(fill).await
    }

    async fn on_stop(&mut self, ctx: &mut EngineContext, reason: StopReason) -> Result<(), GridError> {
        let _ = ctx;
        match reason {
            StopReason::OperatorRequested => self.engine.stop_by_operator().await,
            other => self.engine.stop(other).await,
        }
    }

    async fn on_teardown(&mut self, ctx: &mut EngineContext) -> Result<(), GridError> {
        let _ = ctx;
        self.engine.teardown().await
    }

    fn snapshot(&self) -> GridStatusView {
        self.engine.state.status_view()
    }
}

/// Convenience alias matching the signature of the operator-command arm of
/// `grid_core::EngineEvent`, so a binary's command-handling code doesn't
/// need to import `grid_core::engine` directly just to say "stop".
pub const STOP: OperatorCommand = OperatorCommand::Stop;
