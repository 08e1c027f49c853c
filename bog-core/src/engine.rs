//! The per-instance control loop: reconciliation, initial placement, tick
//! handling, fill handling, counter-order placement, and risk triggers.
//!
//! Async and I/O-bound by nature (every mutating step may need to await an
//! exchange RPC), so this is built around a `tokio` task draining a single
//! `mpsc` channel rather than this crate's const-generic, zero-allocation
//! `engine::generic` HFT loop, which targets a shared-memory feed and has
//! no use for awaiting network calls at all.

use crate::config::EngineSettings;
use crate::domain::errors::GridError;
use crate::domain::grid_level::{BoundOrder, PendingRetry};
use crate::domain::grid_state::{EngineStatus, GridState, StopReason};
use crate::domain::types::{OrderId, Side};
use crate::exchange::{Exchange, ExchangeError, FillEvent, Ticker};
use crate::persistence::PersistenceStore;
use crate::reconciliation::{self, ReconciliationStats};
use crate::resilience::ExponentialBackoff;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// An operator-issued command, delivered on the same event queue as
/// market data and fills so it is processed in turn rather than
/// pre-empting in-flight work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Stop,
    /// Stops (if not already stopped) and deletes the persisted snapshot.
    /// Terminal for the instance: `resume` is not supported (spec §6) — a
    /// new instance must be started from a fresh `GridConfig`.
    Teardown,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Ticker(Ticker),
    Fill(FillEvent),
    Operator(OperatorCommand),
}

/// Drives one [`GridState`] against one [`Exchange`]. Owns the state
/// exclusively: nothing else mutates it while this engine is running,
/// satisfying the single-writer requirement by construction rather than by
/// a lock.
pub struct GridEngine<E: Exchange> {
    pub state: GridState,
    exchange: Arc<E>,
    settings: EngineSettings,
    store: PersistenceStore,
    retry_backoff: ExponentialBackoff,
    consecutive_failures: u32,
    last_fill_sequence: u64,
}

impl<E: Exchange> GridEngine<E> {
    pub fn new(state: GridState, exchange: Arc<E>, settings: EngineSettings) -> Self {
        let store = PersistenceStore::new(
            settings
                .persistence_dir
                .join(format!("{}.json", state.instance_id)),
        );
        let retry_backoff = ExponentialBackoff::with_config(settings.backoff_config());
        Self {
            state,
            exchange,
            settings,
            store,
            retry_backoff,
            consecutive_failures: 0,
            last_fill_sequence: 0,
        }
    }

    pub fn persist(&mut self) -> Result<(), GridError> {
        self.store.save(&mut self.state)
    }

    /// Number of consecutive exchange-call failures since the last
    /// success. The status view surfaces this once it reaches
    /// `settings.surface_failure_after`.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn mark_success(&mut self) {
        self.consecutive_failures = 0;
        self.retry_backoff.reset();
    }

    fn mark_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.settings.surface_failure_after {
            warn!(
                failures = self.consecutive_failures,
                "consecutive exchange-call failures exceeded threshold"
            );
        }
    }

    /// Wraps an exchange call with this engine's configured request
    /// timeout, surfacing an expired call as `ExchangeError::Ambiguous`
    /// (the outcome is genuinely unknown, not a confirmed failure — the
    /// same treatment reconciliation gives a dropped response).
    async fn call<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, ExchangeError>>,
    ) -> Result<T, ExchangeError> {
        match tokio::time::timeout(self.settings.request_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Ambiguous {
                reason: "request timed out".into(),
            }),
        }
    }

    /// Runs reconciliation, replays any fills discovered in the process,
    /// places initial orders, then transitions to `Running`. Must be
    /// called once before the event loop starts, and again after any
    /// detected reconnect.
    pub async fn start(&mut self) -> Result<ReconciliationStats, GridError> {
        self.state.set_status(EngineStatus::Reconciling)?;
        let (stats, mut synthesized) =
            reconciliation::reconcile(&mut self.state, self.exchange.as_ref()).await?;
        info!(
            instance_id = %self.state.instance_id,
            matched = stats.matched,
            phantoms_cleared = stats.phantoms_cleared,
            phantoms_filled = stats.phantoms_resolved_as_filled,
            orphans_cancelled = stats.orphans_cancelled,
            orphans_adopted = stats.orphans_adopted,
            "reconciliation complete"
        );

        // Lowest level first: a sell fill's counter-buy can only lower
        // this level's committed capital, so processing buys-before-sells
        // in level order never manufactures a spurious capital-bound trip.
        synthesized.sort_by_key(|f| f.level);
        for fill in synthesized {
            self.apply_fill(fill.level, fill.side, fill.price, fill.quantity, fill.fee)
                .await?;
        }

        self.state.set_status(EngineStatus::Running)?;
        self.initial_placement().await?;
        self.persist()?;
        Ok(stats)
    }

    /// The price a level's counter-sell should execute at: the level
    /// immediately above (one grid step of profit), or this level's own
    /// price if it's already the top rung of the ladder.
    fn counter_sell_price(&self, index: usize) -> Decimal {
        self.state
            .levels
            .get(index + 1)
            .map(|l| l.price)
            .unwrap_or(self.state.levels[index].price)
    }

    /// Places a buy at every active level strictly below the current mid
    /// price that isn't already mid-cycle, and a counter-sell for any
    /// level whose buy has filled but which has no bound sell yet (the
    /// crash-recovery case: the fill landed but the counter-order never
    /// made it onto the exchange before the process died). Levels already
    /// bound on either side (e.g. confirmed matched during reconciliation)
    /// are left untouched. No sells are placed above mid on a cold start —
    /// a level only sells inventory it actually holds.
    async fn initial_placement(&mut self) -> Result<(), GridError> {
        let symbol = self.state.config.symbol.clone();
        let ticker = self
            .call(self.exchange.get_ticker(&symbol))
            .await
            .map_err(exchange_to_grid_error)?;
        let mid = ticker.mid();
        self.state.last_known_price = Some(mid);

        let indices: Vec<usize> = self.state.active_levels().map(|l| l.index).collect();

        for index in indices {
            let (price, quantity, has_buy, has_sell, filled_buy) = {
                let level = self.state.level_mut(index)?;
                (
                    level.price,
                    level.quantity,
                    level.buy.is_some(),
                    level.sell.is_some(),
                    level.filled_buy,
                )
            };

            if filled_buy && !has_buy && !has_sell {
                let sell_price = self.counter_sell_price(index);
                self.place_order_at(index, Side::Sell, sell_price, quantity)
                    .await?;
            } else if !filled_buy && price < mid && !has_buy && !has_sell {
                self.place_order_at(index, Side::Buy, price, quantity)
                    .await?;
            }
        }
        Ok(())
    }

    /// Places a fresh order bound to level `index`, minting a new client
    /// order id for it. `price`/`quantity` are the order's actual
    /// execution terms, which for a counter-sell are the level above's
    /// price even though the binding lives on the originating level's
    /// slot (see `counter_sell_price`). A buy is checked against the
    /// capital bound first and deferred (not sent at all) if it would be
    /// breached.
    async fn place_order_at(
        &mut self,
        index: usize,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<(), GridError> {
        if side == Side::Buy {
            if let Err(e) = self.state.check_capital_bound(price * quantity) {
                warn!(level = index, error = %e, "deferring buy placement: capital bound would be exceeded");
                self.state.level_mut(index)?.pending_retry = Some(PendingRetry {
                    side,
                    price,
                    quantity,
                    client_order_id: None,
                });
                return Ok(());
            }
        }

        let epoch = self.state.level_mut(index)?.next_epoch();
        let client_order_id = OrderId::new(&self.state.instance_id, index, side, epoch);
        self.send_order(index, side, client_order_id, price, quantity)
            .await
    }

    /// Sends a placement request under `client_order_id`, which may be
    /// brand new (from [`place_order_at`]) or a resumed retry of one
    /// already sent once. On success the binding is recorded; on a
    /// transient or ambiguous outcome the *same* id is kept for the next
    /// retry — idempotent client order ids make resending (or querying)
    /// under it safe, and reconciliation resolves it if it never actually
    /// landed (§7: an ambiguous result is never re-placed under a new id).
    async fn send_order(
        &mut self,
        index: usize,
        side: Side,
        client_order_id: OrderId,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<(), GridError> {
        let symbol = self.state.config.symbol.clone();

        match self
            .call(
                self.exchange
                    .place_order(client_order_id.as_str(), &symbol, side, price, quantity),
            )
            .await
        {
            Ok(exchange_order_id) => {
                self.mark_success();
                let order = BoundOrder {
                    client_order_id,
                    exchange_order_id,
                    side,
                    price,
                    quantity,
                };
                match side {
                    Side::Buy => self.state.bind_buy(index, order)?,
                    Side::Sell => self.state.bind_sell(index, order)?,
                }
                Ok(())
            }
            Err(ExchangeError::Ambiguous { reason }) => {
                warn!(level = index, %reason, "placement outcome ambiguous, deferring to a resolve-by-id retry");
                self.mark_failure();
                self.state.level_mut(index)?.pending_retry = Some(PendingRetry {
                    side,
                    price,
                    quantity,
                    client_order_id: Some(client_order_id),
                });
                Ok(())
            }
            Err(ExchangeError::Transient { reason }) => {
                warn!(level = index, %reason, "transient placement failure, will retry under the same id");
                self.mark_failure();
                self.state.level_mut(index)?.pending_retry = Some(PendingRetry {
                    side,
                    price,
                    quantity,
                    client_order_id: Some(client_order_id),
                });
                Ok(())
            }
            Err(e @ ExchangeError::Rejected { .. }) => {
                error!(level = index, error = %e, "order permanently rejected");
                self.mark_failure();
                Ok(())
            }
            Err(e) => Err(exchange_to_grid_error(e)),
        }
    }

    /// Attempts to resolve or (re-)send every level carrying a
    /// `pending_retry`. A retry that already has a client order id is
    /// resumed under that exact id; one that never made an attempt (e.g.
    /// deferred by the capital bound) goes through `place_order_at` as a
    /// fresh placement. Returns the backoff delay the caller should wait
    /// before calling again if any levels still need retry.
    pub async fn retry_pending_placements(
        &mut self,
    ) -> Result<Option<std::time::Duration>, GridError> {
        let pending: Vec<(usize, PendingRetry)> = self
            .state
            .levels
            .iter()
            .filter_map(|l| l.pending_retry.clone().map(|r| (l.index, r)))
            .collect();

        for (index, retry) in pending {
            self.state.level_mut(index)?.pending_retry = None;
            match retry.client_order_id {
                Some(client_order_id) => {
                    self.send_order(index, retry.side, client_order_id, retry.price, retry.quantity)
                        .await?
                }
                None => {
                    self.place_order_at(index, retry.side, retry.price, retry.quantity)
                        .await?
                }
            }
        }

        if self.state.levels.iter().any(|l| l.pending_retry.is_some()) {
            Ok(self.retry_backoff.next_delay())
        } else {
            self.retry_backoff.reset();
            Ok(None)
        }
    }

    /// Stop-loss triggers when the mid price falls `stop_loss_pct` below
    /// the grid's lower bound; take-profit triggers when it rises
    /// `take_profit_pct` above the upper bound. Either cancels all open
    /// orders and stops the engine.
    async fn check_risk_triggers(&mut self, ticker: Ticker) -> Result<bool, GridError> {
        let mid = ticker.mid();
        if let Some(pct) = self.state.config.stop_loss_pct {
            let threshold = self.state.config.lower_bound * (Decimal::ONE - pct);
            if mid < threshold {
                warn!(mid = %mid, threshold = %threshold, "stop-loss triggered");
                self.stop(StopReason::StopLossTriggered).await?;
                return Ok(true);
            }
        }
        if let Some(pct) = self.state.config.take_profit_pct {
            let threshold = self.state.config.upper_bound * (Decimal::ONE + pct);
            if mid > threshold {
                warn!(mid = %mid, threshold = %threshold, "take-profit triggered");
                self.stop(StopReason::TakeProfitTriggered).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn on_tick(&mut self, ticker: Ticker) -> Result<(), GridError> {
        if !self.state.status.is_quoting() {
            return Ok(());
        }
        self.state.last_known_price = Some(ticker.mid());
        if self.check_risk_triggers(ticker).await? {
            return Ok(());
        }
        self.retry_pending_placements().await?;
        self.persist()?;
        Ok(())
    }

    /// Books a fill against its level and places that level's counter
    /// order: a buy fill binds a sell at the same level (priced at the
    /// level above, or this level's own price at the top boundary); a
    /// sell fill binds a fresh buy back at this level's own price.
    async fn apply_fill(
        &mut self,
        index: usize,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        fee: Decimal,
    ) -> Result<(), GridError> {
        match side {
            Side::Buy => {
                self.state.record_buy_fill(index, price, fee)?;
                let sell_price = self.counter_sell_price(index);
                let sell_quantity = self.state.levels[index].quantity;
                self.place_order_at(index, Side::Sell, sell_price, sell_quantity)
                    .await?;
            }
            Side::Sell => {
                self.state
                    .record_sell_fill(index, price, quantity, fee)?;
                let (buy_price, buy_quantity) = {
                    let level = &self.state.levels[index];
                    (level.price, level.quantity)
                };
                self.place_order_at(index, Side::Buy, buy_price, buy_quantity)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn on_fill(&mut self, fill: FillEvent) -> Result<(), GridError> {
        if fill.sequence <= self.last_fill_sequence {
            warn!(sequence = fill.sequence, "ignoring duplicate fill delivery");
            return Ok(());
        }
        self.last_fill_sequence = fill.sequence;

        let order_id = OrderId::from(fill.client_order_id.clone());
        let Some((index, side, _epoch)) = order_id.parse_level_side_epoch(&self.state.instance_id)
        else {
            warn!(client_order_id = %fill.client_order_id, "fill for unrecognized order id, ignoring");
            return Ok(());
        };
        if side != fill.side {
            warn!(client_order_id = %fill.client_order_id, "fill side does not match order id encoding, ignoring");
            return Ok(());
        }

        self.apply_fill(index, side, fill.price, fill.quantity, fill.fee)
            .await?;
        self.persist()?;
        Ok(())
    }

    async fn cancel_all_open(&mut self) {
        let client_order_ids: Vec<String> = self
            .state
            .levels
            .iter()
            .flat_map(|l| [l.buy.as_ref(), l.sell.as_ref()])
            .flatten()
            .map(|bound| bound.client_order_id.as_str().to_string())
            .collect();

        for client_order_id in client_order_ids {
            if let Err(e) = self.call(self.exchange.cancel_order(&client_order_id)).await {
                warn!(%client_order_id, error = %e, "failed to cancel order while stopping");
            }
        }
    }

    pub async fn stop(&mut self, reason: StopReason) -> Result<(), GridError> {
        self.cancel_all_open().await;
        self.state.set_status(EngineStatus::StoppedByRisk(reason))?;
        self.persist()?;
        Ok(())
    }

    pub async fn stop_by_operator(&mut self) -> Result<(), GridError> {
        self.cancel_all_open().await;
        self.state.set_status(EngineStatus::StoppedByOperator)?;
        self.persist()?;
        Ok(())
    }

    /// Cancels all open orders (if not already in a terminal status),
    /// then deletes the persisted snapshot. Irreversible: there is no
    /// `resume`, per spec §6, so nothing is written back after this call.
    pub async fn teardown(&mut self) -> Result<(), GridError> {
        if !self.state.status.is_terminal() {
            self.cancel_all_open().await;
            self.state.set_status(EngineStatus::StoppedByOperator)?;
        }
        self.store.delete()?;
        Ok(())
    }

    /// Drains `events` until the engine reaches a terminal status or the
    /// channel closes. Each event is fully processed (including any
    /// exchange calls and the resulting persistence write) before the next
    /// is pulled, serializing all mutation of `self.state`.
    pub async fn run(&mut self, mut events: mpsc::Receiver<EngineEvent>) -> Result<(), GridError> {
        while let Some(event) = events.recv().await {
            if self.state.status.is_terminal() {
                break;
            }
            match event {
                EngineEvent::Ticker(ticker) => self.on_tick(ticker).await?,
                EngineEvent::Fill(fill) => self.on_fill(fill).await?,
                EngineEvent::Operator(OperatorCommand::Stop) => {
                    self.stop_by_operator().await?;
                }
                EngineEvent::Operator(OperatorCommand::Teardown) => {
                    self.teardown().await?;
                    break;
                }
            }
        }
        Ok(())
    }
}

fn exchange_to_grid_error(e: ExchangeError) -> GridError {
    GridError::ReconciliationUnresolved {
        client_order_id: "<unknown>".into(),
        reason: e.to_string(),
    }
}
