//! The exchange adapter contract.
//!
//! Grounded on the `async-trait` pattern used for live exchange clients
//! elsewhere in the retrieval pack (an async client talking to a real
//! venue over HTTP/WebSocket) rather than this crate's own const-generic,
//! synchronous `Executor` trait, which targets a shared-memory market-data
//! feed and sub-microsecond dispatch that have no bearing on a spot grid
//! bot's I/O-bound exchange calls.

pub mod mock;

use crate::domain::errors::ExchangeError;
use crate::domain::types::Side;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::mpsc;

/// An exchange-assigned order identifier, distinct from the locally-minted
/// client order id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeOrderId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    /// The venue could not confirm the order's state (e.g. a connection
    /// drop mid-request); reconciliation, not retry, resolves this.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReport {
    pub client_order_id: String,
    pub exchange_order_id: Option<ExchangeOrderId>,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    /// The venue-reported fee for this order's fill(s), when the query
    /// surfaces one. `None` only when the order hasn't filled at all yet.
    pub fee: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub client_order_id: String,
    pub exchange_order_id: ExchangeOrderId,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The order had already filled or been cancelled by the time the
    /// cancel request reached the venue.
    AlreadyTerminal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub client_order_id: String,
    pub exchange_order_id: ExchangeOrderId,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    /// Monotonically increasing per-exchange-connection sequence number,
    /// used to detect and ignore duplicate fill deliveries.
    pub sequence: u64,
    /// Venue-reported fill time.
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub last: Decimal,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub timestamp: SystemTime,
}

impl Ticker {
    pub fn mid(&self) -> Decimal {
        (self.best_bid + self.best_ask) / Decimal::TWO
    }
}

/// Everything the engine needs from an exchange: idempotent order
/// placement keyed by client order id, cancellation, point-in-time
/// queries, and two push feeds (fills, ticker).
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn place_order(
        &self,
        client_order_id: &str,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<ExchangeOrderId, ExchangeError>;

    async fn cancel_order(&self, client_order_id: &str) -> Result<CancelOutcome, ExchangeError>;

    async fn get_order(&self, order_id: &ExchangeOrderId) -> Result<OrderReport, ExchangeError>;

    async fn list_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ExchangeError>;

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;

    /// A push feed of fills for `symbol`. Each call establishes a fresh
    /// subscription; the engine re-subscribes after a detected connection
    /// loss, which is also the trigger for re-running reconciliation.
    fn subscribe_fills(&self, symbol: &str) -> mpsc::Receiver<FillEvent>;

    fn subscribe_ticker(&self, symbol: &str) -> mpsc::Receiver<Ticker>;
}
