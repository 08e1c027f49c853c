//! A deterministic, in-memory [`Exchange`] used by tests and the
//! simulated-run binary.
//!
//! Grounded on this crate's own `SimulatedExecutor` (instant, pessimistic
//! fills, `HashMap`-keyed order book) but reshaped to the async `Exchange`
//! trait and extended with explicit fault-injection hooks so reconciliation
//! scenarios (phantom orders, orphan orders, dropped fills) can be set up
//! deterministically from a test rather than relying on randomness.

use super::{
    CancelOutcome, Exchange, ExchangeOrderId, FillEvent, OpenOrder, OrderReport, OrderStatus,
    Ticker,
};
use crate::domain::errors::ExchangeError;
use crate::domain::types::Side;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::SystemTime;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct MockOrder {
    client_order_id: String,
    exchange_order_id: ExchangeOrderId,
    symbol: String,
    side: Side,
    price: Decimal,
    quantity: Decimal,
    filled_quantity: Decimal,
    total_fee: Decimal,
    status: OrderStatus,
}

struct State {
    orders: HashMap<String, MockOrder>,
    next_exchange_id: u64,
    next_fill_sequence: u64,
    fill_senders: Vec<mpsc::Sender<FillEvent>>,
    ticker_senders: Vec<mpsc::Sender<Ticker>>,
    ticker: Ticker,
    reject_next_place: Option<String>,
    ambiguous_next_place: bool,
}

/// In-memory mock exchange. Cheaply cloneable (shares state via `Arc`-free
/// interior mutability behind a single mutex, matching a single-threaded
/// simulator's assumption that only one task touches exchange state at a
/// time); intended to be wrapped in an `Arc` by callers that need to share
/// it across tasks.
pub struct MockExchange {
    state: Mutex<State>,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new(Ticker {
            last: Decimal::ZERO,
            best_bid: Decimal::ZERO,
            best_ask: Decimal::ZERO,
            timestamp: SystemTime::now(),
        })
    }
}

impl MockExchange {
    pub fn new(initial_ticker: Ticker) -> Self {
        Self {
            state: Mutex::new(State {
                orders: HashMap::new(),
                next_exchange_id: 1,
                next_fill_sequence: 1,
                fill_senders: Vec::new(),
                ticker_senders: Vec::new(),
                ticker: initial_ticker,
                reject_next_place: None,
                ambiguous_next_place: false,
            }),
        }
    }

    /// Test/fault-injection hook: the next `place_order` call will be
    /// rejected with this reason instead of succeeding.
    pub fn reject_next_place(&self, reason: &str) {
        self.state.lock().reject_next_place = Some(reason.to_string());
    }

    /// Test/fault-injection hook: the next `place_order` call returns
    /// `ExchangeError::Ambiguous` after the order was actually accepted
    /// exchange-side — simulating a dropped response to a successful
    /// request.
    pub fn make_next_place_ambiguous(&self) {
        self.state.lock().ambiguous_next_place = true;
    }

    /// Simulates an order appearing on the exchange's books that this
    /// engine never placed (an orphan from the engine's perspective).
    pub fn inject_orphan_order(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> ExchangeOrderId {
        let mut state = self.state.lock();
        let exchange_order_id = ExchangeOrderId(format!("mock-{}", state.next_exchange_id));
        state.next_exchange_id += 1;
        let client_order_id = format!("external-{}", exchange_order_id.0);
        state.orders.insert(
            client_order_id.clone(),
            MockOrder {
                client_order_id,
                exchange_order_id: exchange_order_id.clone(),
                symbol: symbol.to_string(),
                side,
                price,
                quantity,
                filled_quantity: Decimal::ZERO,
                total_fee: Decimal::ZERO,
                status: OrderStatus::Open,
            },
        );
        exchange_order_id
    }

    /// Removes an order from the exchange's books without notifying any
    /// subscriber — simulating an order the engine still believes is bound
    /// (a phantom from the engine's perspective, since the exchange no
    /// longer has it).
    pub fn drop_order_silently(&self, client_order_id: &str) {
        self.state.lock().orders.remove(client_order_id);
    }

    /// Delivers a fill for `client_order_id` on the fills feed, updating the
    /// order's filled quantity and status.
    pub async fn simulate_fill(&self, client_order_id: &str, quantity: Decimal, fee: Decimal) {
        let event = {
            let mut state = self.state.lock();
            let sequence = state.next_fill_sequence;
            state.next_fill_sequence += 1;
            let Some(order) = state.orders.get_mut(client_order_id) else {
                return;
            };
            order.filled_quantity += quantity;
            order.total_fee += fee;
            order.status = if order.filled_quantity >= order.quantity {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            FillEvent {
                client_order_id: order.client_order_id.clone(),
                exchange_order_id: order.exchange_order_id.clone(),
                side: order.side,
                price: order.price,
                quantity,
                fee,
                sequence,
                timestamp: SystemTime::now(),
            }
        };
        self.broadcast_fill(event).await;
    }

    async fn broadcast_fill(&self, event: FillEvent) {
        let senders = self.state.lock().fill_senders.clone();
        for sender in senders {
            let _ = sender.send(event.clone()).await;
        }
    }

    pub async fn set_ticker(&self, ticker: Ticker) {
        let senders = {
            let mut state = self.state.lock();
            state.ticker = ticker;
            state.ticker_senders.clone()
        };
        for sender in senders {
            let _ = sender.send(ticker).await;
        }
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn place_order(
        &self,
        client_order_id: &str,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<ExchangeOrderId, ExchangeError> {
        let mut state = self.state.lock();

        if let Some(existing) = state.orders.get(client_order_id) {
            // Idempotent replay: the same client order id always maps to
            // the same exchange order.
            return Ok(existing.exchange_order_id.clone());
        }

        if let Some(reason) = state.reject_next_place.take() {
            return Err(ExchangeError::Rejected { reason });
        }

        let exchange_order_id = ExchangeOrderId(format!("mock-{}", state.next_exchange_id));
        state.next_exchange_id += 1;
        state.orders.insert(
            client_order_id.to_string(),
            MockOrder {
                client_order_id: client_order_id.to_string(),
                exchange_order_id: exchange_order_id.clone(),
                symbol: symbol.to_string(),
                side,
                price,
                quantity,
                filled_quantity: Decimal::ZERO,
                total_fee: Decimal::ZERO,
                status: OrderStatus::Open,
            },
        );

        if state.ambiguous_next_place {
            state.ambiguous_next_place = false;
            return Err(ExchangeError::Ambiguous {
                reason: "response lost after order was accepted".into(),
            });
        }

        Ok(exchange_order_id)
    }

    async fn cancel_order(&self, client_order_id: &str) -> Result<CancelOutcome, ExchangeError> {
        let mut state = self.state.lock();
        match state.orders.get_mut(client_order_id) {
            Some(order) if matches!(order.status, OrderStatus::Open | OrderStatus::PartiallyFilled) => {
                order.status = OrderStatus::Cancelled;
                Ok(CancelOutcome::Cancelled)
            }
            Some(_) => Ok(CancelOutcome::AlreadyTerminal),
            None => Err(ExchangeError::OrderNotFound {
                client_order_id: client_order_id.to_string(),
            }),
        }
    }

    async fn get_order(&self, order_id: &ExchangeOrderId) -> Result<OrderReport, ExchangeError> {
        let state = self.state.lock();
        state
            .orders
            .values()
            .find(|o| &o.exchange_order_id == order_id)
            .map(|o| OrderReport {
                client_order_id: o.client_order_id.clone(),
                exchange_order_id: Some(o.exchange_order_id.clone()),
                status: o.status,
                filled_quantity: o.filled_quantity,
                average_fill_price: if o.filled_quantity.is_zero() {
                    None
                } else {
                    Some(o.price)
                },
                fee: if o.filled_quantity.is_zero() {
                    None
                } else {
                    Some(o.total_fee)
                },
            })
            .ok_or_else(|| ExchangeError::OrderNotFound {
                client_order_id: order_id.0.clone(),
            })
    }

    async fn list_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ExchangeError> {
        let state = self.state.lock();
        Ok(state
            .orders
            .values()
            .filter(|o| {
                o.symbol == symbol && matches!(o.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
            })
            .map(|o| OpenOrder {
                client_order_id: o.client_order_id.clone(),
                exchange_order_id: o.exchange_order_id.clone(),
                side: o.side,
                price: o.price,
                quantity: o.quantity,
                filled_quantity: o.filled_quantity,
            })
            .collect())
    }

    async fn get_ticker(&self, _symbol: &str) -> Result<Ticker, ExchangeError> {
        Ok(self.state.lock().ticker)
    }

    fn subscribe_fills(&self, _symbol: &str) -> mpsc::Receiver<FillEvent> {
        let (tx, rx) = mpsc::channel(256);
        self.state.lock().fill_senders.push(tx);
        rx
    }

    fn subscribe_ticker(&self, _symbol: &str) -> mpsc::Receiver<Ticker> {
        let (tx, rx) = mpsc::channel(256);
        self.state.lock().ticker_senders.push(tx);
        rx
    }
}
