//! A single price level in the grid and the order (if any) bound to it.

use super::errors::GridError;
use super::types::{OrderId, Side};
use crate::exchange::ExchangeOrderId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An order locally bound to a grid level, awaiting a fill or cancellation.
///
/// `price`/`quantity` are the order's actual execution terms, which for a
/// counter-sell are the level *above* this one's price (or this level's
/// own price at the top boundary, see `GridEngine::counter_sell_price`) —
/// the binding itself always lives on the originating level's slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundOrder {
    pub client_order_id: OrderId,
    pub exchange_order_id: ExchangeOrderId,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// A placement this level needs to retry: either the exact request that
/// hit a transient failure, or one whose outcome was ambiguous and must be
/// resolved (never blindly re-sent under a new id — §7's idempotency-safe
/// handling for timeouts and `Unknown` results).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRetry {
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    /// `Some(id)` if a request already went out under this id and must be
    /// resumed under that same id rather than re-sent fresh — a transient
    /// failure that may still have reached the exchange, or an ambiguous
    /// outcome awaiting resolution (§7: never re-placed with a new id).
    /// `None` if no attempt has been made yet (e.g. placement deferred by
    /// the capital bound).
    pub client_order_id: Option<OrderId>,
}

/// One rung of the grid.
///
/// A level's `buy` and `sell` bindings are mutually exclusive, and a sell
/// may only be bound once this level's own buy has filled
/// (`filled_buy == true`) — see `bind_buy`/`bind_sell`'s precondition
/// checks, which mirror the invariants in the data model one-for-one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    pub index: usize,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Levels priced below the venue's minimum notional are kept in the
    /// ladder (so indices stay stable) but never quoted.
    pub inactive: bool,
    pub buy: Option<BoundOrder>,
    pub sell: Option<BoundOrder>,
    /// True once this level's buy has filled and it is awaiting its
    /// counter-sell (or the counter-sell's fill). Cleared the moment that
    /// sell fills.
    pub filled_buy: bool,
    /// The price this level's buy last filled at, kept until the
    /// counter-sell fills so realized profit can be computed from it.
    pub last_buy_fill_price: Option<Decimal>,
    /// Incremented every time a fresh client order id is minted for this
    /// level; persisted so a restarted engine mints ids that never collide
    /// with ones already seen by the exchange.
    pub placement_epoch: u64,
    /// Set when this level needs a placement (re)attempted: either a
    /// fresh request (after reconciliation cleared a phantom binding) or a
    /// retry of one already in flight (a transient failure or an
    /// ambiguous outcome awaiting resolution).
    pub pending_retry: Option<PendingRetry>,
}

impl GridLevel {
    pub fn new(index: usize, price: Decimal, quantity: Decimal, inactive: bool) -> Self {
        Self {
            index,
            price,
            quantity,
            inactive,
            buy: None,
            sell: None,
            filled_buy: false,
            last_buy_fill_price: None,
            placement_epoch: 0,
            pending_retry: None,
        }
    }

    /// Requires both order ids absent and `filled_buy` false, per the data
    /// model's invariant that a buy can only be bound on a level that
    /// isn't already mid-cycle.
    pub fn bind_buy(&mut self, order: BoundOrder) -> Result<(), GridError> {
        if self.buy.is_some() || self.sell.is_some() {
            return Err(GridError::LevelAlreadyBound {
                level: self.index,
                side: Side::Buy,
            });
        }
        if self.filled_buy {
            return Err(GridError::InvariantViolation {
                level: self.index,
                reason: "cannot bind a buy while filled_buy is true".into(),
            });
        }
        self.buy = Some(order);
        if matches!(&self.pending_retry, Some(p) if p.side == Side::Buy) {
            self.pending_retry = None;
        }
        Ok(())
    }

    /// Requires both order ids absent and `filled_buy` true: a sell can
    /// only be bound on the level whose own buy just filled.
    pub fn bind_sell(&mut self, order: BoundOrder) -> Result<(), GridError> {
        if self.buy.is_some() || self.sell.is_some() {
            return Err(GridError::LevelAlreadyBound {
                level: self.index,
                side: Side::Sell,
            });
        }
        if !self.filled_buy {
            return Err(GridError::InvariantViolation {
                level: self.index,
                reason: "cannot bind a sell before this level's buy has filled".into(),
            });
        }
        self.sell = Some(order);
        if matches!(&self.pending_retry, Some(p) if p.side == Side::Sell) {
            self.pending_retry = None;
        }
        Ok(())
    }

    pub fn clear_order(&mut self, side: Side) -> Result<BoundOrder, GridError> {
        let slot = match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        };
        slot.take().ok_or(GridError::LevelNotBound {
            level: self.index,
            side,
        })
    }

    /// Requires a bound buy. Clears it, marks `filled_buy`, and remembers
    /// the fill price as this level's cost basis until the counter-sell
    /// fills.
    pub fn record_buy_fill(&mut self, fill_price: Decimal) -> Result<(), GridError> {
        self.clear_order(Side::Buy)?;
        self.filled_buy = true;
        self.last_buy_fill_price = Some(fill_price);
        Ok(())
    }

    /// Requires a bound sell. Clears it, clears `filled_buy`, and returns
    /// the buy fill price this cycle's profit should be computed against.
    pub fn record_sell_fill(&mut self) -> Result<Decimal, GridError> {
        self.clear_order(Side::Sell)?;
        let basis = self
            .last_buy_fill_price
            .take()
            .ok_or_else(|| GridError::InvariantViolation {
                level: self.index,
                reason: "sell fill recorded with no recorded buy fill price".into(),
            })?;
        self.filled_buy = false;
        Ok(basis)
    }

    pub fn next_epoch(&mut self) -> u64 {
        self.placement_epoch += 1;
        self.placement_epoch
    }

    pub fn is_idle(&self) -> bool {
        self.buy.is_none() && self.sell.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(side: Side) -> BoundOrder {
        BoundOrder {
            client_order_id: OrderId::new("inst", 0, side, 1),
            exchange_order_id: ExchangeOrderId("mock-1".into()),
            side,
            price: dec!(100),
            quantity: dec!(1),
        }
    }

    #[test]
    fn binding_twice_on_same_side_is_rejected() {
        let mut level = GridLevel::new(0, dec!(100), dec!(1), false);
        level.bind_buy(order(Side::Buy)).unwrap();
        assert!(matches!(
            level.bind_buy(order(Side::Buy)),
            Err(GridError::LevelAlreadyBound { .. })
        ));
    }

    #[test]
    fn buy_and_sell_are_mutually_exclusive_on_one_level() {
        let mut level = GridLevel::new(0, dec!(100), dec!(1), false);
        level.bind_buy(order(Side::Buy)).unwrap();
        // A sell cannot be bound while a buy is still open on this level.
        assert!(matches!(
            level.bind_sell(order(Side::Sell)),
            Err(GridError::LevelAlreadyBound { .. })
        ));
    }

    #[test]
    fn sell_requires_filled_buy() {
        let mut level = GridLevel::new(0, dec!(100), dec!(1), false);
        assert!(matches!(
            level.bind_sell(order(Side::Sell)),
            Err(GridError::InvariantViolation { .. })
        ));
        level.bind_buy(order(Side::Buy)).unwrap();
        level.record_buy_fill(dec!(100)).unwrap();
        assert!(level.bind_sell(order(Side::Sell)).is_ok());
    }

    #[test]
    fn clearing_unbound_side_errors() {
        let mut level = GridLevel::new(0, dec!(100), dec!(1), false);
        assert!(matches!(
            level.clear_order(Side::Buy),
            Err(GridError::LevelNotBound { .. })
        ));
    }

    #[test]
    fn epoch_increments_monotonically() {
        let mut level = GridLevel::new(0, dec!(100), dec!(1), false);
        assert_eq!(level.next_epoch(), 1);
        assert_eq!(level.next_epoch(), 2);
    }

    #[test]
    fn full_cycle_clears_filled_buy_and_returns_basis() {
        let mut level = GridLevel::new(0, dec!(100), dec!(1), false);
        level.bind_buy(order(Side::Buy)).unwrap();
        level.record_buy_fill(dec!(100)).unwrap();
        assert!(level.filled_buy);
        level.bind_sell(order(Side::Sell)).unwrap();
        let basis = level.record_sell_fill().unwrap();
        assert_eq!(basis, dec!(100));
        assert!(!level.filled_buy);
        assert!(level.last_buy_fill_price.is_none());
    }
}
