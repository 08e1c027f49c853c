//! A read-only, serializable summary of a [`GridState`], used by the
//! status CLI and any future read-only surface. Intentionally does not
//! include the full order ladder — just the counts and distances an
//! operator actually wants at a glance.

use super::grid_state::{EngineStatus, GridState, GridStatistics};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridStatusView {
    pub instance_id: String,
    pub symbol: String,
    pub status: EngineStatus,
    pub open_buy_orders: usize,
    pub open_sell_orders: usize,
    pub levels_awaiting_retry: usize,
    pub lowest_open_buy_price: Option<Decimal>,
    pub highest_open_sell_price: Option<Decimal>,
    pub statistics: GridStatistics,
}

impl GridState {
    pub fn status_view(&self) -> GridStatusView {
        let open_buy_orders = self.levels.iter().filter(|l| l.buy.is_some()).count();
        let open_sell_orders = self.levels.iter().filter(|l| l.sell.is_some()).count();
        let levels_awaiting_retry = self
            .levels
            .iter()
            .filter(|l| l.pending_retry.is_some())
            .count();
        let lowest_open_buy_price = self
            .levels
            .iter()
            .filter_map(|l| l.buy.as_ref().map(|_| l.price))
            .min();
        let highest_open_sell_price = self
            .levels
            .iter()
            .filter_map(|l| l.sell.as_ref().map(|_| l.price))
            .max();

        GridStatusView {
            instance_id: self.instance_id.clone(),
            symbol: self.config.symbol.clone(),
            status: self.status,
            open_buy_orders,
            open_sell_orders,
            levels_awaiting_retry,
            lowest_open_buy_price,
            highest_open_sell_price,
            statistics: self.statistics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::grid_config::{GridConfig, SpacingMode};
    use crate::domain::grid_level::{BoundOrder, GridLevel};
    use crate::domain::types::{OrderId, Side};
    use crate::exchange::ExchangeOrderId;
    use rust_decimal_macros::dec;

    #[test]
    fn status_view_counts_open_orders_by_side() {
        let config = GridConfig {
            symbol: "BTC-USDT".into(),
            lower_bound: dec!(100),
            upper_bound: dec!(200),
            num_grids: 3,
            spacing_mode: SpacingMode::Arithmetic,
            total_investment: dec!(300),
            stop_loss_pct: None,
            take_profit_pct: None,
            reserve_fraction: dec!(0.05),
        };
        let levels = vec![
            GridLevel::new(0, dec!(100), dec!(1), false),
            GridLevel::new(1, dec!(150), dec!(1), false),
            GridLevel::new(2, dec!(200), dec!(1), false),
        ];
        let mut state = GridState::new("inst".into(), config, levels);
        state
            .bind_buy(
                0,
                BoundOrder {
                    client_order_id: OrderId::new("inst", 0, Side::Buy, 1),
                    exchange_order_id: ExchangeOrderId("mock-1".into()),
                    side: Side::Buy,
                    price: dec!(100),
                    quantity: dec!(1),
                },
            )
            .unwrap();

        let view = state.status_view();
        assert_eq!(view.open_buy_orders, 1);
        assert_eq!(view.open_sell_orders, 0);
        assert_eq!(view.lowest_open_buy_price, Some(dec!(100)));
    }
}
