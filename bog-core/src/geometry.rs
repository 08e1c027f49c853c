//! Builds the price/quantity ladder for a [`GridConfig`].

use crate::domain::{GridConfig, GridError, GridLevel, SpacingMode};
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};

/// Rounds `value` down to the nearest multiple of `step` (never rounds up:
/// a floored order size must never exceed what was configured).
fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    (value / step).floor() * step
}

/// Rounds `value` to the nearest multiple of `step`, ties to even, the way
/// a venue's tick size is normally applied to a raw price.
fn round_to_tick(value: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size.is_zero() {
        return value;
    }
    let units = (value / tick_size).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    units * tick_size
}

/// Builds the ladder of `config.num_grids + 1` grid levels (from
/// `lower_bound` to `upper_bound` inclusive), rounding prices to
/// `tick_size` and quantities down to `lot_size`. Levels that collapse
/// together after tick rounding make the configuration infeasible. Levels
/// whose notional (`price * quantity`) falls below `min_notional` are kept
/// in the ladder (so indices stay stable) but marked `inactive` and are
/// never quoted.
pub fn build_levels(
    config: &GridConfig,
    tick_size: Decimal,
    lot_size: Decimal,
    min_notional: Decimal,
) -> Result<Vec<GridLevel>, GridError> {
    config.validate()?;

    let n = config.num_grids as usize;
    let level_count = n + 1;
    let mut raw_prices = Vec::with_capacity(level_count);

    match config.spacing_mode {
        SpacingMode::Arithmetic => {
            let step = (config.upper_bound - config.lower_bound) / Decimal::from(n as u64);
            for i in 0..level_count {
                raw_prices.push(config.lower_bound + step * Decimal::from(i as u64));
            }
        }
        SpacingMode::Geometric => {
            // ratio^n = upper/lower => ratio = (upper/lower)^(1/n)
            let total_ratio = config.upper_bound / config.lower_bound;
            let exponent = Decimal::ONE / Decimal::from(n as u64);
            let ratio = total_ratio
                .checked_powd(exponent)
                .ok_or_else(|| GridError::ConfigInfeasible {
                    reason: "geometric ratio could not be computed for this bound/grid count"
                        .into(),
                })?;
            let mut price = config.lower_bound;
            raw_prices.push(price);
            for _ in 1..level_count {
                price *= ratio;
                raw_prices.push(price);
            }
        }
    }

    // Per-level base-asset quantity (§4.1): capital allocated to each of
    // the `num_grids` gaps, divided by that level's own price, floored to
    // the venue's lot size. Levels below min notional are marked inactive
    // rather than erroring the whole grid.
    let per_level_capital =
        config.total_investment * (Decimal::ONE - config.reserve_fraction) / Decimal::from(n as u64);

    let mut levels = Vec::with_capacity(level_count);
    let mut prev_price: Option<Decimal> = None;
    for (i, raw) in raw_prices.into_iter().enumerate() {
        let price = round_to_tick(raw, tick_size);
        if let Some(prev) = prev_price {
            if price <= prev {
                return Err(GridError::ConfigInfeasible {
                    reason: format!(
                        "levels {} and {} collapse to the same price after rounding to tick size {tick_size}",
                        i - 1,
                        i
                    ),
                });
            }
        }
        prev_price = Some(price);

        let raw_quantity = per_level_capital / price;
        let quantity = floor_to_step(raw_quantity, lot_size);
        if quantity.is_zero() {
            return Err(GridError::ConfigInfeasible {
                reason: format!(
                    "level {i}'s quantity floors to zero at the venue's lot size"
                ),
            });
        }

        let inactive = price * quantity < min_notional;
        levels.push(GridLevel::new(i, price, quantity, inactive));
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config(mode: SpacingMode) -> GridConfig {
        GridConfig {
            symbol: "BTC-USDT".into(),
            lower_bound: dec!(20000),
            upper_bound: dec!(30000),
            num_grids: 10,
            spacing_mode: mode,
            total_investment: dec!(50000),
            stop_loss_pct: None,
            take_profit_pct: None,
            reserve_fraction: dec!(0.05),
        }
    }

    #[test]
    fn arithmetic_levels_are_evenly_spaced_and_monotone_and_num_grids_plus_one_long() {
        let cfg = base_config(SpacingMode::Arithmetic);
        let levels = build_levels(&cfg, dec!(0.01), dec!(0.0001), dec!(10)).unwrap();
        assert_eq!(levels.len(), 11);
        assert_eq!(levels[0].price, dec!(20000));
        assert_eq!(levels[10].price, dec!(30000));
        for w in levels.windows(2) {
            assert!(w[1].price > w[0].price);
        }
        let gap = levels[1].price - levels[0].price;
        for w in levels.windows(2) {
            assert_eq!(w[1].price - w[0].price, gap);
        }
    }

    #[test]
    fn geometric_levels_have_constant_ratio_and_are_monotone() {
        let cfg = base_config(SpacingMode::Geometric);
        let levels = build_levels(&cfg, dec!(0.01), dec!(0.0001), dec!(10)).unwrap();
        assert_eq!(levels.len(), 11);
        for w in levels.windows(2) {
            assert!(w[1].price > w[0].price);
        }
    }

    #[test]
    fn collapsing_levels_after_tick_rounding_is_infeasible() {
        let mut cfg = base_config(SpacingMode::Arithmetic);
        cfg.lower_bound = dec!(100.000);
        cfg.upper_bound = dec!(100.005);
        cfg.num_grids = 10;
        let result = build_levels(&cfg, dec!(1), dec!(0.0001), dec!(1));
        assert!(matches!(result, Err(GridError::ConfigInfeasible { .. })));
    }

    #[test]
    fn levels_below_min_notional_are_marked_inactive_not_errors() {
        let cfg = base_config(SpacingMode::Arithmetic);
        let levels = build_levels(&cfg, dec!(0.01), dec!(0.0001), dec!(1_000_000_000)).unwrap();
        assert!(levels.iter().all(|l| l.inactive));
        assert_eq!(levels.len(), 11);
    }

    #[test]
    fn quantity_flooring_to_zero_lot_size_is_infeasible() {
        let mut cfg = base_config(SpacingMode::Arithmetic);
        cfg.total_investment = dec!(0.001);
        let result = build_levels(&cfg, dec!(0.01), dec!(0.0001), dec!(1));
        assert!(matches!(result, Err(GridError::ConfigInfeasible { .. })));
    }

    /// SOL/USDT, lower 120, upper 150, 6 grids, investment 45, arithmetic,
    /// reserve 0.20 => levels at 120, 125, 130, 135, 140, 145, 150, each
    /// sized (45*0.80/6)/price.
    #[test]
    fn arithmetic_worked_example_produces_expected_ladder() {
        let cfg = GridConfig {
            symbol: "SOL-USDT".into(),
            lower_bound: dec!(120),
            upper_bound: dec!(150),
            num_grids: 6,
            spacing_mode: SpacingMode::Arithmetic,
            total_investment: dec!(45),
            stop_loss_pct: None,
            take_profit_pct: None,
            reserve_fraction: dec!(0.20),
        };
        let levels = build_levels(&cfg, dec!(0.01), dec!(0.0001), dec!(0)).unwrap();
        let expected_prices = [
            dec!(120),
            dec!(125),
            dec!(130),
            dec!(135),
            dec!(140),
            dec!(145),
            dec!(150),
        ];
        assert_eq!(levels.len(), expected_prices.len());
        for (level, expected) in levels.iter().zip(expected_prices) {
            assert_eq!(level.price, expected);
        }
        let per_level_capital = dec!(45) * dec!(0.80) / dec!(6);
        for level in &levels {
            let expected_quantity = floor_to_step(per_level_capital / level.price, dec!(0.0001));
            assert_eq!(level.quantity, expected_quantity);
        }
    }

    /// Same bounds, geometric mode. The number of levels and the ratio
    /// between adjacent levels follow the same `num_grids + 1` rule as
    /// arithmetic mode, so this checks the structural properties (level
    /// count, constant ratio) rather than a hand-picked worked example
    /// (see DESIGN.md for the one-level discrepancy against a shorthand
    /// six-value walkthrough).
    #[test]
    fn geometric_ladder_has_seven_levels_with_constant_ratio() {
        let cfg = GridConfig {
            symbol: "SOL-USDT".into(),
            lower_bound: dec!(120),
            upper_bound: dec!(150),
            num_grids: 6,
            spacing_mode: SpacingMode::Geometric,
            total_investment: dec!(45),
            stop_loss_pct: None,
            take_profit_pct: None,
            reserve_fraction: dec!(0.20),
        };
        let levels = build_levels(&cfg, dec!(0.01), dec!(0.0001), dec!(0)).unwrap();
        assert_eq!(levels.len(), 7);
        assert_eq!(levels[0].price, dec!(120.00));
        assert_eq!(levels[6].price, dec!(150.00));
        let ratio = levels[1].price / levels[0].price;
        for w in levels.windows(2) {
            let r = w[1].price / w[0].price;
            assert!((r - ratio).abs() < dec!(0.0005));
        }
    }
}
