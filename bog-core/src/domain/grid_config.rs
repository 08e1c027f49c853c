//! Grid configuration: the parameters a strategy instance is launched with.

use super::errors::GridError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How grid levels are spaced between `lower_bound` and `upper_bound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpacingMode {
    /// Equal price differences between adjacent levels.
    Arithmetic,
    /// Equal price ratios between adjacent levels.
    Geometric,
}

/// Immutable parameters describing one grid instance.
///
/// `num_grids` is the number of price *levels* the range is divided into
/// (so the number of gaps is `num_grids - 1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub symbol: String,
    pub lower_bound: Decimal,
    pub upper_bound: Decimal,
    pub num_grids: u32,
    pub spacing_mode: SpacingMode,
    /// Total quote-asset capital allocated to this grid instance. Each
    /// active level's order size is derived from this (see
    /// [`crate::geometry::build_levels`]), not configured per level.
    pub total_investment: Decimal,
    pub stop_loss_pct: Option<Decimal>,
    pub take_profit_pct: Option<Decimal>,
    /// Fraction of `total_investment` held back as a buffer against
    /// rounding and fee drift; never committed to a placed order.
    pub reserve_fraction: Decimal,
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), GridError> {
        if self.num_grids < 3 || self.num_grids > 100 {
            return Err(GridError::ConfigInfeasible {
                reason: format!("num_grids must be in 3..=100, got {}", self.num_grids),
            });
        }
        if self.lower_bound <= Decimal::ZERO {
            return Err(GridError::ConfigInfeasible {
                reason: "lower_bound must be positive".into(),
            });
        }
        if self.upper_bound <= self.lower_bound {
            return Err(GridError::ConfigInfeasible {
                reason: "upper_bound must be greater than lower_bound".into(),
            });
        }
        if self.total_investment <= Decimal::ZERO {
            return Err(GridError::ConfigInfeasible {
                reason: "total_investment must be positive".into(),
            });
        }
        if self.reserve_fraction < Decimal::ZERO || self.reserve_fraction >= Decimal::ONE {
            return Err(GridError::ConfigInfeasible {
                reason: "reserve_fraction must be in [0, 1)".into(),
            });
        }
        for (name, pct) in [
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
        ] {
            if let Some(p) = pct {
                if p <= Decimal::ZERO || p >= Decimal::ONE {
                    return Err(GridError::ConfigInfeasible {
                        reason: format!("{name} must be in (0, 1), got {p}"),
                    });
                }
            }
        }
        Ok(())
    }
}
