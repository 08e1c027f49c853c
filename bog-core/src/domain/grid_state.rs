//! Mutable state for one running grid instance: its ladder of levels, its
//! lifecycle status, and its running statistics.

use super::errors::GridError;
use super::grid_config::GridConfig;
use super::grid_level::{BoundOrder, GridLevel};
use super::types::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why the engine stopped quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    StopLossTriggered,
    TakeProfitTriggered,
    OperatorRequested,
    UnrecoverableError,
}

/// Lifecycle status of the engine driving a [`GridState`].
///
/// Modeled as plain data (rather than a typestate wrapper) because it must
/// round-trip through the persisted snapshot; `transition` enforces the
/// same "only these moves are legal" discipline a typestate encoding would
/// give at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    Initializing,
    Reconciling,
    Running,
    StoppedByRisk(StopReason),
    StoppedByOperator,
    Failed,
}

impl EngineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EngineStatus::StoppedByRisk(_) | EngineStatus::StoppedByOperator | EngineStatus::Failed
        )
    }

    pub fn is_quoting(self) -> bool {
        matches!(self, EngineStatus::Running)
    }

    fn can_transition_to(self, next: EngineStatus) -> bool {
        use EngineStatus::*;
        match (self, next) {
            (Initializing, Reconciling) => true,
            (Reconciling, Running) => true,
            (Reconciling, Failed) => true,
            (Running, Reconciling) => true, // re-reconcile after reconnect
            (Running, StoppedByRisk(_)) => true,
            (Running, StoppedByOperator) => true,
            (Running, Failed) => true,
            (_, Failed) => true, // a failure can be reported from anywhere
            // teardown/stop can be requested before the engine ever reaches
            // Running (e.g. tearing down an instance stuck reconciling);
            // once a state is terminal it stays terminal (see is_terminal).
            (s, StoppedByOperator) if !s.is_terminal() => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }
}

/// Accumulated performance statistics for one grid instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridStatistics {
    pub realized_profit: Decimal,
    pub total_fees_paid: Decimal,
    pub completed_cycles: u64,
    pub total_buys_filled: u64,
    pub total_sells_filled: u64,
}

/// Durable state for one grid instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    pub instance_id: String,
    pub config: GridConfig,
    pub levels: Vec<GridLevel>,
    pub status: EngineStatus,
    pub statistics: GridStatistics,
    pub schema_version: u32,
    /// Monotone counter incremented every time this state is persisted
    /// (spec §3/§6's `version`/`monotone_version`), distinct from
    /// `schema_version` (which tracks the on-disk *shape*, not how many
    /// times a given instance has been saved). Never decreases.
    pub version: u64,
    /// The last ticker price this instance observed, persisted so a
    /// restarted engine can reason about initial placement and risk
    /// triggers even before its first fresh tick arrives.
    pub last_known_price: Option<Decimal>,
}

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

impl GridState {
    pub fn new(instance_id: String, config: GridConfig, levels: Vec<GridLevel>) -> Self {
        Self {
            instance_id,
            config,
            levels,
            status: EngineStatus::Initializing,
            statistics: GridStatistics::default(),
            schema_version: CURRENT_SCHEMA_VERSION,
            version: 0,
            last_known_price: None,
        }
    }

    /// Advances the monotone `version` counter by one. Called by
    /// [`crate::persistence::PersistenceStore::save`] immediately before
    /// serializing, so every persisted snapshot carries a strictly higher
    /// version than the one before it (spec §3's global invariant).
    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub fn level_mut(&mut self, index: usize) -> Result<&mut GridLevel, GridError> {
        self.levels
            .get_mut(index)
            .ok_or_else(|| GridError::InvariantViolation {
                level: index,
                reason: "level index out of range".into(),
            })
    }

    pub fn bind_buy(&mut self, index: usize, order: BoundOrder) -> Result<(), GridError> {
        self.level_mut(index)?.bind_buy(order)
    }

    pub fn bind_sell(&mut self, index: usize, order: BoundOrder) -> Result<(), GridError> {
        self.level_mut(index)?.bind_sell(order)
    }

    pub fn clear_order(&mut self, index: usize, side: Side) -> Result<BoundOrder, GridError> {
        self.level_mut(index)?.clear_order(side)
    }

    /// Record that the buy bound at `index` has been filled. Clears the
    /// binding, marks `filled_buy`, and remembers the fill price on that
    /// same level so the counter-sell (bound to the same level, priced at
    /// the level above) can later settle the cycle against it.
    pub fn record_buy_fill(
        &mut self,
        index: usize,
        fill_price: Decimal,
        fee: Decimal,
    ) -> Result<(), GridError> {
        self.level_mut(index)?.record_buy_fill(fill_price)?;
        self.statistics.total_buys_filled += 1;
        self.statistics.total_fees_paid += fee;
        Ok(())
    }

    /// Record that the sell bound at `index` has been filled. Books
    /// realized P&L against this level's own recorded buy fill price,
    /// increments `completed_cycles`, and clears `filled_buy` so the level
    /// is free to take a fresh buy again.
    pub fn record_sell_fill(
        &mut self,
        index: usize,
        fill_price: Decimal,
        fill_quantity: Decimal,
        fee: Decimal,
    ) -> Result<(), GridError> {
        let basis = self.level_mut(index)?.record_sell_fill()?;
        self.statistics.total_sells_filled += 1;
        self.statistics.total_fees_paid += fee;
        let profit = (fill_price - basis) * fill_quantity;
        self.statistics.realized_profit += profit;
        self.statistics.completed_cycles += 1;
        Ok(())
    }

    /// Quote-asset notional currently committed: open buy orders at their
    /// order price, plus the cost basis of inventory awaiting its
    /// counter-sell (bought but not yet sold). This is the quantity P3
    /// bounds against `total_investment * (1 - reserve_fraction)`.
    pub fn committed_capital(&self) -> Decimal {
        self.levels
            .iter()
            .map(|l| {
                let open_buy = l
                    .buy
                    .as_ref()
                    .map(|b| b.price * b.quantity)
                    .unwrap_or(Decimal::ZERO);
                let held_inventory = if l.filled_buy {
                    l.last_buy_fill_price.unwrap_or(l.price) * l.quantity
                } else {
                    Decimal::ZERO
                };
                open_buy + held_inventory
            })
            .sum()
    }

    /// The capital ceiling from §3: `total_investment * (1 - reserve_fraction)`.
    pub fn capital_ceiling(&self) -> Decimal {
        self.config.total_investment * (Decimal::ONE - self.config.reserve_fraction)
    }

    /// Checks whether committing `additional` more quote-asset notional
    /// (e.g. a new buy about to be placed) would breach the capital bound.
    /// Called by the engine immediately before placing a buy order.
    pub fn check_capital_bound(&self, additional: Decimal) -> Result<(), GridError> {
        let projected = self.committed_capital() + additional;
        let ceiling = self.capital_ceiling();
        if projected > ceiling {
            return Err(GridError::InvariantViolation {
                level: usize::MAX,
                reason: format!(
                    "placing this order would commit {projected}, exceeding the capital bound {ceiling}"
                ),
            });
        }
        Ok(())
    }

    pub fn set_status(&mut self, next: EngineStatus) -> Result<(), GridError> {
        if !self.status.can_transition_to(next) {
            return Err(GridError::InvalidState {
                reason: format!("cannot move from {:?} to {next:?}", self.status),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn active_levels(&self) -> impl Iterator<Item = &GridLevel> {
        self.levels.iter().filter(|l| !l.inactive)
    }
}
