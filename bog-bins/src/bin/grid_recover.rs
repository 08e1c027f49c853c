//! Crash/recover demo.
//!
//! Starts a grid, persists it, simulates the process dying (the in-memory
//! `GridEngine` is dropped), then reloads the snapshot from disk into a
//! fresh engine and re-runs reconciliation against an exchange that has
//! drifted in the meantime: one locally-bound order silently disappeared
//! (a phantom) and one order appeared that this instance never placed (an
//! orphan). Prints what reconciliation found and the resulting state.

use anyhow::Result;
use grid_core::domain::grid_config::SpacingMode;
use grid_core::exchange::mock::MockExchange;
use grid_core::geometry::build_levels;
use grid_core::persistence::PersistenceStore;
use grid_core::prelude::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::tempdir;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let dir = tempdir()?;
    let config = GridConfig {
        symbol: "BTC-USDT".into(),
        lower_bound: dec!(20000),
        upper_bound: dec!(22000),
        num_grids: 5,
        spacing_mode: SpacingMode::Arithmetic,
        total_investment: dec!(5000),
        stop_loss_pct: Some(dec!(0.1)),
        take_profit_pct: Some(dec!(0.1)),
        reserve_fraction: dec!(0.05),
    };
    let levels = build_levels(&config, dec!(0.01), dec!(0.0001), dec!(10))?;

    let exchange = Arc::new(MockExchange::new(Ticker {
        last: dec!(21000),
        best_bid: dec!(20999),
        best_ask: dec!(21001),
        timestamp: std::time::SystemTime::now(),
    }));

    let state = GridState::new("recover-demo".into(), config, levels);
    let mut settings = EngineSettings::default();
    settings.persistence_dir = dir.path().to_path_buf();

    {
        let mut engine = GridEngine::new(state, exchange.clone(), settings.clone());
        engine.start().await?;
        info!("initial ladder placed and persisted; simulating process crash now");

        // Drift the exchange state while the "process" is down: one bound
        // buy silently disappears, and an untracked sell appears.
        let phantom_client_order_id = engine
            .state
            .levels
            .iter()
            .find_map(|l| l.buy.as_ref())
            .map(|b| b.client_order_id.as_str().to_string())
            .expect("expected at least one open buy before the simulated crash");
        exchange.drop_order_silently(&phantom_client_order_id);
        exchange.inject_orphan_order("BTC-USDT", Side::Sell, dec!(21900), dec!(0.01));
        // `engine` is dropped here, as if the process had exited.
    }

    let store = PersistenceStore::new(settings.persistence_dir.join("recover-demo.json"));
    let recovered_state = store
        .load()?
        .expect("snapshot should have been persisted by the first engine instance");

    let mut engine = GridEngine::new(recovered_state, exchange.clone(), settings);
    let stats = engine.start().await?;

    println!("recovered and re-reconciled:");
    println!("  phantoms cleared:   {}", stats.phantoms_cleared);
    println!("  orphans cancelled:  {}", stats.orphans_cancelled);
    println!("  matched:            {}", stats.matched);
    println!("  status:             {:?}", engine.state.status);

    Ok(())
}
