//! Simulated end-to-end grid run against an in-memory mock exchange.
//!
//! Builds a grid from CLI-supplied bounds, starts the engine (which
//! reconciles against an empty mock exchange and places the initial
//! ladder), then walks the ticker through a few price moves, simulating
//! fills at the levels crossed so a reader can see counter-orders placed
//! and profit booked without touching a real venue.

use anyhow::Result;
use clap::Parser;
use grid_core::domain::grid_config::SpacingMode;
use grid_core::exchange::mock::MockExchange;
use grid_core::geometry::build_levels;
use grid_core::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "grid-sim")]
#[command(about = "Run a grid instance against a simulated exchange", long_about = None)]
struct Args {
    #[arg(long, default_value = "BTC-USDT")]
    symbol: String,

    #[arg(long, default_value = "20000")]
    lower_bound: String,

    #[arg(long, default_value = "30000")]
    upper_bound: String,

    #[arg(long, default_value = "10")]
    num_grids: u32,

    #[arg(long, default_value = "50000")]
    total_investment: String,

    #[arg(long, value_enum, default_value = "arithmetic")]
    spacing: SpacingArg,
}

#[derive(Clone, clap::ValueEnum)]
enum SpacingArg {
    Arithmetic,
    Geometric,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let lower_bound = Decimal::from_str(&args.lower_bound)?;
    let upper_bound = Decimal::from_str(&args.upper_bound)?;
    let total_investment = Decimal::from_str(&args.total_investment)?;

    let config = GridConfig {
        symbol: args.symbol.clone(),
        lower_bound,
        upper_bound,
        num_grids: args.num_grids,
        spacing_mode: match args.spacing {
            SpacingArg::Arithmetic => SpacingMode::Arithmetic,
            SpacingArg::Geometric => SpacingMode::Geometric,
        },
        total_investment,
        stop_loss_pct: Some(Decimal::from_str("0.15")?),
        take_profit_pct: Some(Decimal::from_str("0.15")?),
        reserve_fraction: Decimal::from_str("0.05")?,
    };

    let levels = build_levels(
        &config,
        Decimal::from_str("0.01")?,
        Decimal::from_str("0.0001")?,
        Decimal::from_str("10")?,
    )?;

    let mid = (lower_bound + upper_bound) / Decimal::TWO;
    let exchange = Arc::new(MockExchange::new(Ticker {
        last: mid,
        best_bid: mid - Decimal::ONE,
        best_ask: mid + Decimal::ONE,
        timestamp: std::time::SystemTime::now(),
    }));

    let state = GridState::new(format!("sim-{}", args.symbol), config, levels);
    let settings = EngineSettings::default();
    let mut engine = GridEngine::new(state, exchange.clone(), settings);

    let stats = engine.start().await?;
    info!(
        phantoms = stats.phantoms_cleared,
        orphans = stats.orphans_cancelled,
        matched = stats.matched,
        "reconciled against simulated exchange"
    );

    let mut fills = exchange.subscribe_fills(&args.symbol);

    let buy_levels: Vec<usize> = engine
        .state
        .levels
        .iter()
        .filter(|l| l.buy.is_some())
        .map(|l| l.index)
        .collect();

    let fill_fee = Decimal::from_str("0.01")?;
    for index in buy_levels {
        let Some(order) = engine.state.levels[index].buy.clone() else {
            continue;
        };
        exchange
            .simulate_fill(order.client_order_id.as_str(), order.quantity, fill_fee)
            .await;
        let fill = fills.recv().await.expect("mock exchange closed fills channel unexpectedly");
        engine.on_fill(fill).await?;
    }

    let view = engine.state.status_view();
    println!("final status: {:?}", view.status);
    println!("open buys: {}  open sells: {}", view.open_buy_orders, view.open_sell_orders);
    println!("realized profit: {}", view.statistics.realized_profit);
    println!("completed cycles: {}", view.statistics.completed_cycles);

    Ok(())
}
