//! Grid Status Printer
//!
//! Reads a persisted grid snapshot from disk and prints a summary.
//! Useful for debugging a running or crashed instance without pulling it
//! into a REPL.
//!
//! ## Usage
//!
//! ```bash
//! # Pretty-print the default view
//! grid-status --path ./state/BTC-USDT.json
//!
//! # Compact one-line view
//! grid-status --path ./state/BTC-USDT.json --format compact
//!
//! # JSON output, for piping into other tools
//! grid-status --path ./state/BTC-USDT.json --format json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use grid_core::persistence::PersistenceStore;
use grid_core::prelude::*;
use serde_json::json;

#[derive(Parser)]
#[command(name = "grid-status")]
#[command(about = "Print a persisted grid instance's status", long_about = None)]
struct Args {
    /// Path to the persisted snapshot file
    #[arg(short, long)]
    path: String,

    /// Number of grid levels to display (0 = all)
    #[arg(short, long, default_value = "10")]
    levels: usize,

    /// Output format (pretty, compact, json)
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let store = PersistenceStore::new(&args.path);
    let state = store
        .load()
        .context("failed to load snapshot")?
        .ok_or_else(|| anyhow::anyhow!("no snapshot found at {}", args.path))?;

    match args.format.as_str() {
        "json" => print_json(&state)?,
        "compact" => print_compact(&state),
        _ => print_pretty(&state, args.levels),
    }

    Ok(())
}

fn print_pretty(state: &GridState, max_levels: usize) {
    let view = state.status_view();

    println!();
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║  {:<58} ║", format!("{} ({})", view.symbol, view.instance_id));
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║  Status: {:<51?} ║", view.status);
    println!(
        "║  Open buys: {:<6} Open sells: {:<6} Awaiting retry: {:<6} ║",
        view.open_buy_orders, view.open_sell_orders, view.levels_awaiting_retry
    );
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    if let Some(price) = view.lowest_open_buy_price {
        println!("  Lowest open buy:   {price}");
    }
    if let Some(price) = view.highest_open_sell_price {
        println!("  Highest open sell: {price}");
    }
    println!();

    println!("  Realized profit:   {}", view.statistics.realized_profit);
    println!("  Fees paid:         {}", view.statistics.total_fees_paid);
    println!("  Completed cycles:  {}", view.statistics.completed_cycles);
    println!(
        "  Fills: {} buys / {} sells",
        view.statistics.total_buys_filled, view.statistics.total_sells_filled
    );
    println!();

    println!("  LEVEL   PRICE        BUY         SELL       RETRY");
    println!("  ─────────────────────────────────────────────────");
    let levels: Box<dyn Iterator<Item = &GridLevel>> = if max_levels == 0 {
        Box::new(state.levels.iter())
    } else {
        Box::new(state.levels.iter().take(max_levels))
    };
    for level in levels {
        let buy = if level.buy.is_some() { "open" } else { "-" };
        let sell = if level.sell.is_some() { "open" } else { "-" };
        let retry = match level.pending_retry.as_ref().map(|r| r.side) {
            Some(Side::Buy) => "buy",
            Some(Side::Sell) => "sell",
            None => "-",
        };
        let marker = if level.inactive { "*" } else { " " };
        println!(
            "  {:>4}{}  {:>10}  {:>8}  {:>8}  {:>6}",
            level.index, marker, level.price, buy, sell, retry
        );
    }
    if state.levels.iter().any(|l| l.inactive) {
        println!();
        println!("  * inactive (below minimum notional)");
    }
    println!();
}

fn print_compact(state: &GridState) {
    let view = state.status_view();
    println!(
        "{}  {:?}  buys={} sells={} retry={}  profit={}  cycles={}",
        view.symbol,
        view.status,
        view.open_buy_orders,
        view.open_sell_orders,
        view.levels_awaiting_retry,
        view.statistics.realized_profit,
        view.statistics.completed_cycles,
    );
}

fn print_json(state: &GridState) -> Result<()> {
    let view = state.status_view();
    let output = json!({
        "instance_id": view.instance_id,
        "symbol": view.symbol,
        "status": view.status,
        "open_buy_orders": view.open_buy_orders,
        "open_sell_orders": view.open_sell_orders,
        "levels_awaiting_retry": view.levels_awaiting_retry,
        "lowest_open_buy_price": view.lowest_open_buy_price,
        "highest_open_sell_price": view.highest_open_sell_price,
        "statistics": view.statistics,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
