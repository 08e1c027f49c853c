//! Strategy-level wiring on top of `grid-core`.
//!
//! `grid-core` owns durable state, persistence, reconciliation, and the
//! exchange contract; this crate adds the capability boundary a binary
//! actually drives (`Strategy`) and the one concrete strategy this
//! workspace ships (`GridStrategy`), which delegates straight into a
//! `grid_core::GridEngine`.

pub mod grid_strategy;
pub mod strategy;

pub use grid_strategy::GridStrategy;
pub use strategy::{EngineContext, Strategy};
