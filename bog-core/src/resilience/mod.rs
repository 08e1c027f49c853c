//! Resilience patterns for production deployment.
//!
//! Currently just exponential backoff; reconnect handling lives in
//! [`crate::exchange`] (a fresh subscription plus a full reconciliation
//! pass), since a single grid instance manages exactly one exchange
//! connection rather than a fleet of shards.

pub mod backoff;

pub use backoff::{BackoffConfig, ExponentialBackoff};
