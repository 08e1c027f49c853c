//! Runtime configuration for the engine process.
//!
//! `GridConfig` (symbol, bounds, grid count, risk percentages) is a
//! per-instance value that belongs to the domain model
//! ([`crate::domain::GridConfig`]) and is supplied however a binary wants
//! (a TOML file, a CLI flag, a request body). This module is the *engine
//! process* settings surrounding it: where snapshots live, how long to
//! wait on an exchange call, and the retry policy — the kind of
//! operational, non-hot-path configuration this crate's own predecessor
//! anticipated loading via the `config` crate but left as a TODO. That TODO
//! is completed here rather than left pending, since a grid bot's
//! settings are inherently runtime values, not something to compile in via
//! Cargo features the way a latency-sensitive market maker's risk limits
//! are.

use crate::resilience::BackoffConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSettings {
    pub initial_delay_secs: f64,
    pub max_delay_secs: f64,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        let defaults = BackoffConfig::default();
        Self {
            initial_delay_secs: defaults.initial_delay.as_secs_f64(),
            max_delay_secs: defaults.max_delay.as_secs_f64(),
            multiplier: defaults.multiplier,
            jitter_factor: defaults.jitter_factor,
        }
    }
}

impl From<&BackoffSettings> for BackoffConfig {
    fn from(s: &BackoffSettings) -> Self {
        BackoffConfig {
            initial_delay: Duration::from_secs_f64(s.initial_delay_secs),
            max_delay: Duration::from_secs_f64(s.max_delay_secs),
            multiplier: s.multiplier,
            max_retries: None,
            jitter_factor: s.jitter_factor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Directory persisted snapshots are written under, one file per
    /// instance id.
    pub persistence_dir: PathBuf,
    /// Upper bound on any single exchange RPC.
    pub request_timeout_secs: u64,
    pub backoff: BackoffSettings,
    /// Consecutive exchange-call failures before the failure is surfaced
    /// to the status view rather than retried silently.
    pub surface_failure_after: u32,
    pub log_level: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            persistence_dir: PathBuf::from("./data/grids"),
            request_timeout_secs: 10,
            backoff: BackoffSettings::default(),
            surface_failure_after: 5,
            log_level: "info".to_string(),
        }
    }
}

impl EngineSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig::from(&self.backoff)
    }

    /// Loads settings from `path` (TOML), with `GRID__`-prefixed
    /// environment variables (double underscore separating nested fields,
    /// e.g. `GRID__BACKOFF__MAX_DELAY_SECS=120`) overriding file values.
    /// Falls back to defaults if `path` does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&EngineSettings::default())?)
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("GRID").separator("__"));

        let settings = builder
            .build()
            .context("failed to assemble engine settings")?;
        let settings: EngineSettings = settings
            .try_deserialize()
            .context("failed to deserialize engine settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            anyhow::bail!(
                "invalid log_level '{}', must be one of {:?}",
                self.log_level,
                valid_levels
            );
        }
        Ok(())
    }
}
