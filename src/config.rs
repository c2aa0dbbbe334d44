// Runtime configuration: layered defaults + optional TOML file +
// environment variables, via the `config` crate.
//
// Grounded in `llm/providers/openai/config.rs`'s per-provider
// `Default`-plus-env-override shape, generalized to the layered
// `config::Config` builder SPEC_FULL.md §1.3 calls for (the reference
// crate only ever reads individual env vars directly; this is the one
// place in the crate that assembles them through the `config` crate it
// already depends on).

//! # Runtime Configuration
//!
//! [`RuntimeConfig`] layers, in increasing priority:
//! 1. built-in defaults,
//! 2. an optional `RuntimeConfig.toml` in the current directory,
//! 3. environment variables prefixed `RUNTIME_` (e.g. `RUNTIME_CHECKPOINT_DIR`).
//!
//! Call [`RuntimeConfig::load`] once at startup. Test harnesses and binaries
//! built on this crate may call [`load_dotenv`] first to populate the
//! environment from a local `.env` file, the way the reference crate's own
//! `src/bin` binaries do.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::{Result, RuntimeError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Root directory the Checkpoint Manager persists snapshots under.
    pub checkpoint_dir: PathBuf,
    /// Root directory the Execution Logger persists finished records under.
    pub execution_log_dir: PathBuf,
    /// Default retry policy applied when a step names no specific policy.
    pub default_retry: DefaultRetryConfig,
    /// How often the Progress Tracker writes its periodic disk checkpoint.
    pub progress_checkpoint_interval_secs: u64,
    /// How often the Execution Logger's duration/memory watchdog samples.
    pub monitor_poll_interval_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            checkpoint_dir: PathBuf::from("./data/checkpoints"),
            execution_log_dir: PathBuf::from("./data/executions"),
            default_retry: DefaultRetryConfig::default(),
            progress_checkpoint_interval_secs: 30,
            monitor_poll_interval_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultRetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for DefaultRetryConfig {
    fn default() -> Self {
        DefaultRetryConfig {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 10_000,
        }
    }
}

impl RuntimeConfig {
    /// Build the layered configuration: defaults, then `RuntimeConfig.toml`
    /// if present, then `RUNTIME_`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        Self::load_inner().map_err(|e| RuntimeError::Internal(format!("invalid runtime configuration: {e}")))
    }

    fn load_inner() -> anyhow::Result<Self> {
        let defaults = RuntimeConfig::default();
        let settled = config::Config::builder()
            .set_default("checkpoint_dir", defaults.checkpoint_dir.to_string_lossy().to_string())?
            .set_default("execution_log_dir", defaults.execution_log_dir.to_string_lossy().to_string())?
            .set_default("default_retry.max_attempts", defaults.default_retry.max_attempts)?
            .set_default("default_retry.base_delay_ms", defaults.default_retry.base_delay_ms)?
            .set_default("default_retry.max_delay_ms", defaults.default_retry.max_delay_ms)?
            .set_default(
                "progress_checkpoint_interval_secs",
                defaults.progress_checkpoint_interval_secs,
            )?
            .set_default("monitor_poll_interval_secs", defaults.monitor_poll_interval_secs)?
            .add_source(config::File::with_name("RuntimeConfig").required(false))
            .add_source(
                config::Environment::with_prefix("RUNTIME")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settled.try_deserialize()?)
    }

    pub fn progress_checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.progress_checkpoint_interval_secs)
    }

    pub fn monitor_poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_poll_interval_secs)
    }
}

/// Load a local `.env` file into the process environment, if one exists.
/// Mirrors the reference crate's `src/bin` binaries; this library itself
/// never calls it on its own, since a library must not mutate process-wide
/// environment state as a side effect of being linked.
pub fn load_dotenv() {
    let _ = dotenv::dotenv();
}
