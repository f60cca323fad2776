//! Configuration management for a converge engine.
//!
//! Values are loaded from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. The file named by `CONVERGE_CONFIG_PATH`
//! 3. Environment variables prefixed with `CONVERGE__` (highest priority)
//!
//! Loading never validates; call [`ConvergeConfig::validate`] once all
//! overrides are applied.


use std::env;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Upper bound for the coalescing window. A longer window would hold the
/// drain lock long enough to look like a stalled engine.
pub const MAX_COALESCE_WINDOW_MS: u64 = 60_000;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConvergeConfig {
    /// Engine name, used as the metrics label and in worker log spans.
    /// Distinct engines in one process should use distinct names.
    #[serde(default = "default_name")]
    pub name: String,

    /// Number of parallel drain workers. Bounds how many batch resolution
    /// calls can be in flight at once.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Delay inserted before each swap of the pending queue, widening the
    /// window in which concurrent submits join the same round.
    /// 0 disables the delay.
    #[serde(default = "default_coalesce_window_in_ms")]
    pub coalesce_window_in_ms: u64,
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            worker_count: default_worker_count(),
            coalesce_window_in_ms: default_coalesce_window_in_ms(),
        }
    }
}

impl ConvergeConfig {
    /// Creates a new configuration with hierarchical override support.
    ///
    /// # Example
    /// ```ignore
    /// let cfg = ConvergeConfig::new()?
    ///     .with_override_config("converge.toml")?
    ///     .validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONVERGE_CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config) // No validation - deferred to validate()
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Builds a configuration from raw tuning values, clamping them into the
    /// accepted range instead of rejecting them: zero workers become one.
    /// A non-zero window shorter than a millisecond is rounded up to 1ms.
    pub fn with_workers(
        worker_count: usize,
        coalesce_window: Duration,
    ) -> Self {
        Self {
            worker_count: worker_count.max(1),
            coalesce_window_in_ms: window_in_ms(coalesce_window),
            ..Default::default()
        }
    }

    pub fn with_name(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.name = name.into();
        self
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        if self.name.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message("name cannot be empty".into())));
        }

        if self.worker_count == 0 {
            return Err(Error::Config(ConfigError::Message(
                "worker_count must be at least 1".into(),
            )));
        }

        if self.coalesce_window_in_ms > MAX_COALESCE_WINDOW_MS {
            return Err(Error::Config(ConfigError::Message(format!(
                "coalesce_window_in_ms {}ms exceeds the maximum of {}ms",
                self.coalesce_window_in_ms, MAX_COALESCE_WINDOW_MS
            ))));
        }

        Ok(self)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_in_ms)
    }
}

fn window_in_ms(window: Duration) -> u64 {
    let ms = window.as_millis().min(MAX_COALESCE_WINDOW_MS as u128) as u64;
    if ms == 0 && !window.is_zero() {
        1
    } else {
        ms
    }
}

fn environment() -> Environment {
    Environment::with_prefix("CONVERGE")
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

fn default_name() -> String {
    "converge".to_string()
}
fn default_worker_count() -> usize {
    1
}
// in ms
fn default_coalesce_window_in_ms() -> u64 {
    0
}
