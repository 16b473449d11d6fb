//! Run configuration, loaded and validated the way the rest of the stack
//! loads node settings: a plain `Deserialize` struct assembled from layered
//! sources via the `config` crate, with a single `validate()` pass run once
//! at construction.

use std::time::Duration;

use serde::Deserialize;

use crate::errors::CosiError;

/// Minimum main-protocol timeout accepted by [`CosiConfig::validate`].
pub const MIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Recognised run configuration (spec.md §6, "Configuration").
#[derive(Debug, Clone, Deserialize)]
pub struct CosiConfig {
    /// Minimum number of present (non-absent) roster positions for a valid
    /// signature. Defaults to `ceil(2*roster_len/3)` when absent.
    pub threshold: Option<usize>,

    /// Main-protocol budget.
    #[serde(with = "humantime_serde_millis")]
    pub timeout: Duration,

    /// Sub-protocol budget. Defaults to `timeout / 2` when absent.
    #[serde(default, with = "opt_humantime_serde_millis")]
    pub sub_timeout: Option<Duration>,

    /// Whether to retry a sub-protocol once on sub-leader timeout.
    #[serde(default = "default_retry")]
    pub retry_subtree_once: bool,
}

fn default_retry() -> bool {
    true
}

impl Default for CosiConfig {
    fn default() -> Self {
        CosiConfig {
            threshold: None,
            timeout: Duration::from_secs(1),
            sub_timeout: None,
            retry_subtree_once: true,
        }
    }
}

/// A [`CosiConfig`] that has been validated against a roster of `n` members.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub threshold: usize,
    pub timeout: Duration,
    pub sub_timeout: Duration,
    pub retry_subtree_once: bool,
}

impl CosiConfig {
    /// Load configuration the way the rest of the stack loads settings: a
    /// compiled-in default, overridden by an optional file, overridden by
    /// `COSI_*` environment variables.
    pub fn load(config_file: Option<&str>) -> Result<Self, CosiError> {
        let mut builder = config::Config::builder()
            .set_default("timeout", "1s")
            .map_err(|e| CosiError::ConfigError(e.to_string()))?
            .set_default("retry_subtree_once", true)
            .map_err(|e| CosiError::ConfigError(e.to_string()))?;

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(config::Environment::with_prefix("COSI"));

        let raw = builder
            .build()
            .map_err(|e| CosiError::ConfigError(e.to_string()))?;

        raw.try_deserialize()
            .map_err(|e| CosiError::ConfigError(e.to_string()))
    }

    /// Validate this configuration against a roster of `roster_len` members,
    /// enforcing `timeout >= MIN_TIMEOUT` and `1 <= threshold <= roster_len`,
    /// and deriving `sub_timeout` when it wasn't set explicitly.
    pub fn validate(&self, roster_len: usize) -> Result<ValidatedConfig, CosiError> {
        if roster_len == 0 {
            return Err(CosiError::ConfigError("roster must not be empty".into()));
        }
        if self.timeout < MIN_TIMEOUT {
            return Err(CosiError::ConfigError(format!(
                "timeout {:?} below minimum {:?}",
                self.timeout, MIN_TIMEOUT
            )));
        }

        let threshold = self.threshold.unwrap_or_else(|| (2 * roster_len).div_ceil(3));
        if threshold < 1 || threshold > roster_len {
            return Err(CosiError::ConfigError(format!(
                "threshold {} out of range [1, {}]",
                threshold, roster_len
            )));
        }

        let sub_timeout = self.sub_timeout.unwrap_or(self.timeout / 2);

        Ok(ValidatedConfig {
            threshold,
            timeout: self.timeout,
            sub_timeout,
            retry_subtree_once: self.retry_subtree_once,
        })
    }
}

/// `humantime`-less millisecond (de)serialization for `Duration` fields, kept
/// local to avoid pulling in another dependency for two fields.
mod humantime_serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

mod opt_humantime_serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}
