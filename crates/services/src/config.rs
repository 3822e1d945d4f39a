//! Tunables for the services layer, with environment overrides.

use std::env;
use std::time::Duration;

use quiz_core::ranking::Eligibility;

use crate::error::ConfigError;

/// Retry and timeout policy for `ProgressionCoordinator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressionConfig {
    /// Read-modify-write attempts before a conflict is surfaced. At least 1.
    pub max_attempts: u32,
    /// Upper bound on each storage call.
    pub storage_timeout: Duration,
    /// Pause before retry `n` is `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            storage_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(5),
        }
    }
}

impl ProgressionConfig {
    /// Defaults overridden by `QUIZ_MAX_ATTEMPTS` and `QUIZ_STORAGE_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for unparsable or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(n) = read_env::<u32>("QUIZ_MAX_ATTEMPTS")? {
            config.max_attempts = n;
        }
        if let Some(ms) = read_env::<u64>("QUIZ_STORAGE_TIMEOUT_MS")? {
            config.storage_timeout = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `max_attempts` or `storage_timeout`
    /// is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "max_attempts",
                value: "0".into(),
            });
        }
        if self.storage_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "storage_timeout",
                value: "0ms".into(),
            });
        }
        Ok(())
    }
}

/// Shape of the materialized leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderboardConfig {
    /// Rows kept before the current player's row is appended.
    pub top_k: usize,
    pub eligibility: Eligibility,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            eligibility: Eligibility::ActiveOnly,
        }
    }
}

impl LeaderboardConfig {
    /// Defaults overridden by `QUIZ_LEADERBOARD_SIZE` and
    /// `QUIZ_INCLUDE_INACTIVE` (`true`/`false`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for unparsable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(k) = read_env::<usize>("QUIZ_LEADERBOARD_SIZE")? {
            config.top_k = k;
        }
        if let Some(include) = read_env::<bool>("QUIZ_INCLUDE_INACTIVE")? {
            config.eligibility = if include {
                Eligibility::Everyone
            } else {
                Eligibility::ActiveOnly
            };
        }
        Ok(config)
    }
}

fn read_env<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ProgressionConfig::default().validate().is_ok());
        assert_eq!(LeaderboardConfig::default().top_k, 10);
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let config = ProgressionConfig {
            max_attempts: 0,
            ..ProgressionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "max_attempts",
                ..
            })
        ));
    }

    #[test]
    fn parse_value_reports_key_and_raw_value() {
        assert_eq!(parse_value::<u32>("QUIZ_MAX_ATTEMPTS", " 7 ").unwrap(), 7);
        let err = parse_value::<u32>("QUIZ_MAX_ATTEMPTS", "lots").unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "QUIZ_MAX_ATTEMPTS",
                value: "lots".into()
            }
        );
    }
}
