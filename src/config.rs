//! Application settings loaded from the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::api::{RetryPolicy, CHART_API_BASE};
use crate::metrics::DEFAULT_WINDOW;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:./options_journal.db?mode=rwc";

/// Runtime configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Deployment label (development, production, ...)
    pub app_env: String,

    /// SQLite connection string for the journal
    pub database_url: String,

    /// Default lookback for realized volatility, in trading days
    pub hv_window: usize,

    /// Base URL of the chart endpoint
    pub market_data_url: String,

    /// Maximum fetch attempts per request
    pub fetch_max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    pub fetch_backoff_ms: u64,

    /// Cap on any single retry delay, in milliseconds
    pub fetch_backoff_max_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_env: "development".to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            hv_window: DEFAULT_WINDOW,
            market_data_url: CHART_API_BASE.to_string(),
            fetch_max_attempts: 3,
            fetch_backoff_ms: 1_000,
            fetch_backoff_max_ms: 8_000,
        }
    }
}

impl Settings {
    /// Load `.env` (if present) and read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let settings = Self {
            app_env: lookup("APP_ENV").unwrap_or(defaults.app_env),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            hv_window: parse_or(&lookup, "HV_WINDOW", defaults.hv_window)?,
            market_data_url: lookup("MARKET_DATA_URL").unwrap_or(defaults.market_data_url),
            fetch_max_attempts: parse_or(&lookup, "FETCH_MAX_ATTEMPTS", defaults.fetch_max_attempts)?,
            fetch_backoff_ms: parse_or(&lookup, "FETCH_BACKOFF_MS", defaults.fetch_backoff_ms)?,
            fetch_backoff_max_ms: parse_or(
                &lookup,
                "FETCH_BACKOFF_MAX_MS",
                defaults.fetch_backoff_max_ms,
            )?,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.hv_window < 2 {
            bail!("HV_WINDOW must be at least 2, got {}", self.hv_window);
        }
        if self.fetch_max_attempts == 0 {
            bail!("FETCH_MAX_ATTEMPTS must be at least 1");
        }
        if self.fetch_backoff_max_ms < self.fetch_backoff_ms {
            bail!(
                "FETCH_BACKOFF_MAX_MS ({}) must not be below FETCH_BACKOFF_MS ({})",
                self.fetch_backoff_max_ms,
                self.fetch_backoff_ms
            );
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fetch_max_attempts,
            initial: Duration::from_millis(self.fetch_backoff_ms),
            max: Duration::from_millis(self.fetch_backoff_max_ms),
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Configuration ===")?;
        writeln!(f, "Environment:        {}", self.app_env)?;
        writeln!(f, "Database:           {}", self.database_url)?;
        writeln!(f, "HV Window:          {} days", self.hv_window)?;
        writeln!(f, "Market Data URL:    {}", self.market_data_url)?;
        writeln!(f, "Fetch Attempts:     {}", self.fetch_max_attempts)?;
        writeln!(
            f,
            "Fetch Backoff:      {}ms doubling, capped at {}ms",
            self.fetch_backoff_ms, self.fetch_backoff_max_ms
        )
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.app_env, "development");
        assert_eq!(settings.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(settings.hv_window, 20);
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("HV_WINDOW", " 30 "),
            ("FETCH_MAX_ATTEMPTS", "5"),
            ("FETCH_BACKOFF_MS", "250"),
            ("FETCH_BACKOFF_MAX_MS", "2000"),
        ]))
        .unwrap();

        assert_eq!(settings.app_env, "production");
        assert_eq!(settings.hv_window, 30);
        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial, Duration::from_millis(250));
        assert_eq!(policy.max, Duration::from_secs(2));
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = Settings::from_lookup(lookup(&[("HV_WINDOW", "twenty")])).unwrap_err();
        assert!(err.to_string().contains("HV_WINDOW"));

        assert!(Settings::from_lookup(lookup(&[("HV_WINDOW", "1")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("FETCH_MAX_ATTEMPTS", "0")])).is_err());
        assert!(Settings::from_lookup(lookup(&[
            ("FETCH_BACKOFF_MS", "5000"),
            ("FETCH_BACKOFF_MAX_MS", "1000"),
        ]))
        .is_err());
    }
}
