use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::form::{FormPolicy, RegistryLimits, RetryPolicy};
use crate::gap::SeverityBands;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    File,
    Redis,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "redis" => Ok(StorageBackend::Redis),
            "memory" => Ok(StorageBackend::Memory),
            other => bail!("STORAGE_BACKEND must be one of file, redis, memory (got '{other}')"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub index_series_path: PathBuf,
    pub port: u16,
    pub rust_log: String,
    pub storage_backend: StorageBackend,
    pub storage_dir: PathBuf,
    pub redis_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub snapshot_max_age: Duration,
    pub form_policy: FormPolicy,
    pub registry_limits: RegistryLimits,
    pub bands: SeverityBands,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let storage_backend: StorageBackend = env.or("STORAGE_BACKEND", "file")?;
        let redis_url = env.optional("REDIS_URL");
        if storage_backend == StorageBackend::Redis && redis_url.is_none() {
            bail!("REDIS_URL is required when STORAGE_BACKEND=redis");
        }

        let max_age_hours: u64 = env.or("SNAPSHOT_MAX_AGE_HOURS", "24")?;
        if max_age_hours == 0 {
            bail!("SNAPSHOT_MAX_AGE_HOURS must be at least 1");
        }
        let Some(max_age_secs) = max_age_hours.checked_mul(60 * 60) else {
            bail!("SNAPSHOT_MAX_AGE_HOURS is too large ({max_age_hours})");
        };

        let idle_minutes: u64 = env.or("FORM_IDLE_TIMEOUT_MINUTES", "30")?;
        if idle_minutes == 0 {
            bail!("FORM_IDLE_TIMEOUT_MINUTES must be at least 1");
        }
        let Some(idle_secs) = idle_minutes.checked_mul(60) else {
            bail!("FORM_IDLE_TIMEOUT_MINUTES is too large ({idle_minutes})");
        };
        let max_sessions: usize = env.or("MAX_ACTIVE_FORMS", "1000")?;
        if max_sessions == 0 {
            bail!("MAX_ACTIVE_FORMS must be at least 1");
        }

        let bands = SeverityBands::new(
            env.or("SEVERITY_MINIMAL_BELOW_PCT", "2.0")?,
            env.or("SEVERITY_MODERATE_BELOW_PCT", "5.0")?,
            env.or("SEVERITY_SIGNIFICANT_BELOW_PCT", "10.0")?,
        )
        .context("Invalid SEVERITY_*_BELOW_PCT cut points")?;

        Ok(Config {
            index_series_path: PathBuf::from(env.require("INDEX_SERIES_PATH")?),
            port: env.or("PORT", "8080")?,
            rust_log: env.optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            storage_backend,
            storage_dir: PathBuf::from(
                env.optional("STORAGE_DIR")
                    .unwrap_or_else(|| "./data/forms".to_string()),
            ),
            redis_url,
            anthropic_api_key: env.optional("ANTHROPIC_API_KEY"),
            snapshot_max_age: Duration::from_secs(max_age_secs),
            form_policy: FormPolicy {
                autosave_debounce: Duration::from_millis(env.or("AUTOSAVE_DEBOUNCE_MS", "800")?),
                retry: RetryPolicy {
                    max_retries: env.or("SUBMIT_MAX_RETRIES", "3")?,
                    backoff_base: Duration::from_millis(env.or("SUBMIT_BACKOFF_BASE_MS", "1000")?),
                },
            },
            registry_limits: RegistryLimits {
                idle_timeout: Duration::from_secs(idle_secs),
                max_sessions,
            },
            bands,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and blank are the same thing.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.optional(key)
            .with_context(|| format!("Required environment variable '{key}' is not set"))
    }

    fn or<T>(&self, key: &str, default: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.optional(key).unwrap_or_else(|| default.to_string());
        raw.trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply() {
        let config = config(&[("INDEX_SERIES_PATH", "data/cpi.json")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage_backend, StorageBackend::File);
        assert_eq!(config.storage_dir, PathBuf::from("./data/forms"));
        assert_eq!(config.snapshot_max_age, Duration::from_secs(24 * 3600));
        assert_eq!(config.form_policy, FormPolicy::default());
        assert_eq!(config.registry_limits, RegistryLimits::default());
        assert_eq!(config.bands, SeverityBands::default());
        assert!(config.anthropic_api_key.is_none());
    }

    #[test]
    fn test_index_path_is_required() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("INDEX_SERIES_PATH"));
    }

    #[test]
    fn test_redis_backend_needs_url() {
        let err = config(&[("INDEX_SERIES_PATH", "x"), ("STORAGE_BACKEND", "redis")]).unwrap_err();
        assert!(err.to_string().contains("REDIS_URL"));

        let ok = config(&[
            ("INDEX_SERIES_PATH", "x"),
            ("STORAGE_BACKEND", "Redis"),
            ("REDIS_URL", "redis://localhost:6379"),
        ])
        .unwrap();
        assert_eq!(ok.storage_backend, StorageBackend::Redis);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config(&[
            ("INDEX_SERIES_PATH", "x"),
            ("AUTOSAVE_DEBOUNCE_MS", "250"),
            ("SUBMIT_MAX_RETRIES", "5"),
            ("SUBMIT_BACKOFF_BASE_MS", "200"),
            ("SNAPSHOT_MAX_AGE_HOURS", "2"),
            ("ANTHROPIC_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert_eq!(config.form_policy.autosave_debounce, Duration::from_millis(250));
        assert_eq!(config.form_policy.retry.max_retries, 5);
        assert_eq!(config.form_policy.retry.backoff_base, Duration::from_millis(200));
        assert_eq!(config.snapshot_max_age, Duration::from_secs(7200));
        assert_eq!(config.anthropic_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_bad_numbers_name_the_variable() {
        let err = config(&[("INDEX_SERIES_PATH", "x"), ("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        let huge = u64::MAX.to_string();
        let err = config(&[("INDEX_SERIES_PATH", "x"), ("SNAPSHOT_MAX_AGE_HOURS", &huge)]).unwrap_err();
        assert!(err.to_string().contains("SNAPSHOT_MAX_AGE_HOURS"));

        let err = config(&[("INDEX_SERIES_PATH", "x"), ("FORM_IDLE_TIMEOUT_MINUTES", &huge)]).unwrap_err();
        assert!(err.to_string().contains("FORM_IDLE_TIMEOUT_MINUTES"));
    }

    #[test]
    fn test_registry_limits_must_be_positive() {
        let err = config(&[("INDEX_SERIES_PATH", "x"), ("MAX_ACTIVE_FORMS", "0")]).unwrap_err();
        assert!(err.to_string().contains("MAX_ACTIVE_FORMS"));

        let config = config(&[
            ("INDEX_SERIES_PATH", "x"),
            ("MAX_ACTIVE_FORMS", "50"),
            ("FORM_IDLE_TIMEOUT_MINUTES", "5"),
        ])
        .unwrap();
        assert_eq!(config.registry_limits.max_sessions, 50);
        assert_eq!(config.registry_limits.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_non_ascending_bands_fail() {
        let err = config(&[
            ("INDEX_SERIES_PATH", "x"),
            ("SEVERITY_MINIMAL_BELOW_PCT", "6"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("SEVERITY"));
    }

    #[test]
    fn test_blank_key_counts_as_unset() {
        let config = config(&[("INDEX_SERIES_PATH", "x"), ("ANTHROPIC_API_KEY", "  ")]).unwrap();
        assert!(config.anthropic_api_key.is_none());
    }
}
