use crate::models::PollTarget;
use crate::rpc::{DEFAULT_BLOCK_TIMEOUT, DEFAULT_LOGS_TIMEOUT};
use crate::scanner::DEFAULT_LOG_BATCH_SIZE;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_BLOCKS_PER_CYCLE: u64 = 500;
pub const DEFAULT_INITIAL_BACKFILL_BLOCKS: u64 = 2000;

/// Tunables for a [`PollScheduler`](crate::scheduler::PollScheduler).
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorSettings {
    pub poll_interval: Duration,
    pub block_timeout: Duration,
    pub logs_timeout: Duration,
    /// Upper bound on blocks per `eth_getLogs` call.
    pub log_batch_size: u64,
    /// Upper bound on blocks of extended metrics per target per sweep.
    pub max_blocks_per_cycle: u64,
    /// How far behind head a target without checkpoint starts.
    pub initial_backfill_blocks: u64,
    pub max_concurrent_targets: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        CollectorSettings {
            poll_interval: DEFAULT_POLL_INTERVAL,
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
            logs_timeout: DEFAULT_LOGS_TIMEOUT,
            log_batch_size: DEFAULT_LOG_BATCH_SIZE,
            max_blocks_per_cycle: DEFAULT_MAX_BLOCKS_PER_CYCLE,
            initial_backfill_blocks: DEFAULT_INITIAL_BACKFILL_BLOCKS,
            max_concurrent_targets: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub settings: CollectorSettings,
    /// Targets from `POLL_TARGETS`, registered at startup.
    pub seed_targets: Vec<PollTarget>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:./collector.db".to_string());

        let defaults = CollectorSettings::default();
        let settings = CollectorSettings {
            poll_interval: secs_var(&lookup, "POLL_INTERVAL_SECS", defaults.poll_interval)?,
            block_timeout: secs_var(&lookup, "BLOCK_TIMEOUT_SECS", defaults.block_timeout)?,
            logs_timeout: secs_var(&lookup, "LOGS_TIMEOUT_SECS", defaults.logs_timeout)?,
            log_batch_size: positive_var(&lookup, "LOG_BATCH_SIZE", defaults.log_batch_size)?,
            max_blocks_per_cycle: positive_var(
                &lookup,
                "MAX_BLOCKS_PER_CYCLE",
                defaults.max_blocks_per_cycle,
            )?,
            initial_backfill_blocks: positive_var(
                &lookup,
                "INITIAL_BACKFILL_BLOCKS",
                defaults.initial_backfill_blocks,
            )?,
            max_concurrent_targets: positive_var(
                &lookup,
                "MAX_CONCURRENT_TARGETS",
                defaults.max_concurrent_targets,
            )?,
        };

        let seed_targets = match lookup("POLL_TARGETS") {
            Some(raw) => parse_poll_targets(&raw)?,
            None => Vec::new(),
        };

        Ok(Config {
            database_url,
            settings,
            seed_targets,
        })
    }
}

fn positive_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };

    let value = raw
        .trim()
        .parse::<T>()
        .with_context(|| format!("Invalid {key} value: {raw}"))?;
    if value == T::default() {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(value)
}

fn secs_var<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    positive_var(lookup, key, default.as_secs()).map(Duration::from_secs)
}

/// Parses `id=url[,id=url...]`.
pub fn parse_poll_targets(raw: &str) -> Result<Vec<PollTarget>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, url) = entry
                .split_once('=')
                .with_context(|| format!("POLL_TARGETS entry must be id=url: {entry}"))?;
            let (id, url) = (id.trim(), url.trim());
            if id.is_empty() || url.is_empty() {
                anyhow::bail!("POLL_TARGETS entry must be id=url: {entry}");
            }
            Ok(PollTarget::new(id, url))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite:./collector.db");
        assert_eq!(config.settings, CollectorSettings::default());
        assert_eq!(config.settings.poll_interval, Duration::from_secs(15));
        assert_eq!(config.settings.initial_backfill_blocks, 2000);
        assert!(config.seed_targets.is_empty());
    }

    #[test]
    fn reads_overrides_and_targets() {
        let config = config_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("POLL_INTERVAL_SECS", "30"),
            ("MAX_BLOCKS_PER_CYCLE", "5000"),
            ("MAX_CONCURRENT_TARGETS", "4"),
            ("POLL_TARGETS", "fuji=https://fuji.example/rpc, local=http://127.0.0.1:8545"),
        ])
        .unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.settings.poll_interval, Duration::from_secs(30));
        assert_eq!(config.settings.max_blocks_per_cycle, 5000);
        assert_eq!(config.settings.max_concurrent_targets, 4);
        assert_eq!(
            config.seed_targets,
            vec![
                PollTarget::new("fuji", "https://fuji.example/rpc"),
                PollTarget::new("local", "http://127.0.0.1:8545"),
            ]
        );
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(config_from(&[("LOG_BATCH_SIZE", "0")]).is_err());
        assert!(config_from(&[("POLL_INTERVAL_SECS", "soon")]).is_err());
        assert!(config_from(&[("POLL_TARGETS", "missing-url")]).is_err());
        assert!(config_from(&[("POLL_TARGETS", "=http://x")]).is_err());
    }
}
