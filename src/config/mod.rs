mod file_config;

pub use file_config::{FileConfig, ReconnectConfig};

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::time::Duration;

/// How an optimistic write is undone when the server rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReconcileStrategy {
    /// Re-fetch the list and let the server state win.
    #[default]
    Refetch,
    /// Restore the snapshot taken before the optimistic write.
    Rollback,
}

fn parse_reconcile_strategy(s: &str) -> Option<ReconcileStrategy> {
    ReconcileStrategy::from_str(s, true).ok()
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub api_base_url: Option<String>,
    pub channel_url: Option<String>,
    pub request_timeout_sec: Option<u64>,
    pub reconcile_strategy: Option<ReconcileStrategy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    // Endpoints
    pub api_base_url: Option<String>,
    pub channel_url: Option<String>,
    pub request_timeout_sec: u64,

    // Push channel
    pub reconnect: ReconnectSettings,
    /// Consecutive failed opens before `connect()` reports the channel unavailable.
    pub connect_attempts: u32,
    pub channel_buffer: usize,

    // Coordinator
    pub state_poll_interval: Duration,
    pub reconcile_strategy: ReconcileStrategy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: None,
            channel_url: None,
            request_timeout_sec: 30,
            reconnect: ReconnectSettings::default(),
            connect_attempts: 5,
            channel_buffer: 64,
            state_poll_interval: Duration::from_millis(5000),
            reconcile_strategy: ReconcileStrategy::default(),
        }
    }
}

impl SyncSettings {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();
        let defaults = SyncSettings::default();

        let api_base_url = file
            .api_base_url
            .or_else(|| cli.api_base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string());
        let channel_url = file.channel_url.or_else(|| cli.channel_url.clone());

        if let Some(url) = &channel_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                bail!("channel_url must be a ws:// or wss:// URL: {}", url);
            }
        }

        let request_timeout_sec = file
            .request_timeout_sec
            .or(cli.request_timeout_sec)
            .unwrap_or(defaults.request_timeout_sec);

        let reconcile_strategy = match file.reconcile_strategy {
            Some(s) => match parse_reconcile_strategy(&s) {
                Some(strategy) => strategy,
                None => bail!("Unknown reconcile_strategy: {}", s),
            },
            None => cli.reconcile_strategy.unwrap_or_default(),
        };

        // Reconnect settings - merge file config with defaults
        let rc_file = file.reconnect.unwrap_or_default();
        let reconnect = ReconnectSettings {
            initial_backoff_ms: rc_file
                .initial_backoff_ms
                .unwrap_or(defaults.reconnect.initial_backoff_ms),
            max_backoff_ms: rc_file
                .max_backoff_ms
                .unwrap_or(defaults.reconnect.max_backoff_ms),
            backoff_multiplier: rc_file
                .backoff_multiplier
                .unwrap_or(defaults.reconnect.backoff_multiplier),
        };
        if reconnect.backoff_multiplier < 1.0 {
            bail!(
                "reconnect.backoff_multiplier must be >= 1.0, got {}",
                reconnect.backoff_multiplier
            );
        }
        if reconnect.max_backoff_ms < reconnect.initial_backoff_ms {
            bail!(
                "reconnect.max_backoff_ms ({}) is lower than initial_backoff_ms ({})",
                reconnect.max_backoff_ms,
                reconnect.initial_backoff_ms
            );
        }

        let connect_attempts = file.connect_attempts.unwrap_or(defaults.connect_attempts);
        if connect_attempts == 0 {
            bail!("connect_attempts must be at least 1");
        }

        let state_poll_interval = file
            .state_poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.state_poll_interval);
        if state_poll_interval.is_zero() {
            bail!("state_poll_interval_ms must be greater than 0");
        }

        Ok(Self {
            api_base_url,
            channel_url,
            request_timeout_sec,
            reconnect,
            connect_attempts,
            channel_buffer: file.channel_buffer.unwrap_or(defaults.channel_buffer),
            state_poll_interval,
            reconcile_strategy,
        })
    }
}
