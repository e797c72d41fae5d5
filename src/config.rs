//! Client configuration loading: backend origin, push framing, retry policy and prize table.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use indexmap::IndexMap;
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::dto::{leaderboard::PrizeTable, ws::Framing};

/// Default location on disk where the client looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/client.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LEADERBOARD_SYNC_CONFIG_PATH";
/// Environment variable that overrides the configured backend origin.
const BACKEND_URL_ENV: &str = "BACKEND_URL";
/// Backend origin used when nothing else is configured.
const DEFAULT_BACKEND_URL: &str = "http://localhost:3001";
const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_JITTER: f64 = 0.5;
/// Upper bound on the backoff exponent so the multiplication cannot overflow.
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone)]
/// Immutable runtime configuration of a sync client.
pub struct ClientConfig {
    /// Origin shared by the push channel and the pull endpoints.
    pub backend_url: String,
    /// Wire framing spoken on the push channel.
    pub framing: Framing,
    /// Upper bound on a single pull request.
    pub pull_timeout: Duration,
    /// Upper bound on a single push connect attempt, handshake included.
    pub connect_timeout: Duration,
    /// Push channel reconnection policy.
    pub reconnect: ReconnectPolicy,
    /// Rank to prize table used for display.
    pub prizes: PrizeTable,
}

impl ClientConfig {
    /// Load the configuration from disk and the environment, falling back to built-in defaults.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        if let Some(url) = env::var(BACKEND_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            info!(backend_url = %url, "backend URL overridden from environment");
            config.backend_url = url;
        }
        config
    }

    fn load_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        backend_url = %config.backend_url,
                        "loaded client config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Same configuration pointed at another backend.
    pub fn with_backend_url(mut self, backend_url: impl Into<String>) -> Self {
        self.backend_url = backend_url.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.into(),
            framing: Framing::default(),
            pull_timeout: DEFAULT_PULL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            prizes: PrizeTable::default(),
        }
    }
}

/// Reconnection policy of the push channel.
///
/// Delays grow exponentially from `initial_delay`, are randomized by `jitter`
/// and never exceed `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Consecutive failed reconnects tolerated before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Cap on any delay.
    pub max_delay: Duration,
    /// Randomization factor in `[0, 1]`.
    pub jitter: f64,
}

impl ReconnectPolicy {
    /// Whether another attempt is allowed after `failures` consecutive failures.
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures <= max)
    }

    /// Delay to wait after `failures` consecutive failures (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let base = self
            .initial_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay);

        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }

        let mut rng = rand::rng();
        let deviation = base.mul_f64(rng.random::<f64>() * jitter);
        let delay = if rng.random_bool(0.5) {
            base.saturating_sub(deviation)
        } else {
            base.saturating_add(deviation)
        };
        delay.min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: DEFAULT_JITTER,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    backend_url: Option<String>,
    #[serde(default)]
    framing: Option<Framing>,
    #[serde(default)]
    pull_timeout_ms: Option<u64>,
    #[serde(default)]
    connect_timeout_ms: Option<u64>,
    #[serde(default)]
    reconnect: Option<RawReconnect>,
    #[serde(default)]
    prizes: Option<IndexMap<u32, f64>>,
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the `reconnect` section.
struct RawReconnect {
    /// Missing keeps the default, `null` retries forever.
    #[serde(default, with = "::serde_with::rust::double_option")]
    max_attempts: Option<Option<u32>>,
    #[serde(default)]
    initial_delay_ms: Option<u64>,
    #[serde(default)]
    max_delay_ms: Option<u64>,
    #[serde(default)]
    jitter: Option<f64>,
}

impl From<RawConfig> for ClientConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            backend_url: value.backend_url.unwrap_or(defaults.backend_url),
            framing: value.framing.unwrap_or(defaults.framing),
            pull_timeout: value
                .pull_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.pull_timeout),
            connect_timeout: value
                .connect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            reconnect: value.reconnect.map(Into::into).unwrap_or(defaults.reconnect),
            prizes: value.prizes.map(PrizeTable::new).unwrap_or(defaults.prizes),
        }
    }
}

impl From<RawReconnect> for ReconnectPolicy {
    fn from(value: RawReconnect) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: value.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: value
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: value
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            jitter: value.jitter.unwrap_or(defaults.jitter),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
