use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const API_URL: &str = "https://www.api.experiment-hq.com/";
pub const NOTION_BASE_URL: &str = "https://www.notion.so/";

pub const BATCH_SIZE: usize = 10;
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(10);
pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(1);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_API_KEY: &str = "EXPERIMENT_HQ_API_KEY";
const ENV_API_URL: &str = "EXPERIMENT_HQ_API_URL";
const ENV_REQUEST_TIMEOUT: &str = "EXPERIMENT_HQ_REQUEST_TIMEOUT_SECS";
const ENV_BATCH_SIZE: &str = "EXPERIMENT_HQ_BATCH_SIZE";
const ENV_FLUSH_INTERVAL: &str = "EXPERIMENT_HQ_FLUSH_INTERVAL_SECS";
const ENV_MAX_RETRIES: &str = "EXPERIMENT_HQ_MAX_RETRIES";
const ENV_RETRY_DELAY: &str = "EXPERIMENT_HQ_RETRY_DELAY_MS";
const ENV_HANDLE_SIGNALS: &str = "EXPERIMENT_HQ_HANDLE_SIGNALS";

/// Connection settings for the remote service.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: API_URL.to_string(),
            api_key: api_key.into(),
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(ENV_API_KEY)
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_API_KEY))?;

        let mut config = Self::new(api_key);
        if let Some(url) = lookup(ENV_API_URL) {
            config.api_url = url;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_REQUEST_TIMEOUT)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

// The key is a credential, keep it out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Batching and retry knobs for the delivery worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySettings {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Drain live experiments on Ctrl-C or SIGTERM, then exit the process.
    pub handle_signals: bool,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            flush_interval: FLUSH_INTERVAL,
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
            handle_signals: true,
        }
    }
}

impl DeliverySettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(size) = parse_var::<usize, _>(&lookup, ENV_BATCH_SIZE)? {
            if size == 0 {
                return Err(ConfigError::Invalid { key: ENV_BATCH_SIZE, value: size.to_string() });
            }
            settings.batch_size = size;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_FLUSH_INTERVAL)? {
            settings.flush_interval = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32, _>(&lookup, ENV_MAX_RETRIES)? {
            if retries == 0 {
                return Err(ConfigError::Invalid { key: ENV_MAX_RETRIES, value: retries.to_string() });
            }
            settings.max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_RETRY_DELAY)? {
            settings.retry_delay = Duration::from_millis(ms);
        }
        if let Some(enabled) = parse_var::<bool, _>(&lookup, ENV_HANDLE_SIGNALS)? {
            settings.handle_signals = enabled;
        }

        Ok(settings)
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

/// What the remote experiment record is created with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentOptions {
    pub project: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ExperimentOptions {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}
