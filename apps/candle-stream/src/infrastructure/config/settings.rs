//! Stream Configuration Settings
//!
//! Configuration types for the candle stream, loaded from environment
//! variables. Unlike lenient defaults, a malformed value is an error: the
//! binary reports it and exits before the stream starts.

use std::time::Duration;

use chrono::{DateTime, Local, Utc};

use crate::application::ports::CandleSubscription;

/// Default DXLink endpoint.
pub const DEFAULT_DXLINK_URL: &str = "wss://tasty-openapi-ws.dxfeed.com/realtime";

/// DXLink API quote token.
#[derive(Clone)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self { token }
    }

    /// Get the API token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// DXLink WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct DxLinkSettings {
    /// WebSocket endpoint.
    pub url: String,
    /// Interval between outgoing `KEEPALIVE` messages.
    pub keepalive_interval: Duration,
    /// Silence window after which the connection is considered dead.
    pub keepalive_timeout: Duration,
    /// Connect attempts before giving up.
    pub connect_attempts: u32,
}

impl Default for DxLinkSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DXLINK_URL.to_string(),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(60),
            connect_attempts: 5,
        }
    }
}

/// Stream loop settings.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Bounded wait for one upstream event.
    pub poll_timeout: Duration,
    /// Heartbeat period.
    pub heartbeat_period: Duration,
    /// Capacity of the rendering broadcast channel.
    pub publish_capacity: usize,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(2000),
            heartbeat_period: Duration::from_millis(100),
            publish_capacity: 16,
            metrics_port: 0,
        }
    }
}

/// Complete stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// DXLink credentials.
    pub credentials: Credentials,
    /// Candle subscription parameters.
    pub subscription: CandleSubscription,
    /// DXLink connection settings.
    pub dxlink: DxLinkSettings,
    /// Stream loop settings.
    pub stream: LoopSettings,
}

impl StreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `DXLINK_TOKEN` is missing or empty, or if any
    /// variable is set to a malformed value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`StreamConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let token = env
            .get("DXLINK_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("DXLINK_TOKEN".to_string()))?;
        if token.trim().is_empty() {
            return Err(ConfigError::EmptyValue("DXLINK_TOKEN".to_string()));
        }

        let symbol = env.get("STREAM_SYMBOL").unwrap_or_else(|| "SPY".to_string());
        if symbol.trim().is_empty() {
            return Err(ConfigError::EmptyValue("STREAM_SYMBOL".to_string()));
        }

        let interval = env.get("STREAM_INTERVAL").unwrap_or_else(|| "5m".to_string());
        if !is_valid_interval(&interval) {
            return Err(ConfigError::invalid("STREAM_INTERVAL", &interval));
        }

        let from_time = match env.get("STREAM_START_TIME") {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| ConfigError::invalid("STREAM_START_TIME", &raw))?,
            None => start_of_today()?,
        };

        let subscription = CandleSubscription {
            symbol,
            interval,
            from_time,
            extended_hours: env.parse_bool("STREAM_EXTENDED_HOURS", false)?,
        };

        let dxlink_defaults = DxLinkSettings::default();
        let dxlink = DxLinkSettings {
            url: env.get("DXLINK_URL").unwrap_or(dxlink_defaults.url),
            keepalive_interval: env.parse_duration_secs(
                "STREAM_KEEPALIVE_INTERVAL_SECS",
                dxlink_defaults.keepalive_interval,
            )?,
            keepalive_timeout: env.parse_duration_secs(
                "STREAM_KEEPALIVE_TIMEOUT_SECS",
                dxlink_defaults.keepalive_timeout,
            )?,
            connect_attempts: env
                .parse_nonzero("STREAM_CONNECT_ATTEMPTS", dxlink_defaults.connect_attempts)?,
        };

        let loop_defaults = LoopSettings::default();
        let stream = LoopSettings {
            poll_timeout: env
                .parse_duration_millis("STREAM_POLL_TIMEOUT_MS", loop_defaults.poll_timeout)?,
            heartbeat_period: env.parse_duration_millis(
                "STREAM_HEARTBEAT_PERIOD_MS",
                loop_defaults.heartbeat_period,
            )?,
            publish_capacity: env
                .parse_nonzero("STREAM_PUBLISH_CAPACITY", loop_defaults.publish_capacity)?,
            metrics_port: env.parse("STREAM_METRICS_PORT", loop_defaults.metrics_port)?,
        };

        Ok(Self {
            credentials: Credentials::new(token),
            subscription,
            dxlink,
            stream,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
    /// Local midnight could not be resolved (DST gap).
    #[error("cannot resolve local start of day")]
    AmbiguousStartTime,
}

impl ConfigError {
    fn invalid(key: &str, value: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(key, &raw)),
            None => Ok(default),
        }
    }

    fn parse_nonzero<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr + PartialEq + Default,
    {
        let value = self.parse(key, default)?;
        if value == T::default() {
            return Err(ConfigError::invalid(key, "0"));
        }
        Ok(value)
    }

    fn parse_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::invalid(key, &raw)),
            },
            None => Ok(default),
        }
    }

    fn parse_duration_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse_nonzero(key, default.as_secs())
            .map(Duration::from_secs)
    }

    fn parse_duration_millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse_nonzero(key, default_ms).map(Duration::from_millis)
    }
}

/// dxFeed candle period: optional count followed by a unit.
fn is_valid_interval(raw: &str) -> bool {
    let unit_start = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (count, unit) = raw.split_at(unit_start);
    if count.parse::<u32>().is_ok_and(|n| n == 0) {
        return false;
    }
    matches!(unit, "s" | "m" | "h" | "d" | "w" | "mo" | "y")
}

fn start_of_today() -> Result<DateTime<Utc>, ConfigError> {
    Local::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|t| t.with_timezone(&Utc))
        .ok_or(ConfigError::AmbiguousStartTime)
}
