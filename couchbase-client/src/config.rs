//! Client configuration types, builders, and connection-string parsing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use couchbase_core::transcoder::{Compression, DocumentFormat};
use couchbase_core::{CouchbaseError, DecoderConfig, EncoderConfig, Result};

use crate::transport::{Connector, Endpoint};

/// Default port for the key-value service.
pub const DEFAULT_PORT: u16 = 11210;
/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default key-value operation timeout.
const DEFAULT_KV_TIMEOUT: Duration = Duration::from_millis(2500);
/// Default query/search/analytics timeout.
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(75);
/// Default management operation timeout.
const DEFAULT_MANAGEMENT_TIMEOUT: Duration = Duration::from_secs(75);
/// Default maximum idle time before a pooled connection is reaped.
const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(60);
/// Default interval between idle sweeps.
const DEFAULT_IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
/// Default initial reconnect backoff.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Default maximum reconnect backoff.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Default reconnect backoff multiplier.
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
/// Default reconnect backoff jitter fraction.
const DEFAULT_BACKOFF_JITTER: f64 = 0.1;
/// Default maximum reconnect attempts.
const DEFAULT_MAX_RECONNECTS: u32 = 10;

/// Verbosity of the client's internal diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Only unrecoverable failures.
    Fatal,
    /// Errors.
    Error,
    /// Warnings (the default).
    #[default]
    Warn,
    /// Informational messages.
    Info,
    /// Debug detail.
    Debug,
    /// Everything, including per-operation traces.
    Trace,
}

impl LogLevel {
    /// Parses a configuration string, case-insensitively.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FATAL" => Ok(LogLevel::Fatal),
            "ERROR" => Ok(LogLevel::Error),
            "WARN" => Ok(LogLevel::Warn),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            other => Err(CouchbaseError::InvalidConfiguration(format!(
                "unknown log level {other:?}"
            ))),
        }
    }

    /// Maps this level onto a `tracing` filter level.
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Fatal | LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Username/password credentials presented during transport authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    pub fn password(&self) -> &str {
        &self.password
    }
}

/// Per-service operation deadlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    connect: Duration,
    key_value: Duration,
    query: Duration,
    management: Duration,
}

impl TimeoutConfig {
    /// Returns the connection-establishment timeout.
    pub fn connect(&self) -> Duration {
        self.connect
    }

    /// Returns the default key-value operation deadline.
    pub fn key_value(&self) -> Duration {
        self.key_value
    }

    /// Returns the default query/search/analytics deadline.
    pub fn query(&self) -> Duration {
        self.query
    }

    /// Returns the default management operation deadline.
    pub fn management(&self) -> Duration {
        self.management
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            key_value: DEFAULT_KV_TIMEOUT,
            query: DEFAULT_QUERY_TIMEOUT,
            management: DEFAULT_MANAGEMENT_TIMEOUT,
        }
    }
}

/// Builder for [`TimeoutConfig`].
#[derive(Debug, Clone, Default)]
pub struct TimeoutConfigBuilder {
    connect: Option<Duration>,
    key_value: Option<Duration>,
    query: Option<Duration>,
    management: Option<Duration>,
}

impl TimeoutConfigBuilder {
    /// Sets the connection-establishment timeout.
    pub fn connect(mut self, timeout: Duration) -> Self {
        self.connect = Some(timeout);
        self
    }

    /// Sets the default key-value operation deadline.
    pub fn key_value(mut self, timeout: Duration) -> Self {
        self.key_value = Some(timeout);
        self
    }

    /// Sets the default query deadline.
    pub fn query(mut self, timeout: Duration) -> Self {
        self.query = Some(timeout);
        self
    }

    /// Sets the default management deadline.
    pub fn management(mut self, timeout: Duration) -> Self {
        self.management = Some(timeout);
        self
    }

    fn build(self) -> TimeoutConfig {
        TimeoutConfig {
            connect: self.connect.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            key_value: self.key_value.unwrap_or(DEFAULT_KV_TIMEOUT),
            query: self.query.unwrap_or(DEFAULT_QUERY_TIMEOUT),
            management: self.management.unwrap_or(DEFAULT_MANAGEMENT_TIMEOUT),
        }
    }
}

/// Connection pool tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    max_idle_time: Duration,
    idle_sweep_interval: Duration,
}

impl PoolConfig {
    /// Returns the maximum interval a connection may sit idle before the
    /// periodic sweep closes it.
    pub fn max_idle_time(&self) -> Duration {
        self.max_idle_time
    }

    /// Returns the interval between idle sweeps.
    pub fn idle_sweep_interval(&self) -> Duration {
        self.idle_sweep_interval
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
            idle_sweep_interval: DEFAULT_IDLE_SWEEP_INTERVAL,
        }
    }
}

/// Reconnect backoff tuning for connection establishment.
///
/// This governs connections only; operations are never retried by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: f64,
    max_reconnects: u32,
}

impl RetryConfig {
    /// Returns the initial backoff duration.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the maximum backoff duration.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns the backoff multiplier.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the jitter fraction applied to each backoff step.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Returns the maximum number of reconnect attempts.
    pub fn max_reconnects(&self) -> u32 {
        self.max_reconnects
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: DEFAULT_BACKOFF_JITTER,
            max_reconnects: DEFAULT_MAX_RECONNECTS,
        }
    }
}

/// Cluster-level client options.
///
/// Build with [`ClusterOptions::builder()`]; every knob has a documented
/// default and most can also be set through connection-string parameters.
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    credentials: Option<Credentials>,
    log_level: LogLevel,
    encoder: EncoderConfig,
    decoder: DecoderConfig,
    pool: PoolConfig,
    timeouts: TimeoutConfig,
    retry: RetryConfig,
    connector: Option<Arc<dyn Connector>>,
}

impl ClusterOptions {
    /// Returns a new options builder.
    pub fn builder() -> ClusterOptionsBuilder {
        ClusterOptionsBuilder::default()
    }

    /// Returns the configured credentials, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Returns the diagnostics verbosity.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Returns the default encoder configuration.
    pub fn encoder(&self) -> &EncoderConfig {
        &self.encoder
    }

    /// Returns the decoder configuration.
    pub fn decoder(&self) -> &DecoderConfig {
        &self.decoder
    }

    /// Returns the pool configuration.
    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    /// Returns the timeout configuration.
    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Returns the reconnect backoff configuration.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns the transport connector.
    pub fn connector(&self) -> Option<&Arc<dyn Connector>> {
        self.connector.as_ref()
    }

    pub(crate) fn apply_param(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "log_level" => self.log_level = LogLevel::parse(value)?,
            "encoder.format" => self.encoder.format = DocumentFormat::parse(value)?,
            "encoder.compression" => self.encoder.compression = Compression::parse(value)?,
            "encoder.compression_threshold" => {
                self.encoder.compression_threshold = parse_num(key, value)?;
            }
            "encoder.compression_factor" => {
                self.encoder.compression_min_ratio = parse_num(key, value)?;
            }
            "decoder.json_arrays" => self.decoder.json_arrays = parse_bool(key, value)?,
            "pool.max_idle_time_sec" => {
                self.pool.max_idle_time = Duration::from_secs(parse_num(key, value)?);
            }
            "timeout.connect_ms" => {
                self.timeouts.connect = Duration::from_millis(parse_num(key, value)?);
            }
            "timeout.key_value_ms" => {
                self.timeouts.key_value = Duration::from_millis(parse_num(key, value)?);
            }
            "timeout.query_ms" => {
                self.timeouts.query = Duration::from_millis(parse_num(key, value)?);
            }
            "timeout.management_ms" => {
                self.timeouts.management = Duration::from_millis(parse_num(key, value)?);
            }
            other => {
                return Err(CouchbaseError::InvalidConfiguration(format!(
                    "unknown connection string parameter {other:?}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            credentials: None,
            log_level: LogLevel::default(),
            encoder: EncoderConfig::default(),
            decoder: DecoderConfig::default(),
            pool: PoolConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            connector: None,
        }
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        CouchbaseError::InvalidConfiguration(format!("invalid value {value:?} for {key}"))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        _ => Err(CouchbaseError::InvalidConfiguration(format!(
            "invalid boolean {value:?} for {key}"
        ))),
    }
}

/// Builder for [`ClusterOptions`].
#[derive(Debug, Clone, Default)]
pub struct ClusterOptionsBuilder {
    credentials: Option<Credentials>,
    log_level: Option<LogLevel>,
    encoder: EncoderConfig,
    decoder: DecoderConfig,
    pool: PoolConfig,
    timeouts: TimeoutConfigBuilder,
    retry: RetryConfig,
    connector: Option<Arc<dyn Connector>>,
}

impl ClusterOptionsBuilder {
    /// Creates a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the username and password presented during authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Sets the diagnostics verbosity.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Sets the default document serialization format.
    pub fn format(mut self, format: DocumentFormat) -> Self {
        self.encoder.format = format;
        self
    }

    /// Sets the compression algorithm for stored values.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.encoder.compression = compression;
        self
    }

    /// Sets the minimum encoded size before compression is considered.
    pub fn compression_threshold(mut self, threshold: usize) -> Self {
        self.encoder.compression_threshold = threshold;
        self
    }

    /// Sets the minimum compression ratio required to keep the compressed form.
    pub fn compression_min_ratio(mut self, ratio: f64) -> Self {
        self.encoder.compression_min_ratio = ratio;
        self
    }

    /// Sets the JSON-array decoding preference (kept for connection-string
    /// compatibility; see [`DecoderConfig`]).
    pub fn json_arrays(mut self, json_arrays: bool) -> Self {
        self.decoder.json_arrays = json_arrays;
        self
    }

    /// Sets the maximum idle time before a pooled connection is reaped.
    pub fn max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.pool.max_idle_time = max_idle_time;
        self
    }

    /// Sets the interval between idle sweeps.
    pub fn idle_sweep_interval(mut self, interval: Duration) -> Self {
        self.pool.idle_sweep_interval = interval;
        self
    }

    /// Configures timeouts using a builder function.
    pub fn timeouts<F>(mut self, f: F) -> Self
    where
        F: FnOnce(TimeoutConfigBuilder) -> TimeoutConfigBuilder,
    {
        self.timeouts = f(self.timeouts);
        self
    }

    /// Sets the transport connector used to reach cluster nodes.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Builds the options, validating cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the compression ratio is negative,
    /// credentials have an empty username, or the idle sweep interval is zero.
    pub fn build(self) -> Result<ClusterOptions> {
        if self.encoder.compression_min_ratio < 0.0 {
            return Err(CouchbaseError::InvalidConfiguration(
                "compression_min_ratio must not be negative".to_string(),
            ));
        }
        if let Some(credentials) = &self.credentials {
            if credentials.username.is_empty() {
                return Err(CouchbaseError::InvalidConfiguration(
                    "credentials require a non-empty username".to_string(),
                ));
            }
        }
        if self.pool.idle_sweep_interval.is_zero() {
            return Err(CouchbaseError::InvalidConfiguration(
                "idle_sweep_interval must be positive".to_string(),
            ));
        }

        Ok(ClusterOptions {
            credentials: self.credentials,
            log_level: self.log_level.unwrap_or_default(),
            encoder: self.encoder,
            decoder: self.decoder,
            pool: self.pool,
            timeouts: self.timeouts.build(),
            retry: self.retry,
            connector: self.connector,
        })
    }
}

/// A parsed connection string.
///
/// The accepted form is `couchbase://host1,host2:port?param=value&...`;
/// the `couchbases` scheme marks a TLS deployment (handled by the transport).
/// Parameters override the same-named [`ClusterOptions`] knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    scheme: String,
    endpoints: Vec<Endpoint>,
    params: HashMap<String, String>,
}

impl ConnectionString {
    /// Parses a connection string.
    pub fn parse(input: &str) -> Result<Self> {
        let (scheme, rest) = input.split_once("://").ok_or_else(|| {
            CouchbaseError::InvalidConfiguration(format!(
                "connection string {input:?} has no scheme"
            ))
        })?;

        if scheme != "couchbase" && scheme != "couchbases" {
            return Err(CouchbaseError::InvalidConfiguration(format!(
                "unsupported scheme {scheme:?}"
            )));
        }

        let (hosts, query) = match rest.split_once('?') {
            Some((hosts, query)) => (hosts, Some(query)),
            None => (rest, None),
        };

        if hosts.is_empty() {
            return Err(CouchbaseError::InvalidConfiguration(
                "connection string lists no hosts".to_string(),
            ));
        }

        let mut endpoints = Vec::new();
        for host in hosts.split(',') {
            endpoints.push(Endpoint::parse(host, DEFAULT_PORT)?);
        }

        let mut params = HashMap::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    CouchbaseError::InvalidConfiguration(format!(
                        "malformed parameter {pair:?} in connection string"
                    ))
                })?;
                params.insert(key.to_string(), value.to_string());
            }
        }

        Ok(Self {
            scheme: scheme.to_string(),
            endpoints,
            params,
        })
    }

    /// Returns the scheme (`couchbase` or `couchbases`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns true if the string requests TLS.
    pub fn is_tls(&self) -> bool {
        self.scheme == "couchbases"
    }

    /// Returns the listed endpoints.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Applies the string's parameters onto the given options.
    pub fn apply(&self, options: &mut ClusterOptions) -> Result<()> {
        for (key, value) in &self.params {
            options.apply_param(key, value)?;
        }
        Ok(())
    }
}
