//! Broker connection settings and tuning knobs for readers.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::bus::StartId;
use crate::error::EventError;

/// Redis connection configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .finish()
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    ///
    /// All optional:
    /// - `REDIS_HOST`: broker host (default: "localhost")
    /// - `REDIS_PORT`: broker port (default: 6379)
    /// - `REDIS_PASSWORD`: AUTH password
    /// - `REDIS_DB`: logical database index (default: 0)
    pub fn from_env() -> Result<Self, EventError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EventError> {
        let mut builder = Self::builder();

        if let Some(host) = lookup("REDIS_HOST") {
            builder = builder.host(host);
        }
        if let Some(port) = lookup("REDIS_PORT") {
            let port = port.parse::<u16>().map_err(|e| EventError::ConfigInvalid {
                var: "REDIS_PORT".to_string(),
                reason: format!("'{port}': {e}"),
            })?;
            builder = builder.port(port);
        }
        if let Some(password) = lookup("REDIS_PASSWORD").filter(|p| !p.is_empty()) {
            builder = builder.password(password);
        }
        if let Some(db) = lookup("REDIS_DB") {
            let db = db.parse::<i64>().map_err(|e| EventError::ConfigInvalid {
                var: "REDIS_DB".to_string(),
                reason: format!("'{db}': {e}"),
            })?;
            builder = builder.db(db);
        }

        builder.build()
    }

    /// Start from the defaults and override fields.
    pub fn builder() -> RedisConfigBuilder {
        RedisConfigBuilder {
            config: Self::default(),
        }
    }

    /// `host:port/db`, for logs and error messages.
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Builder for [`RedisConfig`].
#[derive(Debug, Clone)]
pub struct RedisConfigBuilder {
    config: RedisConfig,
}

impl RedisConfigBuilder {
    /// Set the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Authenticate with this password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Select a logical database.
    pub fn db(mut self, db: i64) -> Self {
        self.config.db = db;
        self
    }

    /// Validate and finish. Rejects an empty host, port 0 and a negative db.
    pub fn build(self) -> Result<RedisConfig, EventError> {
        if self.config.host.trim().is_empty() {
            return Err(EventError::ConfigInvalid {
                var: "REDIS_HOST".to_string(),
                reason: "host must not be empty".to_string(),
            });
        }
        if self.config.port == 0 {
            return Err(EventError::ConfigInvalid {
                var: "REDIS_PORT".to_string(),
                reason: "port must not be 0".to_string(),
            });
        }
        if self.config.db < 0 {
            return Err(EventError::ConfigInvalid {
                var: "REDIS_DB".to_string(),
                reason: format!("database index must not be negative, got {}", self.config.db),
            });
        }
        Ok(self.config)
    }
}

/// Polling behaviour of the correlation waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Upper bound on a single blocking read.
    pub poll_interval: Duration,
    /// Entries fetched per read.
    pub batch: usize,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch: 10,
        }
    }
}

impl WaitOptions {
    /// Longest single blocking read, at least 1ms.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Entries fetched per read, at least 1.
    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }
}

/// Read behaviour of a [`GroupConsumer`](crate::bus::GroupConsumer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Entries fetched per read.
    pub count: usize,
    /// How long one read blocks when the stream is idle.
    pub block: Duration,
    /// Where a newly created group starts.
    pub start: StartId,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            count: 10,
            block: Duration::from_secs(1),
            start: StartId::Tail,
        }
    }
}

impl ConsumerOptions {
    /// Entries fetched per read, at least 1.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }

    /// How long one read blocks; zero polls without blocking.
    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    /// Where the group starts if it has to be created.
    pub fn with_start(mut self, start: StartId) -> Self {
        self.start = start;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = RedisConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RedisConfig::default());
        assert_eq!(config.target(), "localhost:6379/0");
    }

    #[test]
    fn reads_every_variable() {
        let config = RedisConfig::from_lookup(lookup(&[
            ("REDIS_HOST", "redis.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "hunter2"),
            ("REDIS_DB", "3"),
        ]))
        .unwrap();

        assert_eq!(config.host, "redis.internal");
        assert_eq!(config.port, 6380);
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.db, 3);
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let err = RedisConfig::from_lookup(lookup(&[("REDIS_PORT", "redis")])).unwrap_err();
        assert!(matches!(err, EventError::ConfigInvalid { ref var, .. } if var == "REDIS_PORT"));
        assert!(err.is_config_error());

        let err = RedisConfig::from_lookup(lookup(&[("REDIS_DB", "-1")])).unwrap_err();
        assert!(matches!(err, EventError::ConfigInvalid { ref var, .. } if var == "REDIS_DB"));
    }

    #[test]
    fn builder_validates() {
        assert!(RedisConfig::builder().host("").build().is_err());
        assert!(RedisConfig::builder().port(0).build().is_err());
        assert!(RedisConfig::builder().host("cache").port(7000).build().is_ok());
    }

    #[test]
    fn debug_redacts_password() {
        let config = RedisConfig::builder().password("hunter2").build().unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"), "{debug}");
        assert!(debug.contains("***"));
    }

    #[test]
    fn option_builders() {
        let wait = WaitOptions::default()
            .with_poll_interval(Duration::from_millis(50))
            .with_batch(0);
        assert_eq!(wait.poll_interval, Duration::from_millis(50));
        assert_eq!(wait.batch, 1);

        let consumer = ConsumerOptions::default()
            .with_count(25)
            .with_block(Duration::from_millis(100))
            .with_start(StartId::Beginning);
        assert_eq!(consumer.count, 25);
        assert_eq!(consumer.start, StartId::Beginning);
    }
}
