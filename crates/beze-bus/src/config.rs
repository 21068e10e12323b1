//! Bus configuration loaded from environment variables.

use std::time::Duration;

use crate::router::RouterConfig;

/// Per-message handler budget in seconds.
pub const DEFAULT_HANDLER_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Kafka,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "kafka" => Ok(Backend::Kafka),
            other => Err(format!("unknown bus backend: {other}")),
        }
    }
}

impl Default for Backend {
    /// Kafka when this build can reach it, otherwise the in-process broker.
    fn default() -> Self {
        if cfg!(feature = "kafka") {
            Backend::Kafka
        } else {
            Backend::Memory
        }
    }
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Env: `BUS_BACKEND` (`kafka` | `memory`)
    /// Default: `kafka` with the `kafka` feature, `memory` without it
    pub backend: Backend,

    /// Comma-separated broker list.
    /// Env: `KAFKA_BROKERS`
    /// Default: `localhost:9092`
    pub brokers: String,

    /// Env: `BUS_HANDLER_TIMEOUT_SECS`
    /// Default: 15
    pub handler_timeout: Duration,

    /// Producer delivery wait.
    pub publish_timeout: Duration,

    /// How long router shutdown waits for in-flight handlers.
    pub close_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            brokers: "localhost:9092".to_string(),
            handler_timeout: Duration::from_secs(DEFAULT_HANDLER_TIMEOUT_SECS),
            publish_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(30),
        }
    }
}

impl BusConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("BUS_BACKEND") {
            match val.parse::<Backend>() {
                Ok(backend) => config.backend = backend,
                Err(e) => tracing::warn!(value = %val, error = %e, "Invalid BUS_BACKEND, using default"),
            }
        }

        if let Ok(brokers) = std::env::var("KAFKA_BROKERS") {
            if !brokers.trim().is_empty() {
                config.brokers = brokers;
            }
        }

        if let Ok(val) = std::env::var("BUS_HANDLER_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.handler_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid BUS_HANDLER_TIMEOUT_SECS, using default"),
            }
        }

        config
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            handler_timeout: self.handler_timeout,
            close_timeout: self.close_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BusConfig::default();
        let expected = if cfg!(feature = "kafka") { Backend::Kafka } else { Backend::Memory };
        assert_eq!(config.backend, expected);
        assert_eq!(
            config.router_config().handler_timeout,
            Duration::from_secs(DEFAULT_HANDLER_TIMEOUT_SECS)
        );
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn test_default_backend_connects_without_kafka() {
        assert!(crate::connect(&BusConfig::default()).is_ok());
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn test_explicit_kafka_without_feature_is_unavailable() {
        let config = BusConfig { backend: Backend::Kafka, ..BusConfig::default() };
        assert!(matches!(
            crate::connect(&config),
            Err(crate::BusError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!("Memory".parse::<Backend>().unwrap(), Backend::Memory);
        assert_eq!(" kafka ".parse::<Backend>().unwrap(), Backend::Kafka);
        assert!("rabbit".parse::<Backend>().is_err());
    }
}
