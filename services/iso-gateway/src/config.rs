use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub switch: SwitchConfig,
    pub correlation: CorrelationConfig,
    pub bus: BusConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SwitchConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorrelationConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Memory,
    Nats,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BusConfig {
    pub kind: BusKind,
    #[serde(default)]
    pub nats_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("switch.base_url", "http://localhost:4001")?
            .set_default("switch.request_timeout_secs", 30)?
            .set_default("correlation.timeout_secs", 60)?
            .set_default("bus.kind", "memory")?
            .set_default("logging.json", false)?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        // Override with environment variables, e.g. ISO_GATEWAY__SWITCH__BASE_URL
        builder = builder.add_source(Environment::with_prefix("ISO_GATEWAY").separator("__"));

        if let Ok(base_url) = env::var("SWITCH_BASE_URL") {
            builder = builder.set_override("switch.base_url", base_url)?;
        }

        if let Ok(nats_url) = env::var("NATS_URL") {
            builder = builder
                .set_override("bus.nats_url", nats_url)?
                .set_override("bus.kind", "nats")?;
        }

        if let Ok(timeout) = env::var("CORRELATION_TIMEOUT_SECS") {
            builder = builder.set_override("correlation.timeout_secs", timeout)?;
        }

        if let Ok(port) = env::var("GATEWAY_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.switch.base_url.trim().is_empty() {
            return Err("Switch base URL is required".to_string());
        }

        if self.switch.request_timeout_secs == 0 {
            return Err("Switch request timeout must be positive".to_string());
        }

        if self.correlation.timeout_secs == 0 {
            return Err("Correlation timeout must be positive".to_string());
        }

        if self.bus.kind == BusKind::Nats
            && self.bus.nats_url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            return Err("NATS URL is required for the nats bus".to_string());
        }

        Ok(())
    }

    pub fn correlation_timeout(&self) -> Duration {
        Duration::from_secs(self.correlation.timeout_secs)
    }

    pub fn switch_timeout(&self) -> Duration {
        Duration::from_secs(self.switch.request_timeout_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            switch: SwitchConfig {
                base_url: "http://switch".to_string(),
                request_timeout_secs: 5,
            },
            correlation: CorrelationConfig { timeout_secs: 60 },
            bus: BusConfig {
                kind: BusKind::Memory,
                nats_url: None,
            },
            logging: LoggingConfig { json: false },
        }
    }

    #[test]
    fn test_valid_config() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.correlation_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_rejects_zero_timeout_and_empty_url() {
        let mut zero_timeout = config();
        zero_timeout.correlation.timeout_secs = 0;
        assert!(zero_timeout.validate().is_err());

        let mut no_url = config();
        no_url.switch.base_url = " ".to_string();
        assert!(no_url.validate().is_err());
    }

    #[test]
    fn test_nats_bus_requires_url() {
        let mut nats = config();
        nats.bus.kind = BusKind::Nats;
        assert!(nats.validate().is_err());

        nats.bus.nats_url = Some("nats://localhost:4222".to_string());
        assert!(nats.validate().is_ok());
    }
}
