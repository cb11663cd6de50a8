use clap::Parser;
use envconfig::Envconfig;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config_validator::ConfigValidator;
use crate::error::ServiceError;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:8080")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL; empty keeps records in process memory
    #[envconfig(from = "REDIS_URL", default = "")]
    pub redis_url: String,

    /// Namespace for idempotency records in the shared store
    #[envconfig(from = "IDEMPOTENCY_KEY_PREFIX", default = "idempotency")]
    pub idempotency_key_prefix: String,

    /// Tokens refilled per second for each client
    #[envconfig(from = "RATE_LIMIT_PER_SECOND", default = "10")]
    pub rate_limit_per_second: f64,

    /// Token bucket capacity
    #[envconfig(from = "RATE_LIMIT_BURST", default = "20")]
    pub rate_limit_burst: u32,

    /// Idle time after which a client's bucket is evicted
    #[envconfig(from = "RATE_LIMIT_IDLE_TTL_SECS", default = "300")]
    pub rate_limit_idle_ttl_secs: u64,

    /// Largest request or response body buffered for replay
    #[envconfig(from = "MAX_BODY_BYTES", default = "1048576")]
    pub max_body_bytes: usize,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

/// Command line overrides for the environment configuration.
#[derive(Debug, Default, Parser)]
#[command(name = "config-service", version, about)]
pub struct Cli {
    /// Address to listen on
    #[arg(long)]
    pub bind_addr: Option<SocketAddr>,

    /// Redis connection URL
    #[arg(long)]
    pub redis_url: Option<String>,

    /// Log level for the service's own events
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    /// Flags given on the command line win over the environment.
    pub fn apply_cli(mut self, cli: Cli) -> Self {
        if let Some(bind_addr) = cli.bind_addr {
            self.bind_addr = bind_addr;
        }
        if let Some(redis_url) = cli.redis_url {
            self.redis_url = redis_url;
        }
        if let Some(log_level) = cli.log_level {
            self.log_level = log_level;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        ConfigValidator::validate_redis_url(&self.redis_url)?;
        ConfigValidator::validate_rate_limit(self.rate_limit_per_second, self.rate_limit_burst)?;
        ConfigValidator::validate_ttl(self.rate_limit_idle_ttl_secs)?;
        ConfigValidator::validate_body_limit(self.max_body_bytes)?;
        ConfigValidator::validate_key_prefix(&self.idempotency_key_prefix)?;
        ConfigValidator::validate_log_level(&self.log_level)?;
        Ok(())
    }

    pub fn uses_redis(&self) -> bool {
        !self.redis_url.trim().is_empty()
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.rate_limit_idle_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::init_from_hashmap(&env).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);

        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert!(!config.uses_redis());
        assert_eq!(config.idempotency_key_prefix, "idempotency");
        assert_eq!(config.rate_limit_per_second, 10.0);
        assert_eq!(config.rate_limit_burst, 20);
        assert_eq!(config.idle_ttl(), Duration::from_secs(300));
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides() {
        let config = config_from(&[
            ("REDIS_URL", "redis://cache:6379"),
            ("RATE_LIMIT_BURST", "5"),
            ("IDEMPOTENCY_KEY_PREFIX", "dedup"),
        ]);

        assert!(config.uses_redis());
        assert_eq!(config.rate_limit_burst, 5);
        assert_eq!(config.idempotency_key_prefix, "dedup");
    }

    #[test]
    fn test_cli_overrides_environment() {
        let cli = Cli::parse_from([
            "config-service",
            "--bind-addr",
            "0.0.0.0:9000",
            "--log-level",
            "debug",
        ]);
        let config = config_from(&[("LOG_LEVEL", "warn")]).apply_cli(cli);

        assert_eq!(config.bind_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.redis_url, "");
    }

    #[test]
    fn test_validate_rejects_zero_burst() {
        let config = config_from(&[("RATE_LIMIT_BURST", "0")]);
        assert!(matches!(config.validate(), Err(ServiceError::Configuration(_))));
    }
}
