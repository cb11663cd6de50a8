use crate::error::ServiceError;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validates startup configuration for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL. Empty selects the in-process store.
    pub fn validate_redis_url(url: &str) -> Result<(), ServiceError> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(());
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(ServiceError::Configuration(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates rate limit parameters
    pub fn validate_rate_limit(rate_per_second: f64, burst: u32) -> Result<(), ServiceError> {
        if !rate_per_second.is_finite() || rate_per_second <= 0.0 {
            return Err(ServiceError::Configuration(
                "Rate limit per second must be a positive number".to_string(),
            ));
        }

        if burst == 0 {
            return Err(ServiceError::Configuration(
                "Rate limit burst must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_ttl(ttl_secs: u64) -> Result<(), ServiceError> {
        if ttl_secs == 0 {
            return Err(ServiceError::Configuration(
                "Idle TTL must be greater than 0 seconds".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_body_limit(max_body_bytes: usize) -> Result<(), ServiceError> {
        if max_body_bytes == 0 {
            return Err(ServiceError::Configuration(
                "Maximum body size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates the idempotency record namespace
    pub fn validate_key_prefix(prefix: &str) -> Result<(), ServiceError> {
        if prefix.trim_matches('/').trim().is_empty() {
            return Err(ServiceError::Configuration(
                "Idempotency key prefix cannot be empty".to_string(),
            ));
        }

        if prefix.chars().any(char::is_whitespace) {
            return Err(ServiceError::Configuration(
                "Idempotency key prefix cannot contain whitespace".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_log_level(level: &str) -> Result<(), ServiceError> {
        if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
            return Err(ServiceError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {:?}",
                level, LOG_LEVELS
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("redis://localhost:6379").is_ok());
        assert!(ConfigValidator::validate_redis_url("rediss://localhost:6379").is_ok());
        assert!(ConfigValidator::validate_redis_url("").is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("http://localhost:6379").is_err());
    }

    #[test]
    fn test_valid_rate_limit() {
        assert!(ConfigValidator::validate_rate_limit(10.0, 20).is_ok());
        assert!(ConfigValidator::validate_rate_limit(0.5, 1).is_ok());
    }

    #[test]
    fn test_invalid_rate_limit() {
        assert!(ConfigValidator::validate_rate_limit(0.0, 20).is_err());
        assert!(ConfigValidator::validate_rate_limit(-1.0, 20).is_err());
        assert!(ConfigValidator::validate_rate_limit(f64::NAN, 20).is_err());
        assert!(ConfigValidator::validate_rate_limit(10.0, 0).is_err());
    }

    #[test]
    fn test_ttl_and_body_limit() {
        assert!(ConfigValidator::validate_ttl(300).is_ok());
        assert!(ConfigValidator::validate_ttl(0).is_err());
        assert!(ConfigValidator::validate_body_limit(1).is_ok());
        assert!(ConfigValidator::validate_body_limit(0).is_err());
    }

    #[test]
    fn test_key_prefix() {
        assert!(ConfigValidator::validate_key_prefix("idempotency").is_ok());
        assert!(ConfigValidator::validate_key_prefix("svc/idempotency").is_ok());
        assert!(ConfigValidator::validate_key_prefix("").is_err());
        assert!(ConfigValidator::validate_key_prefix("/").is_err());
        assert!(ConfigValidator::validate_key_prefix("two words").is_err());
    }

    #[test]
    fn test_log_level() {
        assert!(ConfigValidator::validate_log_level("info").is_ok());
        assert!(ConfigValidator::validate_log_level("DEBUG").is_ok());
        assert!(ConfigValidator::validate_log_level("verbose").is_err());
    }
}
