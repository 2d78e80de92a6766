//! Configuration validation and interpolation utilities.

use std::time::Duration;

use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Parse duration string using humantime.
///
/// Supports various formats: `30s`, `1m`, `5m30s`, `1h`, `100ms`, etc.
///
/// # Examples
///
/// ```
/// use dbpulse::config::parse_duration;
///
/// assert_eq!(parse_duration("5s").unwrap().as_secs(), 5);
/// assert_eq!(parse_duration("15m").unwrap().as_secs(), 900);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `${VAR:-default}`. An unset `${VAR}` without a
/// default is left as is, so expanding twice gives the same result.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            match (std::env::var(&caps[1]), caps.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.as_str().to_string(),
                (Err(_), None) => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_valid() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("20s").unwrap(), Duration::from_secs(20));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("  ").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("30").is_err());
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("blip.heartbeat"), "blip.heartbeat");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        let result = expand_env_vars("${DBPULSE_NONEXISTENT_12345:-read_only}");
        assert_eq!(result, "read_only");
    }

    #[test]
    fn test_expand_env_vars_missing_left_unresolved() {
        let input = "src-${DBPULSE_NONEXISTENT_67890}";
        assert_eq!(expand_env_vars(input), input);
        assert_eq!(expand_env_vars(&expand_env_vars(input)), input);
    }

    #[test]
    fn test_expand_env_vars_from_env() {
        // SAFETY: This test only modifies a test-specific variable.
        unsafe {
            std::env::set_var("DBPULSE_TEST_VAR_EXPAND", "db-01");
        }
        let result = expand_env_vars("source ${DBPULSE_TEST_VAR_EXPAND}");
        assert_eq!(result, "source db-01");
        // SAFETY: Cleanup test variable.
        unsafe {
            std::env::remove_var("DBPULSE_TEST_VAR_EXPAND");
        }
    }
}
