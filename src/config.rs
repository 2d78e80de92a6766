//! Configuration module for dbpulse.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Monitors (connection target, plan name, probe and query timeouts, tags)
//! - Interpolation helpers for `${VAR}` and `%{monitor.FIELD}` placeholders

mod app;
mod monitor;
mod validation;

pub use app::AppConfig;
pub use monitor::{DEFAULT_PLAN, DEFAULT_PROBE_TIMEOUT, DEFAULT_QUERY_TIMEOUT, MonitorConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
