//! Application configuration structures.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::plan::{Plan, defaults};

use super::monitor::MonitorConfig;
use super::validation::{ConfigError, expand_env_vars};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Monitored MySQL instances.
    #[serde(default)]
    pub monitors: Vec<MonitorConfig>,

    /// Plans defined inline. A plan here shadows a built-in plan of the
    /// same name.
    #[serde(default)]
    pub plans: Vec<Plan>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` placeholders in the file are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a plan by name: inline plans first, then built-in plans.
    ///
    /// The returned plan is a fresh copy with level and domain names filled.
    pub fn plan(&self, name: &str) -> Option<Plan> {
        self.plans
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .map(|mut plan| {
                plan.normalize_names();
                plan
            })
            .or_else(|| defaults::builtin(name))
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` for empty or duplicate monitor
    /// ids, monitors without a connection target, invalid or duplicate
    /// inline plans, and unknown plan names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_plans = HashSet::new();
        for plan in &self.plans {
            plan.validate()?;
            if !seen_plans.insert(plan.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate plan name: '{}'",
                    plan.name
                )));
            }
        }

        let mut seen_ids = HashSet::new();
        for mon in &self.monitors {
            mon.validate()?;
            if !seen_ids.insert(mon.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate monitor id: '{}'",
                    mon.id
                )));
            }
            if self.plan(&mon.plan).is_none() {
                let mut valid: Vec<&str> = self.plans.iter().map(|p| p.name.as_str()).collect();
                valid.extend_from_slice(defaults::BUILTIN_PLANS);
                return Err(ConfigError::ValidationError(format!(
                    "monitor '{}': unknown plan '{}'; valid plans: {}",
                    mon.id,
                    mon.plan,
                    valid.join(", ")
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "monitors:\n  - id: db1\n    hostname: 127.0.0.1:3306\n  - id: db2\n    socket: /tmp/mysql.sock\n    plan: scrape"
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.monitors.len(), 2);
        assert_eq!(config.monitors[0].plan, "default");
        assert_eq!(config.monitors[1].plan, "scrape");
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load("/nonexistent/dbpulse.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_duplicate_monitor_ids() {
        let yaml = "monitors:\n  - id: db1\n    hostname: a\n  - id: db1\n    hostname: b\n";
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate monitor id"));
    }

    #[test]
    fn test_unknown_plan() {
        let yaml = "monitors:\n  - id: db1\n    hostname: a\n    plan: nope\n";
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown plan 'nope'"));
    }

    #[test]
    fn test_inline_plan() {
        let yaml = r#"
monitors:
  - id: db1
    hostname: a
    plan: lag
plans:
  - name: lag
    levels:
      5s:
        freq: 5s
        collect:
          repl.lag:
            options:
              writer: blip
              source-id: "%{monitor.tags.source}"
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        let plan = config.plan("lag").unwrap();
        assert_eq!(plan.levels["5s"].name, "5s");
        assert_eq!(plan.levels["5s"].collect["repl.lag"].name, "repl.lag");
        assert_eq!(plan.levels["5s"].collect["repl.lag"].option("writer"), "blip");
        assert_eq!(config.plan("default").unwrap().name, "default");
        assert!(config.plan("nope").is_none());
    }

    #[test]
    fn test_invalid_inline_plan() {
        let yaml = "plans:\n  - name: bad\n    levels:\n      x:\n        freq: often\n";
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("often"));

        let yaml = "plans:\n  - name: p\n  - name: p\n";
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate plan name"));
    }

    #[test]
    fn test_env_vars_expanded() {
        let yaml = "monitors:\n  - id: db1\n    hostname: ${DBPULSE_APP_TEST_HOST:-10.0.0.5}\n";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.monitors[0].hostname, "10.0.0.5");
    }

    #[test]
    fn test_invalid_yaml() {
        let err = AppConfig::from_yaml("monitors: [").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
