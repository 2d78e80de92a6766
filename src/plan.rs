//! Plan model: what to collect, and how often.
//!
//! A [`Plan`] is a set of [`Level`]s. Each level is a collection frequency
//! and the metric [`Domain`]s collected at that frequency. The same domain
//! may appear in several levels of one plan.
//!
//! Levels and domains are kept in `BTreeMap`s so every traversal visits them
//! in name order. Collectors rely on this to pick the same "first" level on
//! every run against an unchanged plan.

pub mod defaults;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, MonitorConfig, expand_env_vars, parse_duration};

/// Different levels of metrics collection for one monitored target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Name of the plan (required).
    pub name: String,

    /// Collection frequencies that constitute the plan, keyed by level name.
    #[serde(default)]
    pub levels: BTreeMap<String, Level>,

    /// Monitor this plan belongs to; empty for shared plans.
    #[serde(skip)]
    pub monitor_id: String,
}

/// One collection frequency in a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Level {
    #[serde(skip)]
    pub name: String,

    /// Duration literal (`5s`, `15m`); empty means collected on demand.
    #[serde(default)]
    pub freq: String,

    /// Domains collected at this level, keyed by domain name.
    #[serde(default)]
    pub collect: BTreeMap<String, Domain>,
}

/// One metric domain for collecting related metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    #[serde(skip)]
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,

    /// Explicit metric allow-list; empty means all applicable metrics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<String>,
}

impl Plan {
    /// Create an empty plan.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a level, keyed by its name.
    pub fn with_level(mut self, level: Level) -> Self {
        self.levels.insert(level.name.clone(), level);
        self
    }

    /// Set the owning monitor.
    pub fn with_monitor_id(mut self, monitor_id: impl Into<String>) -> Self {
        self.monitor_id = monitor_id.into();
        self
    }

    /// Fill `Level::name` and `Domain::name` from their map keys.
    ///
    /// Names are not serialized, so call this after deserializing a plan.
    pub fn normalize_names(&mut self) {
        for (level_name, level) in self.levels.iter_mut() {
            level.name = level_name.clone();
            for (domain_name, domain) in level.collect.iter_mut() {
                domain.name = domain_name.clone();
            }
        }
    }

    /// Validate the plan.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if the plan has no name, a level
    /// is named differently from its key, or a level frequency is not a
    /// valid duration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "plan name cannot be empty".to_string(),
            ));
        }
        for (key, level) in &self.levels {
            if !level.name.is_empty() && level.name != *key {
                return Err(ConfigError::ValidationError(format!(
                    "plan '{}': level '{}' is keyed as '{}'",
                    self.name, level.name, key
                )));
            }
            level.interval().map_err(|e| {
                ConfigError::ValidationError(format!("plan '{}': {}", self.name, e))
            })?;
        }
        Ok(())
    }

    /// Replace `${VAR}` placeholders in every domain option value with
    /// environment variable values.
    pub fn interpolate_env_vars(&mut self) {
        self.rewrite_options(expand_env_vars);
    }

    /// Replace `%{monitor.FIELD}` placeholders in every domain option value
    /// with values from the monitor configuration.
    pub fn interpolate_monitor(&mut self, mon: &MonitorConfig) {
        self.rewrite_options(|v| mon.interpolate_mon(v));
    }

    /// Levels that collect `domain`, in level name order.
    pub fn levels_collecting<'a>(
        &'a self,
        domain: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Domain)> + 'a {
        self.levels.iter().filter_map(move |(name, level)| {
            level.collect.get(domain).map(|dom| (name.as_str(), dom))
        })
    }

    /// Every distinct domain name in the plan, sorted.
    pub fn domains(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .levels
            .values()
            .flat_map(|level| level.collect.keys().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    fn rewrite_options(&mut self, mut rewrite: impl FnMut(&str) -> String) {
        for level in self.levels.values_mut() {
            for domain in level.collect.values_mut() {
                for value in domain.options.values_mut() {
                    *value = rewrite(value);
                }
            }
        }
    }
}

impl Level {
    /// Create a level with no domains.
    pub fn new(name: impl Into<String>, freq: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            freq: freq.into(),
            collect: BTreeMap::new(),
        }
    }

    /// Add a domain, keyed by its name.
    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.collect.insert(domain.name.clone(), domain);
        self
    }

    /// Collection interval, or `None` for on-demand levels.
    pub fn interval(&self) -> Result<Option<Duration>, ConfigError> {
        if self.freq.trim().is_empty() {
            return Ok(None);
        }
        parse_duration(&self.freq).map(Some).map_err(|e| {
            ConfigError::ValidationError(format!(
                "level '{}': invalid freq '{}': {}",
                self.name, self.freq, e
            ))
        })
    }
}

impl Domain {
    /// Create a domain that collects all applicable metrics.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set an option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Set the metric allow-list.
    pub fn with_metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics = metrics.into_iter().map(Into::into).collect();
        self
    }

    /// Option value, or `""` if unset.
    pub fn option(&self, key: &str) -> &str {
        self.options.get(key).map(String::as_str).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> Plan {
        Plan::new("test")
            .with_level(
                Level::new("fast", "5s").with_domain(
                    Domain::new("repl.lag")
                        .with_option("source-id", "%{monitor.id}")
                        .with_option("table", "${DBPULSE_PLAN_TEST_TABLE:-blip.heartbeat}")
                        .with_metrics(["current"]),
                ),
            )
            .with_level(
                Level::new("slow", "1m")
                    .with_domain(Domain::new("repl.lag").with_option("writer", "pfs"))
                    .with_domain(Domain::new("status.global")),
            )
    }

    #[test]
    fn test_interpolation_rewrites_options_only() {
        let mut plan = sample_plan();
        plan.interpolate_env_vars();
        plan.interpolate_monitor(&MonitorConfig::new("db1"));

        let fast = &plan.levels["fast"].collect["repl.lag"];
        assert_eq!(fast.name, "repl.lag");
        assert_eq!(fast.option("source-id"), "db1");
        assert_eq!(fast.option("table"), "blip.heartbeat");
        assert_eq!(fast.metrics, vec!["current".to_string()]);
        assert_eq!(plan.levels["slow"].collect["repl.lag"].option("writer"), "pfs");
        assert_eq!(plan.levels.len(), 2);
    }

    #[test]
    fn test_interpolation_is_idempotent() {
        let mut once = sample_plan();
        once.interpolate_env_vars();
        once.interpolate_monitor(&MonitorConfig::new("db1"));

        let mut twice = once.clone();
        twice.interpolate_env_vars();
        twice.interpolate_monitor(&MonitorConfig::new("db1"));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_interpolation_leaves_unresolved() {
        let mut plan = Plan::new("p").with_level(
            Level::new("l", "").with_domain(
                Domain::new("d").with_option("x", "${DBPULSE_PLAN_UNSET_VAR}%{monitor.bogus}"),
            ),
        );
        plan.interpolate_env_vars();
        plan.interpolate_monitor(&MonitorConfig::new("db1"));
        assert_eq!(
            plan.levels["l"].collect["d"].option("x"),
            "${DBPULSE_PLAN_UNSET_VAR}%{monitor.bogus}"
        );
    }

    #[test]
    fn test_levels_collecting_sorted() {
        let plan = sample_plan();
        let levels: Vec<&str> = plan.levels_collecting("repl.lag").map(|(l, _)| l).collect();
        assert_eq!(levels, vec!["fast", "slow"]);
        assert_eq!(plan.levels_collecting("innodb").count(), 0);
        assert_eq!(plan.domains(), vec!["repl.lag", "status.global"]);
    }

    #[test]
    fn test_level_interval() {
        assert_eq!(
            Level::new("a", "5s").interval().unwrap(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(Level::new("b", "").interval().unwrap(), None);
        assert!(Level::new("c", "often").interval().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(sample_plan().validate().is_ok());
        assert!(Plan::new("").validate().is_err());
        assert!(Plan::new("empty").validate().is_ok());

        let bad_freq = Plan::new("p").with_level(Level::new("l", "5 parsecs"));
        assert!(bad_freq.validate().unwrap_err().to_string().contains("invalid freq"));

        let mut mismatched = Plan::new("p");
        mismatched
            .levels
            .insert("a".to_string(), Level::new("b", "5s"));
        assert!(mismatched.validate().is_err());
    }

    #[test]
    fn test_deserialize_and_normalize() {
        let yaml = r#"
name: custom
levels:
  lag:
    freq: 5s
    collect:
      repl.lag:
        options:
          writer: blip
"#;
        let mut plan: Plan = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(plan.levels["lag"].name, "");
        plan.normalize_names();
        assert_eq!(plan.levels["lag"].name, "lag");
        assert_eq!(plan.levels["lag"].collect["repl.lag"].name, "repl.lag");
        assert!(plan.monitor_id.is_empty());
        assert!(plan.validate().is_ok());
    }
}
