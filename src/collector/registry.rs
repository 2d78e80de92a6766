//! Collector registry: maps domain names to collector factories.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::collector::repl_lag::{self, ReplLagCollector};
use crate::collector::{Collector, CollectorError, CollectorHelp};
use crate::config::DEFAULT_PROBE_TIMEOUT;
use crate::db::Database;

/// Arguments passed to a factory for one monitor.
#[derive(Clone)]
pub struct FactoryArgs {
    pub monitor_id: String,
    pub db: Arc<dyn Database>,
    /// Bound on each auto-detection probe during `prepare`.
    pub probe_timeout: Duration,
}

impl FactoryArgs {
    pub fn new(monitor_id: impl Into<String>, db: Arc<dyn Database>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            db,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for FactoryArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryArgs")
            .field("monitor_id", &self.monitor_id)
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

/// Creates collectors for one domain.
pub trait CollectorFactory: Send + Sync {
    /// Create a new, unprepared collector.
    fn make(&self, args: FactoryArgs) -> Result<Box<dyn Collector>, CollectorError>;
}

impl<F> CollectorFactory for F
where
    F: Fn(FactoryArgs) -> Result<Box<dyn Collector>, CollectorError> + Send + Sync,
{
    fn make(&self, args: FactoryArgs) -> Result<Box<dyn Collector>, CollectorError> {
        self(args)
    }
}

struct Entry {
    factory: Arc<dyn CollectorFactory>,
    help: CollectorHelp,
}

fn make_repl_lag(args: FactoryArgs) -> Result<Box<dyn Collector>, CollectorError> {
    Ok(Box::new(
        ReplLagCollector::new(args.monitor_id, args.db).with_probe_timeout(args.probe_timeout),
    ))
}

/// Registry of collector factories, keyed by domain.
///
/// Help is stored at registration, so [`help`](Self::help) needs no
/// database.
#[derive(Default)]
pub struct CollectorRegistry {
    entries: BTreeMap<String, Entry>,
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("domains", &self.domains())
            .finish()
    }
}

impl CollectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in collector.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.entries.insert(
            repl_lag::DOMAIN.to_string(),
            Entry {
                factory: Arc::new(make_repl_lag),
                help: repl_lag::help(),
            },
        );
        registry
    }

    /// Register `factory` for `domain` with its static `help`.
    ///
    /// # Errors
    /// Returns `CollectorError::Config` if `domain` is already registered.
    pub fn register(
        &mut self,
        domain: impl Into<String>,
        help: CollectorHelp,
        factory: impl CollectorFactory + 'static,
    ) -> Result<(), CollectorError> {
        let domain = domain.into();
        if self.entries.contains_key(&domain) {
            return Err(CollectorError::Config(format!(
                "collector for domain {domain} already registered"
            )));
        }
        tracing::info!(domain = %domain, "Collector registered");
        self.entries.insert(
            domain,
            Entry {
                factory: Arc::new(factory),
                help,
            },
        );
        Ok(())
    }

    /// Create a collector for `domain`.
    ///
    /// # Errors
    /// Returns `CollectorError::Config` for an unknown domain, or whatever
    /// the factory returns.
    pub fn make(&self, domain: &str, args: FactoryArgs) -> Result<Box<dyn Collector>, CollectorError> {
        let entry = self.entries.get(domain).ok_or_else(|| {
            CollectorError::Config(format!(
                "no collector for domain {domain}; registered domains: {}",
                self.domains().join(", ")
            ))
        })?;
        tracing::debug!(domain = %domain, monitor_id = %args.monitor_id, "Creating collector");
        entry.factory.make(args)
    }

    /// Registered domains in sorted order.
    pub fn domains(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Whether `domain` is registered.
    pub fn contains(&self, domain: &str) -> bool {
        self.entries.contains_key(domain)
    }

    /// Static help for `domain`.
    pub fn help(&self, domain: &str) -> Option<&CollectorHelp> {
        self.entries.get(domain).map(|e| &e.help)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Cleanup;
    use crate::db::fake::FakeDatabase;
    use crate::metric::MetricValue;
    use crate::plan::Plan;

    struct ConstCollector;

    #[async_trait::async_trait]
    impl Collector for ConstCollector {
        fn domain(&self) -> &'static str {
            "test.const"
        }

        fn help(&self) -> CollectorHelp {
            CollectorHelp {
                domain: "test.const".into(),
                ..Default::default()
            }
        }

        async fn prepare(&mut self, _plan: &Plan) -> Result<Cleanup, CollectorError> {
            Ok(Cleanup::none())
        }

        async fn collect(&self, _level: &str) -> Result<Vec<MetricValue>, CollectorError> {
            Ok(vec![MetricValue::counter("n", 1.0)])
        }
    }

    fn args() -> FactoryArgs {
        FactoryArgs::new("db1", Arc::new(FakeDatabase::new()))
    }

    fn const_factory(_: FactoryArgs) -> Result<Box<dyn Collector>, CollectorError> {
        Ok(Box::new(ConstCollector))
    }

    #[test]
    fn test_builtin_has_repl_lag() {
        let registry = CollectorRegistry::with_builtin();
        assert_eq!(registry.domains(), vec!["repl.lag"]);
        let help = registry.help("repl.lag").unwrap();
        assert_eq!(help.options["writer"].default, "auto");

        let collector = registry.make("repl.lag", args()).unwrap();
        assert_eq!(collector.domain(), "repl.lag");
    }

    #[test]
    fn test_register_and_make() {
        let mut registry = CollectorRegistry::with_builtin();
        registry
            .register("test.const", ConstCollector.help(), const_factory)
            .unwrap();
        assert_eq!(registry.domains(), vec!["repl.lag", "test.const"]);
        assert!(registry.contains("test.const"));
        assert_eq!(registry.make("test.const", args()).unwrap().domain(), "test.const");
    }

    #[test]
    fn test_duplicate_domain_rejected() {
        let mut registry = CollectorRegistry::with_builtin();
        let err = registry
            .register("repl.lag", CollectorHelp::default(), const_factory)
            .unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_unknown_domain() {
        let registry = CollectorRegistry::new();
        assert!(registry.help("size.data").is_none());
        let err = registry.make("size.data", args()).err().unwrap();
        assert!(matches!(err, CollectorError::Config(_)));
    }

    #[tokio::test]
    async fn test_made_collector_is_usable() {
        let mut registry = CollectorRegistry::new();
        registry
            .register("test.const", CollectorHelp::default(), const_factory)
            .unwrap();
        let mut collector = registry.make("test.const", args()).unwrap();
        let cleanup = collector.prepare(&Plan::new("p")).await.unwrap();
        assert!(cleanup.is_noop());
        assert_eq!(collector.collect("5s").await.unwrap()[0].value, 1.0);
    }
}
