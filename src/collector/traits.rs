//! Core collector traits and types.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;
use crate::heartbeat::HeartbeatError;
use crate::metric::{MetricKind, MetricValue};
use crate::plan::Plan;

/// Errors that can occur while preparing or collecting a domain.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Invalid or conflicting domain options in the plan.
    #[error("config error: {0}")]
    Config(String),

    /// No measurement method is viable on the monitored server.
    #[error("failed to auto-detect {what}, set option {option} manually")]
    AutoDetect {
        what: &'static str,
        option: &'static str,
    },

    /// The configured replica check could not be evaluated.
    #[error("checking if instance is a replica failed, check value of {option}: {source}")]
    ReplicaCheck {
        option: &'static str,
        #[source]
        source: DbError,
    },

    /// The server reports contradictory state.
    #[error("inconsistent server state: {0}")]
    Inconsistent(String),

    /// A query returned a value that cannot be used as a metric.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Heartbeat(#[from] HeartbeatError),

    /// `collect` was called for a level that `prepare` never saw.
    ///
    /// This is a contract violation between scheduler and collector, not a
    /// data problem; callers should treat it as fatal.
    #[error("level {level:?} was not prepared for domain {domain}; prepared levels: {prepared:?}")]
    UnpreparedLevel {
        domain: &'static str,
        level: String,
        prepared: Vec<String>,
    },
}

impl CollectorError {
    /// Whether the error is a programming error that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnpreparedLevel { .. })
    }
}

/// Describes one domain option.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectorHelpOption {
    pub name: String,
    pub desc: String,
    /// Default value; a key of `values` when `values` is not empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default: String,
    /// Accepted values and their meaning; empty for free-form options.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
}

/// Describes one metric a collector can emit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectorMetricHelp {
    pub name: String,
    pub kind: MetricKind,
    pub desc: String,
}

/// Static documentation for a collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectorHelp {
    pub domain: String,
    pub description: String,
    pub options: BTreeMap<String, CollectorHelpOption>,
    pub metrics: Vec<CollectorMetricHelp>,
}

/// A long-lived resource created by [`Collector::prepare`].
pub trait Stop: Send + Sync {
    /// Release the resource. Must be safe to call more than once.
    fn stop(&self);
}

/// Release handle returned by [`Collector::prepare`].
///
/// The scheduler runs it when it retires the plan. Clones share the same
/// resource, and running it again after the first time does nothing.
#[derive(Clone, Default)]
pub struct Cleanup {
    resource: Option<Arc<dyn Stop>>,
}

impl Cleanup {
    /// A handle with nothing to release.
    pub fn none() -> Self {
        Self::default()
    }

    /// A handle that stops `resource`.
    pub fn stop(resource: Arc<dyn Stop>) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    /// Whether running this handle does nothing.
    pub fn is_noop(&self) -> bool {
        self.resource.is_none()
    }

    /// Release the resource, if any.
    pub fn run(&self) {
        if let Some(resource) = &self.resource {
            resource.stop();
        }
    }
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cleanup")
            .field("noop", &self.is_noop())
            .finish()
    }
}

/// Core collector trait implemented by every metric domain.
///
/// A collector instance serves one plan of one monitor. The scheduler calls
/// [`prepare`](Self::prepare) once, then [`collect`](Self::collect) on each
/// level's own clock. Calls for different levels may run concurrently; calls
/// for the same level never do.
///
/// # Error Handling
///
/// - Returning `Ok(vec![])` from `collect` is normal: a drop policy may
///   suppress output for the current sample.
/// - Errors from `collect` are for that tick only; the collector does not
///   retry internally.
/// - [`CollectorError::is_fatal`] errors mean the scheduler and collector
///   disagree about which levels exist.
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Domain name, the key into `Level::collect`.
    fn domain(&self) -> &'static str;

    /// Static documentation; does not depend on runtime state.
    fn help(&self) -> CollectorHelp;

    /// Prepare to collect every level of `plan` that includes this domain.
    ///
    /// May probe the monitored server and start background tasks. On error
    /// nothing started here is left running.
    async fn prepare(&mut self, plan: &Plan) -> Result<Cleanup, CollectorError>;

    /// Collect metrics for one level.
    async fn collect(&self, level: &str) -> Result<Vec<MetricValue>, CollectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl Stop for Counter {
        fn stop(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_cleanup_none_is_noop() {
        let cleanup = Cleanup::none();
        assert!(cleanup.is_noop());
        cleanup.run();
        cleanup.run();
    }

    #[test]
    fn test_cleanup_clones_share_resource() {
        let counter = Arc::new(Counter::default());
        let cleanup = Cleanup::stop(counter.clone());
        let clone = cleanup.clone();
        assert!(!clone.is_noop());

        cleanup.run();
        clone.run();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_error_fatality() {
        let fatal = CollectorError::UnpreparedLevel {
            domain: "repl.lag",
            level: "10s".into(),
            prepared: vec!["5s".into()],
        };
        assert!(fatal.is_fatal());
        assert!(fatal.to_string().contains("\"10s\""));

        assert!(!CollectorError::Config("x".into()).is_fatal());
        assert!(!CollectorError::Database(DbError::Timeout).is_fatal());
    }

    #[test]
    fn test_auto_detect_message() {
        let err = CollectorError::AutoDetect {
            what: "replication lag writer",
            option: "writer",
        };
        assert_eq!(
            err.to_string(),
            "failed to auto-detect replication lag writer, set option writer manually"
        );
    }
}
