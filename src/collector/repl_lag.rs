//! Replication lag collector (`repl.lag`).
//!
//! Lag can be collected at several levels of one plan, but it is measured
//! by exactly one writer per plan:
//!
//! - `pfs`: Performance Schema applier instrumentation, queried on every tick
//! - `blip`: heartbeat table, sampled by one background [`HeartbeatReader`]
//!   shared by every level
//!
//! The two do not necessarily agree, so levels that set different writers
//! are a configuration error. `auto` (the default) probes `pfs` first, then
//! the heartbeat table.

mod options;
mod pfs;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::collector::{Cleanup, Collector, CollectorError, CollectorHelp, Stop};
use crate::config::DEFAULT_PROBE_TIMEOUT;
use crate::db::{Database, DbError};
use crate::heartbeat::{DEFAULT_POLL_INTERVAL, HeartbeatReader, NO_HEARTBEAT, ReaderArgs};
use crate::metric::MetricValue;
use crate::plan::Plan;

use options::LevelOptions;

pub use options::{
    OPT_HEARTBEAT_SOURCE_ID, OPT_HEARTBEAT_SOURCE_ROLE, OPT_HEARTBEAT_TABLE, OPT_NETWORK_LATENCY,
    OPT_REPL_CHECK, OPT_REPORT_NO_HEARTBEAT, OPT_REPORT_NOT_A_REPLICA, OPT_WRITER, Writer,
};
pub use pfs::LAG_QUERY;

/// Domain name.
pub const DOMAIN: &str = "repl.lag";

/// The only metric of this domain, in milliseconds.
pub(crate) const METRIC_CURRENT: &str = "current";

/// Metadata key naming the heartbeat source of a sample.
pub const META_SOURCE: &str = "source";

/// Resolved configuration of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LevelConfig {
    writer: Writer,
    report_no_heartbeat: bool,
    report_not_a_replica: bool,
}

/// Output for an instance that is not a replica: nothing, or -1 if reported.
pub(crate) fn not_a_replica(report: bool) -> Vec<MetricValue> {
    if report {
        vec![MetricValue::gauge(METRIC_CURRENT, -1.0)]
    } else {
        vec![]
    }
}

/// Static help of the `repl.lag` domain.
pub fn help() -> CollectorHelp {
    options::help()
}

impl Stop for HeartbeatReader {
    fn stop(&self) {
        HeartbeatReader::stop(self);
    }
}

/// Replication lag collector for one plan of one monitor.
pub struct ReplLagCollector {
    monitor_id: String,
    db: Arc<dyn Database>,
    probe_timeout: Duration,
    poll_interval: Duration,
    levels: BTreeMap<String, LevelConfig>,
    repl_check: String,
    reader: Option<Arc<HeartbeatReader>>,
}

impl std::fmt::Debug for ReplLagCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplLagCollector")
            .field("monitor_id", &self.monitor_id)
            .field("levels", &self.levels)
            .field("repl_check", &self.repl_check)
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

impl ReplLagCollector {
    /// Create an unprepared collector.
    pub fn new(monitor_id: impl Into<String>, db: Arc<dyn Database>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            db,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            levels: BTreeMap::new(),
            repl_check: String::new(),
            reader: None,
        }
    }

    /// Bound each auto-detection probe.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Polling interval of the heartbeat reader.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Writer resolved for `level`, if the level was prepared.
    pub fn writer_for(&self, level: &str) -> Option<Writer> {
        self.levels.get(level).map(|c| c.writer)
    }

    /// Whether the shared heartbeat reader is running.
    pub fn has_sampler(&self) -> bool {
        self.reader.as_ref().is_some_and(|r| r.is_running())
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop();
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CollectorError>
    where
        F: Future<Output = Result<T, CollectorError>>,
    {
        tokio::time::timeout(self.probe_timeout, fut)
            .await
            .map_err(|_| CollectorError::Database(DbError::Timeout))?
    }

    /// Run the Performance Schema strategy once and discard the result.
    async fn probe_pfs(&self) -> Result<(), CollectorError> {
        self.bounded(pfs::collect(self.db.as_ref(), &self.repl_check, true))
            .await
            .map(|_| ())
    }

    /// Create and start the heartbeat reader shared by all levels.
    async fn start_reader(&mut self, level: &str, opts: &LevelOptions) -> Result<(), CollectorError> {
        if self.reader.is_some() {
            return Ok(());
        }

        let args = ReaderArgs {
            monitor_id: self.monitor_id.clone(),
            db: Arc::clone(&self.db),
            table: opts.table.clone(),
            source_id: opts.source_id.clone(),
            source_role: opts.source_role.clone(),
            repl_check: self.repl_check.clone(),
            network_latency: opts.network_latency,
            interval: self.poll_interval,
        };
        let reader = self
            .bounded(async { HeartbeatReader::connect(args).await.map_err(Into::into) })
            .await?;
        if tokio::time::timeout(self.probe_timeout, reader.prime()).await.is_err() {
            tracing::debug!(monitor_id = %self.monitor_id, "repl.lag: initial heartbeat sample timed out");
        }
        reader.start();
        tracing::debug!(
            monitor_id = %self.monitor_id,
            level = %level,
            table = %reader.table(),
            network_latency = ?opts.network_latency,
            "repl.lag: started heartbeat reader"
        );
        self.reader = Some(Arc::new(reader));
        Ok(())
    }

    /// Resolve the writer of the first level, probing if it is `auto`.
    async fn resolve_writer(
        &mut self,
        level: &str,
        opts: &LevelOptions,
    ) -> Result<Writer, CollectorError> {
        tracing::debug!(monitor_id = %self.monitor_id, level = %level, "repl.lag: config from level");
        match opts.writer {
            Some(Writer::PerformanceSchema) => {
                self.probe_pfs().await?;
                Ok(Writer::PerformanceSchema)
            }
            Some(Writer::Heartbeat) => {
                self.start_reader(level, opts).await?;
                Ok(Writer::Heartbeat)
            }
            None => {
                match self.probe_pfs().await {
                    Ok(()) => {
                        tracing::debug!(monitor_id = %self.monitor_id, "repl.lag: auto-detected pfs");
                        return Ok(Writer::PerformanceSchema);
                    }
                    Err(e) => {
                        tracing::debug!(monitor_id = %self.monitor_id, error = %e, "repl.lag: pfs not viable");
                    }
                }
                match self.start_reader(level, opts).await {
                    Ok(()) => {
                        tracing::debug!(monitor_id = %self.monitor_id, "repl.lag: auto-detected heartbeat");
                        Ok(Writer::Heartbeat)
                    }
                    Err(e) => {
                        tracing::debug!(monitor_id = %self.monitor_id, error = %e, "repl.lag: heartbeat not viable");
                        Err(CollectorError::AutoDetect {
                            what: "replication lag writer",
                            option: OPT_WRITER,
                        })
                    }
                }
            }
        }
    }

    async fn prepare_levels(&mut self, plan: &Plan) -> Result<BTreeMap<String, LevelConfig>, CollectorError> {
        let mut resolved: Option<Writer> = None;
        let mut levels = BTreeMap::new();

        // Level names are visited in sorted order, so the first level (the one
        // that may trigger auto-detection) is the same on every run.
        for (level_name, dom) in plan.levels_collecting(DOMAIN) {
            let opts = LevelOptions::parse(&self.monitor_id, level_name, dom)?;

            let writer = match resolved {
                None => {
                    self.repl_check = opts.repl_check.clone();
                    let writer = self.resolve_writer(level_name, &opts).await?;
                    resolved = Some(writer);
                    writer
                }
                Some(first) => match opts.writer {
                    Some(w) if w != first => {
                        return Err(CollectorError::Config(format!(
                            "different {OPT_WRITER} configuration: level {level_name} sets {w}, \
                             but {first} is used by other levels"
                        )));
                    }
                    _ => first,
                },
            };

            levels.insert(
                level_name.to_string(),
                LevelConfig {
                    writer,
                    report_no_heartbeat: opts.report_no_heartbeat,
                    report_not_a_replica: opts.report_not_a_replica,
                },
            );
        }

        Ok(levels)
    }

    async fn collect_heartbeat(&self, level: &str, cfg: &LevelConfig) -> Result<Vec<MetricValue>, CollectorError> {
        let Some(reader) = &self.reader else {
            return Err(self.unprepared(level));
        };
        let lag = reader.lag().await?;
        if !lag.replica {
            return Ok(not_a_replica(cfg.report_not_a_replica));
        }
        if lag.milliseconds == NO_HEARTBEAT && !cfg.report_no_heartbeat {
            return Ok(vec![]);
        }

        let mut metric = MetricValue::gauge(METRIC_CURRENT, lag.milliseconds as f64);
        if !lag.source_id.is_empty() {
            metric = metric.with_meta(META_SOURCE, lag.source_id);
        }
        Ok(vec![metric])
    }

    fn unprepared(&self, level: &str) -> CollectorError {
        CollectorError::UnpreparedLevel {
            domain: DOMAIN,
            level: level.to_string(),
            prepared: self.levels.keys().cloned().collect(),
        }
    }
}

#[async_trait::async_trait]
impl Collector for ReplLagCollector {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn help(&self) -> CollectorHelp {
        help()
    }

    async fn prepare(&mut self, plan: &Plan) -> Result<Cleanup, CollectorError> {
        self.stop_reader();
        self.levels.clear();
        self.repl_check.clear();

        match self.prepare_levels(plan).await {
            Ok(levels) => {
                self.levels = levels;
                Ok(match &self.reader {
                    Some(reader) => Cleanup::stop(reader.clone()),
                    None => Cleanup::none(),
                })
            }
            Err(e) => {
                self.stop_reader();
                Err(e)
            }
        }
    }

    async fn collect(&self, level: &str) -> Result<Vec<MetricValue>, CollectorError> {
        let Some(cfg) = self.levels.get(level) else {
            return Err(self.unprepared(level));
        };
        match cfg.writer {
            Writer::PerformanceSchema => {
                pfs::collect(self.db.as_ref(), &self.repl_check, cfg.report_not_a_replica).await
            }
            Writer::Heartbeat => self.collect_heartbeat(level, cfg).await,
        }
    }
}
