//! Background heartbeat table reader.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::db::{Database, first_column};
use crate::sqlutil::{clean_object_name, parse_f64, quote};

use super::{DEFAULT_NETWORK_LATENCY, DEFAULT_POLL_INTERVAL, DEFAULT_TABLE, HeartbeatError, Lag};

/// Construction arguments for [`HeartbeatReader`].
#[derive(Clone)]
pub struct ReaderArgs {
    /// Monitor that owns the reader; also the `src_id` its own writer uses.
    pub monitor_id: String,
    pub db: Arc<dyn Database>,
    /// Heartbeat table (`db.table`).
    pub table: String,
    /// Read heartbeats from this source only.
    pub source_id: String,
    /// Read the newest heartbeat from sources with this role.
    pub source_role: String,
    /// System variable that is 0/OFF when the instance is not a replica.
    pub repl_check: String,
    /// Subtracted from every measured lag.
    pub network_latency: Duration,
    pub interval: Duration,
}

impl ReaderArgs {
    /// Arguments with default table, latency and interval.
    pub fn new(monitor_id: impl Into<String>, db: Arc<dyn Database>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            db,
            table: DEFAULT_TABLE.to_string(),
            source_id: String::new(),
            source_role: String::new(),
            repl_check: String::new(),
            network_latency: DEFAULT_NETWORK_LATENCY,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl std::fmt::Debug for ReaderArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderArgs")
            .field("monitor_id", &self.monitor_id)
            .field("table", &self.table)
            .field("source_id", &self.source_id)
            .field("source_role", &self.source_role)
            .field("repl_check", &self.repl_check)
            .field("network_latency", &self.network_latency)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Everything the polling task needs to take one sample.
struct Sampler {
    monitor_id: String,
    db: Arc<dyn Database>,
    heartbeat_query: String,
    repl_check_query: Option<String>,
    network_latency_ms: i64,
}

impl Sampler {
    async fn sample(&self) -> Result<Lag, HeartbeatError> {
        if let Some(query) = &self.repl_check_query {
            let value = first_column(self.db.query_row(query).await?);
            if value.as_deref().and_then(parse_f64) == Some(0.0) {
                return Ok(Lag::not_a_replica());
            }
        }

        let Some(row) = self.db.query_row(&self.heartbeat_query).await? else {
            return Ok(Lag::no_heartbeat());
        };
        let mut columns = row.into_iter();
        let age_ms = columns.next().flatten().as_deref().and_then(parse_f64);
        let source_id = columns.next().flatten().unwrap_or_default();

        // Newest heartbeat is our own: this instance is the active source.
        if source_id == self.monitor_id {
            return Ok(Lag::not_a_replica());
        }

        let milliseconds = match age_ms {
            Some(age) => (age as i64 - self.network_latency_ms).max(0),
            None => super::NO_HEARTBEAT,
        };
        Ok(Lag {
            replica: true,
            milliseconds,
            source_id,
        })
    }
}

#[derive(Debug)]
struct State {
    lag: Lag,
    error: Option<String>,
}

/// Reads the heartbeat table in a background task.
///
/// Create with [`connect`](Self::connect), then [`start`](Self::start) the
/// task. [`lag`](Self::lag) never waits on the database: it returns the
/// latest sample, which is [`Lag::no_heartbeat`] until the first poll lands.
pub struct HeartbeatReader {
    sampler: Arc<Sampler>,
    table: String,
    interval: Duration,
    state: Arc<RwLock<State>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for HeartbeatReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatReader")
            .field("monitor_id", &self.sampler.monitor_id)
            .field("table", &self.table)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl HeartbeatReader {
    /// Create a reader after checking that the heartbeat table is readable.
    ///
    /// # Errors
    /// Returns `HeartbeatError::TableUnavailable` if the table cannot be
    /// queried (missing table, no privileges, connection failure).
    pub async fn connect(args: ReaderArgs) -> Result<Self, HeartbeatError> {
        let table = match clean_object_name(&args.table) {
            t if t.is_empty() => DEFAULT_TABLE.to_string(),
            t => t,
        };

        args.db
            .query_row(&format!("SELECT CAST(1 AS CHAR) FROM {table} LIMIT 1"))
            .await
            .map_err(|source| HeartbeatError::TableUnavailable {
                table: table.clone(),
                source,
            })?;

        let filter = if !args.source_id.is_empty() {
            format!(" WHERE src_id = {}", quote(&args.source_id))
        } else if !args.source_role.is_empty() {
            format!(" WHERE src_role = {}", quote(&args.source_role))
        } else {
            String::new()
        };
        let heartbeat_query = format!(
            "SELECT CAST(TIMESTAMPDIFF(MICROSECOND, ts, NOW(6)) DIV 1000 AS CHAR), src_id \
             FROM {table}{filter} ORDER BY ts DESC LIMIT 1"
        );

        let repl_check = clean_object_name(&args.repl_check);
        let repl_check_query =
            (!repl_check.is_empty()).then(|| format!("SELECT CAST(@@{repl_check} AS CHAR)"));

        let sampler = Sampler {
            monitor_id: args.monitor_id,
            db: args.db,
            heartbeat_query,
            repl_check_query,
            network_latency_ms: i64::try_from(args.network_latency.as_millis())
                .unwrap_or(i64::MAX),
        };

        Ok(Self {
            sampler: Arc::new(sampler),
            table,
            interval: args.interval,
            state: Arc::new(RwLock::new(State {
                lag: Lag::no_heartbeat(),
                error: None,
            })),
            task: Mutex::new(None),
        })
    }

    /// Spawn the polling task. No-op if it is already running.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }

        let sampler = Arc::clone(&self.sampler);
        let state = Arc::clone(&self.state);
        let interval = self.interval.max(Duration::from_millis(1));
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let sample = sampler.sample().await;
                let mut guard = state.write().await;
                match sample {
                    Ok(lag) => {
                        guard.lag = lag;
                        guard.error = None;
                    }
                    Err(e) => {
                        tracing::debug!(monitor_id = %sampler.monitor_id, error = %e, "Heartbeat poll failed");
                        guard.error = Some(e.to_string());
                    }
                }
            }
        }));
        tracing::debug!(
            monitor_id = %self.sampler.monitor_id,
            table = %self.table,
            network_latency_ms = self.sampler.network_latency_ms,
            "Heartbeat reader started"
        );
    }

    /// Take one sample now and make it the latest.
    ///
    /// Lets callers see real replica status before the first background
    /// poll lands. A failed sample keeps the current state.
    pub async fn prime(&self) {
        match self.sampler.sample().await {
            Ok(lag) => {
                let mut guard = self.state.write().await;
                guard.lag = lag;
                guard.error = None;
            }
            Err(e) => {
                tracing::debug!(monitor_id = %self.sampler.monitor_id, error = %e, "Initial heartbeat sample failed");
            }
        }
    }

    /// Stop the polling task. Safe to call more than once.
    pub fn stop(&self) {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::debug!(monitor_id = %self.sampler.monitor_id, "Heartbeat reader stopped");
        }
    }

    /// Whether the polling task is running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Latest lag sample.
    ///
    /// # Errors
    /// Returns `HeartbeatError::Sample` if the most recent poll failed.
    pub async fn lag(&self) -> Result<Lag, HeartbeatError> {
        let state = self.state.read().await;
        match &state.error {
            Some(e) => Err(HeartbeatError::Sample(e.clone())),
            None => Ok(state.lag.clone()),
        }
    }

    /// Heartbeat table this reader polls.
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Drop for HeartbeatReader {
    fn drop(&mut self) {
        self.stop();
    }
}
