//! Heartbeat-based replication lag sampling.
//!
//! A heartbeat writer on the source periodically updates a row in a heartbeat
//! table; replicas read that row and infer lag from its age. This module only
//! reads: [`HeartbeatReader`] polls the table in a background task and
//! serves the latest [`Lag`] sample on demand.
//!
//! Table layout read by the reader:
//!
//! ```sql
//! CREATE TABLE blip.heartbeat (
//!   src_id   varchar(200) NOT NULL PRIMARY KEY,
//!   src_role varchar(200) NULL DEFAULT NULL,
//!   ts       timestamp(3) NOT NULL,
//!   freq     smallint unsigned NOT NULL
//! );
//! ```

mod reader;

use std::time::Duration;

use thiserror::Error;

use crate::db::DbError;

pub use reader::{HeartbeatReader, ReaderArgs};

/// Default heartbeat table.
pub const DEFAULT_TABLE: &str = "blip.heartbeat";

/// Default network latency subtracted from every sample.
pub const DEFAULT_NETWORK_LATENCY: Duration = Duration::from_millis(50);

/// Default polling interval of the background task.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lag value meaning no heartbeat has been observed yet.
pub const NO_HEARTBEAT: i64 = -1;

/// One replication lag sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lag {
    /// Whether the local instance is currently a replica.
    pub replica: bool,
    /// Lag in milliseconds, or [`NO_HEARTBEAT`].
    pub milliseconds: i64,
    /// Heartbeat source that produced the sample.
    pub source_id: String,
}

impl Lag {
    /// Sample for a replica that has not seen a heartbeat yet.
    pub fn no_heartbeat() -> Self {
        Self {
            replica: true,
            milliseconds: NO_HEARTBEAT,
            source_id: String::new(),
        }
    }

    /// Sample for an instance that is not a replica.
    pub fn not_a_replica() -> Self {
        Self {
            replica: false,
            ..Self::no_heartbeat()
        }
    }
}

/// Errors returned by the heartbeat reader.
#[derive(Debug, Error)]
pub enum HeartbeatError {
    /// Heartbeat table cannot be read.
    #[error("heartbeat table {table} is not readable: {source}")]
    TableUnavailable {
        table: String,
        #[source]
        source: DbError,
    },

    /// Query against the monitored server failed.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Latest background poll failed.
    #[error("heartbeat sample failed: {0}")]
    Sample(String),
}
