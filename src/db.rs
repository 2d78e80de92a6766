//! Database access for collectors.
//!
//! Collectors only ever run single-row scalar queries against the monitored
//! server, so the abstraction is a single method returning the first row as
//! text columns. Queries are expected to `CAST(... AS CHAR)` their columns.
//!
//! # Architecture
//!
//! - [`Database`]: the seam collectors and the heartbeat reader depend on
//! - [`MySqlDatabase`]: sqlx MySQL pool with a per-query timeout
//!
//! # Example
//!
//! ```ignore
//! let db = MySqlDatabase::connect("mysql://root@127.0.0.1:3306", Duration::from_secs(5)).await?;
//! let row = db.query_row("SELECT CAST(@@server_id AS CHAR)").await?;
//! ```

mod mysql;

use thiserror::Error;

pub use mysql::MySqlDatabase;

/// One result row; `None` columns are SQL `NULL`.
pub type Row = Vec<Option<String>>;

/// Errors returned by [`Database`] implementations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Driver error (connection, syntax, missing table, ...).
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Query did not complete within the configured timeout.
    #[error("query timed out")]
    Timeout,

    /// Query failed for a reason reported by a non-sqlx backend.
    #[error("query failed: {0}")]
    Query(String),
}

/// Handle to the monitored database server.
///
/// Owned by the monitor and shared by every collector of its plan, so
/// implementations must be safe for concurrent use.
#[async_trait::async_trait]
pub trait Database: Send + Sync + 'static {
    /// Run `sql` and return its first row, or `None` if it returned no rows.
    async fn query_row(&self, sql: &str) -> Result<Option<Row>, DbError>;
}

/// Returns the first column of `row`, flattening a missing row and `NULL`.
pub fn first_column(row: Option<Row>) -> Option<String> {
    row.and_then(|r| r.into_iter().next().flatten())
}
