//! Replication lag from Performance Schema applier instrumentation.
//!
//! Requires MySQL 8.0+ with `performance_schema` enabled. Stateless: each
//! call runs at most two queries.

use crate::collector::CollectorError;
use crate::db::{Database, first_column};
use crate::metric::MetricValue;
use crate::sqlutil::parse_f64;

use super::options::OPT_REPL_CHECK;
use super::{METRIC_CURRENT, not_a_replica};

/// Lag in milliseconds, or `NULL` when no applier worker has applied a
/// transaction (not a replica, or replication never ran).
///
/// - applier latency: original commit to end of apply of the most recently
///   applied transaction
/// - queue latency: time since the immediate commit of the last applied
///   transaction, 0 when the queue is drained (queued GTIDs all applied) or
///   either side is ANONYMOUS
/// - idle: last queued transaction committed more than a minute ago; lag is 0
///
/// Reported lag is the greater of applier and queue latency.
pub const LAG_QUERY: &str = "WITH applier AS (
  SELECT TIMESTAMPDIFF(MICROSECOND, LAST_APPLIED_TRANSACTION_ORIGINAL_COMMIT_TIMESTAMP,
           LAST_APPLIED_TRANSACTION_END_APPLY_TIMESTAMP) / 1000 AS latency_ms
  FROM performance_schema.replication_applier_status_by_worker
  ORDER BY LAST_APPLIED_TRANSACTION_END_APPLY_TIMESTAMP DESC
  LIMIT 1
), queue AS (
  SELECT MIN(CASE
           WHEN s.LAST_QUEUED_TRANSACTION = 'ANONYMOUS'
             OR w.LAST_APPLIED_TRANSACTION = 'ANONYMOUS'
             OR GTID_SUBTRACT(s.LAST_QUEUED_TRANSACTION, w.LAST_APPLIED_TRANSACTION) = ''
           THEN 0
           ELSE TIMESTAMPDIFF(MICROSECOND, w.LAST_APPLIED_TRANSACTION_IMMEDIATE_COMMIT_TIMESTAMP, NOW(3)) / 1000
         END) AS latency_ms,
         IF(MIN(TIMESTAMPDIFF(SECOND, s.LAST_QUEUED_TRANSACTION_ORIGINAL_COMMIT_TIMESTAMP, NOW())) > 60,
            'IDLE', 'ACTIVE') AS status
  FROM performance_schema.replication_applier_status_by_worker w
  JOIN performance_schema.replication_connection_status s ON s.CHANNEL_NAME = w.CHANNEL_NAME
)
SELECT CAST(IF(queue.status = 'IDLE', 0, GREATEST(applier.latency_ms, queue.latency_ms)) AS CHAR) AS lag_ms
FROM applier, queue";

/// Collect `current` from Performance Schema.
///
/// `repl_check` is a sanitized system variable name, or empty to infer
/// replica status from the lag query itself.
pub(crate) async fn collect(
    db: &dyn Database,
    repl_check: &str,
    report_not_a_replica: bool,
) -> Result<Vec<MetricValue>, CollectorError> {
    if !repl_check.is_empty() {
        let value = db
            .query_row(&format!("SELECT CAST(@@{repl_check} AS CHAR)"))
            .await
            .map(first_column)
            .map_err(|source| CollectorError::ReplicaCheck {
                option: OPT_REPL_CHECK,
                source,
            })?;
        let is_replica = value.as_deref().and_then(parse_f64).ok_or_else(|| {
            CollectorError::InvalidValue(format!(
                "{OPT_REPL_CHECK} @@{repl_check} returned {value:?}, expected 0 or 1"
            ))
        })?;
        if is_replica == 0.0 {
            return Ok(not_a_replica(report_not_a_replica));
        }
    }

    let Some(lag) = first_column(db.query_row(LAG_QUERY).await?) else {
        if repl_check.is_empty() {
            return Ok(not_a_replica(report_not_a_replica));
        }
        return Err(CollectorError::Inconsistent(format!(
            "@@{repl_check} reports a replica but performance_schema.replication_applier_status_by_worker \
             returned no lag (check that replication is running and performance_schema is enabled)"
        )));
    };

    let value = parse_f64(&lag).ok_or_else(|| {
        CollectorError::InvalidValue(format!(
            "replication lag from performance_schema is not a number: {lag:?}"
        ))
    })?;
    Ok(vec![MetricValue::gauge(METRIC_CURRENT, value)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::FakeDatabase;
    use crate::metric::MetricKind;

    const LAG: &str = "performance_schema.replication_applier_status_by_worker";

    #[tokio::test]
    async fn test_lag_reported_as_gauge() {
        let db = FakeDatabase::new().value(LAG, Some("1532.250"));
        let metrics = collect(&db, "", false).await.unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "current");
        assert_eq!(metrics[0].kind, MetricKind::Gauge);
        assert_eq!(metrics[0].value, 1532.25);
        assert!(metrics[0].meta.is_empty());
    }

    #[tokio::test]
    async fn test_idle_channel_reports_zero() {
        // The server evaluates the idle rule; an idle channel yields "0".
        assert!(LAG_QUERY.contains("> 60"));
        assert!(LAG_QUERY.contains("IF(queue.status = 'IDLE', 0,"));
        let db = FakeDatabase::new().value(LAG, Some("0"));
        let metrics = collect(&db, "", false).await.unwrap();
        assert_eq!(metrics[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_not_a_replica_by_repl_check() {
        let db = FakeDatabase::new().value("@@read_only", Some("0"));
        assert!(collect(&db, "read_only", false).await.unwrap().is_empty());

        let metrics = collect(&db, "read_only", true).await.unwrap();
        assert_eq!(metrics, vec![MetricValue::gauge("current", -1.0)]);
        assert_eq!(db.count(LAG), 0);
    }

    #[tokio::test]
    async fn test_no_rows_without_repl_check_is_not_a_replica() {
        let db = FakeDatabase::new().value(LAG, None);
        assert!(collect(&db, "", false).await.unwrap().is_empty());
        assert_eq!(collect(&db, "", true).await.unwrap()[0].value, -1.0);

        let db = FakeDatabase::new().row(LAG, None);
        assert!(collect(&db, "", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_rows_with_repl_check_is_inconsistent() {
        let db = FakeDatabase::new()
            .value("@@super_read_only", Some("ON"))
            .value(LAG, None);
        let err = collect(&db, "super_read_only", false).await.unwrap_err();
        assert!(matches!(err, CollectorError::Inconsistent(_)));
    }

    #[tokio::test]
    async fn test_non_numeric_lag_is_error() {
        let db = FakeDatabase::new().value(LAG, Some("soon"));
        let err = collect(&db, "", false).await.unwrap_err();
        assert!(matches!(err, CollectorError::InvalidValue(_)));
        assert!(err.to_string().contains("\"soon\""));
    }

    #[tokio::test]
    async fn test_repl_check_query_failure() {
        let db = FakeDatabase::new().fail("@@is_replica", "Unknown system variable");
        let err = collect(&db, "is_replica", false).await.unwrap_err();
        assert!(err.to_string().contains("repl-check"));
    }

    #[tokio::test]
    async fn test_lag_query_failure_is_surfaced() {
        let db = FakeDatabase::new().fail(LAG, "Table doesn't exist");
        let err = collect(&db, "", false).await.unwrap_err();
        assert!(matches!(err, CollectorError::Database(_)));
    }
}
