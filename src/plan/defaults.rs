//! Built-in plans used when a monitor does not supply its own.

use super::{Domain, Level, Plan};

/// Names accepted by [`builtin`].
pub const BUILTIN_PLANS: &[&str] = &["default", "scrape"];

/// Look up a built-in plan by name.
pub fn builtin(name: &str) -> Option<Plan> {
    match name {
        "default" => Some(internal_level_plan()),
        "scrape" => Some(scrape_plan()),
        _ => None,
    }
}

/// Multi-tier plan: KPIs every 5s, connection and temp-table counters every
/// 20s, data sizes every 5m, slow-changing system variables every 15m.
pub fn internal_level_plan() -> Plan {
    Plan::new("default")
        .with_level(
            Level::new("performance", "5s")
                .with_domain(Domain::new("status.global").with_metrics([
                    // KPIs
                    "queries",
                    "threads_running",
                    // TPS
                    "com_begin",
                    "com_commit",
                    "com_rollback",
                    // Read/write access
                    "com_select",
                    "com_delete",
                    "com_delete_multi",
                    "com_insert",
                    "com_insert_select",
                    "com_replace",
                    "com_replace_select",
                    "com_update",
                    "com_update_multi",
                    // Storage IOPS and throughput
                    "innodb_data_reads",
                    "innodb_data_writes",
                    "innodb_data_read",
                    "innodb_data_written",
                    // Buffer pool
                    "innodb_buffer_pool_read_requests",
                    "innodb_buffer_pool_reads",
                    "innodb_buffer_pool_wait_free",
                    "innodb_buffer_pool_pages_dirty",
                    "innodb_buffer_pool_pages_free",
                    "innodb_buffer_pool_pages_total",
                    "innodb_buffer_pool_pages_flushed",
                    // Redo log
                    "innodb_os_log_written",
                ]))
                .with_domain(Domain::new("innodb").with_metrics([
                    "trx_active_transactions",
                    "lock_timeouts",
                    "lock_row_lock_current_waits",
                    "lock_row_lock_waits",
                    "lock_row_lock_time",
                    "buffer_flush_adaptive_total_pages",
                    "buffer_LRU_batch_flush_total_pages",
                    "buffer_flush_background_total_pages",
                    "log_lsn_checkpoint_age_total",
                    "log_max_modified_age_async",
                    "innodb_os_log_pending_writes",
                    "innodb_log_waits",
                    "trx_rseg_history_len",
                    "lock_deadlocks",
                ])),
        )
        .with_level(
            Level::new("additional", "20s").with_domain(Domain::new("status.global").with_metrics([
                // Temp objects
                "created_tmp_disk_tables",
                "created_tmp_tables",
                "created_tmp_files",
                // Threads and connections
                "connections",
                "threads_connected",
                "max_used_connections",
                // Network
                "bytes_sent",
                "bytes_received",
                "binlog_cache_disk_use",
                // Prepared statements
                "prepared_stmt_count",
                "com_stmt_execute",
                "com_stmt_prepare",
                // Client errors
                "aborted_clients",
                "aborted_connects",
                // Should be zero
                "select_full_join",
                "select_full_range_join",
                "select_range_check",
                "select_scan",
                // Admin and SHOW
                "com_flush",
                "com_kill",
                "com_purge",
                "com_admin_commands",
                "com_show_processlist",
                "com_show_replica_status",
                "com_show_status",
                "com_show_variables",
                "com_show_warnings",
            ])),
        )
        .with_level(
            Level::new("data-size", "5m")
                .with_domain(Domain::new("size.data"))
                .with_domain(Domain::new("size.binlogs")),
        )
        .with_level(
            Level::new("sysvars", "15m").with_domain(Domain::new("var.global").with_metrics([
                "max_connections",
                "max_prepared_stmt_count",
                "innodb_log_file_size",
                "innodb_max_dirty_pages_pct",
            ])),
        )
}

/// Single on-demand level that collects everything from a few domains, for
/// pull-based scraping.
pub fn scrape_plan() -> Plan {
    Plan::new("scrape").with_level(
        Level::new("all", "")
            .with_domain(Domain::new("status.global").with_option("all", "yes"))
            .with_domain(Domain::new("var.global").with_option("all", "yes"))
            .with_domain(Domain::new("innodb").with_option("all", "enabled")),
    )
}
