//! dbpulse - plan-driven MySQL metric collection
//!
//! This crate provides the collection core of a MySQL monitor: plans that
//! say what to collect and how often, and collectors that turn a plan into
//! metric values. It can be used as a library, or run with the `dbpulse`
//! executable to check a configuration against live servers.
//!
//! # Architecture
//!
//! - **Plan**: levels (collection frequencies) of metric domains, with
//!   `${ENV}` and `%{monitor.FIELD}` option interpolation
//! - **Collectors**: one per domain; `repl.lag` reconciles per-level lag
//!   options into a single measurement method
//! - **Heartbeat**: background reader of a heartbeat table
//! - **Database**: narrow async seam over a sqlx MySQL pool
//!
//! # Example
//!
//! ```rust,ignore
//! use dbpulse::{AppConfig, CollectorRegistry, FactoryArgs, MySqlDatabase};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load("dbpulse.yaml")?;
//!     let mon = &config.monitors[0];
//!     let db = MySqlDatabase::connect(&mon.connection_url(), mon.query_timeout).await?;
//!     let plan = config.plan(&mon.plan).unwrap().with_monitor_id(&mon.id);
//!
//!     let registry = CollectorRegistry::with_builtin();
//!     let mut lag = registry.make("repl.lag", FactoryArgs::new(&mon.id, std::sync::Arc::new(db)))?;
//!     let cleanup = lag.prepare(&plan).await?;
//!     println!("{:?}", lag.collect("5s").await?);
//!     cleanup.run();
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod db;
pub mod heartbeat;
pub mod metric;
pub mod plan;
pub mod sqlutil;

pub use collector::{
    Cleanup, Collector, CollectorError, CollectorHelp, CollectorRegistry, FactoryArgs,
    ReplLagCollector,
};
pub use config::{AppConfig, ConfigError, MonitorConfig};
pub use db::{Database, DbError, MySqlDatabase, Row};
pub use heartbeat::{HeartbeatError, HeartbeatReader, Lag, ReaderArgs};
pub use metric::{MetricKind, MetricValue};
pub use plan::{Domain, Level, Plan};
