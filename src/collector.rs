//! Collector Layer
//!
//! A collector serves one metric domain (`repl.lag`, ...) for one plan of
//! one monitor. The scheduler prepares it once with the whole plan, then
//! calls `collect` for each level that includes the domain.
//!
//! # Architecture
//!
//! - [`Collector`]: Core trait for implementing domain collectors
//! - [`Cleanup`]: Release handle for resources started by `prepare`
//! - [`CollectorRegistry`]: Creates collectors by domain name
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dbpulse::collector::{CollectorRegistry, FactoryArgs};
//! use dbpulse::db::MySqlDatabase;
//! use dbpulse::plan::defaults;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = MySqlDatabase::connect("mysql://root@127.0.0.1:3306", Duration::from_secs(5)).await?;
//! let plan = defaults::internal_level_plan().with_monitor_id("db1");
//!
//! let registry = CollectorRegistry::with_builtin();
//! let mut collector = registry.make("repl.lag", FactoryArgs::new("db1", Arc::new(db)))?;
//! let cleanup = collector.prepare(&plan).await?;
//! let metrics = collector.collect("performance").await?;
//! cleanup.run();
//! # Ok(())
//! # }
//! ```

mod registry;
pub mod repl_lag;
mod traits;

pub use registry::{CollectorFactory, CollectorRegistry, FactoryArgs};
pub use repl_lag::ReplLagCollector;
pub use traits::{
    Cleanup, Collector, CollectorError, CollectorHelp, CollectorHelpOption, CollectorMetricHelp,
    Stop,
};
