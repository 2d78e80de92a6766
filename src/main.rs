//! dbpulse Binary Entry Point
//!
//! Prints collector help, or prepares every configured monitor and collects
//! its plan, once (`check`) or on each level's frequency (`run`).
//! Core functionality is provided by the `dbpulse` library crate.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use dbpulse::{
    AppConfig, Cleanup, Collector, CollectorRegistry, Database, FactoryArgs, MetricValue,
    MonitorConfig, MySqlDatabase, Plan,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// dbpulse - plan-driven MySQL metric collection
#[derive(Parser, Debug)]
#[command(name = "dbpulse", version, about, long_about = None, disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print domain options and metrics as YAML
    Help {
        /// Domain name; all registered domains when omitted
        domain: Option<String>,
    },
    /// Prepare every monitor and collect each level once
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/config.yaml", env = "DBPULSE_CONFIG")]
        config: String,
    },
    /// Collect every level on its frequency until Ctrl+C
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/config.yaml", env = "DBPULSE_CONFIG")]
        config: String,
    },
}

/// One collection of one domain at one level, printed as a JSON line.
#[derive(Serialize)]
struct Report<'a> {
    monitor_id: &'a str,
    level: &'a str,
    domain: &'a str,
    metrics: Vec<MetricValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// A monitor whose collectors are prepared for its plan.
struct Monitor {
    id: String,
    plan: Plan,
    db: MySqlDatabase,
    collectors: Arc<Vec<Box<dyn Collector>>>,
    cleanups: Vec<Cleanup>,
}

impl Monitor {
    /// Release collector resources and close the pool.
    async fn shutdown(self) {
        for cleanup in &self.cleanups {
            cleanup.run();
        }
        self.db.close().await;
        tracing::info!(monitor_id = %self.id, "Monitor stopped");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dbpulse=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let registry = CollectorRegistry::with_builtin();

    match cli.command {
        Command::Help { domain } => print_help(&registry, domain.as_deref()),
        Command::Check { config } => {
            let config = load_config(&config)?;
            for mon in &config.monitors {
                let monitor = prepare_monitor(&config, &registry, mon).await?;
                for level in monitor.plan.levels.keys() {
                    collect_level(&monitor.id, &monitor.plan, &monitor.collectors, level).await;
                }
                monitor.shutdown().await;
            }
            Ok(())
        }
        Command::Run { config } => {
            let config = load_config(&config)?;
            run(&config, &registry).await
        }
    }
}

fn load_config(path: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    tracing::info!("Loading configuration from: {}", path);
    let config = AppConfig::load(path)?;
    tracing::info!(
        monitors = config.monitors.len(),
        plans = config.plans.len(),
        "Configuration loaded"
    );
    Ok(config)
}

fn print_help(
    registry: &CollectorRegistry,
    domain: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let helps = match domain {
        Some(domain) => vec![registry.help(domain).ok_or_else(|| {
            format!(
                "unknown domain '{domain}'; registered domains: {}",
                registry.domains().join(", ")
            )
        })?],
        None => registry
            .domains()
            .into_iter()
            .filter_map(|d| registry.help(d))
            .collect(),
    };
    print!("{}", serde_yaml::to_string(&helps)?);
    Ok(())
}

/// Connect to the monitor and prepare a collector for every registered
/// domain in its plan.
async fn prepare_monitor(
    config: &AppConfig,
    registry: &CollectorRegistry,
    mon: &MonitorConfig,
) -> Result<Monitor, Box<dyn std::error::Error>> {
    let mut plan = config
        .plan(&mon.plan)
        .ok_or_else(|| format!("monitor '{}': unknown plan '{}'", mon.id, mon.plan))?
        .with_monitor_id(&mon.id);
    plan.interpolate_env_vars();
    plan.interpolate_monitor(mon);
    plan.validate()?;

    let db = MySqlDatabase::connect(&mon.connection_url(), mon.query_timeout).await?;
    tracing::info!(monitor_id = %mon.id, plan = %plan.name, "Connected");
    let shared: Arc<dyn Database> = Arc::new(db.clone());

    let domains: Vec<String> = plan.domains().into_iter().map(str::to_string).collect();
    let mut collectors = Vec::new();
    let mut cleanups: Vec<Cleanup> = Vec::new();
    for domain in domains {
        if !registry.contains(&domain) {
            tracing::debug!(monitor_id = %mon.id, domain = %domain, "No collector for domain, skipping");
            continue;
        }

        let args = FactoryArgs::new(&mon.id, Arc::clone(&shared)).with_probe_timeout(mon.probe_timeout);
        let prepared = match registry.make(&domain, args) {
            Ok(mut collector) => match collector.prepare(&plan).await {
                Ok(cleanup) => Ok((collector, cleanup)),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        match prepared {
            Ok((collector, cleanup)) => {
                tracing::info!(monitor_id = %mon.id, domain = %domain, "Collector prepared");
                collectors.push(collector);
                cleanups.push(cleanup);
            }
            Err(e) => {
                tracing::error!(monitor_id = %mon.id, domain = %domain, error = %e, "Prepare failed");
                cleanups.iter().for_each(Cleanup::run);
                db.close().await;
                return Err(e.into());
            }
        }
    }

    Ok(Monitor {
        id: mon.id.clone(),
        plan,
        db,
        collectors: Arc::new(collectors),
        cleanups,
    })
}

/// Collect every domain of `level` once and print one report per domain.
///
/// Returns `false` if a collector reported a fatal error.
async fn collect_level(
    monitor_id: &str,
    plan: &Plan,
    collectors: &[Box<dyn Collector>],
    level: &str,
) -> bool {
    let Some(domains) = plan.levels.get(level).map(|l| &l.collect) else {
        return true;
    };

    let mut healthy = true;
    for collector in collectors.iter().filter(|c| domains.contains_key(c.domain())) {
        let (metrics, error) = match collector.collect(level).await {
            Ok(metrics) => (metrics, None),
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(monitor_id, level, domain = collector.domain(), error = %e, "Fatal collector error");
                    healthy = false;
                } else {
                    tracing::warn!(monitor_id, level, domain = collector.domain(), error = %e, "Collection failed");
                }
                (Vec::new(), Some(e.to_string()))
            }
        };

        let report = Report {
            monitor_id,
            level,
            domain: collector.domain(),
            metrics,
            error,
        };
        match serde_json::to_string(&report) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize report"),
        }
    }
    healthy
}

/// Collect each level on its own clock until a shutdown signal.
async fn run(config: &AppConfig, registry: &CollectorRegistry) -> Result<(), Box<dyn std::error::Error>> {
    let mut monitors = Vec::new();
    let mut tasks = Vec::new();

    for mon in &config.monitors {
        let monitor = match prepare_monitor(config, registry, mon).await {
            Ok(monitor) => monitor,
            Err(e) => {
                for monitor in monitors {
                    Monitor::shutdown(monitor).await;
                }
                return Err(e);
            }
        };

        for (level, tier) in &monitor.plan.levels {
            let Some(interval) = tier.interval()? else {
                tracing::debug!(monitor_id = %monitor.id, level = %level, "On-demand level, not scheduled");
                continue;
            };

            let (id, plan, level) = (monitor.id.clone(), monitor.plan.clone(), level.clone());
            let collectors = Arc::clone(&monitor.collectors);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if !collect_level(&id, &plan, &collectors, &level).await {
                        tracing::error!(monitor_id = %id, level = %level, "Level stopped");
                        break;
                    }
                }
            }));
        }
        monitors.push(monitor);
    }

    tracing::info!(tasks = tasks.len(), "Collecting; press Ctrl+C to shutdown");
    shutdown_signal().await;

    for task in &tasks {
        task.abort();
    }
    for monitor in monitors {
        monitor.shutdown().await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
