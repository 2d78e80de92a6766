//! `repl.lag` domain options and help.

use std::collections::BTreeMap;
use std::time::Duration;

use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::collector::{CollectorError, CollectorHelp, CollectorHelpOption, CollectorMetricHelp};
use crate::config::parse_duration;
use crate::heartbeat::{DEFAULT_NETWORK_LATENCY, DEFAULT_TABLE};
use crate::metric::MetricKind;
use crate::plan::Domain;
use crate::sqlutil::{clean_object_name, option_enabled};

use super::DOMAIN;

pub const OPT_WRITER: &str = "writer";
pub const OPT_HEARTBEAT_TABLE: &str = "table";
pub const OPT_HEARTBEAT_SOURCE_ID: &str = "source-id";
pub const OPT_HEARTBEAT_SOURCE_ROLE: &str = "source-role";
pub const OPT_REPL_CHECK: &str = "repl-check";
pub const OPT_REPORT_NO_HEARTBEAT: &str = "report-no-heartbeat";
pub const OPT_REPORT_NOT_A_REPLICA: &str = "report-not-a-replica";
pub const OPT_NETWORK_LATENCY: &str = "network-latency";

/// How replication lag is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Writer {
    /// Performance Schema replication applier instrumentation.
    #[strum(serialize = "pfs")]
    PerformanceSchema,
    /// Heartbeat table written by the source.
    #[strum(serialize = "blip")]
    Heartbeat,
}

/// Options of one `repl.lag` occurrence in one level.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LevelOptions {
    /// `None` means auto-detect.
    pub writer: Option<Writer>,
    pub report_no_heartbeat: bool,
    pub report_not_a_replica: bool,
    pub repl_check: String,
    pub table: String,
    pub source_id: String,
    pub source_role: String,
    pub network_latency: Duration,
}

impl LevelOptions {
    /// Parse the options of `dom` as configured in `level`.
    ///
    /// An unparsable network latency falls back to the default with a
    /// warning; every other invalid value is a `Config` error.
    pub fn parse(monitor_id: &str, level: &str, dom: &Domain) -> Result<Self, CollectorError> {
        let writer = match dom.option(OPT_WRITER).trim() {
            "" | "auto" => None,
            w => Some(w.parse::<Writer>().map_err(|_| {
                let valid: Vec<String> = Writer::iter().map(|w| w.to_string()).collect();
                CollectorError::Config(format!(
                    "level {level}: invalid lag {OPT_WRITER}: {w:?}; valid values: auto, {}",
                    valid.join(", ")
                ))
            })?),
        };

        let source_id = dom.option(OPT_HEARTBEAT_SOURCE_ID).to_string();
        let source_role = dom.option(OPT_HEARTBEAT_SOURCE_ROLE).to_string();
        if !source_id.is_empty() && !source_role.is_empty() {
            return Err(CollectorError::Config(format!(
                "level {level}: {OPT_HEARTBEAT_SOURCE_ID} and {OPT_HEARTBEAT_SOURCE_ROLE} are mutually exclusive"
            )));
        }

        let table = match dom.option(OPT_HEARTBEAT_TABLE) {
            "" => DEFAULT_TABLE.to_string(),
            t => t.to_string(),
        };

        Ok(Self {
            writer,
            report_no_heartbeat: option_enabled(dom.option(OPT_REPORT_NO_HEARTBEAT)),
            report_not_a_replica: option_enabled(dom.option(OPT_REPORT_NOT_A_REPLICA)),
            repl_check: clean_object_name(dom.option(OPT_REPL_CHECK)),
            table,
            source_id,
            source_role,
            network_latency: network_latency(monitor_id, dom.options.get(OPT_NETWORK_LATENCY)),
        })
    }
}

/// Milliseconds (`50`) or a duration literal (`50ms`); default otherwise.
fn network_latency(monitor_id: &str, value: Option<&String>) -> Duration {
    let Some(value) = value.map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return DEFAULT_NETWORK_LATENCY;
    };
    if let Ok(ms) = value.parse::<u64>() {
        return Duration::from_millis(ms);
    }
    match parse_duration(value) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(
                monitor_id = %monitor_id,
                value = %value,
                error = %e,
                default_ms = DEFAULT_NETWORK_LATENCY.as_millis(),
                "Invalid {OPT_NETWORK_LATENCY}, using default"
            );
            DEFAULT_NETWORK_LATENCY
        }
    }
}

fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn option(name: &str, desc: &str, default: &str, vals: &[(&str, &str)]) -> (String, CollectorHelpOption) {
    (
        name.to_string(),
        CollectorHelpOption {
            name: name.to_string(),
            desc: desc.to_string(),
            default: default.to_string(),
            values: values(vals),
        },
    )
}

pub(crate) fn help() -> CollectorHelp {
    CollectorHelp {
        domain: DOMAIN.to_string(),
        description: "Replication lag".to_string(),
        options: [
            option(
                OPT_WRITER,
                "How to collect lag",
                "auto",
                &[
                    ("auto", "Auto-determine best lag writer"),
                    ("blip", "Heartbeat table replication lag"),
                    ("pfs", "Performance Schema"),
                ],
            ),
            option(OPT_HEARTBEAT_TABLE, "Heartbeat table", DEFAULT_TABLE, &[]),
            option(
                OPT_HEARTBEAT_SOURCE_ID,
                &format!(
                    "Source ID as reported by heartbeat writer; mutually exclusive with {OPT_HEARTBEAT_SOURCE_ROLE}"
                ),
                "",
                &[],
            ),
            option(
                OPT_HEARTBEAT_SOURCE_ROLE,
                &format!(
                    "Source role as reported by heartbeat writer; mutually exclusive with {OPT_HEARTBEAT_SOURCE_ID}"
                ),
                "",
                &[],
            ),
            option(
                OPT_REPL_CHECK,
                "MySQL global variable (without @@) to check if instance is a replica",
                "",
                &[],
            ),
            option(
                OPT_REPORT_NO_HEARTBEAT,
                "Report no heartbeat as -1",
                "no",
                &[
                    ("yes", "Enabled: report no heartbeat as repl.lag.current = -1"),
                    ("no", "Disabled: drop repl.lag.current if no heartbeat"),
                ],
            ),
            option(
                OPT_REPORT_NOT_A_REPLICA,
                "Report not a replica as -1",
                "no",
                &[
                    ("yes", "Enabled: report not a replica as repl.lag.current = -1"),
                    ("no", "Disabled: drop repl.lag.current if not a replica"),
                ],
            ),
            option(
                OPT_NETWORK_LATENCY,
                "Network latency (milliseconds)",
                "50",
                &[],
            ),
        ]
        .into_iter()
        .collect(),
        metrics: vec![CollectorMetricHelp {
            name: "current".to_string(),
            kind: MetricKind::Gauge,
            desc: "Current replication lag (milliseconds)".to_string(),
        }],
    }
}
