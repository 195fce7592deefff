use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

use super::keys::Metric;
use super::snapshot::TimeVal;

/// Which lifecycle event a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Begin,
    End,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Begin => "(begin)",
            Phase::End => "(end)",
        })
    }
}

/// The OS query a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    TimeOfDay,
    OwnUsage,
    ChildUsage,
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Probe::TimeOfDay => "time of day",
            Probe::OwnUsage => "resource usage",
            Probe::ChildUsage => "children's resource usage",
        })
    }
}

/// Every non-fatal condition the accounting core can run into.
///
/// None of these abort a transaction: the affected field reads zero or the
/// transaction is published without accounting data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Anomaly {
    #[error("request for {phase} {probe} failed: {reason}")]
    SampleFailed {
        phase: Phase,
        probe: Probe,
        reason: String,
    },

    #[error("failed to fetch internal data: no begin snapshot on the request chain root")]
    MissingBegin,

    #[error("timetraveling ({metric}): begin({begin}) end({end})")]
    TimeTravel {
        metric: Metric,
        begin: TimeVal,
        end: TimeVal,
    },

    #[error("negative blockcount ({metric}): begin({begin} blocks) end({end} blocks)")]
    NegativeCount { metric: Metric, begin: i64, end: i64 },
}

/// Destination for anomaly reports.
pub trait AnomalySink: Send + Sync {
    fn report(&self, anomaly: Anomaly);
}

/// Logs every anomaly at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AnomalySink for LogSink {
    fn report(&self, anomaly: Anomaly) {
        tracing::error!(target: "accounting", "{anomaly}");
    }
}

/// Keeps reports in memory, and also logs them.
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<Anomaly>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far, oldest first.
    pub fn reports(&self) -> Vec<Anomaly> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl AnomalySink for CollectingSink {
    fn report(&self, anomaly: Anomaly) {
        LogSink.report(anomaly.clone());
        self.reports.lock().push(anomaly);
    }
}
