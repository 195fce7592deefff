use std::collections::VecDeque;
use std::time::{SystemTime, SystemTimeError};

use nix::errno::Errno;
use nix::sys::resource::{getrusage, UsageWho};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;
use parking_lot::Mutex;
use thiserror::Error;

use super::anomaly::{Anomaly, AnomalySink, Phase, Probe};
use super::snapshot::{Snapshot, TimeVal, Usage};

/// Why a single OS query could not be answered.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error(transparent)]
    Os(#[from] Errno),

    #[error("clock is before the unix epoch: {0}")]
    Clock(#[from] SystemTimeError),
}

/// Produces snapshots for the accounting controller.
pub trait ResourceSampler: Send + Sync {
    /// Take a snapshot. A failed component is reported to `sink` and
    /// reads as zero; this never fails as a whole.
    fn capture(&self, phase: Phase, sink: &dyn AnomalySink) -> Snapshot;

    /// Collect exited children without blocking so their usage shows up in
    /// the children's counters. Best effort.
    fn reap_children(&self) {}
}

/// Reads the real process clock and `getrusage` counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSampler;

impl SystemSampler {
    fn wall_clock() -> Result<TimeVal, SampleError> {
        let since_epoch = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH)?;
        Ok(TimeVal::from_duration(since_epoch))
    }

    fn usage(who: UsageWho) -> Result<Usage, SampleError> {
        let raw = getrusage(who)?;
        let user = raw.user_time();
        let system = raw.system_time();
        Ok(Usage {
            user_time: TimeVal::new(user.tv_sec() as i64, user.tv_usec() as i64),
            system_time: TimeVal::new(system.tv_sec() as i64, system.tv_usec() as i64),
            in_blocks: raw.block_reads() as i64,
            out_blocks: raw.block_writes() as i64,
        })
    }
}

impl ResourceSampler for SystemSampler {
    fn capture(&self, phase: Phase, sink: &dyn AnomalySink) -> Snapshot {
        assemble(
            phase,
            sink,
            Self::wall_clock(),
            Self::usage(UsageWho::RUSAGE_SELF),
            Self::usage(UsageWho::RUSAGE_CHILDREN),
        )
    }

    fn reap_children(&self) {
        // ECHILD (nothing to reap) is the common case here.
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => tracing::trace!(target: "accounting", ?status, "reaped child"),
            Err(errno) => tracing::trace!(target: "accounting", %errno, "no child reaped"),
        }
    }
}

/// Combine the three probe results into a snapshot, zeroing and reporting
/// whichever failed.
pub(crate) fn assemble(
    phase: Phase,
    sink: &dyn AnomalySink,
    wall_clock: Result<TimeVal, SampleError>,
    own: Result<Usage, SampleError>,
    children: Result<Usage, SampleError>,
) -> Snapshot {
    let report = |probe: Probe, err: SampleError| {
        sink.report(Anomaly::SampleFailed {
            phase,
            probe,
            reason: err.to_string(),
        });
    };

    let wall_clock = wall_clock.unwrap_or_else(|e| {
        report(Probe::TimeOfDay, e);
        TimeVal::ZERO
    });
    let own = own.unwrap_or_else(|e| {
        report(Probe::OwnUsage, e);
        Usage::default()
    });
    let children = children.unwrap_or_else(|e| {
        report(Probe::ChildUsage, e);
        Usage::default()
    });

    Snapshot {
        wall_clock,
        own,
        children,
    }
}

/// Hands out pre-recorded snapshots in order.
///
/// Useful for exercising a host integration deterministically. Once the
/// script runs out the last snapshot is repeated.
#[derive(Debug, Default)]
pub struct ScriptedSampler {
    script: Mutex<VecDeque<Snapshot>>,
    last: Mutex<Snapshot>,
    reaps: Mutex<usize>,
}

impl ScriptedSampler {
    pub fn new(script: impl IntoIterator<Item = Snapshot>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn push(&self, snapshot: Snapshot) {
        self.script.lock().push_back(snapshot);
    }

    /// Snapshots not yet handed out.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    /// How many times `reap_children` was called.
    pub fn reap_calls(&self) -> usize {
        *self.reaps.lock()
    }
}

impl ResourceSampler for ScriptedSampler {
    fn capture(&self, _phase: Phase, _sink: &dyn AnomalySink) -> Snapshot {
        let mut last = self.last.lock();
        if let Some(next) = self.script.lock().pop_front() {
            *last = next;
        }
        *last
    }

    fn reap_children(&self) {
        *self.reaps.lock() += 1;
    }
}
