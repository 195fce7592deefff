use super::anomaly::{Anomaly, AnomalySink};
use super::keys::Metric;
use super::snapshot::TimeVal;

/// Turns begin/end samples into non-negative deltas.
///
/// Counters and clocks must not go backwards within one process. When they
/// do, the offending field is reported once and published as zero.
pub struct DeltaCalculator<'a> {
    sink: &'a dyn AnomalySink,
}

impl<'a> DeltaCalculator<'a> {
    pub fn new(sink: &'a dyn AnomalySink) -> Self {
        Self { sink }
    }

    /// Elapsed microseconds between two time values.
    pub fn duration(&self, metric: Metric, begin: TimeVal, end: TimeVal) -> u64 {
        if end < begin {
            self.sink.report(Anomaly::TimeTravel { metric, begin, end });
            return 0;
        }

        tracing::debug!(target: "accounting", %metric, %begin, %end, "time delta");

        let micros = end
            .secs()
            .saturating_sub(begin.secs())
            .saturating_mul(1_000_000)
            .saturating_add(end.micros() - begin.micros());
        // Normalized operands with end >= begin never go negative.
        u64::try_from(micros).unwrap_or(0)
    }

    /// Difference between two raw counter readings.
    pub fn count(&self, metric: Metric, begin: i64, end: i64) -> u64 {
        if end < begin {
            self.sink
                .report(Anomaly::NegativeCount { metric, begin, end });
            return 0;
        }

        tracing::debug!(target: "accounting", %metric, begin, end, "block delta");

        end.abs_diff(begin)
    }
}
