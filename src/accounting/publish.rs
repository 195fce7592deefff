use serde::Serialize;

use super::delta::DeltaCalculator;
use super::keys::Metric;
use super::snapshot::Snapshot;
use super::transaction::Notes;

/// The nine deltas of one transaction, before they are turned into notes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccountingRecord {
    pub time_us: u64,
    pub user_time_us: u64,
    pub system_time_us: u64,
    pub in_blocks: u64,
    pub out_blocks: u64,
    pub child_user_time_us: u64,
    pub child_system_time_us: u64,
    pub child_in_blocks: u64,
    pub child_out_blocks: u64,
}

impl AccountingRecord {
    /// Compute every delta between `begin` and `end`. Each field is checked
    /// on its own, so one regression only zeroes that field.
    pub fn between(begin: &Snapshot, end: &Snapshot, calc: &DeltaCalculator<'_>) -> Self {
        Self {
            time_us: calc.duration(Metric::Time, begin.wall_clock, end.wall_clock),
            user_time_us: calc.duration(
                Metric::UserTime,
                begin.own.user_time,
                end.own.user_time,
            ),
            system_time_us: calc.duration(
                Metric::SystemTime,
                begin.own.system_time,
                end.own.system_time,
            ),
            in_blocks: calc.count(Metric::InBlocks, begin.own.in_blocks, end.own.in_blocks),
            out_blocks: calc.count(Metric::OutBlocks, begin.own.out_blocks, end.own.out_blocks),
            child_user_time_us: calc.duration(
                Metric::ChildUserTime,
                begin.children.user_time,
                end.children.user_time,
            ),
            child_system_time_us: calc.duration(
                Metric::ChildSystemTime,
                begin.children.system_time,
                end.children.system_time,
            ),
            child_in_blocks: calc.count(
                Metric::ChildInBlocks,
                begin.children.in_blocks,
                end.children.in_blocks,
            ),
            child_out_blocks: calc.count(
                Metric::ChildOutBlocks,
                begin.children.out_blocks,
                end.children.out_blocks,
            ),
        }
    }

    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Time => self.time_us,
            Metric::UserTime => self.user_time_us,
            Metric::SystemTime => self.system_time_us,
            Metric::InBlocks => self.in_blocks,
            Metric::OutBlocks => self.out_blocks,
            Metric::ChildUserTime => self.child_user_time_us,
            Metric::ChildSystemTime => self.child_system_time_us,
            Metric::ChildInBlocks => self.child_in_blocks,
            Metric::ChildOutBlocks => self.child_out_blocks,
        }
    }

    fn slot(&mut self, metric: Metric) -> &mut u64 {
        match metric {
            Metric::Time => &mut self.time_us,
            Metric::UserTime => &mut self.user_time_us,
            Metric::SystemTime => &mut self.system_time_us,
            Metric::InBlocks => &mut self.in_blocks,
            Metric::OutBlocks => &mut self.out_blocks,
            Metric::ChildUserTime => &mut self.child_user_time_us,
            Metric::ChildSystemTime => &mut self.child_system_time_us,
            Metric::ChildInBlocks => &mut self.child_in_blocks,
            Metric::ChildOutBlocks => &mut self.child_out_blocks,
        }
    }

    /// Write every value as a decimal string under its stable key.
    pub fn publish(&self, notes: &mut Notes) {
        for metric in Metric::ALL {
            notes.set(metric.key(), self.get(metric).to_string());
        }
    }

    /// Read a record back from published notes. `None` unless all nine keys
    /// are present and numeric.
    pub fn from_notes(notes: &Notes) -> Option<Self> {
        let mut record = Self::default();
        for metric in Metric::ALL {
            *record.slot(metric) = notes.get(metric.key())?.parse().ok()?;
        }
        Some(record)
    }
}
