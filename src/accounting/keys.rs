use std::fmt;

/// One of the nine values published on the tail request of a transaction.
///
/// The key strings are stable: downstream log formats bind to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    /// Wall-clock time between start and stop (μs)
    Time,
    /// Own user CPU time (μs)
    UserTime,
    /// Own system CPU time (μs)
    SystemTime,
    /// Own input block operations
    InBlocks,
    /// Own output block operations
    OutBlocks,
    /// Terminated children's user CPU time (μs)
    ChildUserTime,
    /// Terminated children's system CPU time (μs)
    ChildSystemTime,
    /// Terminated children's input block operations
    ChildInBlocks,
    /// Terminated children's output block operations
    ChildOutBlocks,
}

impl Metric {
    /// Publication order.
    pub const ALL: [Metric; 9] = [
        Metric::Time,
        Metric::UserTime,
        Metric::SystemTime,
        Metric::InBlocks,
        Metric::OutBlocks,
        Metric::ChildUserTime,
        Metric::ChildSystemTime,
        Metric::ChildInBlocks,
        Metric::ChildOutBlocks,
    ];

    /// Key under which the value is written to the tail's notes.
    pub const fn key(self) -> &'static str {
        match self {
            Metric::Time => "ACC_time",
            Metric::UserTime => "ACC_utime",
            Metric::SystemTime => "ACC_stime",
            Metric::InBlocks => "ACC_inblock",
            Metric::OutBlocks => "ACC_oublock",
            Metric::ChildUserTime => "ACC_cutime",
            Metric::ChildSystemTime => "ACC_cstime",
            Metric::ChildInBlocks => "ACC_cinblock",
            Metric::ChildOutBlocks => "ACC_coublock",
        }
    }

    /// Key without the `ACC_` prefix, used for response header names.
    pub fn short_name(self) -> &'static str {
        &self.key()[4..]
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_are_unique_and_prefixed() {
        let keys: HashSet<_> = Metric::ALL.iter().map(|m| m.key()).collect();
        assert_eq!(keys.len(), 9);
        assert!(keys.iter().all(|k| k.starts_with("ACC_")));
    }

    #[test]
    fn short_name_strips_prefix() {
        assert_eq!(Metric::Time.short_name(), "time");
        assert_eq!(Metric::ChildOutBlocks.short_name(), "coublock");
    }
}
