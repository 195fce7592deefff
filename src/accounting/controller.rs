use std::sync::Arc;

use super::anomaly::{Anomaly, AnomalySink, LogSink, Phase};
use super::chain::{resolve_root, resolve_tail, ChainNavigator, RequestId};
use super::delta::DeltaCalculator;
use super::publish::AccountingRecord;
use super::sampler::{ResourceSampler, SystemSampler};
use super::transaction::AccountingStore;

/// What a lifecycle hook tells the host.
///
/// Accounting never ends request processing, so both hooks always decline
/// and the host carries on with its other handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Declined,
}

/// Measures one transaction between its `start` and `stop` hooks.
///
/// Holds no per-transaction state: the begin snapshot and the published
/// notes live in the store handed to each call, so one accountant can serve
/// any number of concurrent transactions.
pub struct Accountant {
    sampler: Arc<dyn ResourceSampler>,
    sink: Arc<dyn AnomalySink>,
    reap_children: bool,
}

impl Accountant {
    pub fn new(sampler: Arc<dyn ResourceSampler>, sink: Arc<dyn AnomalySink>) -> Self {
        Self {
            sampler,
            sink,
            reap_children: true,
        }
    }

    /// Real clock and `getrusage`, anomalies to the log.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemSampler), Arc::new(LogSink))
    }

    /// Whether `stop` collects exited children before sampling.
    pub fn with_child_reaping(mut self, enabled: bool) -> Self {
        self.reap_children = enabled;
        self
    }

    pub fn sink(&self) -> &dyn AnomalySink {
        self.sink.as_ref()
    }

    /// Early-processing hook: capture the begin snapshot on the chain root
    /// unless one is there already.
    pub fn start<T>(&self, txn: &mut T, request: RequestId) -> HookStatus
    where
        T: ChainNavigator + AccountingStore + ?Sized,
    {
        let root = resolve_root(&*txn, request);
        if txn.begin_snapshot(root).is_some() {
            tracing::trace!(target: "accounting", %request, %root, "begin snapshot already taken");
            return HookStatus::Declined;
        }

        let begin = self.sampler.capture(Phase::Begin, self.sink());
        tracing::debug!(target: "accounting", %request, %root, snapshot = ?begin, "begin snapshot");
        txn.attach_snapshot(root, begin);

        HookStatus::Declined
    }

    /// End-of-transaction hook: sample again and publish all deltas on the
    /// chain tail. Without a begin snapshot nothing is published.
    pub fn stop<T>(&self, txn: &mut T, request: RequestId) -> HookStatus
    where
        T: ChainNavigator + AccountingStore + ?Sized,
    {
        let root = resolve_root(&*txn, request);
        let tail = resolve_tail(&*txn, request);

        let Some(begin) = txn.begin_snapshot(root).copied() else {
            self.sink.report(Anomaly::MissingBegin);
            return HookStatus::Declined;
        };

        if self.reap_children {
            self.sampler.reap_children();
        }

        let end = self.sampler.capture(Phase::End, self.sink());
        tracing::debug!(
            target: "accounting",
            %request, %root, %tail,
            begin = ?begin, end = ?end,
            "end snapshot"
        );

        let record = AccountingRecord::between(&begin, &end, &DeltaCalculator::new(self.sink()));
        record.publish(txn.notes_mut(tail));

        HookStatus::Declined
    }
}

impl Default for Accountant {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::anomaly::CollectingSink;
    use crate::accounting::keys::Metric;
    use crate::accounting::sampler::ScriptedSampler;
    use crate::accounting::snapshot::{Snapshot, TimeVal, Usage};
    use crate::accounting::transaction::Transaction;

    fn snapshot(secs: i64, micros: i64, in_blocks: i64) -> Snapshot {
        Snapshot {
            wall_clock: TimeVal::new(secs, micros),
            own: Usage {
                in_blocks,
                ..Usage::default()
            },
            children: Usage::default(),
        }
    }

    fn accountant(
        script: impl IntoIterator<Item = Snapshot>,
    ) -> (Accountant, Arc<ScriptedSampler>, Arc<CollectingSink>) {
        let sampler = Arc::new(ScriptedSampler::new(script));
        let sink = Arc::new(CollectingSink::new());
        let acc = Accountant::new(sampler.clone(), sink.clone());
        (acc, sampler, sink)
    }

    #[test]
    fn both_hooks_decline() {
        let (acc, _, _) = accountant([snapshot(1, 0, 0), snapshot(2, 0, 0)]);
        let mut txn = Transaction::new("/");
        let root = txn.chain().initial();

        assert_eq!(acc.start(&mut txn, root), HookStatus::Declined);
        assert_eq!(acc.stop(&mut txn, root), HookStatus::Declined);
    }

    #[test]
    fn second_start_keeps_first_snapshot() {
        let first = snapshot(100, 0, 1);
        let (acc, sampler, _) = accountant([first, snapshot(200, 0, 2)]);
        let mut txn = Transaction::new("/");
        let root = txn.chain().initial();
        let sub = txn.chain_mut().subrequest(root, "/inc").expect("node in chain");

        acc.start(&mut txn, root);
        acc.start(&mut txn, sub);
        acc.start(&mut txn, root);

        assert_eq!(txn.begin_snapshot(root), Some(&first));
        assert_eq!(sampler.remaining(), 1, "declined starts must not sample");
    }

    #[test]
    fn stop_publishes_on_tail_only() {
        let (acc, _, sink) = accountant([snapshot(10, 0, 0), snapshot(11, 500, 3)]);
        let mut txn = Transaction::new("/a");
        let root = txn.chain().initial();

        acc.start(&mut txn, root);
        let tail = txn.chain_mut().redirect(root, "/b").expect("node in chain");
        acc.stop(&mut txn, root);

        assert!(txn.notes(root).is_none());
        let notes = txn.notes(tail).expect("tail notes");
        assert_eq!(notes.get(Metric::Time.key()), Some("1000500"));
        assert_eq!(notes.get(Metric::InBlocks.key()), Some("3"));
        assert!(sink.is_empty());
    }

    #[test]
    fn stop_without_start_publishes_nothing() {
        let (acc, sampler, sink) = accountant([snapshot(1, 0, 0)]);
        let mut txn = Transaction::new("/");
        let root = txn.chain().initial();

        acc.stop(&mut txn, root);

        assert!(txn.notes(root).is_none());
        assert_eq!(sink.reports(), vec![Anomaly::MissingBegin]);
        assert_eq!(sampler.remaining(), 1);
        assert_eq!(sampler.reap_calls(), 0);
    }

    #[test]
    fn regression_zeroes_one_field_only() {
        let (acc, _, sink) = accountant([snapshot(5, 0, 20), snapshot(6, 0, 15)]);
        let mut txn = Transaction::new("/");
        let root = txn.chain().initial();

        acc.start(&mut txn, root);
        acc.stop(&mut txn, root);

        let notes = txn.notes(root).expect("notes");
        assert_eq!(notes.get("ACC_inblock"), Some("0"));
        assert_eq!(notes.get("ACC_time"), Some("1000000"));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn child_reaping_follows_setting() {
        let (acc, sampler, _) = accountant([snapshot(1, 0, 0), snapshot(2, 0, 0)]);
        let acc = acc.with_child_reaping(false);
        let mut txn = Transaction::new("/");
        let root = txn.chain().initial();

        acc.start(&mut txn, root);
        acc.stop(&mut txn, root);
        assert_eq!(sampler.reap_calls(), 0);

        let (acc, sampler, _) = accountant([snapshot(1, 0, 0), snapshot(2, 0, 0)]);
        let mut txn = Transaction::new("/");
        let root = txn.chain().initial();
        acc.start(&mut txn, root);
        acc.stop(&mut txn, root);
        assert_eq!(sampler.reap_calls(), 1);
    }

    #[test]
    fn system_accountant_publishes_real_values() {
        let acc = Accountant::system();
        let mut txn = Transaction::new("/");
        let root = txn.chain().initial();

        acc.start(&mut txn, root);
        std::hint::black_box((0..10_000u64).sum::<u64>());
        acc.stop(&mut txn, root);

        let notes = txn.notes(root).expect("notes");
        for metric in Metric::ALL {
            let value = notes.get(metric.key()).expect("every key published");
            assert!(value.parse::<u64>().is_ok(), "{metric} = {value}");
        }
    }
}
