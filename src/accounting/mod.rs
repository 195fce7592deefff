//! Per-transaction resource accounting.
//!
//! A transaction may span an initial request, internal redirects and
//! sub-requests. [`Accountant::start`] captures a begin [`Snapshot`] on the
//! chain root, [`Accountant::stop`] captures the end and publishes nine
//! deltas as string notes on the chain tail, keyed by [`Metric::key`].

pub mod anomaly;
pub mod chain;
pub mod controller;
pub mod delta;
pub mod keys;
pub mod publish;
pub mod sampler;
pub mod snapshot;
pub mod transaction;

pub use anomaly::{Anomaly, AnomalySink, CollectingSink, LogSink, Phase, Probe};
pub use chain::{resolve_root, resolve_tail, ChainNavigator, NodeKind, RequestChain, RequestId};
pub use controller::{Accountant, HookStatus};
pub use delta::DeltaCalculator;
pub use keys::Metric;
pub use publish::AccountingRecord;
pub use sampler::{ResourceSampler, SampleError, ScriptedSampler, SystemSampler};
pub use snapshot::{Snapshot, TimeVal, Usage};
pub use transaction::{AccountingStore, Notes, Transaction, TransactionId};
