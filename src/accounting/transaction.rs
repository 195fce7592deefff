use std::collections::{BTreeMap, HashMap};
use std::fmt;

use uuid::Uuid;

use super::chain::{ChainNavigator, RequestChain, RequestId};
use super::snapshot::Snapshot;

/// Identity of one logical transaction, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// String metadata attached to one request, read by the host's logger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notes(BTreeMap<String, String>);

impl Notes {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-transaction storage the accounting controller reads and writes.
pub trait AccountingStore {
    /// Begin snapshot attached to `root`, if any.
    fn begin_snapshot(&self, root: RequestId) -> Option<&Snapshot>;

    /// Attach a begin snapshot to `root`. The first attach wins; later
    /// calls leave the stored value alone and return `false`.
    fn attach_snapshot(&mut self, root: RequestId, snapshot: Snapshot) -> bool;

    /// Writable notes of `request`, created empty on first use.
    fn notes_mut(&mut self, request: RequestId) -> &mut Notes;
}

/// Everything the host keeps for one transaction: the request chain, the
/// begin snapshot side table and each request's notes.
///
/// Dropped as a whole when the host is done with the transaction.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    chain: RequestChain,
    begin: HashMap<RequestId, Snapshot>,
    notes: HashMap<RequestId, Notes>,
}

impl Transaction {
    pub fn new(uri: impl Into<String>) -> Self {
        Self::with_chain(RequestChain::new(uri))
    }

    pub fn with_chain(chain: RequestChain) -> Self {
        Self {
            id: TransactionId::new(),
            chain,
            begin: HashMap::new(),
            notes: HashMap::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn chain(&self) -> &RequestChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut RequestChain {
        &mut self.chain
    }

    pub fn notes(&self, request: RequestId) -> Option<&Notes> {
        self.notes.get(&request)
    }
}

impl ChainNavigator for Transaction {
    fn parent(&self, id: RequestId) -> Option<RequestId> {
        self.chain.parent(id)
    }

    fn previous(&self, id: RequestId) -> Option<RequestId> {
        self.chain.previous(id)
    }

    fn next(&self, id: RequestId) -> Option<RequestId> {
        self.chain.next(id)
    }
}

impl AccountingStore for Transaction {
    fn begin_snapshot(&self, root: RequestId) -> Option<&Snapshot> {
        self.begin.get(&root)
    }

    fn attach_snapshot(&mut self, root: RequestId, snapshot: Snapshot) -> bool {
        match self.begin.entry(root) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(snapshot);
                true
            }
        }
    }

    fn notes_mut(&mut self, request: RequestId) -> &mut Notes {
        self.notes.entry(request).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::snapshot::TimeVal;

    fn at(secs: i64) -> Snapshot {
        Snapshot {
            wall_clock: TimeVal::new(secs, 0),
            ..Snapshot::default()
        }
    }

    #[test]
    fn first_attach_wins() {
        let mut txn = Transaction::new("/");
        let root = txn.chain().initial();

        assert!(txn.begin_snapshot(root).is_none());
        assert!(txn.attach_snapshot(root, at(1)));
        assert!(!txn.attach_snapshot(root, at(2)));
        assert_eq!(txn.begin_snapshot(root), Some(&at(1)));
    }

    #[test]
    fn notes_are_scoped_per_request() {
        let mut txn = Transaction::new("/");
        let root = txn.chain().initial();
        let sub = txn.chain_mut().subrequest(root, "/inc").expect("node in chain");

        txn.notes_mut(sub).set("k", "v");

        assert_eq!(txn.notes(sub).and_then(|n| n.get("k")), Some("v"));
        assert!(txn.notes(root).is_none());
    }

    #[test]
    fn transaction_ids_differ() {
        assert_ne!(Transaction::new("/").id(), Transaction::new("/").id());
    }
}
