use std::fmt;

/// Handle of one request node inside a transaction's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(usize);

impl RequestId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only view of the links the host keeps between related requests.
///
/// Implementations must be acyclic in every direction: following any one
/// relation repeatedly has to run out.
pub trait ChainNavigator {
    /// The request this one was generated from as a sub-request.
    fn parent(&self, id: RequestId) -> Option<RequestId>;
    /// The request this one replaced through an internal redirect.
    fn previous(&self, id: RequestId) -> Option<RequestId>;
    /// The request that replaced this one through an internal redirect.
    fn next(&self, id: RequestId) -> Option<RequestId>;
}

fn outermost<N: ChainNavigator + ?Sized>(nav: &N, mut id: RequestId) -> RequestId {
    while let Some(parent) = nav.parent(id) {
        id = parent;
    }
    id
}

/// First request of the outermost redirect sequence; the begin snapshot
/// lives here.
pub fn resolve_root<N: ChainNavigator + ?Sized>(nav: &N, id: RequestId) -> RequestId {
    let mut id = outermost(nav, id);
    while let Some(prev) = nav.previous(id) {
        id = prev;
    }
    id
}

/// Last request of the outermost redirect sequence; results are published
/// here.
pub fn resolve_tail<N: ChainNavigator + ?Sized>(nav: &N, id: RequestId) -> RequestId {
    let mut id = outermost(nav, id);
    while let Some(next) = nav.next(id) {
        id = next;
    }
    id
}

/// How a node came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The request read off the connection.
    Initial,
    /// Replacement created by an internal redirect.
    Redirect,
    /// Nested request issued while serving another one.
    SubRequest,
}

#[derive(Debug, Clone)]
pub struct RequestNode {
    pub kind: NodeKind,
    pub uri: String,
    parent: Option<RequestId>,
    previous: Option<RequestId>,
    next: Option<RequestId>,
}

/// Arena holding every request node of one transaction.
///
/// Nodes are only ever appended and links only point at nodes that exist
/// already, so the graph stays acyclic.
#[derive(Debug, Clone)]
pub struct RequestChain {
    nodes: Vec<RequestNode>,
}

impl RequestChain {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            nodes: vec![RequestNode {
                kind: NodeKind::Initial,
                uri: uri.into(),
                parent: None,
                previous: None,
                next: None,
            }],
        }
    }

    /// The request the transaction started with.
    pub fn initial(&self) -> RequestId {
        RequestId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: RequestId) -> Option<&RequestNode> {
        self.nodes.get(id.0)
    }

    /// Nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (RequestId, &RequestNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (RequestId(i), n))
    }

    pub fn contains(&self, id: RequestId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Add a sub-request of `parent`. `None` if `parent` is not in this
    /// chain.
    pub fn subrequest(&mut self, parent: RequestId, uri: impl Into<String>) -> Option<RequestId> {
        if !self.contains(parent) {
            return None;
        }
        Some(self.push(RequestNode {
            kind: NodeKind::SubRequest,
            uri: uri.into(),
            parent: Some(parent),
            previous: None,
            next: None,
        }))
    }

    /// Replace `from` with a new request through an internal redirect.
    ///
    /// The new node shares the parent of the sequence it joins and is
    /// appended after the current end of that sequence. `None` if `from`
    /// is not in this chain.
    pub fn redirect(&mut self, from: RequestId, uri: impl Into<String>) -> Option<RequestId> {
        if !self.contains(from) {
            return None;
        }
        let mut last = from;
        while let Some(next) = self.next(last) {
            last = next;
        }

        let parent = self.parent(last);
        let id = self.push(RequestNode {
            kind: NodeKind::Redirect,
            uri: uri.into(),
            parent,
            previous: Some(last),
            next: None,
        });
        if let Some(node) = self.nodes.get_mut(last.0) {
            node.next = Some(id);
        }
        Some(id)
    }

    fn push(&mut self, node: RequestNode) -> RequestId {
        self.nodes.push(node);
        RequestId(self.nodes.len() - 1)
    }
}

impl ChainNavigator for RequestChain {
    fn parent(&self, id: RequestId) -> Option<RequestId> {
        self.node(id).and_then(|n| n.parent)
    }

    fn previous(&self, id: RequestId) -> Option<RequestId> {
        self.node(id).and_then(|n| n.previous)
    }

    fn next(&self, id: RequestId) -> Option<RequestId> {
        self.node(id).and_then(|n| n.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lone_request_resolves_to_itself() {
        let chain = RequestChain::new("/");
        let id = chain.initial();
        assert_eq!(resolve_root(&chain, id), id);
        assert_eq!(resolve_tail(&chain, id), id);
    }

    #[test]
    fn redirects_with_nested_subrequest() {
        // root -> r1 -> r2 via next; r1 issues a sub-request, which itself
        // issues a sub-request and is internally redirected.
        let mut chain = RequestChain::new("/root");
        let root = chain.initial();
        let r1 = chain.redirect(root, "/r1").expect("node in chain");
        let sub = chain.subrequest(r1, "/sub").expect("node in chain");
        let sub_sub = chain.subrequest(sub, "/sub/sub").expect("node in chain");
        let sub_redirect = chain.redirect(sub, "/sub/moved").expect("node in chain");
        let r2 = chain.redirect(r1, "/r2").expect("node in chain");

        for id in [root, r1, r2, sub, sub_sub, sub_redirect] {
            assert_eq!(resolve_root(&chain, id), root, "root from {id}");
            assert_eq!(resolve_tail(&chain, id), r2, "tail from {id}");
        }
    }

    #[test]
    fn redirect_from_middle_appends_at_end() {
        let mut chain = RequestChain::new("/a");
        let a = chain.initial();
        let b = chain.redirect(a, "/b").expect("node in chain");
        let c = chain.redirect(a, "/c").expect("node in chain");

        assert_eq!(chain.next(b), Some(c));
        assert_eq!(chain.previous(c), Some(b));
        assert_eq!(resolve_tail(&chain, a), c);
    }

    #[test]
    fn redirect_inherits_parent() {
        let mut chain = RequestChain::new("/");
        let root = chain.initial();
        let sub = chain.subrequest(root, "/inc").expect("node in chain");
        let moved = chain.redirect(sub, "/inc2").expect("node in chain");

        assert_eq!(chain.parent(moved), Some(root));
        assert_eq!(chain.node(moved).map(|n| n.kind), Some(NodeKind::Redirect));
        assert_eq!(chain.len(), 3);
        let kinds: Vec<_> = chain.iter().map(|(_, n)| n.kind).collect();
        assert_eq!(
            kinds,
            [NodeKind::Initial, NodeKind::SubRequest, NodeKind::Redirect]
        );
    }

    #[test]
    fn unknown_ids_have_no_links() {
        let chain = RequestChain::new("/");
        let stray = RequestId(42);
        assert!(!chain.contains(stray));
        assert_eq!(resolve_root(&chain, stray), stray);
    }

    #[test]
    fn growing_from_a_foreign_id_is_refused() {
        let mut big = RequestChain::new("/a");
        let a = big.initial();
        let b = big.redirect(a, "/b").expect("node in chain");
        let foreign = big.subrequest(b, "/c").expect("node in chain");

        let mut small = RequestChain::new("/x");
        assert_eq!(small.redirect(foreign, "/y"), None);
        assert_eq!(small.subrequest(foreign, "/z"), None);
        assert_eq!(small.len(), 1);
        assert_eq!(small.next(small.initial()), None);
    }
}
