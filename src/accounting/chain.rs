use super::metric::Notes;

/// Index of a node inside its [`RequestTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(usize);

/// One request object of a transaction.
///
/// `main`, `prev` and `next` are back-references into the owning tree,
/// never ownership.
#[derive(Debug)]
pub struct RequestNode {
    main: Option<RequestId>,
    prev: Option<RequestId>,
    next: Option<RequestId>,
    path: String,
    pub notes: Notes,
}

impl RequestNode {
    fn new(path: &str) -> Self {
        Self {
            main: None,
            prev: None,
            next: None,
            path: path.to_owned(),
            notes: Notes::default(),
        }
    }

    /// Outer request this node is a sub-request of.
    pub fn main(&self) -> Option<RequestId> {
        self.main
    }

    pub fn prev(&self) -> Option<RequestId> {
        self.prev
    }

    pub fn next(&self) -> Option<RequestId> {
        self.next
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Arena of every request object created for one client-visible
/// transaction: the top-level request, its internal redirects and
/// sub-requests.
///
/// Nodes are only ever appended and links only point at existing nodes,
/// so the graph stays acyclic.
#[derive(Debug)]
pub struct RequestTree {
    nodes: Vec<RequestNode>,
}

impl RequestTree {
    /// New tree holding a single top-level request, which is returned
    /// alongside.
    pub fn new(path: &str) -> (Self, RequestId) {
        let tree = Self {
            nodes: vec![RequestNode::new(path)],
        };
        (tree, RequestId(0))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: RequestId) -> &RequestNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: RequestId) -> &mut RequestNode {
        &mut self.nodes[id.0]
    }

    /// Re-dispatch `from` to `path` at the same nesting level.
    ///
    /// The new node shares `from`'s outer request and becomes its `next`.
    pub fn internal_redirect(&mut self, from: RequestId, path: &str) -> RequestId {
        let id = RequestId(self.nodes.len());
        let mut node = RequestNode::new(path);
        node.main = self.nodes[from.0].main;
        node.prev = Some(from);
        self.nodes.push(node);
        self.nodes[from.0].next = Some(id);
        id
    }

    /// Nested request issued while processing `main`.
    pub fn sub_request(&mut self, main: RequestId, path: &str) -> RequestId {
        let id = RequestId(self.nodes.len());
        let mut node = RequestNode::new(path);
        node.main = Some(main);
        self.nodes.push(node);
        id
    }

    fn outermost(&self, mut id: RequestId) -> RequestId {
        while let Some(main) = self.node(id).main {
            id = main;
        }
        id
    }
}

/// Canonical first node of the chain `node` belongs to. The begin snapshot
/// is kept for this node.
pub fn resolve_first(tree: &RequestTree, node: RequestId) -> RequestId {
    let mut id = tree.outermost(node);
    while let Some(prev) = tree.node(id).prev {
        id = prev;
    }
    id
}

/// Canonical last node of the chain `node` belongs to. Deltas are published
/// on this node.
pub fn resolve_last(tree: &RequestTree, node: RequestId) -> RequestId {
    let mut id = tree.outermost(node);
    while let Some(next) = tree.node(id).next {
        id = next;
    }
    id
}
