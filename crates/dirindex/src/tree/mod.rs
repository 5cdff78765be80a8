//! An AVL tree with in-order sibling links.
//!
//! [`OrderedTree`] is a height-balanced binary search tree over a
//! caller-supplied [`Comparator`].  Besides the usual child links, every node
//! links to its in-order predecessor and successor, so walking the tree in
//! order (or backward) costs O(1) per step and never re-descends from the
//! root.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`].  A `NodeId`
//! stays valid until its node is removed, which is what lets cursors and the
//! serializer work with plain indices instead of references.

use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::iter::FusedIterator;

use dirindex_types::Comparator;

pub mod cursor;
pub mod format;

#[cfg(test)]
mod test;

pub use cursor::TreeCursor;
pub use format::TreeSerializer;

/// Handle to a node of an [`OrderedTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    /// Height of the subtree rooted here; a leaf has height 1.
    pub(crate) height: u8,
}

impl<K, V> Node<K, V> {
    pub(crate) fn leaf(key: K, value: V) -> Self {
        Self {
            key,
            value,
            left: None,
            right: None,
            prev: None,
            next: None,
            height: 1,
        }
    }
}

/// A balanced binary search tree mapping keys to values.
///
/// Keys are unique under the tree's comparator.  Use `V = ()` for a set.
pub struct OrderedTree<K, V = ()> {
    /// Node arena.  `None` marks a free slot, listed in `free`.
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    first: Option<NodeId>,
    last: Option<NodeId>,
    len: usize,
    comparator: Comparator<K>,
}

impl<K, V> OrderedTree<K, V> {
    /// Creates an empty tree ordered by `comparator`.
    pub fn new(comparator: Comparator<K>) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            first: None,
            last: None,
            len: 0,
            comparator,
        }
    }

    /// Builds a tree from nodes whose child links and heights are already
    /// consistent.  `nodes` must be in key order; the sibling chain is derived
    /// from that order.
    pub(crate) fn from_sorted_nodes(
        comparator: Comparator<K>,
        mut nodes: Vec<Node<K, V>>,
        root: Option<NodeId>,
    ) -> Self {
        let len = nodes.len();
        for (index, node) in nodes.iter_mut().enumerate() {
            node.prev = index.checked_sub(1).map(|i| NodeId(i as u32));
            node.next = (index + 1 < len).then(|| NodeId(index as u32 + 1));
        }
        Self {
            nodes: nodes.into_iter().map(Some).collect(),
            free: Vec::new(),
            root,
            first: (len > 0).then_some(NodeId(0)),
            last: len.checked_sub(1).map(|i| NodeId(i as u32)),
            len,
            comparator,
        }
    }

    pub fn comparator(&self) -> &Comparator<K> {
        &self.comparator
    }

    /// Number of keys in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The node with the smallest key.
    pub fn first(&self) -> Option<NodeId> {
        self.first
    }

    /// The node with the largest key.
    pub fn last(&self) -> Option<NodeId> {
        self.last
    }

    pub(crate) fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node<K, V> {
        match self.nodes.get(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("{id:?} does not refer to a live node"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<K, V> {
        match self.nodes.get_mut(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("{id:?} does not refer to a live node"),
        }
    }

    /// The key at `id`.
    ///
    /// # Panics
    ///
    /// If `id` does not refer to a node of this tree.
    pub fn key(&self, id: NodeId) -> &K {
        &self.node(id).key
    }

    /// The value at `id`.
    ///
    /// # Panics
    ///
    /// If `id` does not refer to a node of this tree.
    pub fn value(&self, id: NodeId) -> &V {
        &self.node(id).value
    }

    pub fn value_mut(&mut self, id: NodeId) -> &mut V {
        &mut self.node_mut(id).value
    }

    /// The in-order successor of `id`.
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next
    }

    /// The in-order predecessor of `id`.
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev
    }

    fn height(&self, id: Option<NodeId>) -> u8 {
        id.map_or(0, |id| self.node(id).height)
    }

    /// Height of the left subtree minus height of the right subtree.
    pub(crate) fn balance(&self, id: NodeId) -> i8 {
        let node = self.node(id);
        self.height(node.left) as i8 - self.height(node.right) as i8
    }

    /// Finds the node whose key equals `key`.
    pub fn find(&self, key: &K) -> Option<NodeId> {
        let mut cursor = self.root;
        while let Some(id) = cursor {
            let node = self.node(id);
            cursor = match (self.comparator)(key, &node.key) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(id),
            };
        }
        None
    }

    pub fn contains(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|id| self.value(id))
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.find(key).map(|id| self.value_mut(id))
    }

    /// Finds the node with the smallest key greater than or equal to `key`.
    pub fn find_greater_or_equal(&self, key: &K) -> Option<NodeId> {
        let mut candidate = None;
        let mut cursor = self.root;
        while let Some(id) = cursor {
            let node = self.node(id);
            cursor = match (self.comparator)(key, &node.key) {
                Ordering::Less => {
                    candidate = Some(id);
                    node.left
                }
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(id),
            };
        }
        candidate
    }

    /// Finds the node with the smallest key strictly greater than `key`.
    pub fn find_greater(&self, key: &K) -> Option<NodeId> {
        let mut candidate = None;
        let mut cursor = self.root;
        while let Some(id) = cursor {
            let node = self.node(id);
            cursor = match (self.comparator)(key, &node.key) {
                Ordering::Less => {
                    candidate = Some(id);
                    node.left
                }
                Ordering::Greater => node.right,
                Ordering::Equal => return node.next,
            };
        }
        candidate
    }

    /// Finds the node with the largest key less than or equal to `key`.
    pub fn find_less_or_equal(&self, key: &K) -> Option<NodeId> {
        let mut candidate = None;
        let mut cursor = self.root;
        while let Some(id) = cursor {
            let node = self.node(id);
            cursor = match (self.comparator)(key, &node.key) {
                Ordering::Less => node.left,
                Ordering::Greater => {
                    candidate = Some(id);
                    node.right
                }
                Ordering::Equal => return Some(id),
            };
        }
        candidate
    }

    /// Finds the node with the largest key strictly less than `key`.
    pub fn find_less(&self, key: &K) -> Option<NodeId> {
        let mut candidate = None;
        let mut cursor = self.root;
        while let Some(id) = cursor {
            let node = self.node(id);
            cursor = match (self.comparator)(key, &node.key) {
                Ordering::Less => node.left,
                Ordering::Greater => {
                    candidate = Some(id);
                    node.right
                }
                Ordering::Equal => return node.prev,
            };
        }
        candidate
    }

    /// Inserts `key` with `value`.
    ///
    /// Returns `false` and leaves the tree untouched if `key` is already
    /// present; whether to overwrite is up to the caller (see
    /// [`get_mut`](Self::get_mut)).
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let mut path = Vec::new();
        let mut pred = None;
        let mut succ = None;
        let mut cursor = self.root;
        while let Some(id) = cursor {
            let node = self.node(id);
            let ordering = (self.comparator)(&key, &node.key);
            cursor = match ordering {
                Ordering::Less => {
                    succ = Some(id);
                    node.left
                }
                Ordering::Greater => {
                    pred = Some(id);
                    node.right
                }
                Ordering::Equal => return false,
            };
            path.push((id, ordering));
        }

        let mut node = Node::leaf(key, value);
        node.prev = pred;
        node.next = succ;
        let id = self.allocate(node);
        match pred {
            Some(pred) => self.node_mut(pred).next = Some(id),
            None => self.first = Some(id),
        }
        match succ {
            Some(succ) => self.node_mut(succ).prev = Some(id),
            None => self.last = Some(id),
        }
        self.len += 1;

        self.retrace(&path, Some(id));
        true
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let mut path = Vec::new();
        let mut cursor = self.root;
        let target = loop {
            let id = cursor?;
            let node = self.node(id);
            let ordering = (self.comparator)(key, &node.key);
            cursor = match ordering {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => break id,
            };
            path.push((id, ordering));
        };

        let (left, right, next) = {
            let node = self.node(target);
            (node.left, node.right, node.next)
        };
        let replacement = match (left, right) {
            (Some(left), Some(right)) => {
                // The successor is the leftmost node of the right subtree;
                // it takes the removed node's place.
                let successor = next.expect("a node with a right child has a successor");
                let mut successor_path = Vec::new();
                let mut id = right;
                while id != successor {
                    successor_path.push(id);
                    id = self
                        .node(id)
                        .left
                        .expect("the successor is in the left spine of the right subtree");
                }

                // Detach the successor, handing its right subtree to its
                // parent, and rebalance the spine below the removed node.
                let mut subtree = self.node(successor).right;
                for &ancestor in successor_path.iter().rev() {
                    self.node_mut(ancestor).left = subtree;
                    subtree = Some(self.rebalance(ancestor));
                }
                let successor_node = self.node_mut(successor);
                successor_node.left = Some(left);
                successor_node.right = subtree;
                Some(self.rebalance(successor))
            }
            (child, None) | (None, child) => child,
        };

        let removed = self.release(target);
        match removed.prev {
            Some(prev) => self.node_mut(prev).next = removed.next,
            None => self.first = removed.next,
        }
        match removed.next {
            Some(next) => self.node_mut(next).prev = removed.prev,
            None => self.last = removed.prev,
        }
        self.len -= 1;

        self.retrace(&path, replacement);
        Some(removed.value)
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.first = None;
        self.last = None;
        self.len = 0;
    }

    /// Iterates over `(key, value)` pairs in key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: self,
            front: self.first,
            back: self.last,
            remaining: self.len,
        }
    }

    /// Iterates over keys in order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> + ExactSizeIterator + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Returns a cursor over this tree's keys, positioned before the first.
    pub fn cursor(&self) -> TreeCursor<'_, K, V> {
        TreeCursor::new(self)
    }

    fn allocate(&mut self, node: Node<K, V>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.index()] = Some(node);
                id
            }
            None => {
                let id = NodeId(
                    u32::try_from(self.nodes.len()).expect("tree exceeds u32::MAX nodes"),
                );
                self.nodes.push(Some(node));
                id
            }
        }
    }

    fn release(&mut self, id: NodeId) -> Node<K, V> {
        let node = self.nodes[id.index()]
            .take()
            .expect("released node must be live");
        self.free.push(id);
        node
    }

    /// Hangs `subtree` in place of the child at the bottom of `path`, then
    /// rebalances every ancestor on the way back up to the root.
    fn retrace(&mut self, path: &[(NodeId, Ordering)], mut subtree: Option<NodeId>) {
        for &(ancestor, direction) in path.iter().rev() {
            let node = self.node_mut(ancestor);
            if direction == Ordering::Less {
                node.left = subtree;
            } else {
                node.right = subtree;
            }
            subtree = Some(self.rebalance(ancestor));
        }
        self.root = subtree;
    }

    fn update_height(&mut self, id: NodeId) {
        let node = self.node(id);
        let height = 1 + self.height(node.left).max(self.height(node.right));
        self.node_mut(id).height = height;
    }

    /// Restores the AVL property at `id`, whose subtrees must already be
    /// balanced, and returns the root of the resulting subtree.
    fn rebalance(&mut self, id: NodeId) -> NodeId {
        self.update_height(id);
        let root = match self.balance(id) {
            2 => {
                let left = self.node(id).left.expect("left-heavy node has a left child");
                if self.balance(left) < 0 {
                    let rotated = self.rotate_left(left);
                    self.node_mut(id).left = Some(rotated);
                }
                self.rotate_right(id)
            }
            -2 => {
                let right = self
                    .node(id)
                    .right
                    .expect("right-heavy node has a right child");
                if self.balance(right) > 0 {
                    let rotated = self.rotate_right(right);
                    self.node_mut(id).right = Some(rotated);
                }
                self.rotate_left(id)
            }
            _ => id,
        };
        debug_assert!(self.balance(root).abs() <= 1, "unbalanced after rebalance");
        root
    }

    fn rotate_right(&mut self, id: NodeId) -> NodeId {
        let pivot = self.node(id).left.expect("rotate_right needs a left child");
        let inner = self.node(pivot).right;
        self.node_mut(id).left = inner;
        self.node_mut(pivot).right = Some(id);
        self.update_height(id);
        self.update_height(pivot);
        pivot
    }

    fn rotate_left(&mut self, id: NodeId) -> NodeId {
        let pivot = self.node(id).right.expect("rotate_left needs a right child");
        let inner = self.node(pivot).left;
        self.node_mut(id).right = inner;
        self.node_mut(pivot).left = Some(id);
        self.update_height(id);
        self.update_height(pivot);
        pivot
    }

    /// Checks every structural invariant, panicking on the first violation:
    /// search order, AVL balance, stored heights, the sibling chain, the
    /// first/last handles and the length.
    pub fn validate(&self) {
        let mut in_order = Vec::with_capacity(self.len);
        let mut stack = Vec::new();
        let mut cursor = self.root;
        loop {
            while let Some(id) = cursor {
                stack.push(id);
                cursor = self.node(id).left;
            }
            let Some(id) = stack.pop() else { break };
            in_order.push(id);
            assert!(in_order.len() <= self.len, "tree has more nodes than len()");
            cursor = self.node(id).right;
        }
        assert_eq!(in_order.len(), self.len, "len() disagrees with the tree");

        for pair in in_order.windows(2) {
            assert_eq!(
                (self.comparator)(self.key(pair[0]), self.key(pair[1])),
                Ordering::Less,
                "keys out of order"
            );
        }
        for &id in &in_order {
            let node = self.node(id);
            let expected = 1 + self.height(node.left).max(self.height(node.right));
            assert_eq!(node.height, expected, "stale height at {id:?}");
            assert!(self.balance(id).abs() <= 1, "unbalanced at {id:?}");
        }

        assert_eq!(self.first, in_order.first().copied(), "wrong first node");
        assert_eq!(self.last, in_order.last().copied(), "wrong last node");
        for (index, &id) in in_order.iter().enumerate() {
            let expected_prev = index.checked_sub(1).map(|i| in_order[i]);
            let expected_next = in_order.get(index + 1).copied();
            assert_eq!(self.prev(id), expected_prev, "broken prev link at {id:?}");
            assert_eq!(self.next(id), expected_next, "broken next link at {id:?}");
        }
    }
}

impl<K, V> Debug for OrderedTree<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V> IntoIterator for &'a OrderedTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// In-order iterator over an [`OrderedTree`], following the sibling chain.
pub struct Iter<'a, K, V> {
    tree: &'a OrderedTree<K, V>,
    front: Option<NodeId>,
    back: Option<NodeId>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.front?;
        self.front = self.tree.next(id);
        self.remaining -= 1;
        let node = self.tree.node(id);
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.back?;
        self.back = self.tree.prev(id);
        self.remaining -= 1;
        let node = self.tree.node(id);
        Some((&node.key, &node.value))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}
