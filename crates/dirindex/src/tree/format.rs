//! # Tree file format
//!
//! An [`OrderedTree`] serializes to a versionless byte string that preserves
//! the tree's exact shape, so that loading it needs no re-insertion and no
//! rebalancing.  The format uses [`mod@binrw`] for the fixed-length fields and
//! a caller-supplied [`Codec`] for keys and values.  All integers are
//! big-endian.
//!
//! The encoding consists of the following, in order:
//!
//! * A [`TreeHeader`] giving the number of nodes.
//!
//! * If there is at least one node, the 4-byte index of the root node.
//!
//! * One [`NodeRecord`] per node, in key order.  A node's index is its
//!   position in this sequence.  Each record holds the indices of the node's
//!   children ([`NO_NODE`] for none), its balance factor, and its key and value
//!   as length-prefixed codec output.
//!
//! Because records appear in key order, the in-order predecessor of record
//! `i` is record `i - 1`; the sibling chain is rebuilt from that rather than
//! stored.

use std::cmp::Ordering;
use std::io::Cursor as IoCursor;
use std::sync::Arc;

use binrw::{binrw, BinRead, BinWrite};
use dirindex_types::Comparator;

use crate::codec::{Codec, UnitCodec};
use crate::error::{DecodeError, IndexError};

use super::{Node, NodeId, OrderedTree};

/// Child index meaning "no child".
pub const NO_NODE: u32 = u32::MAX;

/// Fixed part of the encoding.
///
/// Serialized and deserialized automatically with [`mod@binrw`].
#[binrw]
#[brw(big)]
#[derive(Debug)]
pub struct TreeHeader {
    /// Number of nodes in the tree.
    pub n_nodes: u32,
}

/// One node of the tree.
///
/// Serialized and deserialized automatically with [`mod@binrw`].
#[binrw]
#[brw(big)]
#[derive(Debug)]
pub struct NodeRecord {
    /// Index of the left child, or [`NO_NODE`].
    pub left: u32,

    /// Index of the right child, or [`NO_NODE`].
    pub right: u32,

    /// Height of the left subtree minus height of the right subtree.
    pub balance: i8,

    #[bw(calc(key.len() as u32))]
    pub key_len: u32,

    /// Key, as encoded by the key codec.
    #[br(count = key_len)]
    pub key: Vec<u8>,

    #[bw(calc(value.len() as u32))]
    pub value_len: u32,

    /// Value, as encoded by the value codec.
    #[br(count = value_len)]
    pub value: Vec<u8>,
}

/// Fails unless a payload of `len` bytes fits a 4-byte length prefix.
///
/// The `calc` length fields of the records in this crate cast with `as`, so
/// every variable-length payload passes through here before it is written.
pub(crate) fn check_payload_len(len: usize, what: &str) -> Result<(), IndexError> {
    if u32::try_from(len).is_err() {
        return Err(IndexError::Encode(format!(
            "{what} is {len} bytes, more than the {} byte limit",
            u32::MAX
        )));
    }
    Ok(())
}

/// Smallest possible encoding of a [`NodeRecord`], used to reject absurd node
/// counts before allocating for them.
const MIN_RECORD_LEN: usize = 4 + 4 + 1 + 4 + 4;

/// Serializes and deserializes [`OrderedTree`]s.
pub struct TreeSerializer<K, V = ()> {
    comparator: Comparator<K>,
    key_codec: Arc<dyn Codec<K>>,
    value_codec: Arc<dyn Codec<V>>,
}

impl<K> TreeSerializer<K, ()> {
    /// Returns a serializer for trees used as sets.
    pub fn for_keys<C>(comparator: Comparator<K>, key_codec: C) -> Self
    where
        C: Codec<K> + 'static,
    {
        Self::new(comparator, key_codec, UnitCodec)
    }
}

impl<K, V> TreeSerializer<K, V> {
    /// Returns a serializer that encodes keys with `key_codec` and values
    /// with `value_codec`.  Deserialized trees are ordered by `comparator`.
    pub fn new<KC, VC>(comparator: Comparator<K>, key_codec: KC, value_codec: VC) -> Self
    where
        KC: Codec<K> + 'static,
        VC: Codec<V> + 'static,
    {
        Self {
            comparator,
            key_codec: Arc::new(key_codec),
            value_codec: Arc::new(value_codec),
        }
    }

    /// Encodes `tree`.
    pub fn serialize(&self, tree: &OrderedTree<K, V>) -> Result<Vec<u8>, IndexError> {
        // Map arena slots to positions in key order.
        let mut order = vec![NO_NODE; tree.nodes.len()];
        for (position, id) in Chain::new(tree).enumerate() {
            order[id.index()] = position as u32;
        }
        let index_of = |id: Option<NodeId>| id.map_or(NO_NODE, |id| order[id.index()]);

        let mut writer = IoCursor::new(Vec::new());
        let n_nodes =
            u32::try_from(tree.len()).map_err(|_| IndexError::Encode("too many nodes".into()))?;
        TreeHeader { n_nodes }
            .write(&mut writer)
            .map_err(|error| IndexError::Encode(error.to_string()))?;
        if let Some(root) = tree.root() {
            index_of(Some(root))
                .write_be(&mut writer)
                .map_err(|error| IndexError::Encode(error.to_string()))?;
        }

        for id in Chain::new(tree) {
            let node = tree.node(id);
            let mut key = Vec::new();
            self.key_codec.encode(&node.key, &mut key)?;
            let mut value = Vec::new();
            self.value_codec.encode(&node.value, &mut value)?;
            check_payload_len(key.len(), "encoded key")?;
            check_payload_len(value.len(), "encoded value")?;
            NodeRecord {
                left: index_of(node.left),
                right: index_of(node.right),
                balance: tree.balance(id),
                key,
                value,
            }
            .write(&mut writer)
            .map_err(|error| IndexError::Encode(error.to_string()))?;
        }
        Ok(writer.into_inner())
    }

    /// Decodes a tree produced by [`serialize`](Self::serialize).
    ///
    /// Fails with [`DecodeError`] on empty, truncated, or structurally
    /// invalid input; a tree is only returned if it satisfies every ordering
    /// and balance invariant.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<OrderedTree<K, V>, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let mut reader = IoCursor::new(bytes);
        let header = TreeHeader::read(&mut reader)
            .map_err(|error| DecodeError::from_binrw(error, "tree header"))?;
        let n_nodes = header.n_nodes as usize;
        if n_nodes == 0 {
            check_consumed(&reader)?;
            return Ok(OrderedTree::new(self.comparator.clone()));
        }
        if n_nodes.saturating_mul(MIN_RECORD_LEN) > bytes.len() {
            return Err(DecodeError::Truncated("node records"));
        }

        let root = u32::read_be(&mut reader)
            .map_err(|error| DecodeError::from_binrw(error, "root index"))?;
        let mut records = Vec::with_capacity(n_nodes);
        for _ in 0..n_nodes {
            records.push(
                NodeRecord::read(&mut reader)
                    .map_err(|error| DecodeError::from_binrw(error, "node record"))?,
            );
        }
        check_consumed(&reader)?;

        let mut links = Links::new(root, &records)?;
        links.check_shape(&records)?;

        let mut nodes: Vec<Node<K, V>> = Vec::with_capacity(n_nodes);
        for (index, record) in records.into_iter().enumerate() {
            let key = self.key_codec.decode(&record.key)?;
            if let Some(prev) = nodes.last() {
                if (self.comparator)(&prev.key, &key) != Ordering::Less {
                    return Err(DecodeError::Malformed(format!(
                        "key of node {index} is not greater than its predecessor"
                    )));
                }
            }
            let value = self.value_codec.decode(&record.value)?;
            nodes.push(Node {
                key,
                value,
                left: links.left[index],
                right: links.right[index],
                prev: None,
                next: None,
                height: links.height[index],
            });
        }
        Ok(OrderedTree::from_sorted_nodes(
            self.comparator.clone(),
            nodes,
            Some(NodeId(root)),
        ))
    }
}

fn check_consumed(reader: &IoCursor<&[u8]>) -> Result<(), DecodeError> {
    let consumed = reader.position() as usize;
    let total = reader.get_ref().len();
    if consumed != total {
        return Err(DecodeError::Malformed(format!(
            "{} trailing bytes after tree",
            total - consumed
        )));
    }
    Ok(())
}

/// Nodes of a tree in key order, following the sibling chain.
struct Chain<'a, K, V> {
    tree: &'a OrderedTree<K, V>,
    next: Option<NodeId>,
}

impl<'a, K, V> Chain<'a, K, V> {
    fn new(tree: &'a OrderedTree<K, V>) -> Self {
        Self {
            tree,
            next: tree.first(),
        }
    }
}

impl<K, V> Iterator for Chain<'_, K, V> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.next(id);
        Some(id)
    }
}

/// Child links decoded from node records, with recomputed heights.
struct Links {
    root: usize,
    left: Vec<Option<NodeId>>,
    right: Vec<Option<NodeId>>,
    height: Vec<u8>,
}

impl Links {
    /// Decodes child indices, rejecting out-of-range indices and nodes with
    /// more than one parent.
    fn new(root: u32, records: &[NodeRecord]) -> Result<Self, DecodeError> {
        let n = records.len();
        let decode = |index: u32, what: &str| -> Result<Option<NodeId>, DecodeError> {
            match index {
                NO_NODE => Ok(None),
                index if (index as usize) < n => Ok(Some(NodeId(index))),
                index => Err(DecodeError::Malformed(format!(
                    "{what} index {index} out of range for {n} nodes"
                ))),
            }
        };

        let root = decode(root, "root")?
            .ok_or_else(|| DecodeError::Malformed("non-empty tree without a root".into()))?;
        let mut has_parent = vec![false; n];
        has_parent[root.index()] = true;
        let mut left = Vec::with_capacity(n);
        let mut right = Vec::with_capacity(n);
        for record in records {
            let (l, r) = (decode(record.left, "child")?, decode(record.right, "child")?);
            for child in [l, r].into_iter().flatten() {
                if std::mem::replace(&mut has_parent[child.index()], true) {
                    return Err(DecodeError::Malformed(format!(
                        "node {} is referenced more than once",
                        child.0
                    )));
                }
            }
            left.push(l);
            right.push(r);
        }

        Ok(Self {
            root: root.index(),
            left,
            right,
            height: vec![0; n],
        })
    }

    /// Verifies that an in-order walk from the root visits every record in
    /// sequence, then recomputes heights and checks them against the stored
    /// balance factors.
    fn check_shape(&mut self, records: &[NodeRecord]) -> Result<(), DecodeError> {
        // With single parents and a parentless root, the walk cannot cycle.
        let n = records.len();
        let mut expected = 0;
        let mut pre_order = Vec::with_capacity(n);
        let mut stack = Vec::new();
        let mut cursor = Some(self.root);
        loop {
            while let Some(index) = cursor {
                stack.push(index);
                pre_order.push(index);
                cursor = self.left[index].map(NodeId::index);
            }
            let Some(index) = stack.pop() else { break };
            if index != expected {
                return Err(DecodeError::Malformed(format!(
                    "node {index} is out of key order"
                )));
            }
            expected += 1;
            cursor = self.right[index].map(NodeId::index);
        }
        if expected != n {
            return Err(DecodeError::Malformed(format!(
                "{} nodes are unreachable from the root",
                n - expected
            )));
        }

        // Children precede their parents in reverse pre-order.
        let height_of =
            |height: &[u8], child: Option<NodeId>| child.map_or(0, |c| height[c.index()]);
        for &index in pre_order.iter().rev() {
            let left = height_of(&self.height, self.left[index]);
            let right = height_of(&self.height, self.right[index]);
            let balance = left as i32 - right as i32;
            if balance != records[index].balance as i32 || balance.abs() > 1 {
                return Err(DecodeError::Malformed(format!(
                    "node {index} has balance {} but its subtrees differ by {balance}",
                    records[index].balance
                )));
            }
            self.height[index] = 1 + left.max(right);
        }
        Ok(())
    }
}
