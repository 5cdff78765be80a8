use crate::cursor::Cursor;
use crate::error::IndexError;

use super::{NodeId, OrderedTree};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    AfterLast,
    /// On the node.
    On(NodeId),
    /// In the gap just in front of the node.
    Before(NodeId),
}

/// A [`Cursor`] over the keys of an [`OrderedTree`].
///
/// Steps follow the tree's sibling chain, so they cost O(1); positioning with
/// [`before`](Cursor::before) and [`after`](Cursor::after) costs O(log n).
#[derive(Debug)]
pub struct TreeCursor<'a, K, V = ()> {
    tree: &'a OrderedTree<K, V>,
    position: Position,
}

impl<K, V> Clone for TreeCursor<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree,
            position: self.position,
        }
    }
}

impl<'a, K, V> TreeCursor<'a, K, V> {
    pub fn new(tree: &'a OrderedTree<K, V>) -> Self {
        Self {
            tree,
            position: Position::BeforeFirst,
        }
    }

    /// The node the cursor is on, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self.position {
            Position::On(id) => Some(id),
            _ => None,
        }
    }

    /// The key and value the cursor is on.
    pub fn entry(&self) -> Result<(&'a K, &'a V), IndexError> {
        let id = self.node().ok_or(IndexError::InvalidPosition)?;
        let node = self.tree.node(id);
        Ok((&node.key, &node.value))
    }

    fn settle(&mut self, target: Option<NodeId>, exhausted: Position) -> bool {
        match target {
            Some(id) => {
                self.position = Position::On(id);
                true
            }
            None => {
                self.position = exhausted;
                false
            }
        }
    }
}

impl<K, V> Cursor for TreeCursor<'_, K, V> {
    type Item = K;

    fn available(&self) -> bool {
        matches!(self.position, Position::On(_))
    }

    fn before_first(&mut self) -> Result<(), IndexError> {
        self.position = Position::BeforeFirst;
        Ok(())
    }

    fn after_last(&mut self) -> Result<(), IndexError> {
        self.position = Position::AfterLast;
        Ok(())
    }

    fn before(&mut self, element: &K) -> Result<(), IndexError> {
        self.position = match self.tree.find_greater_or_equal(element) {
            Some(id) => Position::Before(id),
            None => Position::AfterLast,
        };
        Ok(())
    }

    fn after(&mut self, element: &K) -> Result<(), IndexError> {
        self.position = match self.tree.find_greater(element) {
            Some(id) => Position::Before(id),
            None => Position::AfterLast,
        };
        Ok(())
    }

    fn next(&mut self) -> Result<bool, IndexError> {
        let target = match self.position {
            Position::BeforeFirst => self.tree.first(),
            Position::AfterLast => None,
            Position::On(id) => self.tree.next(id),
            Position::Before(id) => Some(id),
        };
        Ok(self.settle(target, Position::AfterLast))
    }

    fn previous(&mut self) -> Result<bool, IndexError> {
        let target = match self.position {
            Position::BeforeFirst => None,
            Position::AfterLast => self.tree.last(),
            Position::On(id) | Position::Before(id) => self.tree.prev(id),
        };
        Ok(self.settle(target, Position::BeforeFirst))
    }

    fn get(&self) -> Result<&K, IndexError> {
        match self.position {
            Position::On(id) => Ok(self.tree.key(id)),
            _ => Err(IndexError::InvalidPosition),
        }
    }
}
