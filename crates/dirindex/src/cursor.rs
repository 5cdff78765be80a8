//! The bidirectional cursor protocol shared by trees and tables.

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// A `(key, value)` pair produced by a table cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tuple<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> Tuple<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    pub fn into_pair(self) -> (K, V) {
        (self.key, self.value)
    }
}

impl<K, V> From<(K, V)> for Tuple<K, V> {
    fn from((key, value): (K, V)) -> Self {
        Self { key, value }
    }
}

/// A cursor over an ordered sequence of elements.
///
/// A cursor is either *on* an element, in which case [`get`](Self::get)
/// returns it, or in a *gap*: before the first element, after the last, or
/// between two adjacent elements.  [`next`](Self::next) and
/// [`previous`](Self::previous) move to the adjacent element in either
/// direction, from either kind of position, and return whether they found
/// one.  A cursor that runs off either end is left before the first or after
/// the last element, from where it can be moved back.
///
/// # Example
///
/// ```ignore
/// let mut cursor = table.cursor();
/// while cursor.next()? {
///     let tuple = cursor.get()?;
///     // Do something with `tuple`.
/// }
/// ```
pub trait Cursor {
    type Item;

    /// Whether [`get`](Self::get) currently returns an element.
    fn available(&self) -> bool;

    /// Moves into the gap before the first element.
    fn before_first(&mut self) -> Result<(), IndexError>;

    /// Moves into the gap after the last element.
    fn after_last(&mut self) -> Result<(), IndexError>;

    /// Moves into the gap immediately before the smallest element greater
    /// than or equal to `element`.  `element` itself need not be present.
    fn before(&mut self, element: &Self::Item) -> Result<(), IndexError>;

    /// Moves into the gap immediately after the largest element less than or
    /// equal to `element`.  `element` itself need not be present.
    fn after(&mut self, element: &Self::Item) -> Result<(), IndexError>;

    /// Moves to the next element.  Returns `false`, leaving the cursor after
    /// the last element, if there is none.
    fn next(&mut self) -> Result<bool, IndexError>;

    /// Moves to the previous element.  Returns `false`, leaving the cursor
    /// before the first element, if there is none.
    fn previous(&mut self) -> Result<bool, IndexError>;

    /// Moves to the first element.  Returns `false` if there are no elements.
    fn first(&mut self) -> Result<bool, IndexError> {
        self.before_first()?;
        self.next()
    }

    /// Moves to the last element.  Returns `false` if there are no elements.
    fn last(&mut self) -> Result<bool, IndexError> {
        self.after_last()?;
        self.previous()
    }

    /// The element the cursor is on.
    ///
    /// Fails with [`IndexError::InvalidPosition`] if the cursor is in a gap.
    fn get(&self) -> Result<&Self::Item, IndexError>;

    /// Whether the cursor overwrites one element in place as it moves, rather
    /// than handing out a distinct element per position.
    fn is_element_reused(&self) -> bool {
        false
    }
}
