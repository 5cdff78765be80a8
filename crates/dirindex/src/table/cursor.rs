use std::cmp::Ordering;

use dirindex_storage::{BrowseStart, OrderedStore, StoreBrowser};
use dirindex_types::Comparator;

use crate::cursor::{Cursor, Tuple};
use crate::error::IndexError;
use crate::tree::{NodeId, TreeCursor};

use super::duplicates::DuplicateContainer;
use super::Table;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SinglePosition {
    BeforeFirst,
    On,
    AfterLast,
}

/// Browses a secondary store as if the browser sat on the value it last
/// returned.
///
/// A store browser sits in a gap, so reversing direction returns the value
/// it just returned.  `current` remembers that value so the repeat can be
/// skipped.
struct StoreCursor<'a, V> {
    store: &'a dyn OrderedStore<V>,
    comparator: &'a Comparator<V>,
    browser: Box<dyn StoreBrowser<V> + 'a>,
    current: Option<V>,
}

impl<'a, V> StoreCursor<'a, V> {
    fn new(
        store: &'a dyn OrderedStore<V>,
        comparator: &'a Comparator<V>,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            store,
            comparator,
            browser: store.browse(BrowseStart::First)?,
            current: None,
        })
    }

    fn reposition(&mut self, start: BrowseStart<'_, V>) -> Result<(), IndexError> {
        self.browser = self.store.browse(start)?;
        self.current = None;
        Ok(())
    }

    fn step(&mut self, forward: bool) -> Result<bool, IndexError> {
        loop {
            let value = if forward {
                self.browser.next()?
            } else {
                self.browser.previous()?
            };
            match value {
                Some(value) => {
                    let repeat = self.current.as_ref().is_some_and(|current| {
                        (self.comparator)(current, &value) == Ordering::Equal
                    });
                    if !repeat {
                        self.current = Some(value);
                        return Ok(true);
                    }
                }
                None => {
                    self.current = None;
                    return Ok(false);
                }
            }
        }
    }
}

enum Inner<'a, V> {
    Empty,
    /// The value of a key in a table without duplicates.  Without a value
    /// comparator, every value is taken to equal it.
    Single {
        value: &'a V,
        comparator: Option<&'a Comparator<V>>,
        position: SinglePosition,
    },
    Inline(TreeCursor<'a, V>),
    Redirect(StoreCursor<'a, V>),
}

/// A [`Cursor`] over the values of a single key, in value order.
///
/// Obtained from [`Table::value_cursor`].  The cursor starts before the first
/// value.
pub struct ValueCursor<'a, V> {
    inner: Inner<'a, V>,
}

impl<'a, V> ValueCursor<'a, V> {
    pub(crate) fn empty() -> Self {
        Self { inner: Inner::Empty }
    }

    pub(crate) fn single(value: &'a V, comparator: Option<&'a Comparator<V>>) -> Self {
        Self {
            inner: Inner::Single {
                value,
                comparator,
                position: SinglePosition::BeforeFirst,
            },
        }
    }

    pub(crate) fn group(
        container: &'a DuplicateContainer<V>,
        comparator: &'a Comparator<V>,
    ) -> Result<Self, IndexError> {
        let inner = match container {
            DuplicateContainer::Inline(tree) => Inner::Inline(tree.cursor()),
            DuplicateContainer::Redirect(store) => {
                Inner::Redirect(StoreCursor::new(&**store, comparator)?)
            }
        };
        Ok(Self { inner })
    }
}

impl<V> Cursor for ValueCursor<'_, V> {
    type Item = V;

    fn available(&self) -> bool {
        match &self.inner {
            Inner::Empty => false,
            Inner::Single { position, .. } => *position == SinglePosition::On,
            Inner::Inline(cursor) => cursor.available(),
            Inner::Redirect(cursor) => cursor.current.is_some(),
        }
    }

    fn before_first(&mut self) -> Result<(), IndexError> {
        match &mut self.inner {
            Inner::Empty => Ok(()),
            Inner::Single { position, .. } => {
                *position = SinglePosition::BeforeFirst;
                Ok(())
            }
            Inner::Inline(cursor) => cursor.before_first(),
            Inner::Redirect(cursor) => cursor.reposition(BrowseStart::First),
        }
    }

    fn after_last(&mut self) -> Result<(), IndexError> {
        match &mut self.inner {
            Inner::Empty => Ok(()),
            Inner::Single { position, .. } => {
                *position = SinglePosition::AfterLast;
                Ok(())
            }
            Inner::Inline(cursor) => cursor.after_last(),
            Inner::Redirect(cursor) => cursor.reposition(BrowseStart::Last),
        }
    }

    fn before(&mut self, element: &V) -> Result<(), IndexError> {
        match &mut self.inner {
            Inner::Empty => Ok(()),
            Inner::Single {
                value,
                comparator,
                position,
            } => {
                let greater =
                    comparator.is_some_and(|cmp| cmp(element, *value) == Ordering::Greater);
                *position = if greater {
                    SinglePosition::AfterLast
                } else {
                    SinglePosition::BeforeFirst
                };
                Ok(())
            }
            Inner::Inline(cursor) => cursor.before(element),
            Inner::Redirect(cursor) => cursor.reposition(BrowseStart::Before(element)),
        }
    }

    fn after(&mut self, element: &V) -> Result<(), IndexError> {
        match &mut self.inner {
            Inner::Empty => Ok(()),
            Inner::Single {
                value,
                comparator,
                position,
            } => {
                let less = comparator.is_some_and(|cmp| cmp(element, *value) == Ordering::Less);
                *position = if less {
                    SinglePosition::BeforeFirst
                } else {
                    SinglePosition::AfterLast
                };
                Ok(())
            }
            Inner::Inline(cursor) => cursor.after(element),
            Inner::Redirect(cursor) => cursor.reposition(BrowseStart::After(element)),
        }
    }

    fn next(&mut self) -> Result<bool, IndexError> {
        match &mut self.inner {
            Inner::Empty => Ok(false),
            Inner::Single { position, .. } => {
                let found = *position == SinglePosition::BeforeFirst;
                *position = if found {
                    SinglePosition::On
                } else {
                    SinglePosition::AfterLast
                };
                Ok(found)
            }
            Inner::Inline(cursor) => cursor.next(),
            Inner::Redirect(cursor) => cursor.step(true),
        }
    }

    fn previous(&mut self) -> Result<bool, IndexError> {
        match &mut self.inner {
            Inner::Empty => Ok(false),
            Inner::Single { position, .. } => {
                let found = *position == SinglePosition::AfterLast;
                *position = if found {
                    SinglePosition::On
                } else {
                    SinglePosition::BeforeFirst
                };
                Ok(found)
            }
            Inner::Inline(cursor) => cursor.previous(),
            Inner::Redirect(cursor) => cursor.step(false),
        }
    }

    fn get(&self) -> Result<&V, IndexError> {
        match &self.inner {
            Inner::Single {
                value,
                position: SinglePosition::On,
                ..
            } => Ok(*value),
            Inner::Inline(cursor) => cursor.get(),
            Inner::Redirect(cursor) => cursor.current.as_ref().ok_or(IndexError::InvalidPosition),
            _ => Err(IndexError::InvalidPosition),
        }
    }
}

enum Position<'a, V> {
    BeforeFirst,
    AfterLast,
    /// Within the group of values of the key at `node`.
    Key { node: NodeId, values: ValueCursor<'a, V> },
}

/// A [`Cursor`] over the tuples of a [`Table`], in key order and then value
/// order.
///
/// The cursor borrows the table, so the table cannot change while the cursor
/// is open.  It reuses one [`Tuple`], overwriting it in place on every move.
pub struct TableCursor<'a, K, V> {
    table: &'a Table<K, V>,
    position: Position<'a, V>,
    tuple: Option<Tuple<K, V>>,
    available: bool,
}

impl<'a, K, V> TableCursor<'a, K, V>
where
    K: Clone,
    V: Clone,
{
    pub(crate) fn new(table: &'a Table<K, V>) -> Self {
        Self {
            table,
            position: Position::BeforeFirst,
            tuple: None,
            available: false,
        }
    }

    /// Moves into the gap before the first tuple whose key is greater than
    /// or equal to `key`.
    pub fn before_key(&mut self, key: &K) -> Result<(), IndexError> {
        let node = self.table.entries.find_greater_or_equal(key);
        self.enter(node)
    }

    /// Moves into the gap after the last tuple whose key is less than or
    /// equal to `key`.
    pub fn after_key(&mut self, key: &K) -> Result<(), IndexError> {
        let node = self.table.entries.find_greater(key);
        self.enter(node)
    }

    /// Moves in front of the group at `node`, or after the last tuple if
    /// there is no such group.
    fn enter(&mut self, node: Option<NodeId>) -> Result<(), IndexError> {
        self.available = false;
        self.position = match node {
            Some(node) => Position::Key {
                node,
                values: self.table.values_at(node)?,
            },
            None => Position::AfterLast,
        };
        Ok(())
    }

    /// Copies the tuple under the cursor into the reused tuple.
    fn load(&mut self) -> Result<bool, IndexError> {
        let Position::Key { node, values } = &self.position else {
            return Err(IndexError::InvalidPosition);
        };
        let key = self.table.entries.key(*node);
        let value = values.get()?;
        match &mut self.tuple {
            Some(tuple) => {
                tuple.key.clone_from(key);
                tuple.value.clone_from(value);
            }
            None => self.tuple = Some(Tuple::new(key.clone(), value.clone())),
        }
        self.available = true;
        Ok(true)
    }
}

impl<K, V> Cursor for TableCursor<'_, K, V>
where
    K: Clone,
    V: Clone,
{
    type Item = Tuple<K, V>;

    fn available(&self) -> bool {
        self.available
    }

    fn before_first(&mut self) -> Result<(), IndexError> {
        self.position = Position::BeforeFirst;
        self.available = false;
        Ok(())
    }

    fn after_last(&mut self) -> Result<(), IndexError> {
        self.position = Position::AfterLast;
        self.available = false;
        Ok(())
    }

    fn before(&mut self, element: &Tuple<K, V>) -> Result<(), IndexError> {
        let node = self.table.entries.find_greater_or_equal(&element.key);
        self.enter(node)?;
        if let Position::Key { node, values } = &mut self.position {
            let key = self.table.entries.key(*node);
            if (self.table.key_comparator)(key, &element.key) == Ordering::Equal {
                values.before(&element.value)?;
            }
        }
        Ok(())
    }

    fn after(&mut self, element: &Tuple<K, V>) -> Result<(), IndexError> {
        let node = self.table.entries.find_greater_or_equal(&element.key);
        self.enter(node)?;
        if let Position::Key { node, values } = &mut self.position {
            let key = self.table.entries.key(*node);
            if (self.table.key_comparator)(key, &element.key) == Ordering::Equal {
                values.after(&element.value)?;
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<bool, IndexError> {
        let mut candidate = match &mut self.position {
            Position::BeforeFirst => self.table.entries.first(),
            Position::AfterLast => None,
            Position::Key { node, values } => {
                if values.next()? {
                    return self.load();
                }
                self.table.entries.next(*node)
            }
        };
        while let Some(node) = candidate {
            let mut values = self.table.values_at(node)?;
            if values.next()? {
                self.position = Position::Key { node, values };
                return self.load();
            }
            candidate = self.table.entries.next(node);
        }
        self.position = Position::AfterLast;
        self.available = false;
        Ok(false)
    }

    fn previous(&mut self) -> Result<bool, IndexError> {
        let mut candidate = match &mut self.position {
            Position::BeforeFirst => None,
            Position::AfterLast => self.table.entries.last(),
            Position::Key { node, values } => {
                if values.previous()? {
                    return self.load();
                }
                self.table.entries.prev(*node)
            }
        };
        while let Some(node) = candidate {
            let mut values = self.table.values_at(node)?;
            values.after_last()?;
            if values.previous()? {
                self.position = Position::Key { node, values };
                return self.load();
            }
            candidate = self.table.entries.prev(node);
        }
        self.position = Position::BeforeFirst;
        self.available = false;
        Ok(false)
    }

    fn get(&self) -> Result<&Tuple<K, V>, IndexError> {
        match &self.tuple {
            Some(tuple) if self.available => Ok(tuple),
            _ => Err(IndexError::InvalidPosition),
        }
    }

    fn is_element_reused(&self) -> bool {
        true
    }
}
