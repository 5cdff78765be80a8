//! Index tables.
//!
//! A [`Table`] maps keys to values in key order.  A table created with
//! duplicates enabled maps each key to an ordered group of distinct values
//! instead of a single value; it then needs a value comparator to order the
//! group.
//!
//! # Duplicate groups
//!
//! Each group starts out inline, in an [`OrderedTree`] of its own.  When a
//! group grows beyond the table's [duplicate limit](TableConfig::duplicate_limit),
//! its values move into a secondary store created by the table's
//! [`StoreFactory`].  When it later shrinks below half of that limit, the
//! values move back inline.  Neither move changes the order in which cursors
//! see the values.
//!
//! # Cursors
//!
//! [`Table::cursor`] returns a [`TableCursor`] over all `(key, value)`
//! tuples, ordered by key and then by value.  A cursor borrows the table, so
//! the table cannot be modified while any cursor is open.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use dirindex_storage::memory::MemoryStoreFactory;
use dirindex_storage::StoreFactory;
use dirindex_types::config::TableConfig;
use dirindex_types::Comparator;
use tracing::{debug, warn};

use crate::error::IndexError;
use crate::metrics::describe_index_metrics;
use crate::tree::{NodeId, OrderedTree};

mod cursor;
mod duplicates;


pub use cursor::{TableCursor, ValueCursor};

use duplicates::{DuplicateContainer, DuplicatePolicy};

enum Entries<K, V> {
    Unique(OrderedTree<K, V>),
    Duplicates {
        tree: OrderedTree<K, DuplicateContainer<V>>,
        policy: DuplicatePolicy<V>,
    },
}

/// Evaluates `$body` with `$tree` bound to the key tree, whichever kind of
/// values it holds.
macro_rules! with_tree {
    ($entries:expr, $tree:ident => $body:expr) => {
        match $entries {
            Entries::Unique($tree) => $body,
            Entries::Duplicates { tree: $tree, .. } => $body,
        }
    };
}

impl<K, V> Entries<K, V> {
    fn len(&self) -> usize {
        with_tree!(self, tree => tree.len())
    }

    fn first(&self) -> Option<NodeId> {
        with_tree!(self, tree => tree.first())
    }

    fn last(&self) -> Option<NodeId> {
        with_tree!(self, tree => tree.last())
    }

    fn next(&self, node: NodeId) -> Option<NodeId> {
        with_tree!(self, tree => tree.next(node))
    }

    fn prev(&self, node: NodeId) -> Option<NodeId> {
        with_tree!(self, tree => tree.prev(node))
    }

    fn key(&self, node: NodeId) -> &K {
        with_tree!(self, tree => tree.key(node))
    }

    fn find(&self, key: &K) -> Option<NodeId> {
        with_tree!(self, tree => tree.find(key))
    }

    fn find_greater_or_equal(&self, key: &K) -> Option<NodeId> {
        with_tree!(self, tree => tree.find_greater_or_equal(key))
    }

    fn find_greater(&self, key: &K) -> Option<NodeId> {
        with_tree!(self, tree => tree.find_greater(key))
    }

    fn find_less_or_equal(&self, key: &K) -> Option<NodeId> {
        with_tree!(self, tree => tree.find_less_or_equal(key))
    }

    fn find_less(&self, key: &K) -> Option<NodeId> {
        with_tree!(self, tree => tree.find_less(key))
    }
}

/// An ordered index from keys to values.
pub struct Table<K, V> {
    name: String,
    key_comparator: Comparator<K>,
    value_comparator: Option<Comparator<V>>,
    entries: Entries<K, V>,
    /// Number of tuples.
    count: usize,
    duplicate_limit: usize,
    stores: Arc<dyn StoreFactory<V>>,
}

impl<K, V> Table<K, V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an in-memory table.
    ///
    /// Large duplicate groups go to in-memory secondary stores.  Fails with
    /// [`IndexError::Configuration`] if `duplicates` is set but
    /// `value_comparator` is not.
    pub fn new(
        name: &str,
        key_comparator: Comparator<K>,
        value_comparator: Option<Comparator<V>>,
        duplicates: bool,
    ) -> Result<Self, IndexError> {
        Self::with_config(
            &TableConfig::new(name, duplicates),
            key_comparator,
            value_comparator,
            Arc::new(MemoryStoreFactory::default()),
        )
    }
}

impl<K, V> Table<K, V>
where
    V: Clone,
{
    /// Creates a table as described by `config`, taking secondary stores for
    /// large duplicate groups from `stores`.
    ///
    /// The configured cache size and working directory are passed on to
    /// `stores`; a factory that does not support them fails the call with
    /// [`IndexError::Unsupported`].
    pub fn with_config(
        config: &TableConfig,
        key_comparator: Comparator<K>,
        value_comparator: Option<Comparator<V>>,
        stores: Arc<dyn StoreFactory<V>>,
    ) -> Result<Self, IndexError> {
        describe_index_metrics();

        if config.duplicate_limit == 0 {
            return Err(IndexError::configuration(
                &config.name,
                "the duplicate limit must be at least 1",
            ));
        }
        if let Some(entries) = config.cache_size {
            stores.set_cache_size(entries)?;
        }
        if let Some(path) = config.working_directory() {
            stores.set_working_directory(path)?;
        }

        let entries = if config.duplicates {
            let Some(comparator) = value_comparator.clone() else {
                return Err(IndexError::configuration(
                    &config.name,
                    "duplicate keys require a value comparator",
                ));
            };
            Entries::Duplicates {
                tree: OrderedTree::new(key_comparator.clone()),
                policy: DuplicatePolicy::new(
                    &config.name,
                    comparator,
                    stores.clone(),
                    config.duplicate_limit,
                    config.demotion_limit(),
                ),
            }
        } else {
            Entries::Unique(OrderedTree::new(key_comparator.clone()))
        };

        debug!(
            "opened table {} (duplicates: {}, backend: {})",
            config.name,
            config.duplicates,
            stores.backend()
        );
        Ok(Self {
            name: config.name.clone(),
            key_comparator,
            value_comparator,
            entries,
            count: 0,
            duplicate_limit: config.duplicate_limit,
            stores,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a key may map to more than one value.
    pub fn is_dup_enabled(&self) -> bool {
        matches!(self.entries, Entries::Duplicates { .. })
    }

    /// Largest number of values a key keeps inline.
    pub fn duplicate_limit(&self) -> usize {
        self.duplicate_limit
    }

    pub fn key_comparator(&self) -> &Comparator<K> {
        &self.key_comparator
    }

    pub fn value_comparator(&self) -> Option<&Comparator<V>> {
        self.value_comparator.as_ref()
    }

    /// Sets the number of entries the secondary store backend may cache.
    pub fn set_cache_size(&self, entries: usize) -> Result<(), IndexError> {
        Ok(self.stores.set_cache_size(entries)?)
    }

    /// Sets the directory where the secondary store backend keeps its files.
    pub fn set_working_directory(&self, path: &Path) -> Result<(), IndexError> {
        Ok(self.stores.set_working_directory(path)?)
    }

    /// Adds the tuple `(key, value)`.
    ///
    /// Without duplicates, this replaces any value already stored for `key`.
    /// With duplicates, `value` joins the values of `key`; adding a tuple
    /// that is already present changes nothing.
    ///
    /// Returns whether the number of tuples grew.
    pub fn put(&mut self, key: K, value: V) -> Result<bool, IndexError> {
        let added = match &mut self.entries {
            Entries::Unique(tree) => match tree.get_mut(&key) {
                Some(existing) => {
                    *existing = value;
                    false
                }
                None => tree.insert(key, value),
            },
            Entries::Duplicates { tree, policy } => match tree.get_mut(&key) {
                Some(group) => group.insert(value, policy)?,
                None => {
                    let mut group = DuplicateContainer::new(policy.comparator.clone());
                    group.insert(value, policy)?;
                    tree.insert(key, group)
                }
            },
        };
        if added {
            self.count += 1;
        }
        Ok(added)
    }

    /// Removes every tuple with `key`.  Returns whether there was any.
    pub fn remove(&mut self, key: &K) -> Result<bool, IndexError> {
        match &mut self.entries {
            Entries::Unique(tree) => {
                let removed = tree.remove(key).is_some();
                self.count -= usize::from(removed);
                Ok(removed)
            }
            Entries::Duplicates { tree, .. } => {
                let Some(group) = tree.get(key) else {
                    return Ok(false);
                };
                let len = group.len()?;
                if let Some(mut group) = tree.remove(key) {
                    self.count -= len;
                    group.close()?;
                }
                Ok(true)
            }
        }
    }

    /// Removes the tuple `(key, value)`.  Returns whether it was present.
    ///
    /// Removing the last value of a key removes the key.  Without
    /// duplicates, matching the stored value needs a value comparator.
    pub fn remove_value(&mut self, key: &K, value: &V) -> Result<bool, IndexError> {
        match &mut self.entries {
            Entries::Unique(tree) => {
                let comparator = self.value_comparator.as_ref().ok_or_else(|| {
                    IndexError::configuration(
                        &self.name,
                        "matching values requires a value comparator",
                    )
                })?;
                let matches = tree
                    .get(key)
                    .is_some_and(|stored| comparator(stored, value) == Ordering::Equal);
                if matches {
                    tree.remove(key);
                    self.count -= 1;
                }
                Ok(matches)
            }
            Entries::Duplicates { tree, policy } => {
                let Some(group) = tree.get_mut(key) else {
                    return Ok(false);
                };
                if !group.remove(value, policy)? {
                    return Ok(false);
                }
                self.count -= 1;
                if group.len()? == 0 {
                    if let Some(mut group) = tree.remove(key) {
                        group.close()?;
                    }
                }
                Ok(true)
            }
        }
    }

    /// The value stored for `key`.
    ///
    /// Only tables without duplicates support this; use
    /// [`value_cursor`](Self::value_cursor) to read the values of a key with
    /// duplicates.
    pub fn get(&self, key: &K) -> Result<Option<&V>, IndexError> {
        match &self.entries {
            Entries::Unique(tree) => Ok(tree.get(key)),
            Entries::Duplicates { .. } => Err(IndexError::Unsupported(format!(
                "table {} allows duplicate keys, so a key has no single value",
                self.name
            ))),
        }
    }

    /// Whether any tuple has `key`.
    pub fn has(&self, key: &K) -> bool {
        self.entries.find(key).is_some()
    }

    /// Whether the tuple `(key, value)` is present.
    pub fn has_value(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        match &self.entries {
            Entries::Unique(tree) => {
                let comparator = self.require_value_comparator()?;
                Ok(tree
                    .get(key)
                    .is_some_and(|stored| comparator(stored, value) == Ordering::Equal))
            }
            Entries::Duplicates { tree, .. } => match tree.get(key) {
                Some(group) => group.contains(value),
                None => Ok(false),
            },
        }
    }

    /// Whether any tuple has a key greater than or equal to `key`.
    pub fn has_greater_or_equal(&self, key: &K) -> bool {
        self.entries.find_greater_or_equal(key).is_some()
    }

    /// Whether any tuple has a key less than or equal to `key`.
    pub fn has_less_or_equal(&self, key: &K) -> bool {
        self.entries.find_less_or_equal(key).is_some()
    }

    /// Whether `key` has a value greater than or equal to `value`.
    pub fn has_greater_or_equal_value(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        match &self.entries {
            Entries::Unique(tree) => {
                let comparator = self.require_value_comparator()?;
                Ok(tree
                    .get(key)
                    .is_some_and(|stored| comparator(stored, value) != Ordering::Less))
            }
            Entries::Duplicates { tree, .. } => match tree.get(key) {
                Some(group) => group.has_greater_or_equal(value),
                None => Ok(false),
            },
        }
    }

    /// Whether `key` has a value less than or equal to `value`.
    pub fn has_less_or_equal_value(&self, key: &K, value: &V) -> Result<bool, IndexError> {
        match &self.entries {
            Entries::Unique(tree) => {
                let comparator = self.require_value_comparator()?;
                Ok(tree
                    .get(key)
                    .is_some_and(|stored| comparator(stored, value) != Ordering::Greater))
            }
            Entries::Duplicates { tree, .. } => match tree.get(key) {
                Some(group) => group.has_less_or_equal(value),
                None => Ok(false),
            },
        }
    }

    fn require_value_comparator(&self) -> Result<&Comparator<V>, IndexError> {
        self.value_comparator.as_ref().ok_or_else(|| {
            IndexError::configuration(&self.name, "comparing values requires a value comparator")
        })
    }

    /// Number of tuples.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of tuples with `key`.
    pub fn count_key(&self, key: &K) -> Result<usize, IndexError> {
        match self.entries.find(key) {
            Some(node) => self.group_len(node),
            None => Ok(0),
        }
    }

    /// Number of tuples whose key is greater than `key`.
    pub fn greater_than_count(&self, key: &K) -> Result<usize, IndexError> {
        let mut count = 0;
        let mut node = self.entries.find_greater(key);
        while let Some(id) = node {
            count += self.group_len(id)?;
            node = self.entries.next(id);
        }
        Ok(count)
    }

    /// Number of tuples whose key is less than `key`.
    pub fn less_than_count(&self, key: &K) -> Result<usize, IndexError> {
        let mut count = 0;
        let mut node = self.entries.find_less(key);
        while let Some(id) = node {
            count += self.group_len(id)?;
            node = self.entries.prev(id);
        }
        Ok(count)
    }

    /// Whether the counts reported by this table are exact.  Counts that
    /// depend on a secondary store are only as exact as the store's.
    pub fn is_count_exact(&self) -> bool {
        match self.entries {
            Entries::Unique(_) => true,
            Entries::Duplicates { .. } => self.stores.counts_exact(),
        }
    }

    fn group_len(&self, node: NodeId) -> Result<usize, IndexError> {
        match &self.entries {
            Entries::Unique(_) => Ok(1),
            Entries::Duplicates { tree, .. } => tree.value(node).len(),
        }
    }

    /// Number of keys whose values live in a secondary store.
    pub fn redirected_key_count(&self) -> usize {
        match &self.entries {
            Entries::Unique(_) => 0,
            Entries::Duplicates { tree, .. } => tree
                .iter()
                .filter(|(_, group)| group.is_redirect())
                .count(),
        }
    }

    fn values_at(&self, node: NodeId) -> Result<ValueCursor<'_, V>, IndexError> {
        match &self.entries {
            Entries::Unique(tree) => Ok(ValueCursor::single(
                tree.value(node),
                self.value_comparator.as_ref(),
            )),
            Entries::Duplicates { tree, policy } => {
                ValueCursor::group(tree.value(node), &policy.comparator)
            }
        }
    }

    /// Returns a cursor over the values of `key`, in value order, positioned
    /// before the first.  If `key` is absent, the cursor is empty.
    pub fn value_cursor(&self, key: &K) -> Result<ValueCursor<'_, V>, IndexError> {
        match self.entries.find(key) {
            Some(node) => self.values_at(node),
            None => Ok(ValueCursor::empty()),
        }
    }

    /// Releases the table's secondary stores.
    ///
    /// Every store is closed even if closing one of them fails; the first
    /// failure is returned.
    pub fn close(mut self) -> Result<(), IndexError> {
        let mut result = Ok(());
        if let Entries::Duplicates { tree, .. } = &mut self.entries {
            let mut node = tree.first();
            while let Some(id) = node {
                if let Err(error) = tree.value_mut(id).close() {
                    warn!("table {}: failed to close a secondary store: {error}", self.name);
                    if result.is_ok() {
                        result = Err(error);
                    }
                }
                node = tree.next(id);
            }
        }
        debug!("closed table {}", self.name);
        result
    }

    pub(crate) fn unique_tree(&self) -> Option<&OrderedTree<K, V>> {
        match &self.entries {
            Entries::Unique(tree) => Some(tree),
            Entries::Duplicates { .. } => None,
        }
    }

    /// Replaces the contents of a table without duplicates by `tree`.
    pub(crate) fn load_unique(&mut self, tree: OrderedTree<K, V>) -> Result<(), IndexError> {
        match &mut self.entries {
            Entries::Unique(entries) => {
                self.count = tree.len();
                *entries = tree;
                Ok(())
            }
            Entries::Duplicates { .. } => Err(IndexError::configuration(
                &self.name,
                "cannot load a unique tree into a table with duplicates",
            )),
        }
    }
}

impl<K, V> Table<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Returns a cursor over every tuple, positioned before the first.
    pub fn cursor(&self) -> TableCursor<'_, K, V> {
        TableCursor::new(self)
    }

    /// Returns a cursor positioned before the first tuple with `key`, or
    /// before the tuple that would follow such a tuple if `key` is absent.
    pub fn cursor_at(&self, key: &K) -> Result<TableCursor<'_, K, V>, IndexError> {
        let mut cursor = TableCursor::new(self);
        cursor.before_key(key)?;
        Ok(cursor)
    }
}
