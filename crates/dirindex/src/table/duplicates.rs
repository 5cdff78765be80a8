//! Storage for the values of one key in a duplicate-enabled table.

use std::cmp::Ordering;
use std::sync::Arc;

use dirindex_storage::{BrowseStart, OrderedStore, StoreFactory};
use dirindex_types::Comparator;
use metrics::counter;
use tracing::{debug, warn};

use crate::error::IndexError;
use crate::metrics::{DUPLICATE_DEMOTIONS, DUPLICATE_PROMOTIONS};
use crate::tree::OrderedTree;

/// When and where a table's duplicate groups move between inline and
/// redirected storage.
pub(crate) struct DuplicatePolicy<V> {
    table: String,
    pub(crate) comparator: Comparator<V>,
    stores: Arc<dyn StoreFactory<V>>,
    /// An inline group is promoted once it would hold more values than this.
    promote_above: usize,
    /// A redirected group is demoted once it would hold fewer values than this.
    demote_below: usize,
}

impl<V> DuplicatePolicy<V> {
    pub(crate) fn new(
        table: &str,
        comparator: Comparator<V>,
        stores: Arc<dyn StoreFactory<V>>,
        promote_above: usize,
        demote_below: usize,
    ) -> Self {
        debug_assert!(demote_below <= promote_above);
        Self {
            table: table.to_string(),
            comparator,
            stores,
            promote_above,
            demote_below,
        }
    }
}

/// The values of one key, in value order.
pub(crate) enum DuplicateContainer<V> {
    /// A small group, held in a tree of its own.
    Inline(OrderedTree<V>),

    /// A large group, held in a secondary store.
    Redirect(Box<dyn OrderedStore<V>>),
}

impl<V> DuplicateContainer<V>
where
    V: Clone,
{
    pub(crate) fn new(comparator: Comparator<V>) -> Self {
        Self::Inline(OrderedTree::new(comparator))
    }

    pub(crate) fn len(&self) -> Result<usize, IndexError> {
        match self {
            Self::Inline(tree) => Ok(tree.len()),
            Self::Redirect(store) => Ok(store.len()?),
        }
    }

    pub(crate) fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect(_))
    }

    pub(crate) fn contains(&self, value: &V) -> Result<bool, IndexError> {
        match self {
            Self::Inline(tree) => Ok(tree.contains(value)),
            Self::Redirect(store) => Ok(store.contains(value)?),
        }
    }

    /// Adds `value`, promoting the group to a secondary store if it grows
    /// past the policy's limit.  Returns `false` if the value was already
    /// present.
    ///
    /// If creating or filling the secondary store fails, the group is left
    /// exactly as it was.
    pub(crate) fn insert(
        &mut self,
        value: V,
        policy: &DuplicatePolicy<V>,
    ) -> Result<bool, IndexError> {
        let tree = match self {
            Self::Redirect(store) => return Ok(store.insert(value)?),
            Self::Inline(tree) => tree,
        };
        if tree.len() < policy.promote_above || tree.contains(&value) {
            return Ok(tree.insert(value, ()));
        }

        let mut store = policy.stores.create(policy.comparator.clone())?;
        let filled = tree
            .keys()
            .cloned()
            .chain(std::iter::once(value))
            .try_for_each(|value| store.insert(value).map(drop));
        if let Err(error) = filled {
            if let Err(close_error) = store.close() {
                warn!(
                    "table {}: failed to close abandoned store {}: {close_error}",
                    policy.table,
                    store.id()
                );
            }
            return Err(error.into());
        }

        debug!(
            "table {}: moved {} values into {} store {}",
            policy.table,
            tree.len() + 1,
            policy.stores.backend(),
            store.id()
        );
        counter!(DUPLICATE_PROMOTIONS).increment(1);
        *self = Self::Redirect(store);
        Ok(true)
    }

    /// Removes `value`, moving the group back inline if it shrinks below the
    /// policy's limit.  Returns `false` if the value was not present.
    ///
    /// Demotion reads the whole group before touching it, so a failing store
    /// leaves the group unchanged.
    pub(crate) fn remove(
        &mut self,
        value: &V,
        policy: &DuplicatePolicy<V>,
    ) -> Result<bool, IndexError> {
        let store = match self {
            Self::Inline(tree) => return Ok(tree.remove(value).is_some()),
            Self::Redirect(store) => store,
        };
        let remaining = store.len()?.saturating_sub(1);
        if remaining >= policy.demote_below || !store.contains(value)? {
            return Ok(store.remove(value)?);
        }

        let mut tree = OrderedTree::new(policy.comparator.clone());
        let mut browser = store.browse(BrowseStart::First)?;
        while let Some(next) = browser.next()? {
            if (policy.comparator)(&next, value) != Ordering::Equal {
                tree.insert(next, ());
            }
        }
        drop(browser);

        let id = store.id();
        if let Err(error) = store.close() {
            warn!("table {}: failed to close demoted store {id}: {error}", policy.table);
        }
        debug!("table {}: moved {} values out of store {id}", policy.table, tree.len());
        counter!(DUPLICATE_DEMOTIONS).increment(1);
        *self = Self::Inline(tree);
        Ok(true)
    }

    /// Whether the group holds a value greater than or equal to `value`.
    pub(crate) fn has_greater_or_equal(&self, value: &V) -> Result<bool, IndexError> {
        match self {
            Self::Inline(tree) => Ok(tree.find_greater_or_equal(value).is_some()),
            Self::Redirect(store) => Ok(store
                .browse(BrowseStart::Before(value))?
                .next()?
                .is_some()),
        }
    }

    /// Whether the group holds a value less than or equal to `value`.
    pub(crate) fn has_less_or_equal(&self, value: &V) -> Result<bool, IndexError> {
        match self {
            Self::Inline(tree) => Ok(tree.find_less_or_equal(value).is_some()),
            Self::Redirect(store) => Ok(store
                .browse(BrowseStart::After(value))?
                .previous()?
                .is_some()),
        }
    }

    /// Releases the secondary store, if any.
    pub(crate) fn close(&mut self) -> Result<(), IndexError> {
        match self {
            Self::Inline(_) => Ok(()),
            Self::Redirect(store) => Ok(store.close()?),
        }
    }
}
