//! Implementation of the secondary store APIs ([`StoreFactory`],
//! [`OrderedStore`], and [`StoreBrowser`]) using memory.
//!
//! This is the backend used by in-memory tables and by tests.  It keeps each
//! store's values in a sorted vector, so insertion is linear in the store's
//! size.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use dirindex_types::Comparator;
use metrics::counter;
use tracing::trace;

use crate::metrics::{
    describe_store_metrics, STORES_CLOSED, STORES_CREATED, VALUES_INSERTED, VALUES_REMOVED,
};
use crate::{BrowseStart, OrderedStore, StoreBrowser, StoreError, StoreFactory, StoreId};

const BACKEND: &str = "memory";


/// Creates [`MemoryStore`]s.
#[derive(Debug)]
pub struct MemoryStoreFactory {
    /// A counter to get unique identifiers for stores.
    next_id: Arc<AtomicU64>,
}

impl MemoryStoreFactory {
    /// Instantiates a new factory.
    ///
    /// ## Parameters
    /// - `next_id`: A counter to get unique identifiers for stores.  Factories
    ///   that share the counter never hand out the same [`StoreId`].
    pub fn new(next_id: Arc<AtomicU64>) -> Self {
        describe_store_metrics();
        Self { next_id }
    }
}

impl Default for MemoryStoreFactory {
    fn default() -> Self {
        Self::new(Arc::new(AtomicU64::new(1)))
    }
}

impl<V> StoreFactory<V> for MemoryStoreFactory
where
    V: Clone + Send + Sync + 'static,
{
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn create(&self, comparator: Comparator<V>) -> Result<Box<dyn OrderedStore<V>>, StoreError> {
        let id = StoreId(self.next_id.fetch_add(1, AtomicOrdering::Relaxed));
        counter!(STORES_CREATED).increment(1);
        trace!("created memory store {id}");
        Ok(Box::new(MemoryStore::new(id, comparator)))
    }
}

/// An ordered set of values held in memory.
pub struct MemoryStore<V> {
    id: StoreId,
    comparator: Comparator<V>,
    /// Sorted by `comparator`, without duplicates.
    values: Vec<V>,
    closed: bool,
}

impl<V> MemoryStore<V> {
    pub fn new(id: StoreId, comparator: Comparator<V>) -> Self {
        Self {
            id,
            comparator,
            values: Vec::new(),
            closed: false,
        }
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed(self.id))
        } else {
            Ok(())
        }
    }

    fn search(&self, value: &V) -> Result<usize, usize> {
        self.values
            .binary_search_by(|probe| (self.comparator)(probe, value))
    }

    /// Index of the first value that is not less than `value`.
    fn lower_bound(&self, value: &V) -> usize {
        self.values
            .partition_point(|probe| (self.comparator)(probe, value) == Ordering::Less)
    }

    /// Index of the first value that is greater than `value`.
    fn upper_bound(&self, value: &V) -> usize {
        self.values
            .partition_point(|probe| (self.comparator)(probe, value) != Ordering::Greater)
    }
}

impl<V> OrderedStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn id(&self) -> StoreId {
        self.id
    }

    fn insert(&mut self, value: V) -> Result<bool, StoreError> {
        self.check_open()?;
        match self.search(&value) {
            Ok(_) => Ok(false),
            Err(index) => {
                self.values.insert(index, value);
                counter!(VALUES_INSERTED).increment(1);
                Ok(true)
            }
        }
    }

    fn remove(&mut self, value: &V) -> Result<bool, StoreError> {
        self.check_open()?;
        match self.search(value) {
            Ok(index) => {
                self.values.remove(index);
                counter!(VALUES_REMOVED).increment(1);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    fn contains(&self, value: &V) -> Result<bool, StoreError> {
        self.check_open()?;
        Ok(self.search(value).is_ok())
    }

    fn len(&self) -> Result<usize, StoreError> {
        self.check_open()?;
        Ok(self.values.len())
    }

    fn browse<'a>(
        &'a self,
        start: BrowseStart<'_, V>,
    ) -> Result<Box<dyn StoreBrowser<V> + 'a>, StoreError> {
        self.check_open()?;
        let gap = match start {
            BrowseStart::First => 0,
            BrowseStart::Last => self.values.len(),
            BrowseStart::Before(value) => self.lower_bound(value),
            BrowseStart::After(value) => self.upper_bound(value),
        };
        Ok(Box::new(MemoryBrowser {
            values: &self.values,
            gap,
        }))
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if !self.closed {
            self.closed = true;
            self.values = Vec::new();
            counter!(STORES_CLOSED).increment(1);
            trace!("closed memory store {}", self.id);
        }
        Ok(())
    }
}

/// Browser over a [`MemoryStore`].
///
/// `gap` is the index of the value that [`next`](StoreBrowser::next) would
/// return; the value [`previous`](StoreBrowser::previous) would return sits
/// at `gap - 1`.
struct MemoryBrowser<'a, V> {
    values: &'a [V],
    gap: usize,
}

impl<V> StoreBrowser<V> for MemoryBrowser<'_, V>
where
    V: Clone,
{
    fn next(&mut self) -> Result<Option<V>, StoreError> {
        match self.values.get(self.gap) {
            Some(value) => {
                self.gap += 1;
                Ok(Some(value.clone()))
            }
            None => Ok(None),
        }
    }

    fn previous(&mut self) -> Result<Option<V>, StoreError> {
        if self.gap == 0 {
            return Ok(None);
        }
        self.gap -= 1;
        Ok(Some(self.values[self.gap].clone()))
    }
}
