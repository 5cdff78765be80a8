//! Index engine metrics.
//!
//! The constants defined in this module are the names of metrics that tables
//! maintain via [`metrics`] crate interfaces.  The secondary stores keep their
//! own metrics, in [`dirindex_storage::metrics`].
use ::metrics::{describe_counter, describe_histogram};

/// Total number of duplicate groups moved from inline storage into a
/// secondary store.
pub const DUPLICATE_PROMOTIONS: &str = "index.total_duplicate_promotions";

/// Total number of duplicate groups moved from a secondary store back inline.
pub const DUPLICATE_DEMOTIONS: &str = "index.total_duplicate_demotions";

/// Total number of master table snapshots written.
pub const SNAPSHOT_WRITES: &str = "index.total_snapshot_writes";

/// Size of written master table snapshots, in bytes.
pub const SNAPSHOT_BYTES: &str = "index.snapshot_bytes";

/// Total number of master table snapshots loaded.
pub const SNAPSHOT_LOADS: &str = "index.total_snapshot_loads";

/// Adds descriptions for the metrics we expose.
pub(crate) fn describe_index_metrics() {
    describe_counter!(
        DUPLICATE_PROMOTIONS,
        "total number of duplicate groups moved into a secondary store"
    );
    describe_counter!(
        DUPLICATE_DEMOTIONS,
        "total number of duplicate groups moved back inline"
    );
    describe_counter!(SNAPSHOT_WRITES, "total number of master table snapshots written");
    describe_histogram!(SNAPSHOT_BYTES, "size of master table snapshots in bytes");
    describe_counter!(SNAPSHOT_LOADS, "total number of master table snapshots loaded");
}
