//! Secondary store metrics.
//!
//! The constants defined in this module are the names of metrics that the
//! backends maintain via [`metrics`] crate interfaces.
use ::metrics::describe_counter;

/// Total number of secondary stores created.
pub const STORES_CREATED: &str = "store.total_stores_created";

/// Total number of secondary stores closed.
pub const STORES_CLOSED: &str = "store.total_stores_closed";

/// Total number of values inserted into secondary stores.
pub const VALUES_INSERTED: &str = "store.total_values_inserted";

/// Total number of values removed from secondary stores.
pub const VALUES_REMOVED: &str = "store.total_values_removed";

/// Adds descriptions for the metrics we expose.
pub(crate) fn describe_store_metrics() {
    describe_counter!(STORES_CREATED, "total number of secondary stores created");
    describe_counter!(STORES_CLOSED, "total number of secondary stores closed");
    describe_counter!(
        VALUES_INSERTED,
        "total number of values inserted into secondary stores"
    );
    describe_counter!(
        VALUES_REMOVED,
        "total number of values removed from secondary stores"
    );
}
