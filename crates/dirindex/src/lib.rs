//! An ordered, duplicate-key index engine for directory servers.
//!
//! A directory server finds entries through per-attribute indices.  This
//! crate provides the building blocks of such an index:
//!
//! * [`OrderedTree`], an AVL tree whose nodes are also threaded into an
//!   in-order list, so that scans cost O(1) per step.
//!
//! * [`TreeSerializer`], which saves a tree's exact shape to bytes and loads
//!   it back without re-inserting anything.
//!
//! * [`Table`], a key-to-value index that optionally allows many values per
//!   key.  Small groups of values stay inline in a tree; large ones move into
//!   a secondary store obtained from a
//!   [`StoreFactory`](dirindex_storage::StoreFactory).
//!
//! * [`TableCursor`], a bidirectional cursor over a table's `(key, value)`
//!   tuples that can be positioned before or after any key or tuple.
//!
//! * [`MasterTable`], which allocates entry identifiers and stores entries
//!   by identifier, with an optional on-disk snapshot.
//!
//! Keys and values are only ever compared through a caller-supplied
//! [`Comparator`].
//!
//! # Example
//!
//! ```
//! use dirindex::{comparator::natural, Cursor, Table};
//!
//! let mut table = Table::new("objectClass", natural::<String>(), Some(natural::<u64>()), true)?;
//! table.put("person".to_string(), 3)?;
//! table.put("person".to_string(), 1)?;
//! table.put("top".to_string(), 1)?;
//! assert_eq!(table.count(), 3);
//! assert_eq!(table.count_key(&"person".to_string())?, 2);
//!
//! let mut cursor = table.cursor();
//! let mut ids = Vec::new();
//! while cursor.next()? {
//!     ids.push(cursor.get()?.value);
//! }
//! assert_eq!(ids, [1, 3, 1]);
//! # Ok::<(), dirindex::IndexError>(())
//! ```

pub mod codec;
pub mod cursor;
pub mod error;
pub mod master;
pub mod metrics;
pub mod table;
pub mod tree;


pub use cursor::{Cursor, Tuple};
pub use error::{DecodeError, IndexError};
pub use master::MasterTable;
pub use table::{Table, TableCursor, ValueCursor};
pub use tree::{NodeId, OrderedTree, TreeCursor, TreeSerializer};

pub use dirindex_storage as storage;
pub use dirindex_types::{comparator, config, Comparator};
