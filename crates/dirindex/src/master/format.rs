//! # Master table snapshot format
//!
//! A snapshot is a single [`Snapshot`] record, serialized with [`mod@binrw`]
//! in big-endian byte order.  The table's entries are embedded as the output
//! of a [`TreeSerializer`](crate::tree::TreeSerializer), keyed by entry
//! identifier.

use binrw::binrw;

/// Magic number at the start of every snapshot.  `DI` stands for "dirindex",
/// `MT` for "master table".
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"DIMT";

/// Current snapshot version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A saved master table.
///
/// Serialized and deserialized automatically with [`mod@binrw`].
#[binrw]
#[brw(big)]
#[derive(Debug)]
pub struct Snapshot {
    /// Must be [`SNAPSHOT_MAGIC`].
    #[br(assert(magic == SNAPSHOT_MAGIC, "snapshot has bad magic"))]
    pub magic: [u8; 4],

    /// Must be [`SNAPSHOT_VERSION`].
    #[br(assert(version == SNAPSHOT_VERSION, "unsupported snapshot version"))]
    pub version: u32,

    /// Last identifier handed out by the table.
    pub sequence: u64,

    #[bw(calc(properties.len() as u32))]
    pub n_properties: u32,

    /// Table properties, in name order.
    #[br(count = n_properties)]
    pub properties: Vec<Property>,

    #[bw(calc(entries.len() as u32))]
    pub entries_len: u32,

    /// Serialized entry tree.
    #[br(count = entries_len)]
    pub entries: Vec<u8>,
}

/// A name-value property, both UTF-8.
#[binrw]
#[brw(big)]
#[derive(Debug)]
pub struct Property {
    #[bw(calc(name.len() as u32))]
    pub name_len: u32,

    #[br(count = name_len)]
    pub name: Vec<u8>,

    #[bw(calc(value.len() as u32))]
    pub value_len: u32,

    #[br(count = value_len)]
    pub value: Vec<u8>,
}
