//! The master table: entries by identifier.
//!
//! Every directory entry is stored once, in the master table, under a numeric
//! identifier; the attribute indices map attribute values to these
//! identifiers.  [`MasterTable`] allocates the identifiers, stores the
//! entries, and keeps a few string properties alongside them.
//!
//! A master table opened with a [path](MasterTableConfig::path) saves
//! itself to a snapshot file on [`sync`](MasterTable::sync) and
//! [`close`](MasterTable::close), and loads that snapshot when it is opened
//! again.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Cursor as IoCursor, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use binrw::{BinRead, BinWrite};
use dirindex_types::comparator::natural;
use dirindex_types::config::MasterTableConfig;
use metrics::{counter, histogram};
use tracing::{debug, info};

use crate::codec::{Codec, U64Codec};
use crate::error::{DecodeError, IndexError};
use crate::metrics::{SNAPSHOT_BYTES, SNAPSHOT_LOADS, SNAPSHOT_WRITES};
use crate::table::{Table, TableCursor};
use crate::tree::format::check_payload_len;
use crate::tree::TreeSerializer;

pub mod format;


use format::{Property, Snapshot, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};

/// Entries of type `V` by identifier, with an identifier allocator.
///
/// Identifiers start at 1.  [`get_next_id`](Self::get_next_id) may be called
/// concurrently through a shared reference; everything that modifies entries
/// takes `&mut self`.
pub struct MasterTable<V> {
    table: Table<u64, V>,
    /// Last identifier handed out, or 0 if none.
    sequence: AtomicU64,
    properties: RwLock<BTreeMap<String, String>>,
    path: Option<PathBuf>,
    serializer: TreeSerializer<u64, V>,
}

impl<V> MasterTable<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a master table that lives only in memory.
    pub fn in_memory<C>(name: &str, codec: C) -> Result<Self, IndexError>
    where
        C: Codec<V> + 'static,
    {
        Self::open(&MasterTableConfig::new(name), codec)
    }

    /// Opens the master table described by `config`, encoding entries with
    /// `codec` in snapshots.
    ///
    /// If `config` names a snapshot file that exists, the table starts out
    /// with its contents; otherwise it starts out empty.
    pub fn open<C>(config: &MasterTableConfig, codec: C) -> Result<Self, IndexError>
    where
        C: Codec<V> + 'static,
    {
        let mut master = Self {
            table: Table::new(&config.name, natural(), None, false)?,
            sequence: AtomicU64::new(0),
            properties: RwLock::new(BTreeMap::new()),
            path: config.path().map(Path::to_path_buf),
            serializer: TreeSerializer::new(natural(), U64Codec, codec),
        };
        if let Some(path) = master.path.clone() {
            match fs::read(&path) {
                Ok(bytes) => master.load(&bytes)?,
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    info!(
                        "no snapshot for master table {} at {}, starting empty",
                        config.name,
                        path.display()
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(master)
    }

    fn load(&mut self, bytes: &[u8]) -> Result<(), IndexError> {
        let mut reader = IoCursor::new(bytes);
        let snapshot = Snapshot::read(&mut reader)
            .map_err(|error| DecodeError::from_binrw(error, "master table snapshot"))?;
        if reader.position() as usize != bytes.len() {
            return Err(DecodeError::Malformed("trailing bytes after snapshot".into()).into());
        }

        let mut properties = BTreeMap::new();
        for property in snapshot.properties {
            let name = String::from_utf8(property.name)
                .map_err(|error| DecodeError::Codec(error.to_string()))?;
            let value = String::from_utf8(property.value)
                .map_err(|error| DecodeError::Codec(error.to_string()))?;
            properties.insert(name, value);
        }
        let entries = self.serializer.deserialize(&snapshot.entries)?;

        // A snapshot never hands out an identifier it already stores.
        let highest = entries.last().map_or(0, |id| *entries.key(id));
        let sequence = snapshot.sequence.max(highest);

        debug!(
            "loaded master table {} with {} entries, sequence {sequence}",
            self.table.name(),
            entries.len()
        );
        self.table.load_unique(entries)?;
        *self.sequence.get_mut() = sequence;
        *self
            .properties
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = properties;
        counter!(SNAPSHOT_LOADS).increment(1);
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    /// The snapshot file, if the table has one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Allocates a new identifier.  Safe to call from many threads at once;
    /// no two calls return the same identifier.
    ///
    /// Fails once `u64::MAX` has been handed out or stored.
    pub fn get_next_id(&self) -> Result<u64, IndexError> {
        match self
            .sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
        {
            Ok(previous) => Ok(previous + 1),
            Err(_) => Err(IndexError::IdsExhausted(self.name().to_string())),
        }
    }

    /// The last identifier allocated, or 0 if none has been.
    pub fn get_current_id(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: u64) -> Result<Option<&V>, IndexError> {
        self.table.get(&id)
    }

    /// Stores `entry` under `id`, replacing any entry already there.
    ///
    /// The allocator never hands out `id` afterward, nor any identifier
    /// below it.  Storing under `u64::MAX` leaves nothing to allocate.
    pub fn put(&mut self, id: u64, entry: V) -> Result<(), IndexError> {
        self.table.put(id, entry)?;
        self.sequence.fetch_max(id, Ordering::SeqCst);
        Ok(())
    }

    /// Deletes the entry stored under `id`.  Returns whether there was one.
    pub fn delete(&mut self, id: u64) -> Result<bool, IndexError> {
        self.table.remove(&id)
    }

    /// Number of entries.
    pub fn count(&self) -> usize {
        self.table.count()
    }

    /// Returns a cursor over `(id, entry)` tuples in identifier order.
    pub fn cursor(&self) -> TableCursor<'_, u64, V> {
        self.table.cursor()
    }

    pub fn get_property(&self, name: &str) -> Option<String> {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn set_property(&self, name: &str, value: &str) {
        self.properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());
    }

    /// Writes the table to its snapshot file, if it has one.
    ///
    /// The snapshot is first written in full to a temporary file next to the
    /// snapshot, which then replaces the old snapshot, so a failed sync
    /// leaves the previous snapshot intact.
    pub fn sync(&self) -> Result<(), IndexError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let Some(tree) = self.table.unique_tree() else {
            return Err(IndexError::configuration(
                self.name(),
                "a master table cannot allow duplicate keys",
            ));
        };

        let properties = self
            .properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, value)| {
                check_payload_len(name.len(), "property name")?;
                check_payload_len(value.len(), "property value")?;
                Ok(Property {
                    name: name.clone().into_bytes(),
                    value: value.clone().into_bytes(),
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;
        check_payload_len(properties.len(), "property list")?;
        let entries = self.serializer.serialize(tree)?;
        check_payload_len(entries.len(), "serialized entry tree")?;
        let snapshot = Snapshot {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            sequence: self.get_current_id(),
            properties,
            entries,
        };
        let mut writer = IoCursor::new(Vec::new());
        snapshot
            .write(&mut writer)
            .map_err(|error| IndexError::Encode(error.to_string()))?;
        let bytes = writer.into_inner();

        let mut temp = OsString::from(path.as_os_str());
        temp.push(".mut");
        let temp = PathBuf::from(temp);
        let mut file = File::create(&temp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp, path)?;

        counter!(SNAPSHOT_WRITES).increment(1);
        histogram!(SNAPSHOT_BYTES).record(bytes.len() as f64);
        debug!(
            "wrote {} byte snapshot of master table {} to {}",
            bytes.len(),
            self.name(),
            path.display()
        );
        Ok(())
    }

    /// Syncs the table and releases it.
    pub fn close(self) -> Result<(), IndexError> {
        self.sync()?;
        self.table.close()
    }
}
