//! The user-facing box: an ordered, persistent key-value map.

mod txn;

pub use self::txn::Transaction;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crossbeam::channel::Receiver;

use crate::backend::{FileBackend, StorageBackend};
use crate::codec::{Frame, Key};
use crate::error::{HiveError, Result};
use crate::keystore::Keystore;
use crate::notifier::{ChangeEvent, ChangeNotifier};
use crate::registry::TypeRegistry;
use crate::value::Value;

/// Decides after each mutation whether the log should be compacted, given
/// the total number of frames on disk and how many of them are dead.
pub type CompactionStrategy = Box<dyn Fn(usize, usize) -> bool + Send + Sync>;

fn default_compaction_strategy() -> CompactionStrategy {
    Box::new(|_total, deleted| deleted > 60)
}

/// Configuration for opening a box.
pub struct BoxOptions {
    /// Serve values from disk instead of caching them in memory.
    pub lazy: bool,
    /// Truncate a damaged log tail instead of refusing to open.
    pub crash_recovery: bool,
    /// Encrypt values with AES-256 under this key.
    pub encryption_key: Option<[u8; 32]>,
    /// When to compact; the default fires past 60 dead frames.
    pub compaction_strategy: CompactionStrategy,
}

impl Default for BoxOptions {
    fn default() -> BoxOptions {
        BoxOptions {
            lazy: false,
            crash_recovery: true,
            encryption_key: None,
            compaction_strategy: default_compaction_strategy(),
        }
    }
}

/// A named, persistent key-value map backed by one append-only log file.
///
/// Mutations are write-through: the frame hits the disk first, then the
/// in-memory index, then subscribers. When the disk write fails, memory is
/// untouched and no event is emitted.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use hivebox::{BoxOptions, HiveBox, TypeRegistry, Value};
///
/// let registry = Arc::new(TypeRegistry::new());
/// let mut map = HiveBox::open("./data", "settings", BoxOptions::default(), registry).unwrap();
///
/// map.put("theme", "dark").unwrap();
/// assert_eq!(map.get("theme").unwrap(), Some(Value::Str("dark".into())));
/// ```
pub struct HiveBox {
    name: String,
    lazy: bool,
    backend: Box<dyn StorageBackend>,
    registry: Arc<TypeRegistry>,
    keystore: Keystore,
    notifier: ChangeNotifier,
    compaction_strategy: CompactionStrategy,
    open: bool,
}

impl HiveBox {
    /// Opens the box `name` under `dir`, creating it when missing.
    pub fn open(
        dir: impl AsRef<Path>,
        name: &str,
        options: BoxOptions,
        registry: Arc<TypeRegistry>,
    ) -> Result<HiveBox> {
        let backend = FileBackend::open(dir.as_ref(), name, options.encryption_key)?;
        HiveBox::with_backend(Box::new(backend), name, options, registry)
    }

    /// Opens a box on an already constructed backend.
    pub fn with_backend(
        mut backend: Box<dyn StorageBackend>,
        name: &str,
        options: BoxOptions,
        registry: Arc<TypeRegistry>,
    ) -> Result<HiveBox> {
        let mut keystore = Keystore::new();
        backend.initialize(&registry, &mut keystore, options.lazy, options.crash_recovery)?;

        Ok(HiveBox {
            name: name.to_owned(),
            lazy: options.lazy,
            backend,
            registry,
            keystore,
            notifier: ChangeNotifier::new(),
            compaction_strategy: options.compaction_strategy,
            open: true,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(HiveError::BoxClosed)
        }
    }

    /// Name of the box.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether values are served from disk.
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Whether the box accepts operations.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.keystore.len()
    }

    /// Whether the box holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keystore.is_empty()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.keystore.contains(&key.into())
    }

    /// Every live key in order.
    pub fn keys(&self) -> Vec<Key> {
        self.keystore.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Looks up `key`.
    ///
    /// Eager boxes answer from memory; lazy boxes read the frame from disk.
    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        self.ensure_open()?;
        let key = key.into();
        match self.keystore.get(&key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Some(value) => Ok(Some(value.clone())),
                None => self
                    .backend
                    .read_value(&self.registry, entry.offset, entry.length),
            },
        }
    }

    /// Looks up the value at `index` in key order, zero based.
    pub fn get_at(&self, index: usize) -> Result<Option<Value>> {
        self.ensure_open()?;
        match self.keystore.get_at(index) {
            None => Ok(None),
            Some((_, entry)) => match &entry.value {
                Some(value) => Ok(Some(value.clone())),
                None => self
                    .backend
                    .read_value(&self.registry, entry.offset, entry.length),
            },
        }
    }

    /// Every cached value in key order. Not available on lazy boxes.
    pub fn values(&self) -> Result<Vec<Value>> {
        self.ensure_open()?;
        self.reject_lazy("values")?;
        Ok(self
            .keystore
            .iter()
            .filter_map(|(_, entry)| entry.value.clone())
            .collect())
    }

    /// The whole box as an ordered map. Not available on lazy boxes.
    pub fn to_map(&self) -> Result<BTreeMap<Key, Value>> {
        self.ensure_open()?;
        self.reject_lazy("toMap")?;
        Ok(self
            .keystore
            .iter()
            .filter_map(|(key, entry)| entry.value.clone().map(|value| (key.clone(), value)))
            .collect())
    }

    fn reject_lazy(&self, operation: &str) -> Result<()> {
        if self.lazy {
            return Err(HiveError::UnsupportedOperation(format!(
                "{} needs cached values, which a lazy box does not keep",
                operation
            )));
        }
        Ok(())
    }

    /// Writes `value` under `key`.
    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.write_batch(vec![Frame::put(key.into(), value.into())])
    }

    /// Writes every pair in one batched append.
    ///
    /// Events are emitted in the order of `entries`.
    pub fn put_all(&mut self, entries: Vec<(Key, Value)>) -> Result<()> {
        self.write_batch(
            entries
                .into_iter()
                .map(|(key, value)| Frame::put(key, value))
                .collect(),
        )
    }

    /// Writes `value` under the next auto-generated integer key.
    #[allow(clippy::should_implement_trait)]
    pub fn add(&mut self, value: impl Into<Value>) -> Result<u32> {
        self.ensure_open()?;
        let key = self.keystore.auto_increment();
        self.write_batch(vec![Frame::put(key, value.into())])?;
        Ok(key)
    }

    /// Writes every value under consecutive auto-generated integer keys.
    pub fn add_all(&mut self, values: Vec<Value>) -> Result<Vec<u32>> {
        self.ensure_open()?;
        let mut keys = Vec::with_capacity(values.len());
        let mut frames = Vec::with_capacity(values.len());
        for value in values {
            let key = self.keystore.auto_increment();
            keys.push(key);
            frames.push(Frame::put(key, value));
        }
        self.write_batch(frames)?;
        Ok(keys)
    }

    /// Deletes `key`. Deleting an unknown key writes nothing.
    pub fn delete(&mut self, key: impl Into<Key>) -> Result<()> {
        self.delete_all(vec![key.into()])
    }

    /// Deletes every known key of `keys` in one batched append.
    ///
    /// Only keys that are present get a tombstone; unknown keys are
    /// skipped entirely.
    pub fn delete_all(&mut self, keys: Vec<Key>) -> Result<()> {
        self.ensure_open()?;
        let frames: Vec<Frame> = keys
            .into_iter()
            .filter(|key| self.keystore.contains(key))
            .map(Frame::tombstone)
            .collect();
        self.write_batch(frames)
    }

    /// Removes every key, truncating the file. Returns how many keys were
    /// removed.
    pub fn clear(&mut self) -> Result<usize> {
        self.ensure_open()?;
        self.backend.clear()?;
        let removed = self.keystore.clear();
        let count = removed.len();
        for key in removed {
            self.notifier.notify(&ChangeEvent {
                key,
                value: None,
                deleted: true,
            });
        }
        Ok(count)
    }

    /// Rewrites the log, dropping dead frames.
    pub fn compact(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.backend.compact(&mut self.keystore)
    }

    /// Subscribes to change events, optionally only for `key`.
    pub fn watch(&self, key: Option<Key>) -> Result<Receiver<ChangeEvent>> {
        self.ensure_open()?;
        self.notifier.watch(key)
    }

    /// Starts a transaction that buffers mutations until commit.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.ensure_open()?;
        Ok(Transaction::new(self))
    }

    /// Forces written frames to durable storage.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.backend.flush()
    }

    /// Closes the box, ending every watch stream.
    pub fn close(mut self) -> Result<()> {
        self.open = false;
        self.notifier.close();
        self.backend.close()
    }

    /// Closes the box and deletes its files.
    pub fn delete_from_disk(mut self) -> Result<()> {
        self.open = false;
        self.notifier.close();
        self.backend.delete_from_disk()
    }

    pub(crate) fn contains_in_memory(&self, key: &Key) -> bool {
        self.keystore.contains(key)
    }

    /// Appends `frames` in one write, then folds them into memory and
    /// notifies subscribers, then lets the compaction strategy run.
    pub(crate) fn write_batch(&mut self, mut frames: Vec<Frame>) -> Result<()> {
        self.ensure_open()?;
        if frames.is_empty() {
            return Ok(());
        }
        self.backend.write_frames(&self.registry, &mut frames)?;

        for frame in &frames {
            self.keystore.apply(frame, self.lazy);
            self.notifier.notify(&ChangeEvent {
                key: frame.key.clone(),
                value: frame.value.clone(),
                deleted: frame.deleted,
            });
        }

        let total = self.keystore.total_frames();
        let deleted = self.keystore.deleted_entries();
        if (self.compaction_strategy)(total, deleted) {
            debug!(
                "compaction strategy fired for box {:?} at {} frames, {} dead",
                self.name, total, deleted
            );
            self.compact()?;
        }
        Ok(())
    }
}
