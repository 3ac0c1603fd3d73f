use std::collections::BTreeMap;

use crate::boxes::HiveBox;
use crate::codec::{Frame, Key};
use crate::error::Result;
use crate::value::Value;

/// A batch of buffered mutations on one box.
///
/// Nothing touches the disk, the index or any subscriber until
/// [`commit`](Transaction::commit), which appends every buffered frame in a
/// single write. Reads inside the transaction see its own mutations first.
/// Dropping an uncommitted transaction discards it. The transaction borrows
/// the box mutably, so two transactions can never overlap.
pub struct Transaction<'a> {
    target: &'a mut HiveBox,
    frames: Vec<Frame>,
    /// Buffered view of mutated keys; `None` marks a buffered deletion.
    overlay: BTreeMap<Key, Option<Value>>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(target: &'a mut HiveBox) -> Transaction<'a> {
        Transaction {
            target,
            frames: Vec::new(),
            overlay: BTreeMap::new(),
        }
    }

    /// Looks up `key`, seeing buffered mutations before the box.
    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        match self.overlay.get(&key) {
            Some(Some(value)) => Ok(Some(value.clone())),
            Some(None) => Ok(None),
            None => self.target.get(key),
        }
    }

    /// Buffers a write of `value` under `key`.
    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        // Validating here keeps a doomed frame out of the batch, so commit
        // stays all-or-nothing.
        key.validate()?;
        let value = value.into();
        self.frames.push(Frame::put(key.clone(), value.clone()));
        self.overlay.insert(key, Some(value));
        Ok(())
    }

    /// Buffers a deletion of `key`. Unknown keys are a no-op.
    pub fn delete(&mut self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let known = match self.overlay.get(&key) {
            Some(Some(_)) => true,
            Some(None) => false,
            None => self.target.contains_in_memory(&key),
        };
        if !known {
            return Ok(());
        }
        self.frames.push(Frame::tombstone(key.clone()));
        self.overlay.insert(key, None);
        Ok(())
    }

    /// Number of buffered frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Writes the whole batch, applies it to the box and notifies
    /// subscribers in mutation order.
    pub fn commit(self) -> Result<()> {
        self.target.write_batch(self.frames)
    }
}
