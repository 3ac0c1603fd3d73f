//! Storage backends for boxes.

mod file;
mod frame_io;

pub use self::file::FileBackend;

use crate::codec::Frame;
use crate::error::Result;
use crate::keystore::Keystore;
use crate::registry::TypeRegistry;
use crate::value::Value;

/// Persistence layer behind a box.
///
/// The file-backed implementation is [`FileBackend`]; other media only need
/// this trait.
pub trait StorageBackend: Send {
    /// Scans the log into `keystore` and settles crash recovery.
    ///
    /// # Errors
    ///
    /// [`HiveError::CorruptBox`] when damage is found and `crash_recovery`
    /// is off.
    ///
    /// [`HiveError::CorruptBox`]: crate::HiveError::CorruptBox
    fn initialize(
        &mut self,
        registry: &TypeRegistry,
        keystore: &mut Keystore,
        lazy: bool,
        crash_recovery: bool,
    ) -> Result<()>;

    /// Reads and decodes the value of the frame at `offset`.
    fn read_value(&self, registry: &TypeRegistry, offset: u64, length: u32)
        -> Result<Option<Value>>;

    /// Appends `frames` in one write, stamping offsets and lengths.
    ///
    /// On failure the log is cut back to its previous end and no frame is
    /// stamped.
    fn write_frames(&mut self, registry: &TypeRegistry, frames: &mut [Frame]) -> Result<()>;

    /// Rewrites the log with only the live frames of `keystore`, updating
    /// its offsets.
    fn compact(&mut self, keystore: &mut Keystore) -> Result<()>;

    /// Truncates the log to nothing.
    fn clear(&mut self) -> Result<()>;

    /// Forces written frames to durable storage.
    fn flush(&mut self) -> Result<()>;

    /// Current length of the log in bytes.
    fn file_len(&self) -> Result<u64>;

    /// Releases handles and the inter-process lock.
    fn close(self: Box<Self>) -> Result<()>;

    /// Closes the backend and deletes its files.
    fn delete_from_disk(self: Box<Self>) -> Result<()>;
}
