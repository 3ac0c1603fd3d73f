#![deny(clippy::all, missing_docs)]
//! An embedded, file-backed key-value store.
//!
//! Data lives in named [boxes](HiveBox), each persisted as an append-only
//! log of length-prefixed, CRC-checked frames and indexed in memory by a
//! skip list that also answers positional lookups. Boxes can cache values
//! eagerly or fetch them lazily from disk, encrypt values with AES-256,
//! recover from torn writes on open, and compact their log when too many
//! dead frames accumulate.

#[macro_use]
extern crate failure_derive;

#[macro_use]
extern crate log;

pub use backend::{FileBackend, StorageBackend};
pub use boxes::{BoxOptions, CompactionStrategy, HiveBox, Transaction};
pub use codec::{BinaryReader, BinaryWriter, Frame, Key, MAX_STRING_KEY_LENGTH};
pub use crypto::Cipher;
pub use error::{HiveError, Result};
pub use keystore::{BoxEntry, Keystore};
pub use notifier::{ChangeEvent, ChangeNotifier};
pub use registry::{TypeAdapter, TypeRegistry, MAX_TYPE_ID};
pub use skiplist::{IndexableSkipList, Iter as SkipListIter};
pub use value::{CustomValue, Value};

mod backend;
mod boxes;
mod codec;
mod crc;
mod crypto;
mod keystore;
mod notifier;
mod registry;
mod skiplist;
mod value;

/// Error module.
pub mod error;
