use std::collections::BTreeMap;
use std::sync::Arc;

use crate::codec::{BinaryReader, BinaryWriter};
use crate::error::{HiveError, Result};
use crate::value::CustomValue;

/// Wire tags 0..=31 belong to built-in values, user adapters start here.
pub(crate) const RESERVED_TAGS: u8 = 32;

/// Highest type id a user may register.
pub const MAX_TYPE_ID: u8 = 223;

/// Serializer for a user-defined value type.
///
/// Adapters are registered under a type id in `0..=223` and dispatched by
/// the tag byte on read and by a runtime type check on write.
pub trait TypeAdapter: Send + Sync {
    /// Reads one value from the stream.
    fn read(&self, reader: &mut BinaryReader<'_>) -> Result<Arc<dyn CustomValue>>;

    /// Writes `value` to the stream.
    fn write(&self, writer: &mut BinaryWriter<'_>, value: &dyn CustomValue) -> Result<()>;

    /// Whether this adapter serializes `value`.
    fn handles(&self, value: &dyn CustomValue) -> bool;
}

/// Registry of type adapters, optionally chained to a parent.
///
/// Lookups that miss fall through to the parent, which lets one shared
/// registry back many boxes while a box adds its own types.
#[derive(Default)]
pub struct TypeRegistry {
    adapters: BTreeMap<u8, Arc<dyn TypeAdapter>>,
    parent: Option<Arc<TypeRegistry>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> TypeRegistry {
        TypeRegistry::default()
    }

    /// Creates a registry that falls back to `parent` on missed lookups.
    pub fn with_parent(parent: Arc<TypeRegistry>) -> TypeRegistry {
        TypeRegistry {
            adapters: BTreeMap::new(),
            parent: Some(parent),
        }
    }

    /// Registers `adapter` under `type_id`.
    ///
    /// # Errors
    ///
    /// Returns [`HiveError::AlreadyRegistered`] when the id is taken, here
    /// or in the parent chain; ids above [`MAX_TYPE_ID`] are rejected as
    /// [`HiveError::UnsupportedOperation`].
    pub fn register(&mut self, type_id: u8, adapter: Arc<dyn TypeAdapter>) -> Result<()> {
        if type_id > MAX_TYPE_ID {
            return Err(HiveError::UnsupportedOperation(format!(
                "type id {} is out of range, the maximum is {}",
                type_id, MAX_TYPE_ID
            )));
        }
        let tag = type_id + RESERVED_TAGS;
        if self.find_by_tag(tag).is_some() {
            return Err(HiveError::AlreadyRegistered(type_id));
        }
        self.adapters.insert(tag, adapter);
        Ok(())
    }

    /// Looks up the adapter for a wire tag, consulting the parent on miss.
    pub fn find_by_tag(&self, tag: u8) -> Option<Arc<dyn TypeAdapter>> {
        match self.adapters.get(&tag) {
            Some(adapter) => Some(Arc::clone(adapter)),
            None => self
                .parent
                .as_ref()
                .and_then(|parent| parent.find_by_tag(tag)),
        }
    }

    /// Finds the adapter that serializes `value` along with its wire tag.
    ///
    /// The scan is linear over registered adapters in ascending id order;
    /// the first match wins. Misses fall through to the parent.
    pub fn find_by_value(&self, value: &dyn CustomValue) -> Option<(u8, Arc<dyn TypeAdapter>)> {
        for (tag, adapter) in &self.adapters {
            if adapter.handles(value) {
                return Some((*tag, Arc::clone(adapter)));
            }
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.find_by_value(value))
    }
}
