//! Typed binary codec for values and frames.
//!
//! Everything multibyte is little-endian. Integers travel as IEEE-754
//! doubles for compatibility with existing box files.

mod frame;
mod reader;
mod writer;

pub use self::frame::{Frame, Key, MAX_STRING_KEY_LENGTH};
pub(crate) use self::frame::MIN_FRAME_LENGTH;
pub use self::reader::BinaryReader;
pub use self::writer::BinaryWriter;

/// Wire tags for built-in values. Tags 12..=31 are reserved, user types
/// start at 32.
pub(crate) mod tag {
    pub const NULL: u8 = 0;
    pub const INT: u8 = 1;
    pub const DOUBLE: u8 = 2;
    pub const BOOL: u8 = 3;
    pub const STRING: u8 = 4;
    pub const BYTE_LIST: u8 = 5;
    pub const INT_LIST: u8 = 6;
    pub const DOUBLE_LIST: u8 = 7;
    pub const BOOL_LIST: u8 = 8;
    pub const STRING_LIST: u8 = 9;
    pub const LIST: u8 = 10;
    pub const MAP: u8 = 11;
}
