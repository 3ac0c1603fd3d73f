use std::io;

/// Result type for hivebox.
pub type Result<T> = std::result::Result<T, HiveError>;

/// Error type for hivebox.
#[derive(Debug, Fail)]
pub enum HiveError {
    /// IO error.
    #[fail(display = "{}", _0)]
    Io(#[cause] io::Error),

    /// A frame failed its CRC check, ended early, or could not be decrypted.
    #[fail(display = "corrupt frame: {}", _0)]
    CorruptFrame(String),

    /// The box file is damaged and crash recovery was disabled.
    #[fail(display = "box is corrupted and crash recovery is disabled")]
    CorruptBox,

    /// A value tag has no registered adapter.
    #[fail(display = "unknown type: {}", _0)]
    UnknownType(String),

    /// A type id was registered twice.
    #[fail(display = "type id {} is already registered", _0)]
    AlreadyRegistered(u8),

    /// Another process holds the lock file of this box.
    #[fail(display = "box \"{}\" is locked by another process", _0)]
    BoxLocked(String),

    /// Operation on a box that has been closed.
    #[fail(display = "box has already been closed")]
    BoxClosed,

    /// Operation not available for this kind of box.
    #[fail(display = "unsupported operation: {}", _0)]
    UnsupportedOperation(String),

    /// A key is not storable (wrong length or non-ASCII).
    #[fail(display = "invalid key: {}", _0)]
    InvalidKey(String),
}

impl HiveError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> HiveError {
        HiveError::CorruptFrame(msg.into())
    }
}

impl From<io::Error> for HiveError {
    fn from(err: io::Error) -> HiveError {
        HiveError::Io(err)
    }
}
