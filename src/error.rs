use std::io;

use thiserror::Error;

/// Everything that can go wrong while encoding or decoding a row image
/// through the row codec collaborator.
///
/// Codec errors are always fatal to the enclosing transaction: the caller
/// decides whether that means aborting the statement or the whole session,
/// the undo log itself never retries.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("row image cannot be encoded: {0}")]
    Encode(String),

    #[error("stored page could not be decoded: {0}")]
    Decode(String),

    #[error("stored page failed checksum verification")]
    ChecksumMismatch,
}

/// Errors surfaced by [`crate::log::UndoLog`].
///
/// Per the collaborator contract, scratch-file I/O failures are fatal to the
/// owning session and codec failures are fatal to the enclosing transaction.
/// Neither is retried internally; both simply propagate to the caller.
#[derive(Debug, Error)]
pub enum UndoLogError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("scratch file I/O failed: {0}")]
    ScratchIo(#[from] io::Error),

    #[error("operation requires a stored record, but the record is memory-resident")]
    NotStored,

    #[error("record is not eligible for spill")]
    NotEligible,

    #[error("pop_last called on an empty undo log")]
    Empty,
}

pub type Result<T> = std::result::Result<T, UndoLogError>;
