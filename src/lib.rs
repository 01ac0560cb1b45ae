//! Per-session undo log with adaptive memory/disk spill.
//!
//! Appends are O(1) amortized and stay fully memory-resident until the
//! owning session's `max_memory_undo` budget is exceeded, at which point
//! the oldest eligible records stream out to a scratch file. Pops are
//! strict LIFO and transparently rehydrate a window of disk-resident
//! records around whichever one is needed next. See [`UndoLog`] for the
//! entry point.

mod codec;
mod coding;
mod crc32;
mod error;
mod log;
mod logger;
mod record;
mod scratch;
mod session;

#[cfg(test)]
mod test_support;

pub use codec::{LengthPrefixedCodec, RowCodec, RowImage, TableRef, UndoKind};
pub use error::{CodecError, Result, UndoLogError};
pub use log::{UndoLog, UndoLogStats};
pub use logger::{Logger, NullLogger, StderrLogger};
pub use record::UndoRecord;
pub use scratch::{InMemoryScratchFileAllocator, OsScratchFileAllocator, ScratchFileAllocator, ScratchHandle};
pub use session::{FixedSessionContext, SessionContext};
