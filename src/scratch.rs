//! The temp-file allocator collaborator (§6.1) and its file handle.
//!
//! The scratch file itself is an append-oriented, random-access byte file
//! with a reserved header region at the front; the undo log tracks its own
//! write cursor (`scratch_cursor` on [`crate::log::UndoLog`]) rather than
//! relying on the handle's implicit position, so every `seek`/`read`/`write`
//! below takes or implies an absolute offset. See the Design Notes on
//! scratch cursor tracking for why.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// A single scratch file, opened for simultaneous reading and writing.
pub trait ScratchHandle: std::fmt::Debug {
    fn seek(&mut self, offset: u64) -> io::Result<()>;
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn read(&mut self, len: usize) -> io::Result<Vec<u8>>;

    /// Read `len` bytes into `dst`, reusing its existing allocation instead
    /// of handing back a fresh `Vec`. This is what lets
    /// [`crate::log::UndoLog`]'s `codec_scratch_buffer` actually behave like
    /// a reusable page buffer across repeated rehydrations rather than just
    /// a line item that gets allocated and cleared.
    fn read_into(&mut self, dst: &mut Vec<u8>, len: usize) -> io::Result<()>;

    /// Hint that the file should be removed once the handle is done with
    /// it. Idempotent.
    fn mark_auto_delete(&mut self);

    /// Close the handle and remove the backing file, ignoring any error
    /// from either step (see the Open Question on `clear()` in the Design
    /// Notes: callers invoke this from cleanup paths and must not have to
    /// handle a secondary failure there).
    fn close_and_delete_silently(self: Box<Self>);
}

/// Creates scratch files for an [`crate::log::UndoLog`] to spill into.
pub trait ScratchFileAllocator {
    fn create_scratch(&self) -> io::Result<Box<dyn ScratchHandle>>;
}

/// A real, file-system-backed scratch file, created in a directory the
/// caller controls (typically the engine's configured temp directory).
pub struct OsScratchFileAllocator {
    dir: PathBuf,
}

impl OsScratchFileAllocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ScratchFileAllocator for OsScratchFileAllocator {
    fn create_scratch(&self) -> io::Result<Box<dyn ScratchHandle>> {
        std::fs::create_dir_all(&self.dir)?;
        // A process-unique-enough name: pid + a monotonically increasing
        // counter covers the "one log per session" usage pattern without
        // pulling in a UUID dependency the teacher never needed.
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .join(format!("undolog-{}-{unique}.tmp", std::process::id()));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Box::new(OsScratchHandle {
            file,
            path,
            auto_delete: false,
            deleted: false,
        }))
    }
}

struct OsScratchHandle {
    file: File,
    path: PathBuf,
    auto_delete: bool,
    deleted: bool,
}

impl std::fmt::Debug for OsScratchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsScratchHandle")
            .field("path", &self.path)
            .field("auto_delete", &self.auto_delete)
            .finish()
    }
}

impl ScratchHandle for OsScratchHandle {
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    fn read(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_into(&mut self, dst: &mut Vec<u8>, len: usize) -> io::Result<()> {
        dst.clear();
        dst.resize(len, 0);
        self.file.read_exact(dst)?;
        Ok(())
    }

    fn mark_auto_delete(&mut self) {
        self.auto_delete = true;
    }

    fn close_and_delete_silently(mut self: Box<Self>) {
        self.deleted = true;
        let _ = std::fs::remove_file(&self.path);
        // `self.file` closes on drop regardless of whether the remove
        // above succeeded.
    }
}

impl Drop for OsScratchHandle {
    fn drop(&mut self) {
        if self.auto_delete && !self.deleted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// An in-memory [`ScratchFileAllocator`] for unit tests, in the spirit of
/// the teacher's `StringDest`/`StringSource` fakes for `WritableFile` and
/// `SequentialFile`: no real file ever touches disk.
#[derive(Debug, Default)]
pub struct InMemoryScratchFileAllocator;

impl ScratchFileAllocator for InMemoryScratchFileAllocator {
    fn create_scratch(&self) -> io::Result<Box<dyn ScratchHandle>> {
        Ok(Box::new(InMemoryScratchHandle::default()))
    }
}

#[derive(Debug, Default)]
struct InMemoryScratchHandle {
    contents: Vec<u8>,
    cursor: usize,
    auto_delete: bool,
}

impl ScratchHandle for InMemoryScratchHandle {
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.cursor = offset as usize;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let end = self.cursor + bytes.len();
        if end > self.contents.len() {
            self.contents.resize(end, 0);
        }
        self.contents[self.cursor..end].copy_from_slice(bytes);
        self.cursor = end;
        Ok(())
    }

    fn read(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let end = self.cursor + len;
        if end > self.contents.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of in-memory scratch file",
            ));
        }
        let out = self.contents[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(out)
    }

    fn read_into(&mut self, dst: &mut Vec<u8>, len: usize) -> io::Result<()> {
        let end = self.cursor + len;
        if end > self.contents.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of in-memory scratch file",
            ));
        }
        dst.clear();
        dst.extend_from_slice(&self.contents[self.cursor..end]);
        self.cursor = end;
        Ok(())
    }

    fn mark_auto_delete(&mut self) {
        self.auto_delete = true;
    }

    fn close_and_delete_silently(self: Box<Self>) {
        // Nothing backing this on disk; dropping the buffer is enough.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_scratch_roundtrip() {
        let allocator = InMemoryScratchFileAllocator;
        let mut handle = allocator.create_scratch().unwrap();
        handle.seek(0).unwrap();
        handle.write(b"hello").unwrap();
        handle.seek(0).unwrap();
        assert_eq!(handle.read(5).unwrap(), b"hello");
    }

    #[test]
    fn test_in_memory_scratch_absolute_offsets() {
        let allocator = InMemoryScratchFileAllocator;
        let mut handle = allocator.create_scratch().unwrap();
        handle.seek(10).unwrap();
        handle.write(b"x").unwrap();
        handle.seek(10).unwrap();
        assert_eq!(handle.read(1).unwrap(), b"x");
    }

    #[test]
    fn test_read_into_reuses_buffer_across_calls() {
        let allocator = InMemoryScratchFileAllocator;
        let mut handle = allocator.create_scratch().unwrap();
        handle.seek(0).unwrap();
        handle.write(b"firstsecond").unwrap();

        let mut buffer = Vec::with_capacity(64);
        handle.seek(0).unwrap();
        handle.read_into(&mut buffer, 5).unwrap();
        assert_eq!(buffer, b"first");
        let capacity_after_first = buffer.capacity();

        handle.read_into(&mut buffer, 6).unwrap();
        assert_eq!(buffer, b"second");
        assert!(buffer.capacity() >= capacity_after_first.min(6));
    }

    #[test]
    fn test_read_into_past_end_errors() {
        let allocator = InMemoryScratchFileAllocator;
        let mut handle = allocator.create_scratch().unwrap();
        handle.write(b"abc").unwrap();
        handle.seek(0).unwrap();
        let mut buffer = Vec::new();
        assert!(handle.read_into(&mut buffer, 10).is_err());
    }

    #[test]
    fn test_os_scratch_file_is_removed_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = OsScratchFileAllocator::new(dir.path());
        let mut handle = allocator.create_scratch().unwrap();
        handle.write(b"payload").unwrap();

        let entries_before = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries_before, 1);

        handle.close_and_delete_silently();
        let entries_after = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries_after, 0);
    }

    #[test]
    fn test_os_scratch_file_auto_delete_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = OsScratchFileAllocator::new(dir.path());
        {
            let mut handle = allocator.create_scratch().unwrap();
            handle.mark_auto_delete();
            handle.write(b"payload").unwrap();
        }
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 0);
    }
}
