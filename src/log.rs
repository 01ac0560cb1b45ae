//! The undo log itself (§3.2/§4.2/§4.3): an ordered, LIFO-popped sequence
//! of [`UndoRecord`]s with a soft memory budget and transparent spill to a
//! scratch file.

use crate::codec::{RowCodec, RowImage, TableRef, UndoKind};
use crate::error::{Result, UndoLogError};
use crate::logger::Logger;
use crate::record::{seek_past_extent, UndoRecord};
use crate::scratch::{ScratchFileAllocator, ScratchHandle};
use crate::session::SessionContext;

/// A read-only snapshot of the log's current spill state, useful for
/// diagnostics and tests. Not part of the four core operations (§4), but
/// grounded in the same fields §3.2 already names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoLogStats {
    pub size: usize,
    pub resident_count: usize,
    pub is_spilled: bool,
    pub scratch_bytes: u64,
}

/// Per-session undo log. Owns its records by value in a contiguous
/// growable sequence, per the Design Notes on record identity: indices are
/// stable because removal only ever happens at the tail.
pub struct UndoLog<'a> {
    records: Vec<UndoRecord>,
    resident_count: usize,
    scratch: Option<Box<dyn ScratchHandle>>,
    scratch_cursor: u64,
    codec_scratch_buffer: Vec<u8>,
    allocator: &'a dyn ScratchFileAllocator,
    codec: &'a dyn RowCodec,
    session: &'a dyn SessionContext,
    /// Diagnostic sink for spill/rehydrate/clear cycles (record counts,
    /// scratch file bytes moved). Never consulted for control flow.
    logger: &'a dyn Logger,
}

impl<'a> UndoLog<'a> {
    pub fn new(
        allocator: &'a dyn ScratchFileAllocator,
        codec: &'a dyn RowCodec,
        session: &'a dyn SessionContext,
        logger: &'a dyn Logger,
    ) -> Self {
        Self {
            records: Vec::new(),
            resident_count: 0,
            scratch: None,
            scratch_cursor: 0,
            codec_scratch_buffer: Vec::new(),
            allocator,
            codec,
            session,
            logger,
        }
    }

    /// §4.4 `size()`. Asserts the core residency invariant in debug builds.
    pub fn size(&self) -> usize {
        debug_assert!(self.resident_count <= self.records.len());
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> UndoLogStats {
        UndoLogStats {
            size: self.records.len(),
            resident_count: self.resident_count,
            is_spilled: self.scratch.is_some(),
            scratch_bytes: self.scratch_cursor,
        }
    }

    /// §4.2 `append`.
    pub fn append(&mut self, kind: UndoKind, table_ref: TableRef, row_image: RowImage) -> Result<()> {
        let record = UndoRecord::new(kind, table_ref, row_image, self.codec);
        self.records.push(record);
        self.resident_count += 1;

        if self.resident_count <= self.session.max_memory_undo() || !self.session.is_persistent() {
            return Ok(());
        }

        if self.scratch.is_none() {
            self.open_scratch_for_first_spill()?;
            self.logger.log(&format!(
                "undo log exceeded max_memory_undo ({}); opening scratch file and spilling eligible records",
                self.session.max_memory_undo()
            ));
            let last = self.records.len() - 1;
            for i in 0..=last {
                self.attempt_spill(i)?;
            }
        } else {
            let last = self.records.len() - 1;
            self.attempt_spill(last)?;
        }
        Ok(())
    }

    fn open_scratch_for_first_spill(&mut self) -> Result<()> {
        let mut handle = self.allocator.create_scratch()?;
        handle.mark_auto_delete();
        self.scratch_cursor = self.session.scratch_header_length() as u64;
        self.codec_scratch_buffer = self.codec.create_page(self.session.default_page_size());
        self.scratch = Some(handle);
        Ok(())
    }

    /// §4.2 step 4: a single "spill attempt" on `records[index]`.
    fn attempt_spill(&mut self, index: usize) -> Result<()> {
        let record = &mut self.records[index];
        if record.is_stored() {
            return Ok(());
        }
        if !record.eligible_for_spill() {
            return Ok(());
        }
        let offset = self.scratch_cursor;
        let handle = self
            .scratch
            .as_deref_mut()
            .expect("scratch file must exist before attempt_spill is called");
        let stored_len = record.spill(self.codec, handle, offset, &mut self.codec_scratch_buffer)?;
        self.scratch_cursor += stored_len;
        self.resident_count -= 1;
        self.logger.log(&format!(
            "undo log spilled record {index} to scratch at offset {offset}, {stored_len} bytes"
        ));
        Ok(())
    }

    /// §4.3 `pop_last`.
    pub fn pop_last(&mut self) -> Result<UndoRecord> {
        let last_index = self.records.len().checked_sub(1).ok_or(UndoLogError::Empty)?;

        if self.records[last_index].row_image().is_some() {
            self.resident_count -= 1;
            return Ok(self.records.pop().expect("checked non-empty above"));
        }

        self.rehydrate_window(last_index)?;

        self.resident_count -= 1;
        Ok(self.records.pop().expect("checked non-empty above"))
    }

    /// Step 2/3 of §4.3: rehydrate the half-budget window ending at `i`
    /// and reposition the scratch cursor past the furthest record read.
    ///
    /// The spec's literal pseudocode names the first record rehydrated in
    /// the ascending `window_start..=i` scan as the seek target. Since
    /// records are written to the scratch file in ascending offset order,
    /// the record with the *largest* extent is the one whose end marks
    /// "immediately after the last disk image just read" — so this walk
    /// seeks past the furthest (highest-offset) record instead. Because
    /// `scratch_cursor` is tracked independently here (per the Design
    /// Notes) rather than trusted from the handle's implicit position,
    /// this only affects where the handle itself visually rests, not any
    /// observable behavior: every read/write below already carries its
    /// own absolute offset.
    fn rehydrate_window(&mut self, i: usize) -> Result<()> {
        let window_start = i.saturating_sub(self.session.max_memory_undo() / 2);
        let mut furthest_extent: Option<(u64, u64)> = None;
        let mut rehydrated = 0usize;

        for j in window_start..=i {
            let extent = match self.records[j].disk_extent() {
                Some(extent) => extent,
                None => continue,
            };
            {
                let handle = self
                    .scratch
                    .as_deref_mut()
                    .expect("a record reports a disk extent only if scratch exists");
                self.records[j].decode(self.codec, handle, self.session, &mut self.codec_scratch_buffer)?;
            }
            self.resident_count += 1;
            rehydrated += 1;
            furthest_extent = Some(match furthest_extent {
                Some(prev) if prev.0 + prev.1 >= extent.0 + extent.1 => prev,
                _ => extent,
            });
        }

        if let Some(extent) = furthest_extent {
            let handle = self
                .scratch
                .as_deref_mut()
                .expect("furthest_extent is only set when scratch exists");
            seek_past_extent(handle, extent)?;
        }
        if rehydrated > 0 {
            self.logger.log(&format!(
                "undo log rehydrated {rehydrated} record(s) in window [{window_start}, {i}]"
            ));
        }
        Ok(())
    }

    /// §4.4 `clear`. Idempotent.
    pub fn clear(&mut self) {
        let size = self.records.len();
        let had_scratch = self.scratch.is_some();
        self.records.clear();
        self.resident_count = 0;
        self.scratch_cursor = 0;
        self.codec_scratch_buffer.clear();
        if let Some(handle) = self.scratch.take() {
            handle.close_and_delete_silently();
        }
        self.logger.log(&format!(
            "undo log cleared: {size} record(s), scratch file {}",
            if had_scratch { "deleted" } else { "none" }
        ));
    }

    /// Opt-in re-spill hook, not part of the core contract: walks the
    /// currently memory-resident records and spills any eligible ones,
    /// bringing `resident_count` back within budget after a rehydration
    /// burst left it transiently over (see the Open Question on
    /// `memoryUndo` accounting in the Design Notes). Never called
    /// automatically.
    pub fn compact_residency(&mut self) -> Result<()> {
        if self.scratch.is_none() || self.resident_count <= self.session.max_memory_undo() {
            return Ok(());
        }
        for i in 0..self.records.len() {
            if self.resident_count <= self.session.max_memory_undo() {
                break;
            }
            self.attempt_spill(i)?;
        }
        Ok(())
    }
}
