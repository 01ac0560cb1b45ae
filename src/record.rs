//! A single entry in an [`crate::log::UndoLog`] (§3.1/§3.2).
//!
//! Residency is modeled as an enum rather than the pair of nullable fields
//! in the loose original description, so "resident and on disk at once" or
//! "neither" are not representable. See the Design Notes on the data model.

use crate::codec::{RowCodec, RowImage, TableRef, UndoKind};
use crate::coding::{decode_fixed32, extend_fixed32};
use crate::crc32;
use crate::error::{Result, UndoLogError};
use crate::scratch::ScratchHandle;
use crate::session::SessionContext;

/// Fixed header written ahead of every record's codec payload in the
/// scratch file: a masked CRC32C of the payload, followed by the payload's
/// length. See the Design Notes on scratch-file framing for why this is
/// simpler than the teacher's block-fragmented WAL format.
const SCRATCH_RECORD_HEADER_LEN: usize = 4 + 4;

/// Where a record's row image currently lives.
#[derive(Debug)]
enum Residency {
    /// The row image is held in memory; nothing has been written to the
    /// scratch file for this record yet.
    Memory(RowImage),
    /// The row image has been spilled. `offset` is the absolute byte
    /// offset of this record's header in the scratch file; `stored_len` is
    /// the total number of bytes the header plus payload occupy there.
    Disk { offset: u64, stored_len: u64 },
}

/// One logged change, in the order it was applied. See §3.1.
#[derive(Debug)]
pub struct UndoRecord {
    kind: UndoKind,
    table_ref: TableRef,
    residency: Residency,
    /// Cached at construction time from `RowCodec::can_encode`; a record
    /// that is never eligible is skipped by the spill walk entirely
    /// (§8 property 7, scenario S4).
    eligible_for_spill: bool,
}

impl UndoRecord {
    pub fn new(kind: UndoKind, table_ref: TableRef, row_image: RowImage, codec: &dyn RowCodec) -> Self {
        let eligible_for_spill = codec.can_encode(&row_image);
        Self {
            kind,
            table_ref,
            residency: Residency::Memory(row_image),
            eligible_for_spill,
        }
    }

    pub fn kind(&self) -> UndoKind {
        self.kind
    }

    pub fn table_ref(&self) -> TableRef {
        self.table_ref
    }

    pub fn is_stored(&self) -> bool {
        matches!(self.residency, Residency::Disk { .. })
    }

    pub fn eligible_for_spill(&self) -> bool {
        self.eligible_for_spill
    }

    /// The row image, if it is currently memory-resident.
    pub fn row_image(&self) -> Option<&RowImage> {
        match &self.residency {
            Residency::Memory(row) => Some(row),
            Residency::Disk { .. } => None,
        }
    }

    /// Absolute byte range this record occupies in the scratch file, if
    /// spilled.
    pub fn disk_extent(&self) -> Option<(u64, u64)> {
        match self.residency {
            Residency::Disk { offset, stored_len } => Some((offset, stored_len)),
            Residency::Memory(_) => None,
        }
    }

    /// Write this record's row image to `handle` at `offset` and drop the
    /// in-memory copy, per §4.2. Returns the number of bytes occupied on
    /// disk (header plus payload), which is also the caller's new write
    /// cursor advance.
    ///
    /// `buffer` is the log's `codec_scratch_buffer` (§3.2): it is cleared
    /// and reused to frame the header and payload before the single `write`
    /// call, rather than allocating a fresh header `Vec` on every spill.
    ///
    /// No-op (returns 0) if the record is already stored; callers are
    /// expected to check `is_stored`/`eligible_for_spill` first, but this
    /// keeps the operation idempotent rather than panicking on misuse.
    pub fn spill(
        &mut self,
        codec: &dyn RowCodec,
        handle: &mut dyn ScratchHandle,
        offset: u64,
        buffer: &mut Vec<u8>,
    ) -> Result<u64> {
        if self.is_stored() {
            return Ok(0);
        }
        let row_image = match &self.residency {
            Residency::Memory(row) => row,
            Residency::Disk { .. } => unreachable!(),
        };
        if !self.eligible_for_spill {
            return Err(UndoLogError::NotEligible);
        }
        let payload = codec.encode(self.kind, self.table_ref, row_image)?;
        let checksum = crc32::mask(crc32::value(&payload));

        buffer.clear();
        extend_fixed32(buffer, checksum);
        extend_fixed32(buffer, payload.len() as u32);
        buffer.extend_from_slice(&payload);

        handle.seek(offset)?;
        handle.write(buffer)?;

        let stored_len = buffer.len() as u64;
        self.residency = Residency::Disk { offset, stored_len };
        Ok(stored_len)
    }

    /// Read this record's row image back from its stored location and
    /// return it to memory residency, per §4.3.
    ///
    /// `buffer` is the log's `codec_scratch_buffer` (§3.2): the payload is
    /// read into it via `ScratchHandle::read_into`, reusing its allocation
    /// across rehydrations instead of handing back a fresh `Vec` per
    /// record. Only the small fixed header is still read through the
    /// ordinary `read`, since it is discarded immediately after parsing.
    ///
    /// The record's disk extent is intentionally consumed here: once
    /// rehydrated, `is_stored` reports `false` and `disk_extent` reports
    /// `None`, matching "a record is either resident or stored, never
    /// both". Any caller that additionally needs to know how far into the
    /// scratch file this record reached (to reposition the handle's
    /// cursor after a batch rehydration) must read `disk_extent` *before*
    /// calling `decode`.
    pub fn decode(
        &mut self,
        codec: &dyn RowCodec,
        handle: &mut dyn ScratchHandle,
        session: &dyn SessionContext,
        buffer: &mut Vec<u8>,
    ) -> Result<()> {
        let (offset, stored_len) = self.disk_extent().ok_or(UndoLogError::NotStored)?;

        handle.seek(offset)?;
        let header = handle.read(SCRATCH_RECORD_HEADER_LEN)?;
        let expected_checksum = decode_fixed32(&header[0..4]);
        let payload_len = decode_fixed32(&header[4..8]) as usize;
        debug_assert_eq!(
            SCRATCH_RECORD_HEADER_LEN as u64 + payload_len as u64,
            stored_len,
            "stored length must match the header's own payload length"
        );

        handle.read_into(buffer, payload_len)?;
        let actual_checksum = crc32::mask(crc32::value(buffer));
        if actual_checksum != expected_checksum {
            return Err(UndoLogError::Codec(crate::error::CodecError::ChecksumMismatch));
        }

        let (kind, table_ref, row_image) = codec.decode(buffer, session)?;
        debug_assert_eq!(kind, self.kind, "rehydrated kind must match the logged kind");
        debug_assert_eq!(
            table_ref, self.table_ref,
            "rehydrated table reference must match the logged table reference"
        );

        self.residency = Residency::Memory(row_image);
        Ok(())
    }
}

/// Position `handle`'s cursor immediately after the stored bytes described
/// by `extent`. Used by [`crate::log::UndoLog::pop_last`] to leave the
/// scratch file's own cursor consistent after a rehydration batch.
///
/// Takes a bare extent rather than a record, since the extent must be
/// captured before `decode` clears it from the record it came from — see
/// the note on `decode`.
pub fn seek_past_extent(handle: &mut dyn ScratchHandle, extent: (u64, u64)) -> Result<()> {
    let (offset, stored_len) = extent;
    handle.seek(offset + stored_len)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LengthPrefixedCodec;
    use crate::scratch::{InMemoryScratchFileAllocator, ScratchFileAllocator};
    use crate::session::FixedSessionContext;

    #[test]
    fn test_spill_then_decode_roundtrip() {
        let codec = LengthPrefixedCodec;
        let allocator = InMemoryScratchFileAllocator;
        let mut handle = allocator.create_scratch().unwrap();
        let session = FixedSessionContext::new(4, true);

        let row = RowImage::new(b"row-bytes".to_vec());
        let mut record = UndoRecord::new(UndoKind::Delete, TableRef(3), row.clone(), &codec);
        assert!(!record.is_stored());
        let mut buffer = Vec::new();

        let stored_len = record.spill(&codec, handle.as_mut(), 0, &mut buffer).unwrap();
        assert!(stored_len > 0);
        assert!(record.is_stored());
        assert!(record.row_image().is_none());

        record.decode(&codec, handle.as_mut(), &session, &mut buffer).unwrap();
        assert!(!record.is_stored());
        assert_eq!(record.row_image(), Some(&row));
    }

    #[test]
    fn test_transient_row_refuses_spill() {
        let codec = LengthPrefixedCodec;
        let allocator = InMemoryScratchFileAllocator;
        let mut handle = allocator.create_scratch().unwrap();
        let mut buffer = Vec::new();

        let row = RowImage::transient(b"stream".to_vec());
        let mut record = UndoRecord::new(UndoKind::Insert, TableRef(1), row, &codec);
        assert!(!record.eligible_for_spill());
        assert!(record.spill(&codec, handle.as_mut(), 0, &mut buffer).is_err());
    }

    #[test]
    fn test_decode_detects_corruption() {
        let codec = LengthPrefixedCodec;
        let allocator = InMemoryScratchFileAllocator;
        let mut handle = allocator.create_scratch().unwrap();
        let session = FixedSessionContext::new(4, true);
        let mut buffer = Vec::new();

        let row = RowImage::new(b"important".to_vec());
        let mut record = UndoRecord::new(UndoKind::UpdateNew, TableRef(2), row, &codec);
        record.spill(&codec, handle.as_mut(), 0, &mut buffer).unwrap();

        // Flip a payload byte after the header to corrupt the checksum.
        handle.seek(SCRATCH_RECORD_HEADER_LEN as u64).unwrap();
        handle.write(&[0xffu8]).unwrap();

        let err = record.decode(&codec, handle.as_mut(), &session, &mut buffer).unwrap_err();
        assert!(matches!(
            err,
            UndoLogError::Codec(crate::error::CodecError::ChecksumMismatch)
        ));
    }
}
