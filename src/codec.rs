//! The row codec collaborator (§6.1): out of scope for this crate in the
//! sense that the real engine's on-disk row format lives elsewhere, but the
//! undo log needs *a* codec to round-trip row images through the scratch
//! file, so this module defines the trait plus a reference implementation
//! used by the test suite.

use crate::coding::{decode_fixed32, decode_varint32, extend_fixed32, extend_varint32};
use crate::error::CodecError;
use crate::session::SessionContext;

/// How to invert a logged change; see §3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UndoKind {
    Insert,
    Delete,
    UpdateOld,
    UpdateNew,
}

/// An opaque identifier of the table a record belongs to. The undo log
/// never interprets this value, only carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableRef(pub u32);

/// The full row at the moment of logging, as produced by the engine's row
/// format. Opaque to the undo log.
///
/// `transient` marks a row that references a resource the codec cannot
/// round-trip byte-exactly (e.g. an open stream backing a large object);
/// such rows refuse to spill (§3.1 `eligible_for_spill`, §8 property 7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowImage {
    pub bytes: Vec<u8>,
    pub transient: bool,
}

impl RowImage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            transient: false,
        }
    }

    /// A row that can never be spilled to the scratch file.
    pub fn transient(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            transient: true,
        }
    }
}

/// The collaborator that knows how to turn a row into bytes and back.
///
/// Implementations are expected to be cheap to construct and free of
/// internal mutable state beyond what `create_page` hands out, since the
/// undo log may call these methods many times per rollback.
pub trait RowCodec {
    /// Allocate a reusable, page-sized scratch buffer.
    fn create_page(&self, size: usize) -> Vec<u8>;

    /// Serialize `(kind, table_ref, row_image)` into a self-delimiting page.
    fn encode(
        &self,
        kind: UndoKind,
        table_ref: TableRef,
        row_image: &RowImage,
    ) -> Result<Vec<u8>, CodecError>;

    /// Invert `encode`.
    fn decode(
        &self,
        bytes: &[u8],
        session: &dyn SessionContext,
    ) -> Result<(UndoKind, TableRef, RowImage), CodecError>;

    /// True iff `row_image` can survive a spill/rehydrate round-trip
    /// byte-exactly. The eligibility predicate belongs here, not on the
    /// record, so row images remain plain data (see Design Notes).
    fn can_encode(&self, row_image: &RowImage) -> bool;

    /// Given bytes previously returned by `encode` (or a prefix long enough
    /// to contain its length field), return how many bytes the full
    /// encoded page occupies.
    fn serialized_length(&self, bytes: &[u8]) -> usize;
}

/// A length-prefixed reference codec: `[kind:1][table_ref:4][varint32
/// row_len][row bytes]`. Good enough to exercise the undo log in tests and
/// to document the shape collaborators are expected to produce.
#[derive(Debug, Default, Clone, Copy)]
pub struct LengthPrefixedCodec;

impl LengthPrefixedCodec {
    const KIND_INSERT: u8 = 0;
    const KIND_DELETE: u8 = 1;
    const KIND_UPDATE_OLD: u8 = 2;
    const KIND_UPDATE_NEW: u8 = 3;

    fn encode_kind(kind: UndoKind) -> u8 {
        match kind {
            UndoKind::Insert => Self::KIND_INSERT,
            UndoKind::Delete => Self::KIND_DELETE,
            UndoKind::UpdateOld => Self::KIND_UPDATE_OLD,
            UndoKind::UpdateNew => Self::KIND_UPDATE_NEW,
        }
    }

    fn decode_kind(byte: u8) -> Result<UndoKind, CodecError> {
        match byte {
            Self::KIND_INSERT => Ok(UndoKind::Insert),
            Self::KIND_DELETE => Ok(UndoKind::Delete),
            Self::KIND_UPDATE_OLD => Ok(UndoKind::UpdateOld),
            Self::KIND_UPDATE_NEW => Ok(UndoKind::UpdateNew),
            other => Err(CodecError::Decode(format!("unknown undo kind tag {other}"))),
        }
    }
}

impl RowCodec for LengthPrefixedCodec {
    fn create_page(&self, size: usize) -> Vec<u8> {
        Vec::with_capacity(size)
    }

    fn encode(
        &self,
        kind: UndoKind,
        table_ref: TableRef,
        row_image: &RowImage,
    ) -> Result<Vec<u8>, CodecError> {
        if !self.can_encode(row_image) {
            return Err(CodecError::Encode(
                "row image references a transient resource".to_owned(),
            ));
        }
        let mut out = Vec::with_capacity(5 + row_image.bytes.len());
        out.push(Self::encode_kind(kind));
        extend_fixed32(&mut out, table_ref.0);
        extend_varint32(&mut out, row_image.bytes.len() as u32);
        out.extend_from_slice(&row_image.bytes);
        Ok(out)
    }

    fn decode(
        &self,
        bytes: &[u8],
        _session: &dyn SessionContext,
    ) -> Result<(UndoKind, TableRef, RowImage), CodecError> {
        if bytes.len() < 5 {
            return Err(CodecError::Decode("page shorter than fixed header".into()));
        }
        let kind = Self::decode_kind(bytes[0])?;
        let table_ref = TableRef(decode_fixed32(&bytes[1..5]));
        let (row_len, offset) = decode_varint32(&bytes[5..])
            .ok_or_else(|| CodecError::Decode("truncated row length varint".into()))?;
        let start = 5 + offset;
        let end = start + row_len as usize;
        if end > bytes.len() {
            return Err(CodecError::Decode("truncated row payload".into()));
        }
        Ok((kind, table_ref, RowImage::new(bytes[start..end].to_vec())))
    }

    fn can_encode(&self, row_image: &RowImage) -> bool {
        !row_image.transient
    }

    fn serialized_length(&self, bytes: &[u8]) -> usize {
        let (row_len, offset) = decode_varint32(&bytes[5..]).expect("valid page prefix");
        5 + offset + row_len as usize
    }
}
