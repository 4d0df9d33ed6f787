//! Core domain types for Seriesfold.
//!
//! This module defines the foundational data types that every other module depends on:
//! the per-series metadata footer (version-tagged), the stream footer that indexes all
//! series by time range and byte offset, the shadow-footer vocabulary, and format
//! constants.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Size of the fixed shadow footer in bytes:
/// version (2) + footer type (1) + footer length (2) + boundary marker (1).
pub const SHADOW_FOOTER_SIZE: usize = 6;

/// The byte that terminates every region. Readers anchor the tail-first walk on it.
pub const BOUNDARY_MARKER: u8 = 0x00;

/// Current on-disk version of the series footer body.
pub const SERIES_FOOTER_VERSION: u16 = 1;

/// Current on-disk version of the stream footer body.
pub const STREAM_FOOTER_VERSION: u16 = 1;

/// Exact length of the caller-supplied source SHA-1 digest.
pub const SOURCE_SHA1_SIZE: usize = 20;

/// Size of the buffer used for copying payload bytes into or out of a stream.
/// Allocated once per builder/reader and reused across series.
pub const PAYLOAD_COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Identifies which footer flavor a shadow footer describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FooterType {
    /// Per-series metadata footer.
    Series = 1,
    /// The stream-wide footer at the end of the file.
    Stream = 2,
}

impl FooterType {
    /// Map a raw shadow-footer type code back to a `FooterType`.
    ///
    /// Returns `None` for unknown codes; the reader converts that into a
    /// footer-type mismatch against whatever flavor it expected.
    pub fn from_code(code: u8) -> Option<FooterType> {
        match code {
            1 => Some(FooterType::Series),
            2 => Some(FooterType::Stream),
            _ => None,
        }
    }

    /// The raw type code written into the shadow footer.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Current wall-clock time as whole seconds since the Unix epoch (UTC).
///
/// Sub-second precision is dropped on purpose: footers store whole-second
/// epochs, and a value that survives an encode/decode round trip must not
/// carry precision the wire format cannot.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Version 1 of the per-series metadata footer.
///
/// One of these trails every payload in the stream. The caller constructs it
/// with the payload's time range and provenance; the writer fills in
/// `bytes_length` and `data_fnv1a_checksum` while the payload is copied, and
/// the footer becomes immutable once its region is written.
///
/// # Fields
///
/// * `uuid` - Unique identity of the series within the stream.
/// * `head_record_epoch` / `tail_record_epoch` - Inclusive time range of the
///   payload's logical records, seconds since the Unix epoch, UTC.
/// * `bytes_length` - Size of the opaque payload preceding this footer.
/// * `record_count` - Logical record count (opaque to this crate).
/// * `created_epoch` / `updated_epoch` - Wall-clock epochs, UTC.
/// * `original_filename` - Filename of the source data, for provenance.
/// * `source_sha1` - SHA-1 of the caller's original input; used only for
///   equality, never computed here.
/// * `data_fnv1a_checksum` - FNV-1a/32 checksum over the payload bytes as
///   they appear on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesFooterV1 {
    /// Unique identity of the series within the stream.
    pub uuid: Uuid,
    /// Timestamp of the first logical record (epoch seconds, UTC).
    pub head_record_epoch: u64,
    /// Timestamp of the last logical record (epoch seconds, UTC).
    pub tail_record_epoch: u64,
    /// Number of payload bytes occupied on disk.
    pub bytes_length: u64,
    /// Number of logical records in the payload.
    pub record_count: u64,
    /// When this series was first written (epoch seconds, UTC).
    pub created_epoch: u64,
    /// When this series was last rewritten (epoch seconds, UTC).
    pub updated_epoch: u64,
    /// Filename of the source data.
    pub original_filename: String,
    /// SHA-1 of the raw source data; compared, never computed, by this crate.
    pub source_sha1: [u8; SOURCE_SHA1_SIZE],
    /// FNV-1a/32 checksum of the payload bytes on disk.
    pub data_fnv1a_checksum: u32,
}

impl SeriesFooterV1 {
    /// Create a footer for a series about to be written.
    ///
    /// A fresh v4 UUID is assigned and `created_epoch` / `updated_epoch` are
    /// set to the current time. `bytes_length` and `data_fnv1a_checksum`
    /// start at zero; the writer assigns both during the payload copy.
    ///
    /// # Arguments
    ///
    /// * `head_record_epoch` - Timestamp of the first logical record.
    /// * `tail_record_epoch` - Timestamp of the last logical record.
    /// * `record_count` - Number of logical records in the payload.
    /// * `original_filename` - Filename of the source data.
    /// * `source_sha1` - SHA-1 digest of the raw source data.
    pub fn new(
        head_record_epoch: u64,
        tail_record_epoch: u64,
        record_count: u64,
        original_filename: impl Into<String>,
        source_sha1: [u8; SOURCE_SHA1_SIZE],
    ) -> SeriesFooterV1 {
        let now = unix_now();

        SeriesFooterV1 {
            uuid: Uuid::new_v4(),
            head_record_epoch,
            tail_record_epoch,
            bytes_length: 0,
            record_count,
            created_epoch: now,
            updated_epoch: now,
            original_filename: original_filename.into(),
            source_sha1,
            data_fnv1a_checksum: 0,
        }
    }
}

/// A per-series metadata footer, tagged by on-disk version.
///
/// The reader dispatches on the version recorded in the shadow footer and
/// yields the matching variant. New on-disk versions become new variants;
/// existing variants never change shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesFooter {
    /// Version 1 footer body.
    V1(SeriesFooterV1),
}

impl SeriesFooter {
    /// On-disk version of this footer.
    pub fn version(&self) -> u16 {
        match self {
            SeriesFooter::V1(_) => SERIES_FOOTER_VERSION,
        }
    }

    /// Unique identity of the series.
    pub fn uuid(&self) -> Uuid {
        match self {
            SeriesFooter::V1(f) => f.uuid,
        }
    }

    /// Timestamp of the first logical record (epoch seconds, UTC).
    pub fn head_record_epoch(&self) -> u64 {
        match self {
            SeriesFooter::V1(f) => f.head_record_epoch,
        }
    }

    /// Timestamp of the last logical record (epoch seconds, UTC).
    pub fn tail_record_epoch(&self) -> u64 {
        match self {
            SeriesFooter::V1(f) => f.tail_record_epoch,
        }
    }

    /// Number of payload bytes occupied on disk.
    pub fn bytes_length(&self) -> u64 {
        match self {
            SeriesFooter::V1(f) => f.bytes_length,
        }
    }

    /// Number of logical records in the payload.
    pub fn record_count(&self) -> u64 {
        match self {
            SeriesFooter::V1(f) => f.record_count,
        }
    }

    /// When this series was first written (epoch seconds, UTC).
    pub fn created_epoch(&self) -> u64 {
        match self {
            SeriesFooter::V1(f) => f.created_epoch,
        }
    }

    /// When this series was last rewritten (epoch seconds, UTC).
    pub fn updated_epoch(&self) -> u64 {
        match self {
            SeriesFooter::V1(f) => f.updated_epoch,
        }
    }

    /// Filename of the source data.
    pub fn original_filename(&self) -> &str {
        match self {
            SeriesFooter::V1(f) => &f.original_filename,
        }
    }

    /// SHA-1 of the raw source data.
    pub fn source_sha1(&self) -> &[u8; SOURCE_SHA1_SIZE] {
        match self {
            SeriesFooter::V1(f) => &f.source_sha1,
        }
    }

    /// FNV-1a/32 checksum of the payload bytes on disk.
    pub fn data_fnv1a_checksum(&self) -> u32 {
        match self {
            SeriesFooter::V1(f) => f.data_fnv1a_checksum,
        }
    }

    /// Record the payload size measured during the write.
    pub(crate) fn set_bytes_length(&mut self, bytes_length: u64) {
        match self {
            SeriesFooter::V1(f) => f.bytes_length = bytes_length,
        }
    }

    /// Record the payload checksum computed during the write.
    pub(crate) fn set_data_fnv1a_checksum(&mut self, checksum: u32) {
        match self {
            SeriesFooter::V1(f) => f.data_fnv1a_checksum = checksum,
        }
    }

    /// Bump `updated_epoch` to the current time.
    pub(crate) fn touch_updated_epoch(&mut self) {
        match self {
            SeriesFooter::V1(f) => f.updated_epoch = unix_now(),
        }
    }
}

impl From<SeriesFooterV1> for SeriesFooter {
    fn from(footer: SeriesFooterV1) -> SeriesFooter {
        SeriesFooter::V1(footer)
    }
}

/// One stream-footer index entry: a series' identity, time range, and the
/// absolute offset of its boundary-marker byte.
///
/// `absolute_position` points at the trailing NUL of the series' shadow
/// footer. Seeking there and reading backward recovers the series footer;
/// `absolute_position + 1` is the first byte of the next region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedSeriesInfo {
    /// Unique identity of the series.
    pub uuid: Uuid,
    /// Timestamp of the first logical record (epoch seconds, UTC).
    pub head_record_epoch: u64,
    /// Timestamp of the last logical record (epoch seconds, UTC).
    pub tail_record_epoch: u64,
    /// Filename of the source data.
    pub original_filename: String,
    /// Absolute offset of the series' boundary-marker byte.
    pub absolute_position: i64,
}

impl IndexedSeriesInfo {
    /// Summarize a series footer into an index entry at the given boundary
    /// offset.
    pub fn from_series_footer(footer: &SeriesFooter, absolute_position: i64) -> IndexedSeriesInfo {
        IndexedSeriesInfo {
            uuid: footer.uuid(),
            head_record_epoch: footer.head_record_epoch(),
            tail_record_epoch: footer.tail_record_epoch(),
            original_filename: footer.original_filename().to_string(),
            absolute_position,
        }
    }
}

/// Version 1 of the stream footer body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamFooterV1 {
    /// Index entries for every series, in ascending file order.
    pub series: Vec<IndexedSeriesInfo>,
}

/// The stream-wide footer at the end of the file, tagged by on-disk version.
///
/// Exactly one exists per stream. It is materialized in memory from the
/// builder's accumulated offset table during finalization and parsed back
/// first during any tail-first read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFooter {
    /// Version 1 footer body.
    V1(StreamFooterV1),
}

impl StreamFooter {
    /// On-disk version of this footer.
    pub fn version(&self) -> u16 {
        match self {
            StreamFooter::V1(_) => STREAM_FOOTER_VERSION,
        }
    }

    /// Index entries for every series, in ascending file order.
    pub fn series(&self) -> &[IndexedSeriesInfo] {
        match self {
            StreamFooter::V1(f) => &f.series,
        }
    }
}

impl From<StreamFooterV1> for StreamFooter {
    fn from(footer: StreamFooterV1) -> StreamFooter {
        StreamFooter::V1(footer)
    }
}
