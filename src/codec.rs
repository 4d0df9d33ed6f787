//! Wire codec for footer bodies and shadow footers.
//!
//! This module handles serialization and deserialization of the two
//! variable-size footer flavors (series, stream) and the fixed 6-byte shadow
//! footer that trails each of them. It is pure data transformation -- no file
//! I/O, no position tracking.
//!
//! Footer bodies use protocol-buffers encoding (via `prost`): every field
//! carries a numeric tag, fields absent from the wire read back as
//! zero/empty, and unknown tags are skipped. That is what keeps the format
//! forward- and backward-compatible as footer versions evolve.
//!
//! The shadow footer is fixed little-endian binary:
//! `version (u16) | footer_type (u8) | footer_length (u16) | 0x00`. The
//! trailing NUL is the boundary marker the reader anchors its tail-first walk
//! on.

use bytes::BytesMut;
use prost::Message;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{
    FooterType, IndexedSeriesInfo, SeriesFooterV1, StreamFooterV1, BOUNDARY_MARKER,
    SHADOW_FOOTER_SIZE, SOURCE_SHA1_SIZE,
};

/// Size of the shadow descriptor: the shadow footer minus its boundary marker.
pub const SHADOW_DESCRIPTOR_SIZE: usize = SHADOW_FOOTER_SIZE - 1;

/// Wire form of a version-1 series footer body.
#[derive(Clone, PartialEq, Message)]
struct SeriesFooterWireV1 {
    #[prost(string, tag = "1")]
    uuid: String,
    #[prost(uint64, tag = "2")]
    head_record_epoch: u64,
    #[prost(uint64, tag = "3")]
    tail_record_epoch: u64,
    #[prost(uint64, tag = "4")]
    bytes_length: u64,
    #[prost(uint64, tag = "5")]
    record_count: u64,
    #[prost(uint64, tag = "6")]
    created_epoch: u64,
    #[prost(uint64, tag = "7")]
    updated_epoch: u64,
    #[prost(bytes = "vec", tag = "8")]
    source_sha1: Vec<u8>,
    #[prost(uint32, tag = "9")]
    data_fnv1a_checksum: u32,
    #[prost(string, tag = "10")]
    original_filename: String,
}

/// Wire form of one stream-footer index entry.
#[derive(Clone, PartialEq, Message)]
struct IndexedSeriesInfoWire {
    #[prost(string, tag = "1")]
    uuid: String,
    #[prost(uint64, tag = "2")]
    head_record_epoch: u64,
    #[prost(uint64, tag = "3")]
    tail_record_epoch: u64,
    #[prost(string, tag = "4")]
    original_filename: String,
    #[prost(int64, tag = "5")]
    absolute_position: i64,
}

/// Wire form of a version-1 stream footer body.
#[derive(Clone, PartialEq, Message)]
struct StreamFooterWireV1 {
    #[prost(message, repeated, tag = "1")]
    series: Vec<IndexedSeriesInfoWire>,
}

/// Encode a footer body into `buf`, enforcing the shadow footer's u16 length
/// field.
fn encode_body(message: &impl Message, buf: &mut BytesMut) -> Result<usize> {
    let len = message.encoded_len();
    if len > usize::from(u16::MAX) {
        return Err(Error::Codec(format!(
            "encoded footer body is {len} bytes, exceeding the {} byte limit",
            u16::MAX
        )));
    }

    message
        .encode(buf)
        .map_err(|e| Error::Codec(e.to_string()))?;
    Ok(len)
}

/// Parse a UUID from its wire (text) form.
fn decode_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| Error::Codec(format!("malformed series UUID [{text}]: {e}")))
}

/// Encode a version-1 series footer body into `buf`.
///
/// # Returns
///
/// The number of body bytes appended to `buf`.
///
/// # Errors
///
/// Returns [`Error::Codec`] if the encoded body would not fit the shadow
/// footer's u16 length field.
pub fn encode_series_footer_v1(footer: &SeriesFooterV1, buf: &mut BytesMut) -> Result<usize> {
    let wire = SeriesFooterWireV1 {
        uuid: footer.uuid.to_string(),
        head_record_epoch: footer.head_record_epoch,
        tail_record_epoch: footer.tail_record_epoch,
        bytes_length: footer.bytes_length,
        record_count: footer.record_count,
        created_epoch: footer.created_epoch,
        updated_epoch: footer.updated_epoch,
        source_sha1: footer.source_sha1.to_vec(),
        data_fnv1a_checksum: footer.data_fnv1a_checksum,
        original_filename: footer.original_filename.clone(),
    };

    encode_body(&wire, buf)
}

/// Decode a version-1 series footer body.
///
/// # Errors
///
/// Returns [`Error::Codec`] if the body is malformed, the UUID does not
/// parse, or the source SHA-1 is not exactly 20 bytes.
pub fn decode_series_footer_v1(body: &[u8]) -> Result<SeriesFooterV1> {
    let wire = SeriesFooterWireV1::decode(body)?;

    let sha1_len = wire.source_sha1.len();
    let source_sha1: [u8; SOURCE_SHA1_SIZE] = wire.source_sha1.try_into().map_err(|_| {
        Error::Codec(format!(
            "source SHA-1 is {sha1_len} bytes, expected {SOURCE_SHA1_SIZE}"
        ))
    })?;

    Ok(SeriesFooterV1 {
        uuid: decode_uuid(&wire.uuid)?,
        head_record_epoch: wire.head_record_epoch,
        tail_record_epoch: wire.tail_record_epoch,
        bytes_length: wire.bytes_length,
        record_count: wire.record_count,
        created_epoch: wire.created_epoch,
        updated_epoch: wire.updated_epoch,
        original_filename: wire.original_filename,
        source_sha1,
        data_fnv1a_checksum: wire.data_fnv1a_checksum,
    })
}

/// Encode a version-1 stream footer body into `buf`.
///
/// A footer with no series encodes to zero bytes; that is a legal body and
/// decodes back to an empty index.
///
/// # Returns
///
/// The number of body bytes appended to `buf`.
///
/// # Errors
///
/// Returns [`Error::Codec`] if the encoded body would not fit the shadow
/// footer's u16 length field.
pub fn encode_stream_footer_v1(footer: &StreamFooterV1, buf: &mut BytesMut) -> Result<usize> {
    let wire = StreamFooterWireV1 {
        series: footer
            .series
            .iter()
            .map(|info| IndexedSeriesInfoWire {
                uuid: info.uuid.to_string(),
                head_record_epoch: info.head_record_epoch,
                tail_record_epoch: info.tail_record_epoch,
                original_filename: info.original_filename.clone(),
                absolute_position: info.absolute_position,
            })
            .collect(),
    };

    encode_body(&wire, buf)
}

/// Decode a version-1 stream footer body.
///
/// # Errors
///
/// Returns [`Error::Codec`] if the body is malformed or an entry's UUID does
/// not parse.
pub fn decode_stream_footer_v1(body: &[u8]) -> Result<StreamFooterV1> {
    let wire = StreamFooterWireV1::decode(body)?;

    let mut series = Vec::with_capacity(wire.series.len());
    for entry in wire.series {
        series.push(IndexedSeriesInfo {
            uuid: decode_uuid(&entry.uuid)?,
            head_record_epoch: entry.head_record_epoch,
            tail_record_epoch: entry.tail_record_epoch,
            original_filename: entry.original_filename,
            absolute_position: entry.absolute_position,
        });
    }

    Ok(StreamFooterV1 { series })
}

/// Encode the 5-byte shadow descriptor (everything before the boundary
/// marker) in little-endian order.
pub fn encode_shadow_descriptor(
    version: u16,
    footer_type: FooterType,
    footer_length: u16,
) -> [u8; SHADOW_DESCRIPTOR_SIZE] {
    let mut buf = [0u8; SHADOW_DESCRIPTOR_SIZE];
    buf[0..2].copy_from_slice(&version.to_le_bytes());
    buf[2] = footer_type.code();
    buf[3..5].copy_from_slice(&footer_length.to_le_bytes());
    buf
}

/// Decode the 5-byte shadow descriptor into `(version, type code, length)`.
///
/// The type code is returned raw; the reader validates it against the footer
/// flavor it expects.
pub fn decode_shadow_descriptor(buf: &[u8; SHADOW_DESCRIPTOR_SIZE]) -> (u16, u8, u16) {
    let version = u16::from_le_bytes([buf[0], buf[1]]);
    let type_code = buf[2];
    let footer_length = u16::from_le_bytes([buf[3], buf[4]]);
    (version, type_code, footer_length)
}

/// Encode a complete 6-byte shadow footer, boundary marker included.
pub fn encode_shadow_footer(
    version: u16,
    footer_type: FooterType,
    footer_length: u16,
) -> [u8; SHADOW_FOOTER_SIZE] {
    let descriptor = encode_shadow_descriptor(version, footer_type, footer_length);
    let mut buf = [0u8; SHADOW_FOOTER_SIZE];
    buf[..SHADOW_DESCRIPTOR_SIZE].copy_from_slice(&descriptor);
    buf[SHADOW_DESCRIPTOR_SIZE] = BOUNDARY_MARKER;
    buf
}
