//! Shared fixtures for tests.
//!
//! Canonical payloads, footer templates, and a prebuilt two-series stream
//! used across the crate's unit and integration suites. The two payloads and
//! the 2016-10-01T12:34:56Z head time are fixed so checksum and layout
//! expectations stay stable; the two fixture UUIDs are pinned so structure
//! dumps and index assertions can name exact series.

use std::io::Cursor;

use uuid::Uuid;

use crate::builder::StreamBuilder;
use crate::source::PayloadSource;
use crate::types::{SeriesFooter, SeriesFooterV1, SOURCE_SHA1_SIZE};

/// First canonical test payload (21 bytes, FNV-1a/32 0xEFD515F5).
pub const TEST_PAYLOAD_1: &[u8] = b"some time series data";

/// Second canonical test payload (27 bytes, FNV-1a/32 0xBA7AC887).
pub const TEST_PAYLOAD_2: &[u8] = b"X some time series data 2 X";

/// 2016-10-01T12:34:56Z as epoch seconds.
pub const TEST_HEAD_EPOCH: u64 = 1_475_325_296;

/// Pinned UUID of the first fixture series.
pub const TEST_UUID_1: &str = "d095abf5-126e-48a7-8974-885de92bd964";

/// Pinned UUID of the second fixture series.
pub const TEST_UUID_2: &str = "8a4ba0c4-0a0d-442f-8256-1d61adb16abc";

/// A 20-byte SHA-1 value starting with `prefix`, zero-padded.
///
/// # Panics
///
/// Panics if `prefix` is longer than 20 bytes.
pub fn test_sha1(prefix: &[u8]) -> [u8; SOURCE_SHA1_SIZE] {
    let mut digest = [0u8; SOURCE_SHA1_SIZE];
    digest[..prefix.len()].copy_from_slice(prefix);
    digest
}

/// A fresh footer template with the fixture time range and a random UUID.
pub fn test_footer(head_epoch: u64, name: &str, sha1_prefix: &[u8]) -> SeriesFooter {
    SeriesFooter::V1(SeriesFooterV1::new(
        head_epoch,
        head_epoch + 20,
        22,
        name,
        test_sha1(sha1_prefix),
    ))
}

/// Like [`test_footer`], with the UUID pinned.
///
/// # Panics
///
/// Panics if `uuid` does not parse.
pub fn test_footer_with_uuid(
    uuid: &str,
    head_epoch: u64,
    name: &str,
    sha1_prefix: &[u8],
) -> SeriesFooter {
    let mut v1 = SeriesFooterV1::new(
        head_epoch,
        head_epoch + 20,
        22,
        name,
        test_sha1(sha1_prefix),
    );
    v1.uuid = Uuid::parse_str(uuid).expect("fixture UUID parses");
    SeriesFooter::V1(v1)
}

/// Build the canonical two-series stream in memory.
///
/// Returns the raw stream bytes, the finalized footers (with byte lengths
/// and checksums filled in), and each series' end offset (one past its
/// boundary marker). The layout is validated before returning.
pub fn write_two_series_stream() -> (Vec<u8>, Vec<SeriesFooter>, Vec<u64>) {
    let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));

    let mut first = Cursor::new(TEST_PAYLOAD_1.to_vec());
    builder
        .add_series(
            PayloadSource::Reader(&mut first),
            test_footer_with_uuid(TEST_UUID_1, TEST_HEAD_EPOCH, "some_filename", &[11, 22, 33]),
        )
        .expect("first add_series");
    let first_end = builder.next_offset();

    let mut second = Cursor::new(TEST_PAYLOAD_2.to_vec());
    builder
        .add_series(
            PayloadSource::Reader(&mut second),
            test_footer_with_uuid(
                TEST_UUID_2,
                TEST_HEAD_EPOCH + 10,
                "some_filename2",
                &[44, 55, 66],
            ),
        )
        .expect("second add_series");
    let second_end = builder.next_offset();

    let footers = builder.series().to_vec();
    let total = builder.finish().expect("finish");
    let raw = builder.into_sink().into_inner();

    assert_eq!(total, raw.len() as u64, "finish() total equals stream size");
    assert_eq!(raw[first_end as usize - 1], 0, "first boundary marker");
    assert_eq!(raw[second_end as usize - 1], 0, "second boundary marker");
    assert_eq!(*raw.last().unwrap(), 0, "stream boundary marker");

    (raw, footers, vec![first_end, second_end])
}

/// Render a hex dump of `bytes` for failure diagnostics.
pub fn dump_bytes(description: &str, bytes: &[u8]) -> String {
    let mut out = format!("DUMP({description}):");
    for b in bytes {
        out.push_str(&format!(" {b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fnv::fnv1a32;

    #[test]
    fn canonical_payload_checksums_are_pinned() {
        assert_eq!(fnv1a32(TEST_PAYLOAD_1), 0xEFD5_15F5);
        assert_eq!(fnv1a32(TEST_PAYLOAD_2), 0xBA7A_C887);
    }

    #[test]
    fn sha1_fixture_is_zero_padded() {
        let digest = test_sha1(&[0x0B, 0x16, 0x21]);
        assert_eq!(digest[..3], [0x0B, 0x16, 0x21]);
        assert!(digest[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn fixture_stream_has_two_finalized_footers() {
        let (raw, footers, region_ends) = write_two_series_stream();

        assert_eq!(footers.len(), 2);
        assert_eq!(footers[0].uuid().to_string(), TEST_UUID_1);
        assert_eq!(footers[1].uuid().to_string(), TEST_UUID_2);
        assert_eq!(footers[0].bytes_length(), TEST_PAYLOAD_1.len() as u64);
        assert_eq!(footers[1].bytes_length(), TEST_PAYLOAD_2.len() as u64);
        assert_eq!(footers[0].data_fnv1a_checksum(), 0xEFD5_15F5);
        assert_eq!(footers[1].data_fnv1a_checksum(), 0xBA7A_C887);

        assert!(region_ends[0] < region_ends[1]);
        assert!((region_ends[1] as usize) < raw.len());
    }

    #[test]
    fn dump_bytes_renders_hex_pairs() {
        let rendered = dump_bytes("header", &[0x00, 0xAB, 0x10]);
        assert_eq!(rendered, "DUMP(header): 00 ab 10");
    }
}
