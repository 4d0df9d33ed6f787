//! Minimally-invasive in-place stream rewrite.
//!
//! The updater reconciles the caller's desired set of series with what a
//! stream already holds. Series that are unchanged and already in their
//! final position are accounted for without touching a byte. Series that
//! survive but sit behind dropped or reordered predecessors are copied
//! forward from their current on-disk region when it still lies ahead of the
//! write cursor, or re-materialized from the caller's data source when it
//! has been overwritten. Truly new series are appended. A fresh stream
//! footer is then written and the medium truncated to the logical size.
//!
//! The unchanged-prefix rule makes a replay of an identical series set a
//! zero-write operation: the stream footer is not even rewritten, and the
//! file stays byte-identical.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use uuid::Uuid;

use crate::builder::StreamBuilder;
use crate::error::{Error, Result};
use crate::medium::{BouncebackReader, BouncebackWriter, Medium, SharedMedium};
use crate::reader::StreamReader;
use crate::source::{PayloadSource, SeriesDataSource};
use crate::structure::StreamStructure;
use crate::types::{SeriesFooter, SOURCE_SHA1_SIZE};

/// Outcome counters for one [`Updater::write`] run.
///
/// `skips` counts queued series that already existed in the stream (whether
/// reused in place, copied forward, or re-materialized); `adds` counts
/// appended new series; `drops` counts persisted series the caller did not
/// queue again, which therefore vanish from the rewritten stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateStats {
    /// Queued series that already existed in the stream.
    pub skips: usize,
    /// Newly appended series.
    pub adds: usize,
    /// Persisted series not queued again, dropped by the rewrite.
    pub drops: usize,
}

/// Identity of a persisted series: same UUID and same source digest means
/// the payload content is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SeriesKey {
    uuid: Uuid,
    source_sha1: [u8; SOURCE_SHA1_SIZE],
}

impl SeriesKey {
    fn of(footer: &SeriesFooter) -> SeriesKey {
        SeriesKey {
            uuid: footer.uuid(),
            source_sha1: *footer.source_sha1(),
        }
    }
}

/// Where one series currently lives in the stream.
#[derive(Debug)]
struct PersistedSeries {
    /// Index of the series in the existing stream's order.
    seq_position: usize,
    /// Absolute offset of the region's first payload byte.
    file_position: u64,
    /// The footer as persisted.
    footer: SeriesFooter,
    /// Payload plus footer body plus shadow footer.
    total_region_size: u64,
}

/// Rewrites a stream in place against a desired series set.
///
/// Construction scans the existing stream (when the medium holds one) into
/// an index keyed by `(uuid, source_sha1)`. Queue the desired series with
/// [`add_series`](Updater::add_series) in their desired order, then call
/// [`write`](Updater::write) once; the updater owns all read and write
/// access to the medium until then.
pub struct Updater<M: Medium, G: SeriesDataSource> {
    /// Shared handle used for truncation and copy-forward reads.
    medium: SharedMedium<M>,
    /// Reader cursor over the same medium.
    reader: StreamReader<SharedMedium<M>>,
    /// Builder writing through a position-restoring cursor.
    builder: StreamBuilder<BouncebackWriter<SharedMedium<M>>>,
    /// Caller's payload getter for new or re-materialized series.
    source: G,
    /// Desired series, in desired order.
    queued: Vec<SeriesFooter>,
    /// Index of the series the stream currently holds.
    known: HashMap<SeriesKey, PersistedSeries>,
    /// Whether the medium held a stream at construction time.
    had_stream: bool,
    /// Set once [`Updater::write`] has run; the engine is single-shot.
    written: bool,
}

impl<M: Medium, G: SeriesDataSource> Updater<M, G> {
    /// Open an updater over a medium holding a valid stream (or nothing at
    /// all, in which case the rewrite builds the stream from scratch).
    ///
    /// # Errors
    ///
    /// Propagates parse errors from the existing stream's footer walk.
    pub fn new(medium: M, source: G) -> Result<Updater<M, G>> {
        let medium = SharedMedium::new(medium);
        let mut reader = StreamReader::new(medium.clone());

        let len = {
            let mut handle = medium.clone();
            handle.seek(SeekFrom::End(0))?
        };
        let had_stream = len > 0;

        // Enumerate the existing series. One seek per series, but no payload
        // reads.
        let mut known = HashMap::new();
        if had_stream {
            reader.reset()?;
            let (stream_footer, _, _) = reader.read_stream_footer()?;

            for (i, info) in stream_footer.series().iter().enumerate() {
                let boundary = u64::try_from(info.absolute_position).map_err(|_| {
                    Error::Codec(format!(
                        "indexed series {} has negative position {}",
                        info.uuid, info.absolute_position
                    ))
                })?;

                let (footer, payload_offset, total_region_size) =
                    reader.read_series_info_at(boundary)?;

                known.insert(
                    SeriesKey::of(&footer),
                    PersistedSeries {
                        seq_position: i,
                        file_position: payload_offset,
                        footer,
                        total_region_size,
                    },
                );
            }
        }

        // The write cursor starts at the head of the stream and restores its
        // own position around every write, so the reader may seek freely in
        // between.
        let mut sink = BouncebackWriter::new(medium.clone())?;
        sink.seek(SeekFrom::Start(0))?;
        let builder = StreamBuilder::new(sink);

        Ok(Updater {
            medium,
            reader,
            builder,
            source,
            queued: Vec::new(),
            known,
            had_stream,
            written: false,
        })
    }

    /// Enable or disable structure tracking on the write path.
    pub fn set_structure_logging(&mut self, enabled: bool) {
        self.builder.set_structure_logging(enabled);
    }

    /// The collected milestone log, if structure tracking is enabled.
    pub fn structure(&self) -> Option<&StreamStructure> {
        self.builder.structure()
    }

    /// Queue a series for the rewritten stream. Nothing is written until
    /// [`write`](Updater::write).
    pub fn add_series(&mut self, footer: SeriesFooter) {
        self.queued.push(footer);
    }

    /// Perform the rewrite and return `(total_size, stats)`.
    ///
    /// Single-shot: a second call is a usage error, and after a failure the
    /// engine must be discarded. If nothing changed (every queued series was
    /// already in place, nothing added, nothing dropped), the medium is left
    /// untouched and the existing stream's size is returned.
    ///
    /// # Errors
    ///
    /// Propagates I/O, codec, and usage errors from the underlying builder
    /// and reader. A failure mid-write can leave the stream malformed; the
    /// medium should be considered corrupt until rebuilt.
    pub fn write(&mut self) -> Result<(u64, UpdateStats)> {
        if self.written {
            return Err(Error::Usage("write() called twice".to_string()));
        }
        self.written = true;

        let queued = std::mem::take(&mut self.queued);
        let mut stats = UpdateStats::default();
        let mut any_changes = false;
        let mut seq_position = 0usize;
        let mut hits = 0usize;

        // Phase A: series that already exist, in queued order. An unchanged
        // prefix is reused in place; after the first divergence everything
        // must be written again.
        for footer in &queued {
            let key = SeriesKey::of(footer);
            let Some(existing) = self.known.get(&key) else {
                continue;
            };
            hits += 1;

            if seq_position == existing.seq_position && !any_changes {
                tracing::debug!(
                    uuid = %footer.uuid(),
                    position = existing.file_position,
                    "series unchanged; reusing region in place"
                );
                self.builder.add_series_no_write(
                    existing.file_position,
                    existing.total_region_size,
                    footer.clone(),
                )?;
            } else {
                any_changes = true;

                if existing.file_position >= self.builder.next_offset() {
                    // The old region still lies ahead of the write cursor:
                    // copy it forward directly from the medium.
                    tracing::debug!(
                        uuid = %footer.uuid(),
                        from = existing.file_position,
                        to = self.builder.next_offset(),
                        "copying series forward"
                    );
                    let mut payload =
                        BouncebackReader::with_position(self.medium.clone(), existing.file_position)
                            .take(existing.footer.bytes_length());
                    self.builder.add_series(
                        PayloadSource::Reader(&mut payload),
                        existing.footer.clone(),
                    )?;
                } else {
                    // The old region has been overwritten; ask the data
                    // source for the payload again. The persisted footer is
                    // used because the content is asserted unchanged.
                    tracing::debug!(
                        uuid = %footer.uuid(),
                        "re-materializing overwritten series from data source"
                    );
                    let existing_footer = existing.footer.clone();
                    let mut payload = self.source.payload_reader(&existing_footer)?;
                    self.builder
                        .add_series(PayloadSource::Reader(payload.as_mut()), existing_footer)?;
                }
            }

            stats.skips += 1;
            seq_position += 1;
        }

        stats.drops = self.known.len().saturating_sub(hits);

        // Phase B: truly new series are appended at the back, with their
        // update timestamp bumped.
        for footer in queued {
            if self.known.contains_key(&SeriesKey::of(&footer)) {
                continue;
            }
            any_changes = true;

            let mut footer = footer;
            footer.touch_updated_epoch();
            tracing::debug!(uuid = %footer.uuid(), "appending new series");

            let mut payload = self.source.payload_reader(&footer)?;
            self.builder
                .add_series(PayloadSource::Reader(payload.as_mut()), footer)?;

            stats.adds += 1;
        }

        // Phase C: finalize. A run that changed nothing skips the footer
        // rewrite entirely; the file is already exactly the desired stream.
        if stats.adds == 0 && stats.drops == 0 && !any_changes && self.had_stream {
            self.reader.reset()?;
            let (_, _, footer_size) = self.reader.read_stream_footer()?;
            let total = self.builder.next_offset() + footer_size as u64;
            tracing::debug!(total, skips = stats.skips, "no changes; stream left untouched");
            return Ok((total, stats));
        }

        let total = self.builder.finish()?;

        let truncated = self.medium.truncate_to(total)?;
        if !truncated {
            tracing::warn!(
                total,
                "medium does not support truncation; trailing bytes may remain"
            );
        }

        Ok((total, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::SeriesIterator;
    use crate::source::PayloadSink;
    use crate::testing::{test_footer, TEST_HEAD_EPOCH, TEST_PAYLOAD_1, TEST_PAYLOAD_2};
    use std::io::Cursor;

    const PAYLOAD_1: &[u8] = TEST_PAYLOAD_1;
    const PAYLOAD_2: &[u8] = TEST_PAYLOAD_2;

    fn footer(name: &str, seed: u8, head: u64) -> SeriesFooter {
        test_footer(head, name, &[seed, seed + 11, seed + 22])
    }

    /// The canonical two-series stream, without the offsets the updater
    /// tests do not need.
    fn two_series_stream() -> (Vec<u8>, Vec<SeriesFooter>) {
        let (raw, footers, _) = crate::testing::write_two_series_stream();
        (raw, footers)
    }

    fn payload_map(footers: &[SeriesFooter]) -> HashMap<Uuid, Vec<u8>> {
        let payloads: [&[u8]; 2] = [PAYLOAD_1, PAYLOAD_2];
        footers
            .iter()
            .zip(payloads)
            .map(|(f, p)| (f.uuid(), p.to_vec()))
            .collect()
    }

    /// Read every series of a finished stream, front-of-file order.
    fn read_all(raw: Vec<u8>) -> Vec<(SeriesFooter, Vec<u8>)> {
        let mut reader = StreamReader::new(Cursor::new(raw));
        let mut it = SeriesIterator::new(&mut reader).unwrap();
        let mut out = vec![None; it.count()];
        for i in (0..it.count()).rev() {
            let mut payload = Vec::new();
            let (footer, checksum_ok) = it
                .iterate(Some(PayloadSink::Writer(&mut payload)))
                .unwrap();
            assert!(checksum_ok, "checksum for series {i}");
            out[i] = Some((footer, payload));
        }
        out.into_iter().map(|entry| entry.unwrap()).collect()
    }

    #[test]
    fn replaying_the_same_series_is_a_no_op() {
        let (raw, footers) = two_series_stream();
        let mut cursor = Cursor::new(raw.clone());

        let mut updater = Updater::new(&mut cursor, payload_map(&footers)).unwrap();
        updater.add_series(footers[0].clone());
        updater.add_series(footers[1].clone());

        let (total, stats) = updater.write().unwrap();
        drop(updater);

        assert_eq!(
            stats,
            UpdateStats {
                skips: 2,
                adds: 0,
                drops: 0
            }
        );
        assert_eq!(total, raw.len() as u64);
        assert_eq!(cursor.get_ref(), &raw, "file must be byte-identical");
    }

    #[test]
    fn write_twice_is_a_usage_error() {
        let (raw, footers) = two_series_stream();
        let mut cursor = Cursor::new(raw);

        let mut updater = Updater::new(&mut cursor, payload_map(&footers)).unwrap();
        updater.add_series(footers[0].clone());
        updater.add_series(footers[1].clone());
        updater.write().unwrap();

        let err = updater.write().unwrap_err();
        assert!(matches!(err, Error::Usage(_)), "unexpected error: {err:?}");
    }

    #[test]
    fn replay_preserves_updated_epoch() {
        let (raw, footers) = two_series_stream();
        let mut cursor = Cursor::new(raw);

        let mut updater = Updater::new(&mut cursor, payload_map(&footers)).unwrap();
        updater.add_series(footers[0].clone());
        updater.add_series(footers[1].clone());
        updater.write().unwrap();
        drop(updater);

        let stored = read_all(cursor.into_inner());
        for (footer, stored_footer) in footers.iter().zip(stored.iter().map(|(f, _)| f)) {
            assert_eq!(footer.updated_epoch(), stored_footer.updated_epoch());
        }
    }

    #[test]
    fn appending_a_third_series() {
        let (raw, footers) = two_series_stream();
        let mut cursor = Cursor::new(raw.clone());

        let third = footer("third.bin", 77, TEST_HEAD_EPOCH + 20);
        let third_payload = b"a fresh third payload".to_vec();
        let mut payloads = payload_map(&footers);
        payloads.insert(third.uuid(), third_payload.clone());

        let mut updater = Updater::new(&mut cursor, payloads).unwrap();
        updater.add_series(footers[0].clone());
        updater.add_series(footers[1].clone());
        updater.add_series(third.clone());

        let (total, stats) = updater.write().unwrap();
        drop(updater);

        assert_eq!(
            stats,
            UpdateStats {
                skips: 2,
                adds: 1,
                drops: 0
            }
        );
        assert!(total > raw.len() as u64);
        assert_eq!(cursor.get_ref().len() as u64, total);

        // The first two regions were not rewritten.
        assert_eq!(&cursor.get_ref()[..PAYLOAD_1.len()], PAYLOAD_1);

        let stored = read_all(cursor.into_inner());
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].1, PAYLOAD_1);
        assert_eq!(stored[1].1, PAYLOAD_2);
        assert_eq!(stored[2].1, third_payload);
        assert_eq!(stored[2].0.uuid(), third.uuid());
        assert!(stored[2].0.updated_epoch() >= third.updated_epoch());
    }

    #[test]
    fn dropping_the_second_series() {
        let (raw, footers) = two_series_stream();
        let mut cursor = Cursor::new(raw.clone());

        let mut updater = Updater::new(&mut cursor, payload_map(&footers)).unwrap();
        updater.add_series(footers[0].clone());

        let (total, stats) = updater.write().unwrap();
        drop(updater);

        assert_eq!(
            stats,
            UpdateStats {
                skips: 1,
                adds: 0,
                drops: 1
            }
        );
        assert!(total < raw.len() as u64);
        assert_eq!(cursor.get_ref().len() as u64, total, "medium was truncated");

        let stored = read_all(cursor.into_inner());
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0.uuid(), footers[0].uuid());
        assert_eq!(stored[0].1, PAYLOAD_1);
    }

    #[test]
    fn keeping_only_the_later_series_copies_it_forward() {
        let (raw, footers) = two_series_stream();
        let mut cursor = Cursor::new(raw.clone());

        // The data source deliberately has no payloads: the copy must come
        // from the medium itself.
        let empty_source: HashMap<Uuid, Vec<u8>> = HashMap::new();

        let mut updater = Updater::new(&mut cursor, empty_source).unwrap();
        updater.add_series(footers[1].clone());

        let (total, stats) = updater.write().unwrap();
        drop(updater);

        assert_eq!(
            stats,
            UpdateStats {
                skips: 1,
                adds: 0,
                drops: 1
            }
        );
        assert!(total < raw.len() as u64);
        assert_eq!(cursor.get_ref().len() as u64, total);

        let stored = read_all(cursor.into_inner());
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0.uuid(), footers[1].uuid());
        assert_eq!(stored[0].1, PAYLOAD_2, "payload copied forward intact");
        assert_eq!(
            stored[0].0.updated_epoch(),
            footers[1].updated_epoch(),
            "copy-forward keeps the persisted footer"
        );
    }

    #[test]
    fn reordering_rematerializes_the_overwritten_series() {
        let (raw, footers) = two_series_stream();
        let mut cursor = Cursor::new(raw);

        let mut updater = Updater::new(&mut cursor, payload_map(&footers)).unwrap();
        updater.add_series(footers[1].clone());
        updater.add_series(footers[0].clone());

        let (total, stats) = updater.write().unwrap();
        drop(updater);

        assert_eq!(
            stats,
            UpdateStats {
                skips: 2,
                adds: 0,
                drops: 0
            }
        );
        assert_eq!(cursor.get_ref().len() as u64, total);

        let stored = read_all(cursor.into_inner());
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].0.uuid(), footers[1].uuid());
        assert_eq!(stored[0].1, PAYLOAD_2);
        assert_eq!(stored[1].0.uuid(), footers[0].uuid());
        assert_eq!(stored[1].1, PAYLOAD_1);
    }

    #[test]
    fn building_a_stream_on_an_empty_medium() {
        let mut cursor = Cursor::new(Vec::new());

        let first = footer("first.bin", 11, TEST_HEAD_EPOCH);
        let mut payloads = HashMap::new();
        payloads.insert(first.uuid(), PAYLOAD_1.to_vec());

        let mut updater = Updater::new(&mut cursor, payloads).unwrap();
        updater.add_series(first.clone());

        let (total, stats) = updater.write().unwrap();
        drop(updater);

        assert_eq!(
            stats,
            UpdateStats {
                skips: 0,
                adds: 1,
                drops: 0
            }
        );
        assert_eq!(cursor.get_ref().len() as u64, total);

        let stored = read_all(cursor.into_inner());
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0.uuid(), first.uuid());
        assert_eq!(stored[0].1, PAYLOAD_1);
    }

    #[test]
    fn empty_medium_with_nothing_queued_writes_an_empty_stream() {
        let mut cursor = Cursor::new(Vec::new());
        let source: HashMap<Uuid, Vec<u8>> = HashMap::new();

        let mut updater = Updater::new(&mut cursor, source).unwrap();
        let (total, stats) = updater.write().unwrap();
        drop(updater);

        assert_eq!(stats, UpdateStats::default());
        assert_eq!(cursor.get_ref().len() as u64, total);

        let mut reader = StreamReader::new(Cursor::new(cursor.into_inner()));
        reader.reset().unwrap();
        let (stream_footer, _, _) = reader.read_stream_footer().unwrap();
        assert!(stream_footer.series().is_empty());
    }

    #[test]
    fn dropping_everything_leaves_an_empty_stream() {
        let (raw, footers) = two_series_stream();
        let mut cursor = Cursor::new(raw);

        let mut updater = Updater::new(&mut cursor, payload_map(&footers)).unwrap();
        let (total, stats) = updater.write().unwrap();
        drop(updater);

        assert_eq!(
            stats,
            UpdateStats {
                skips: 0,
                adds: 0,
                drops: 2
            }
        );
        assert_eq!(cursor.get_ref().len() as u64, total);

        let mut reader = StreamReader::new(Cursor::new(cursor.into_inner()));
        reader.reset().unwrap();
        let (stream_footer, _, _) = reader.read_stream_footer().unwrap();
        assert!(stream_footer.series().is_empty());
    }
}
