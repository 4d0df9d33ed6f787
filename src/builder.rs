//! Stream builder: appends series and finalizes the stream footer.
//!
//! `StreamBuilder` orchestrates the write path. Each appended series flows
//! through a checksum tee into the underlying sink, gets its footer pair
//! emitted, and contributes one entry to the offset table that becomes the
//! stream footer's index at finalization. During updates, regions that
//! already sit at their final location are accounted for without writing a
//! byte.
//!
//! The builder cross-checks its arithmetic against the sink's actual cursor
//! after every append; a divergence means the caller wired the medium wrong
//! (most often a missing repositioning adapter) and is reported as a usage
//! error rather than silently corrupting the stream.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::fnv::Fnv1a32;
use crate::source::{PayloadSource, WritePayload as _};
use crate::structure::{MilestoneKind, StreamStructure};
use crate::types::{SeriesFooter, PAYLOAD_COPY_BUFFER_SIZE, SHADOW_FOOTER_SIZE};
use crate::writer::StreamWriter;

/// Builds a stream by appending series and finalizing with a stream footer.
///
/// The builder exclusively owns the underlying sink for the duration of a
/// build. Appends must all happen before [`finish`](StreamBuilder::finish);
/// finalizing twice is a usage error.
pub struct StreamBuilder<W: Write + Seek> {
    /// Format-level writer over the sink.
    sw: StreamWriter<W>,
    /// Footers of every appended series, in file order.
    series: Vec<SeriesFooter>,
    /// Boundary-marker offset of every appended series, in file order.
    offsets: Vec<i64>,
    /// Logical position of the next byte to be written.
    next_offset: u64,
    /// Payload copy buffer, allocated on first use and reused across series.
    copy_buf: Vec<u8>,
    /// Set once the stream footer has been written.
    finished: bool,
}

impl<W: Write + Seek> StreamBuilder<W> {
    /// Create a builder over a sink positioned at the head of the stream.
    pub fn new(sink: W) -> StreamBuilder<W> {
        StreamBuilder {
            sw: StreamWriter::new(sink),
            series: Vec::new(),
            offsets: Vec::new(),
            next_offset: 0,
            copy_buf: Vec::new(),
            finished: false,
        }
    }

    /// Enable or disable structure tracking on the underlying writer.
    pub fn set_structure_logging(&mut self, enabled: bool) {
        self.sw.set_structure_logging(enabled);
    }

    /// The collected milestone log, if structure tracking is enabled.
    pub fn structure(&self) -> Option<&StreamStructure> {
        self.sw.structure()
    }

    /// Logical position of the next byte to be written. After a successful
    /// append this is one past the series' boundary marker.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Footers of every appended series so far, in file order, with
    /// `bytes_length` and checksum filled in.
    pub fn series(&self) -> &[SeriesFooter] {
        &self.series
    }

    /// Consume the builder and return the underlying sink.
    pub fn into_sink(self) -> W {
        self.sw.into_sink()
    }

    /// Append one series: copy its payload through the checksum tee, then
    /// emit the series footer and shadow footer.
    ///
    /// The payload size is measured during the copy and assigned to the
    /// footer, overriding any prior value, along with the computed FNV-1a/32
    /// checksum.
    ///
    /// # Arguments
    ///
    /// * `source` - Payload bytes, as a stream or a callback.
    /// * `footer` - Footer template for the series; stored (finalized) in
    ///   the builder and retrievable via [`series`](StreamBuilder::series).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the builder is already finished or a
    /// callback source misreports its byte count, [`Error::Io`] on sink
    /// failure, [`Error::Codec`] if the footer does not encode.
    pub fn add_series(&mut self, source: PayloadSource<'_>, mut footer: SeriesFooter) -> Result<()> {
        if self.finished {
            return Err(Error::Usage(
                "add_series() called after finish()".to_string(),
            ));
        }

        self.sw.push_series_milestone(
            None,
            MilestoneKind::SeriesDataHead,
            Some(footer.uuid()),
            None,
        );

        let mut fnv = Fnv1a32::new();
        let mut copied = 0u64;

        match source {
            PayloadSource::Reader(reader) => {
                if self.copy_buf.is_empty() {
                    self.copy_buf.resize(PAYLOAD_COPY_BUFFER_SIZE, 0);
                }

                loop {
                    let n = reader.read(&mut self.copy_buf)?;
                    if n == 0 {
                        break;
                    }
                    let chunk = &self.copy_buf[..n];
                    fnv.update(chunk);
                    self.sw.write(chunk)?;
                    copied += n as u64;
                }
            }
            PayloadSource::Writer(callback) => {
                let mut tee = TeeWriter {
                    sw: &mut self.sw,
                    fnv: &mut fnv,
                    count: &mut copied,
                };
                let reported = callback.write_payload(&mut tee, &footer)?;
                if reported != copied {
                    return Err(Error::Usage(format!(
                        "payload callback reported {reported} bytes but wrote {copied}"
                    )));
                }
            }
        }

        footer.set_bytes_length(copied);
        footer.set_data_fnv1a_checksum(fnv.digest());

        let footer_size = self.sw.write_series_footer(&footer)? as u64;
        self.next_offset += copied + footer_size;

        self.check_sink_position("write")?;

        self.offsets.push(self.next_offset as i64 - 1);
        self.series.push(footer);

        Ok(())
    }

    /// Account for a series region that already exists on the medium at its
    /// final byte range, without writing anything.
    ///
    /// The builder's logical position and the medium's cursor both advance
    /// by `total_region_size`; the footer joins the series table so the
    /// final stream footer indexes the retained region.
    ///
    /// # Arguments
    ///
    /// * `region_head_position` - Offset of the region's first payload byte.
    /// * `total_region_size` - Payload plus footer body plus shadow footer.
    /// * `footer` - The series' footer, as persisted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the builder is finished, the region could
    /// not hold its own footer, or the cursor does not line up with the
    /// builder's arithmetic before or after the advance.
    pub fn add_series_no_write(
        &mut self,
        region_head_position: u64,
        total_region_size: u64,
        footer: SeriesFooter,
    ) -> Result<()> {
        if self.finished {
            return Err(Error::Usage(
                "add_series_no_write() called after finish()".to_string(),
            ));
        }

        if total_region_size < footer.bytes_length() + SHADOW_FOOTER_SIZE as u64 {
            return Err(Error::Usage(format!(
                "region of {total_region_size} bytes cannot hold a {} byte payload and its \
                 footers",
                footer.bytes_length()
            )));
        }

        let initial_position = self.sw.sink_mut().stream_position()?;
        if initial_position != self.next_offset {
            return Err(Error::Usage(format!(
                "medium cursor at {initial_position} but builder expected {} (no-write)",
                self.next_offset
            )));
        }

        self.sw.push_series_milestone(
            Some(region_head_position),
            MilestoneKind::SeriesDataHead,
            Some(footer.uuid()),
            None,
        );

        let footer_position = region_head_position + footer.bytes_length();
        self.sw.push_series_milestone(
            Some(footer_position),
            MilestoneKind::SeriesFooterHead,
            Some(footer.uuid()),
            Some("retained during update".to_string()),
        );

        // Walk the logical position across the region, dropping milestones
        // at the shadow footer and boundary marker on the way.
        self.sw
            .bump_position(total_region_size - SHADOW_FOOTER_SIZE as u64);
        self.sw.push_series_milestone(
            None,
            MilestoneKind::ShadowFooterHead,
            Some(footer.uuid()),
            Some("retained during update".to_string()),
        );

        self.sw.bump_position(SHADOW_FOOTER_SIZE as u64 - 1);
        self.sw.push_series_milestone(
            None,
            MilestoneKind::BoundaryMarker,
            Some(footer.uuid()),
            Some("retained during update".to_string()),
        );

        self.sw.bump_position(1);
        self.next_offset += total_region_size;

        // The medium's cursor skips the retained bytes.
        let final_position = self
            .sw
            .sink_mut()
            .seek(SeekFrom::Current(total_region_size as i64))?;
        if final_position != self.next_offset {
            return Err(Error::Usage(format!(
                "medium cursor at {final_position} after no-write advance, expected {}",
                self.next_offset
            )));
        }

        self.offsets.push(self.next_offset as i64 - 1);
        self.series.push(footer);

        Ok(())
    }

    /// Finalize the stream: build the stream footer from the accumulated
    /// series and offset tables and emit it.
    ///
    /// # Returns
    ///
    /// The total byte length of the finished stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if called twice, otherwise the errors of the
    /// footer write.
    pub fn finish(&mut self) -> Result<u64> {
        if self.finished {
            return Err(Error::Usage("finish() called twice".to_string()));
        }
        self.finished = true;

        let footer_size = self
            .sw
            .write_stream_footer_for_series(&self.series, &self.offsets)? as u64;
        self.next_offset += footer_size;

        tracing::debug!(
            total_size = self.next_offset,
            series_count = self.series.len(),
            "stream finalized"
        );

        Ok(self.next_offset)
    }

    /// Compare the sink's cursor with the builder's arithmetic.
    fn check_sink_position(&mut self, operation: &str) -> Result<()> {
        let position = self.sw.sink_mut().stream_position()?;
        if position != self.next_offset {
            return Err(Error::Usage(format!(
                "medium cursor at {position} but builder expected {} ({operation})",
                self.next_offset
            )));
        }
        Ok(())
    }
}

/// Write tee: forwards payload bytes to the stream writer while feeding the
/// checksum accumulator and counting bytes.
struct TeeWriter<'a, W: Write> {
    sw: &'a mut StreamWriter<W>,
    fnv: &'a mut Fnv1a32,
    count: &'a mut u64,
}

impl<W: Write> Write for TeeWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.sw.write(buf).map_err(|e| match e {
            Error::Io(io) => io,
            other => std::io::Error::other(other.to_string()),
        })?;
        self.fnv.update(&buf[..n]);
        *self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fnv::fnv1a32;
    use crate::types::{SeriesFooterV1, BOUNDARY_MARKER, SOURCE_SHA1_SIZE};
    use std::io::{Cursor, Read};

    fn footer_template(name: &str) -> SeriesFooter {
        let mut sha1 = [0u8; SOURCE_SHA1_SIZE];
        sha1[..3].copy_from_slice(&[11, 22, 33]);
        SeriesFooter::V1(SeriesFooterV1::new(
            1_475_325_296,
            1_475_325_316,
            22,
            name,
            sha1,
        ))
    }

    #[test]
    fn single_series_layout() {
        let payload = b"some time series data";
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));

        let mut reader = Cursor::new(payload.to_vec());
        builder
            .add_series(PayloadSource::Reader(&mut reader), footer_template("a"))
            .unwrap();

        let series_end = builder.next_offset();
        let total = builder.finish().unwrap();
        let raw = builder.into_sink().into_inner();

        assert_eq!(total, raw.len() as u64);

        // Payload sits at the head of the file.
        assert_eq!(&raw[..payload.len()], payload);

        // The series region and the stream both end in boundary markers.
        assert_eq!(raw[series_end as usize - 1], BOUNDARY_MARKER);
        assert_eq!(*raw.last().unwrap(), BOUNDARY_MARKER);
    }

    #[test]
    fn add_series_fills_in_length_and_checksum() {
        let payload = b"some time series data";
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));

        let mut reader = Cursor::new(payload.to_vec());
        builder
            .add_series(PayloadSource::Reader(&mut reader), footer_template("a"))
            .unwrap();

        let stored = &builder.series()[0];
        assert_eq!(stored.bytes_length(), payload.len() as u64);
        assert_eq!(stored.data_fnv1a_checksum(), 0xEFD5_15F5);
        assert_eq!(stored.data_fnv1a_checksum(), fnv1a32(payload));
    }

    #[test]
    fn offsets_are_cumulative_region_sizes_minus_one() {
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));

        let mut first = Cursor::new(b"some time series data".to_vec());
        builder
            .add_series(PayloadSource::Reader(&mut first), footer_template("a"))
            .unwrap();
        let first_end = builder.next_offset();

        let mut second = Cursor::new(b"X some time series data 2 X".to_vec());
        builder
            .add_series(PayloadSource::Reader(&mut second), footer_template("b"))
            .unwrap();
        let second_end = builder.next_offset();

        assert_eq!(builder.offsets, vec![first_end as i64 - 1, second_end as i64 - 1]);
        assert!(first_end < second_end);
    }

    #[test]
    fn callback_source_feeds_the_checksum_tee() {
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));

        let mut callback = |sink: &mut dyn Write, _footer: &SeriesFooter| -> Result<u64> {
            sink.write_all(b"generated ")?;
            sink.write_all(b"payload")?;
            Ok(17)
        };

        builder
            .add_series(PayloadSource::Writer(&mut callback), footer_template("a"))
            .unwrap();

        let stored = &builder.series()[0];
        assert_eq!(stored.bytes_length(), 17);
        assert_eq!(stored.data_fnv1a_checksum(), fnv1a32(b"generated payload"));
    }

    #[test]
    fn callback_misreporting_count_is_a_usage_error() {
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));

        let mut callback = |sink: &mut dyn Write, _footer: &SeriesFooter| -> Result<u64> {
            sink.write_all(b"four")?;
            Ok(99)
        };

        let err = builder
            .add_series(PayloadSource::Writer(&mut callback), footer_template("a"))
            .unwrap_err();
        assert!(matches!(err, Error::Usage(_)), "unexpected error: {err:?}");
    }

    #[test]
    fn zero_length_payload_is_a_legal_region() {
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));

        let mut empty = Cursor::new(Vec::new());
        builder
            .add_series(PayloadSource::Reader(&mut empty), footer_template("a"))
            .unwrap();

        let stored = &builder.series()[0];
        assert_eq!(stored.bytes_length(), 0);

        let total = builder.finish().unwrap();
        let raw = builder.into_sink().into_inner();
        assert_eq!(total, raw.len() as u64);
        assert_eq!(raw[builder_offset(&raw)], BOUNDARY_MARKER);
    }

    /// Boundary offset of the first (only) series, recovered from the file
    /// itself by re-parsing the stream footer.
    fn builder_offset(raw: &[u8]) -> usize {
        let mut reader = crate::reader::StreamReader::new(Cursor::new(raw.to_vec()));
        reader.reset().unwrap();
        let (footer, _, _) = reader.read_stream_footer().unwrap();
        footer.series()[0].absolute_position as usize
    }

    #[test]
    fn finish_twice_is_a_usage_error() {
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));
        builder.finish().unwrap();

        let err = builder.finish().unwrap_err();
        assert!(matches!(err, Error::Usage(_)), "unexpected error: {err:?}");
    }

    #[test]
    fn add_after_finish_is_a_usage_error() {
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));
        builder.finish().unwrap();

        let mut reader = Cursor::new(b"late".to_vec());
        let err = builder
            .add_series(PayloadSource::Reader(&mut reader), footer_template("a"))
            .unwrap_err();
        assert!(matches!(err, Error::Usage(_)), "unexpected error: {err:?}");
    }

    #[test]
    fn empty_stream_is_just_a_stream_footer() {
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));
        let total = builder.finish().unwrap();
        let raw = builder.into_sink().into_inner();

        assert_eq!(total, raw.len() as u64);
        assert_eq!(*raw.last().unwrap(), BOUNDARY_MARKER);

        let mut reader = crate::reader::StreamReader::new(Cursor::new(raw));
        reader.reset().unwrap();
        let (footer, next_boundary, _) = reader.read_stream_footer().unwrap();
        assert!(footer.series().is_empty());
        assert_eq!(next_boundary, -1);
    }

    #[test]
    fn no_write_replays_an_existing_region() {
        // Build a one-series stream, then rebuild its index without
        // rewriting the region.
        let payload = b"some time series data";
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));
        let mut reader = Cursor::new(payload.to_vec());
        builder
            .add_series(PayloadSource::Reader(&mut reader), footer_template("a"))
            .unwrap();
        let stored = builder.series()[0].clone();
        let region_size = builder.next_offset();
        let first_total = builder.finish().unwrap();
        let raw = builder.into_sink().into_inner();

        let mut rebuild = StreamBuilder::new(Cursor::new(raw.clone()));
        rebuild
            .add_series_no_write(0, region_size, stored.clone())
            .unwrap();
        assert_eq!(rebuild.next_offset(), region_size);

        let second_total = rebuild.finish().unwrap();
        assert_eq!(second_total, first_total);

        let rebuilt = rebuild.into_sink().into_inner();
        assert_eq!(rebuilt, raw);
    }

    #[test]
    fn no_write_with_misaligned_cursor_is_a_usage_error() {
        let mut sink = Cursor::new(vec![0u8; 64]);
        sink.set_position(8); // Cursor disagrees with a fresh builder.
        let mut builder = StreamBuilder::new(sink);

        let mut footer = footer_template("a");
        footer.set_bytes_length(10);
        let err = builder.add_series_no_write(0, 40, footer).unwrap_err();
        assert!(matches!(err, Error::Usage(_)), "unexpected error: {err:?}");
    }

    #[test]
    fn no_write_region_too_small_is_a_usage_error() {
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));

        let mut footer = footer_template("a");
        footer.set_bytes_length(100);
        let err = builder.add_series_no_write(0, 20, footer).unwrap_err();
        assert!(matches!(err, Error::Usage(_)), "unexpected error: {err:?}");
    }

    #[test]
    fn payload_round_trips_through_a_full_build() {
        let payloads: [&[u8]; 3] = [b"alpha", b"", b"a longer third payload with more bytes"];
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));

        for (i, payload) in payloads.iter().enumerate() {
            let mut reader = Cursor::new(payload.to_vec());
            builder
                .add_series(
                    PayloadSource::Reader(&mut reader),
                    footer_template(&format!("series-{i}")),
                )
                .unwrap();
        }
        builder.finish().unwrap();
        let raw = builder.into_sink().into_inner();

        let mut reader = crate::reader::StreamReader::new(Cursor::new(raw));
        reader.reset().unwrap();
        let (stream_footer, _, _) = reader.read_stream_footer().unwrap();
        assert_eq!(stream_footer.series().len(), 3);

        for (i, payload) in payloads.iter().enumerate() {
            let info = stream_footer.series()[i].clone();
            let mut out = Vec::new();
            let (footer, _, checksum_ok) = reader
                .read_series(&info, Some(crate::source::PayloadSink::Writer(&mut out)))
                .unwrap();
            assert!(checksum_ok, "series {i} checksum");
            assert_eq!(&out[..], *payload, "series {i} payload");
            assert_eq!(footer.bytes_length(), payload.len() as u64);
        }
    }

    #[test]
    fn reader_source_drains_until_eof() {
        // A reader source shorter than the copy buffer still copies fully.
        struct Dribble {
            data: Vec<u8>,
            at: usize,
        }
        impl Read for Dribble {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.at >= self.data.len() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.data[self.at];
                self.at += 1;
                Ok(1)
            }
        }

        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));
        let mut dribble = Dribble {
            data: b"one byte at a time".to_vec(),
            at: 0,
        };
        builder
            .add_series(PayloadSource::Reader(&mut dribble), footer_template("a"))
            .unwrap();

        assert_eq!(builder.series()[0].bytes_length(), 18);
        assert_eq!(
            builder.series()[0].data_fnv1a_checksum(),
            fnv1a32(b"one byte at a time")
        );
    }
}
