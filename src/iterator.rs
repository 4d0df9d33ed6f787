//! Reverse iteration over the series in a stream.
//!
//! A `SeriesIterator` reads the stream footer once, retains its index, and
//! then visits series one at a time. The stream footer lives at the tail of
//! the file, so the walk arrives there first; iteration itself starts at the
//! last index entry and decrements, yielding the latest-added series first.
//! Exhaustion is signaled with [`Error::EndOfStream`], which is also what an
//! empty stream yields on the first call.

use std::io::{Read, Seek};

use crate::error::{Error, Result};
use crate::reader::StreamReader;
use crate::source::PayloadSink;
use crate::types::{IndexedSeriesInfo, SeriesFooter};

/// Steps through the series of a stream, last-added-first.
///
/// Construction performs the single stream-footer read; each
/// [`iterate`](SeriesIterator::iterate) call then performs one random-access
/// series read through the shared reader.
#[derive(Debug)]
pub struct SeriesIterator<'r, R: Read + Seek> {
    /// Reader the iterator drives.
    reader: &'r mut StreamReader<R>,
    /// The stream footer's index, in file order.
    series_info: Vec<IndexedSeriesInfo>,
    /// Index of the next series to visit; negative once exhausted.
    current: isize,
}

impl<'r, R: Read + Seek> SeriesIterator<'r, R> {
    /// Read the stream footer and position the iterator on the last series.
    ///
    /// # Errors
    ///
    /// Propagates the errors of the stream-footer read (including
    /// [`Error::Io`] when the medium holds no stream at all).
    pub fn new(reader: &'r mut StreamReader<R>) -> Result<SeriesIterator<'r, R>> {
        reader.reset()?;
        let (stream_footer, _, _) = reader.read_stream_footer()?;
        let series_info = stream_footer.series().to_vec();
        let current = series_info.len() as isize - 1;

        Ok(SeriesIterator {
            reader,
            series_info,
            current,
        })
    }

    /// Number of series recorded in the stream footer.
    pub fn count(&self) -> usize {
        self.series_info.len()
    }

    /// Index of the series the next [`iterate`](SeriesIterator::iterate)
    /// call will visit. Decrements after each call; negative once the
    /// iterator is exhausted.
    pub fn current(&self) -> isize {
        self.current
    }

    /// Index entry for series `i` (file order). Cheap: no I/O.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range, like any slice index.
    pub fn series_info(&self, i: usize) -> &IndexedSeriesInfo {
        &self.series_info[i]
    }

    /// Visit the next series: read it through the checksum tee, copying the
    /// payload into `sink` when one is given.
    ///
    /// # Returns
    ///
    /// The decoded series footer and whether the payload checksum matched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EndOfStream`] once every series has been visited (or
    /// immediately on an empty stream); otherwise the errors of the
    /// underlying series read.
    pub fn iterate(
        &mut self,
        sink: Option<PayloadSink<'_>>,
    ) -> Result<(SeriesFooter, bool)> {
        if self.current < 0 {
            return Err(Error::EndOfStream);
        }

        let info = self.series_info[self.current as usize].clone();
        self.current -= 1;

        let (footer, _, checksum_ok) = self.reader.read_series(&info, sink)?;
        Ok((footer, checksum_ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StreamBuilder;
    use crate::source::PayloadSource;
    use crate::types::{SeriesFooterV1, SOURCE_SHA1_SIZE};
    use std::io::Cursor;

    fn build_stream(payloads: &[&[u8]]) -> Vec<u8> {
        let mut builder = StreamBuilder::new(Cursor::new(Vec::new()));
        for (i, payload) in payloads.iter().enumerate() {
            let footer = SeriesFooter::V1(SeriesFooterV1::new(
                1_475_325_296 + i as u64 * 10,
                1_475_325_316 + i as u64 * 10,
                payload.len() as u64,
                format!("series-{i}"),
                [0u8; SOURCE_SHA1_SIZE],
            ));
            let mut reader = Cursor::new(payload.to_vec());
            builder
                .add_series(PayloadSource::Reader(&mut reader), footer)
                .unwrap();
        }
        builder.finish().unwrap();
        builder.into_sink().into_inner()
    }

    #[test]
    fn two_series_yield_last_added_first() {
        let raw = build_stream(&[b"some time series data", b"X some time series data 2 X"]);
        let mut reader = StreamReader::new(Cursor::new(raw));
        let mut it = SeriesIterator::new(&mut reader).unwrap();

        assert_eq!(it.count(), 2);
        assert_eq!(it.current(), 1);

        let mut out = Vec::new();
        let (footer, checksum_ok) = it
            .iterate(Some(PayloadSink::Writer(&mut out)))
            .unwrap();
        assert!(checksum_ok);
        assert_eq!(out, b"X some time series data 2 X");
        assert_eq!(footer.original_filename(), "series-1");
        assert_eq!(it.current(), 0);

        let mut out = Vec::new();
        let (footer, checksum_ok) = it
            .iterate(Some(PayloadSink::Writer(&mut out)))
            .unwrap();
        assert!(checksum_ok);
        assert_eq!(out, b"some time series data");
        assert_eq!(footer.original_filename(), "series-0");
        assert_eq!(it.current(), -1);

        let err = it.iterate(None).unwrap_err();
        assert!(matches!(err, Error::EndOfStream));
        assert_eq!(it.current(), -1);
    }

    #[test]
    fn index_entries_agree_with_footers() {
        let raw = build_stream(&[b"some time series data", b"X some time series data 2 X"]);
        let mut reader = StreamReader::new(Cursor::new(raw));
        let mut it = SeriesIterator::new(&mut reader).unwrap();

        let info_1 = it.series_info(1).clone();
        let (footer_1, _) = it.iterate(None).unwrap();
        assert_eq!(info_1.uuid, footer_1.uuid());
        assert_eq!(info_1.head_record_epoch, footer_1.head_record_epoch());
        assert_eq!(info_1.tail_record_epoch, footer_1.tail_record_epoch());

        let info_0 = it.series_info(0).clone();
        let (footer_0, _) = it.iterate(None).unwrap();
        assert_eq!(info_0.uuid, footer_0.uuid());
        assert_eq!(info_0.head_record_epoch, footer_0.head_record_epoch());
        assert_eq!(info_0.tail_record_epoch, footer_0.tail_record_epoch());
    }

    #[test]
    fn single_series_yields_once_then_exhausts() {
        let raw = build_stream(&[b"only payload"]);
        let mut reader = StreamReader::new(Cursor::new(raw));
        let mut it = SeriesIterator::new(&mut reader).unwrap();

        assert_eq!(it.count(), 1);
        assert_eq!(it.current(), 0);

        let (_, checksum_ok) = it.iterate(None).unwrap();
        assert!(checksum_ok);

        assert!(matches!(it.iterate(None).unwrap_err(), Error::EndOfStream));
    }

    #[test]
    fn empty_stream_exhausts_immediately() {
        let raw = build_stream(&[]);
        let mut reader = StreamReader::new(Cursor::new(raw));
        let mut it = SeriesIterator::new(&mut reader).unwrap();

        assert_eq!(it.count(), 0);
        assert_eq!(it.current(), -1);
        assert!(matches!(it.iterate(None).unwrap_err(), Error::EndOfStream));
    }

    #[test]
    fn zero_length_medium_fails_construction_with_io_error() {
        let mut reader = StreamReader::new(Cursor::new(Vec::new()));
        let err = SeriesIterator::new(&mut reader).unwrap_err();
        assert!(matches!(err, Error::Io(_)), "unexpected error: {err:?}");
    }
}
