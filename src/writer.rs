//! Stream writer primitives.
//!
//! `StreamWriter` owns the forward-direction mechanics of the format: it
//! tracks a monotonic byte position from the head of the stream, appends raw
//! payload bytes, and emits encoded footer bodies followed by their fixed
//! shadow footers. Footer bodies are encoded into a per-writer buffer that is
//! cleared between footers, so a long build performs one arena allocation.
//!
//! Higher-level orchestration (checksums, offset tables, finalization) lives
//! in the builder; this type only knows how to put format elements on the
//! wire at the current position.

use std::io::Write;

use bytes::BytesMut;
use uuid::Uuid;

use crate::codec;
use crate::error::{Error, Result};
use crate::structure::{MilestoneKind, Scope, StreamStructure};
use crate::types::{
    FooterType, IndexedSeriesInfo, SeriesFooter, StreamFooter, StreamFooterV1, BOUNDARY_MARKER,
    SERIES_FOOTER_VERSION, SHADOW_FOOTER_SIZE, STREAM_FOOTER_VERSION,
};

/// Emits format elements to an underlying byte sink while tracking the
/// absolute stream position.
///
/// The position starts at zero when the writer is created and advances by
/// exactly the number of bytes emitted (or, during update replays, by
/// explicit bumps from the builder). The writer never seeks; callers that
/// need repositioning wrap the sink instead.
pub struct StreamWriter<W: Write> {
    /// Underlying byte sink.
    w: W,
    /// Bytes emitted (or accounted for) since the head of the stream.
    position: u64,
    /// Encoder arena for footer bodies, cleared between footers.
    encode_buf: BytesMut,
    /// Optional milestone log.
    structure: Option<StreamStructure>,
}

impl<W: Write> StreamWriter<W> {
    /// Create a writer positioned at the head of a new stream.
    pub fn new(w: W) -> StreamWriter<W> {
        StreamWriter {
            w,
            position: 0,
            encode_buf: BytesMut::new(),
            structure: None,
        }
    }

    /// Current absolute position (bytes since the head of the stream).
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Enable or disable structure tracking. Enabling discards any
    /// previously collected milestones.
    pub fn set_structure_logging(&mut self, enabled: bool) {
        self.structure = enabled.then(StreamStructure::new);
    }

    /// The collected milestone log, if structure tracking is enabled.
    pub fn structure(&self) -> Option<&StreamStructure> {
        self.structure.as_ref()
    }

    /// Mutable access to the underlying sink, for position cross-checks and
    /// cursor advances during no-write replays.
    pub(crate) fn sink_mut(&mut self) -> &mut W {
        &mut self.w
    }

    /// Consume the writer and return the underlying sink.
    pub fn into_sink(self) -> W {
        self.w
    }

    /// Account for bytes that exist on the medium without writing them.
    pub(crate) fn bump_position(&mut self, count: u64) {
        self.position += count;
    }

    /// Append raw bytes and advance the position.
    ///
    /// # Returns
    ///
    /// The number of bytes written (always `data.len()` on success).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the sink rejects the write.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.w.write_all(data)?;
        self.bump_position(data.len() as u64);
        Ok(data.len())
    }

    /// Record a milestone scoped to the stream, at the current position.
    pub(crate) fn push_stream_milestone(&mut self, kind: MilestoneKind, comment: Option<String>) {
        let position = self.position;
        if let Some(structure) = self.structure.as_mut() {
            structure.push(position, kind, Scope::Stream, None, comment);
        }
    }

    /// Record a milestone scoped to a series. `position` defaults to the
    /// current position; the UUID is optional because it is not always known
    /// yet.
    pub(crate) fn push_series_milestone(
        &mut self,
        position: Option<u64>,
        kind: MilestoneKind,
        series_uuid: Option<Uuid>,
        comment: Option<String>,
    ) {
        let position = position.unwrap_or(self.position);
        if let Some(structure) = self.structure.as_mut() {
            structure.push(position, kind, Scope::Series, series_uuid, comment);
        }
    }

    /// Emit the 6-byte shadow footer for a footer body of `footer_length`
    /// bytes.
    ///
    /// # Returns
    ///
    /// The number of bytes emitted, always [`SHADOW_FOOTER_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on sink failure, or [`Error::Usage`] if the
    /// emitted size somehow differs from the fixed layout.
    pub fn write_shadow_footer(
        &mut self,
        version: u16,
        footer_type: FooterType,
        footer_length: u16,
    ) -> Result<usize> {
        let scope = match footer_type {
            FooterType::Series => Scope::Series,
            FooterType::Stream => Scope::Stream,
        };

        let head_position = self.position;
        if let Some(structure) = self.structure.as_mut() {
            structure.push(
                head_position,
                MilestoneKind::ShadowFooterHead,
                scope,
                None,
                None,
            );
        }

        let descriptor = codec::encode_shadow_descriptor(version, footer_type, footer_length);
        let mut size = self.write(&descriptor)?;

        let marker_position = self.position;
        if let Some(structure) = self.structure.as_mut() {
            structure.push(
                marker_position,
                MilestoneKind::BoundaryMarker,
                scope,
                None,
                None,
            );
        }

        size += self.write(&[BOUNDARY_MARKER])?;

        if size != SHADOW_FOOTER_SIZE {
            return Err(Error::Usage(format!(
                "shadow footer emitted {size} bytes, expected {SHADOW_FOOTER_SIZE}"
            )));
        }

        Ok(size)
    }

    /// Encode and emit a series footer body followed by its shadow footer.
    ///
    /// # Returns
    ///
    /// The total bytes emitted: body plus shadow footer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the body does not encode, or
    /// [`Error::Io`] on sink failure.
    pub fn write_series_footer(&mut self, footer: &SeriesFooter) -> Result<usize> {
        self.encode_buf.clear();
        let body_len = match footer {
            SeriesFooter::V1(f) => codec::encode_series_footer_v1(f, &mut self.encode_buf)?,
        };

        tracing::debug!(
            body_len,
            uuid = %footer.uuid(),
            "writing series footer"
        );

        self.push_series_milestone(
            None,
            MilestoneKind::SeriesFooterHead,
            Some(footer.uuid()),
            None,
        );

        // Take the arena out to sidestep the aliasing with `write`, then put
        // it back so its capacity is reused by the next footer.
        let body = std::mem::take(&mut self.encode_buf);
        self.write(&body)?;
        self.encode_buf = body;

        let body_len_u16 = u16::try_from(body_len)
            .map_err(|_| Error::Codec(format!("series footer body of {body_len} bytes")))?;
        let shadow_len =
            self.write_shadow_footer(SERIES_FOOTER_VERSION, FooterType::Series, body_len_u16)?;

        Ok(body_len + shadow_len)
    }

    /// Encode and emit a stream footer body followed by its shadow footer.
    ///
    /// # Returns
    ///
    /// The total bytes emitted: body plus shadow footer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the body does not encode, or
    /// [`Error::Io`] on sink failure.
    pub fn write_stream_footer(&mut self, footer: &StreamFooter) -> Result<usize> {
        self.encode_buf.clear();
        let body_len = match footer {
            StreamFooter::V1(f) => codec::encode_stream_footer_v1(f, &mut self.encode_buf)?,
        };

        let series_count = footer.series().len();
        tracing::debug!(body_len, series_count, "writing stream footer");

        self.push_stream_milestone(
            MilestoneKind::StreamFooterHead,
            Some(format!("{series_count} series indexed")),
        );

        let body = std::mem::take(&mut self.encode_buf);
        self.write(&body)?;
        self.encode_buf = body;

        let body_len_u16 = u16::try_from(body_len)
            .map_err(|_| Error::Codec(format!("stream footer body of {body_len} bytes")))?;
        let shadow_len =
            self.write_shadow_footer(STREAM_FOOTER_VERSION, FooterType::Stream, body_len_u16)?;

        Ok(body_len + shadow_len)
    }

    /// Build and emit the stream footer for a finished sequence of series.
    ///
    /// `offsets[i]` is the boundary-marker offset of `series[i]`; the two
    /// slices come from the builder's bookkeeping and must be parallel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if the slices differ in length, otherwise as
    /// [`write_stream_footer`](StreamWriter::write_stream_footer).
    pub fn write_stream_footer_for_series(
        &mut self,
        series: &[SeriesFooter],
        offsets: &[i64],
    ) -> Result<usize> {
        if series.len() != offsets.len() {
            return Err(Error::Usage(format!(
                "offset table has {} entries for {} series",
                offsets.len(),
                series.len()
            )));
        }

        let indexed = series
            .iter()
            .zip(offsets)
            .map(|(footer, &offset)| IndexedSeriesInfo::from_series_footer(footer, offset))
            .collect();

        let footer = StreamFooter::V1(StreamFooterV1 { series: indexed });
        self.write_stream_footer(&footer)
    }
}
