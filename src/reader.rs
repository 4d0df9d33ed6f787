//! Stream reader primitives.
//!
//! `StreamReader` knows how to parse a raw stream tail-first. Every walk
//! starts from the final byte of the stream (always a boundary marker),
//! reads the fixed shadow footer backward from it, then the encoded footer
//! body the shadow describes, and finally repositions on the previous
//! region's boundary marker. Random access uses the same mechanics, entered
//! at a boundary offset taken from the stream footer's index.
//!
//! Payload reads are checksummed: the bytes are copied through an FNV-1a/32
//! tee and the result is compared against the footer's recorded checksum.
//! The comparison is reported as a `bool`, never an error, so a caller may
//! keep best-effort data.

use std::io::{Read, Seek, SeekFrom, Write};

use uuid::Uuid;

use crate::codec::{self, SHADOW_DESCRIPTOR_SIZE};
use crate::error::{Error, Result};
use crate::fnv::Fnv1a32;
use crate::source::{PayloadSink, ReadPayload as _};
use crate::structure::{MilestoneKind, Scope, StreamStructure};
use crate::types::{
    FooterType, IndexedSeriesInfo, SeriesFooter, StreamFooter, BOUNDARY_MARKER,
    PAYLOAD_COPY_BUFFER_SIZE, SHADOW_FOOTER_SIZE,
};

/// One decoded shadow footer and the body it described.
///
/// Produced by [`StreamReader::read_one_footer`]; the caller dispatches on
/// the type code and version.
#[derive(Debug)]
pub struct RawFooter {
    /// Footer body version from the shadow descriptor.
    pub version: u16,
    /// Raw footer type code from the shadow descriptor.
    pub type_code: u8,
    /// The encoded footer body.
    pub body: Vec<u8>,
    /// Absolute offset of the first body byte.
    pub body_offset: u64,
}

/// Parses a raw stream from its tail.
///
/// The reader owns no interpretation of payload bytes; it locates regions,
/// decodes footers, and copies payloads through the checksum tee.
#[derive(Debug)]
pub struct StreamReader<R: Read + Seek> {
    /// Underlying byte source.
    r: R,
    /// Optional milestone log, recorded in visit (reverse) order.
    structure: Option<StreamStructure>,
    /// Payload copy buffer, allocated on first use and reused.
    copy_buf: Vec<u8>,
}

impl<R: Read + Seek> StreamReader<R> {
    /// Create a reader over a byte source.
    pub fn new(r: R) -> StreamReader<R> {
        StreamReader {
            r,
            structure: None,
            copy_buf: Vec::new(),
        }
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

    /// Position the cursor on the stream's final boundary marker (EOF - 1).
    ///
    /// Required before any tail-first walk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the medium is empty or the seek fails.
    pub fn reset(&mut self) -> Result<()> {
        self.r.seek(SeekFrom::End(-1))?;
        Ok(())
    }

    /// Record a milestone at `position`, or at the current cursor if `None`.
    fn push_milestone(
        &mut self,
        position: Option<u64>,
        kind: MilestoneKind,
        scope: Scope,
        series_uuid: Option<Uuid>,
        comment: Option<String>,
    ) -> Result<()> {
        if self.structure.is_some() {
            let position = match position {
                Some(p) => p,
                None => self.r.stream_position()?,
            };
            if let Some(structure) = self.structure.as_mut() {
                structure.push(position, kind, scope, series_uuid, comment);
            }
        }
        Ok(())
    }

    /// Read one footer backward from the current position, which must be a
    /// boundary marker.
    ///
    /// Reads the marker byte, rewinds to the shadow descriptor, decodes it,
    /// seeks back over the declared body length, and reads the body. On
    /// return the cursor sits at the end of the footer body; callers seek
    /// explicitly from there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoundaryViolation`] if the current byte is not 0x00,
    /// [`Error::Codec`] if the declared body length runs past the head of
    /// the stream, or [`Error::Io`] on any short read.
    pub fn read_one_footer(&mut self) -> Result<RawFooter> {
        let marker_position = self.r.stream_position()?;
        self.push_milestone(
            Some(marker_position),
            MilestoneKind::BoundaryMarker,
            Scope::Misc,
            None,
            None,
        )?;

        let mut marker = [0u8; 1];
        self.r.read_exact(&mut marker)?;
        if marker[0] != BOUNDARY_MARKER {
            return Err(Error::BoundaryViolation {
                position: marker_position,
                found: marker[0],
            });
        }

        // The cursor is one past the marker; the descriptor head sits
        // SHADOW_FOOTER_SIZE bytes back.
        let shadow_position = self
            .r
            .seek(SeekFrom::Current(-(SHADOW_FOOTER_SIZE as i64)))?;
        self.push_milestone(
            Some(shadow_position),
            MilestoneKind::ShadowFooterHead,
            Scope::Misc,
            None,
            None,
        )?;

        let mut descriptor = [0u8; SHADOW_DESCRIPTOR_SIZE];
        self.r.read_exact(&mut descriptor)?;
        let (version, type_code, footer_length) = codec::decode_shadow_descriptor(&descriptor);

        let body_offset = shadow_position
            .checked_sub(u64::from(footer_length))
            .ok_or_else(|| {
                Error::Codec(format!(
                    "footer length {footer_length} at offset {shadow_position} runs past the \
                     head of the stream"
                ))
            })?;

        self.r.seek(SeekFrom::Start(body_offset))?;
        self.push_milestone(
            Some(body_offset),
            MilestoneKind::FooterHead,
            Scope::Misc,
            None,
            None,
        )?;

        let mut body = vec![0u8; usize::from(footer_length)];
        self.r.read_exact(&mut body)?;

        tracing::debug!(
            version,
            type_code,
            footer_length,
            body_offset,
            "read footer"
        );

        Ok(RawFooter {
            version,
            type_code,
            body,
            body_offset,
        })
    }

    /// Read the series footer whose boundary marker is at the current
    /// position.
    ///
    /// On return the cursor sits on the preceding region's boundary marker
    /// (when one exists).
    ///
    /// # Returns
    ///
    /// `(footer, payload_offset, next_boundary_offset, total_footer_size)`
    /// where `payload_offset` is the absolute offset of the payload's first
    /// byte, `next_boundary_offset` is the preceding region's boundary
    /// marker offset (negative once the walk reaches the head of the
    /// stream), and `total_footer_size` counts body plus shadow footer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FooterTypeMismatch`] if the footer is not a series
    /// footer, [`Error::UnsupportedVersion`] for unknown versions, and the
    /// errors of [`read_one_footer`](StreamReader::read_one_footer).
    pub fn read_series_footer(&mut self) -> Result<(SeriesFooter, u64, i64, usize)> {
        self.push_milestone(None, MilestoneKind::BoundaryMarker, Scope::Series, None, None)?;

        let raw = self.read_one_footer()?;

        self.push_milestone(
            Some(raw.body_offset),
            MilestoneKind::SeriesFooterHead,
            Scope::Series,
            None,
            None,
        )?;

        if FooterType::from_code(raw.type_code) != Some(FooterType::Series) {
            return Err(Error::FooterTypeMismatch {
                expected: FooterType::Series,
                found: raw.type_code,
            });
        }

        let footer = match raw.version {
            1 => SeriesFooter::V1(codec::decode_series_footer_v1(&raw.body)?),
            version => {
                return Err(Error::UnsupportedVersion {
                    footer_type: FooterType::Series,
                    version,
                })
            }
        };

        self.push_milestone(
            Some(raw.body_offset),
            MilestoneKind::SeriesFooterDecoded,
            Scope::Series,
            Some(footer.uuid()),
            None,
        )?;

        let payload_offset = raw
            .body_offset
            .checked_sub(footer.bytes_length())
            .ok_or_else(|| {
                Error::Codec(format!(
                    "series payload of {} bytes runs past the head of the stream",
                    footer.bytes_length()
                ))
            })?;
        let next_boundary_offset = payload_offset as i64 - 1;

        if next_boundary_offset >= 0 {
            self.r.seek(SeekFrom::Start(next_boundary_offset as u64))?;
        }

        let total_footer_size = raw.body.len() + SHADOW_FOOTER_SIZE;
        Ok((footer, payload_offset, next_boundary_offset, total_footer_size))
    }

    /// Read the stream footer whose boundary marker is at the current
    /// position (the stream's final byte, after a [`reset`](StreamReader::reset)).
    ///
    /// On return the cursor sits on the last series' boundary marker (when
    /// the stream holds any series).
    ///
    /// # Returns
    ///
    /// `(footer, next_boundary_offset, total_footer_size)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FooterTypeMismatch`] if the footer is not a stream
    /// footer, [`Error::UnsupportedVersion`] for unknown versions, and the
    /// errors of [`read_one_footer`](StreamReader::read_one_footer).
    pub fn read_stream_footer(&mut self) -> Result<(StreamFooter, i64, usize)> {
        self.push_milestone(None, MilestoneKind::BoundaryMarker, Scope::Stream, None, None)?;

        let raw = self.read_one_footer()?;

        self.push_milestone(
            Some(raw.body_offset),
            MilestoneKind::StreamFooterHead,
            Scope::Stream,
            None,
            None,
        )?;

        if FooterType::from_code(raw.type_code) != Some(FooterType::Stream) {
            return Err(Error::FooterTypeMismatch {
                expected: FooterType::Stream,
                found: raw.type_code,
            });
        }

        let footer = match raw.version {
            1 => StreamFooter::V1(codec::decode_stream_footer_v1(&raw.body)?),
            version => {
                return Err(Error::UnsupportedVersion {
                    footer_type: FooterType::Stream,
                    version,
                })
            }
        };

        self.push_milestone(
            Some(raw.body_offset),
            MilestoneKind::StreamFooterDecoded,
            Scope::Stream,
            None,
            Some(format!("{} series indexed", footer.series().len())),
        )?;

        let next_boundary_offset = raw.body_offset as i64 - 1;
        if next_boundary_offset >= 0 {
            self.r.seek(SeekFrom::Start(next_boundary_offset as u64))?;
        }

        let total_footer_size = raw.body.len() + SHADOW_FOOTER_SIZE;
        Ok((footer, next_boundary_offset, total_footer_size))
    }

    /// Read the series footer whose boundary marker sits at
    /// `boundary_position`.
    ///
    /// # Returns
    ///
    /// `(footer, payload_offset, total_region_size)` where
    /// `total_region_size` counts payload, footer body, and shadow footer.
    pub fn read_series_info_at(
        &mut self,
        boundary_position: u64,
    ) -> Result<(SeriesFooter, u64, u64)> {
        self.r.seek(SeekFrom::Start(boundary_position))?;

        let (footer, payload_offset, _, total_footer_size) = self.read_series_footer()?;

        self.push_milestone(
            Some(payload_offset),
            MilestoneKind::SeriesDataHead,
            Scope::Series,
            Some(footer.uuid()),
            None,
        )?;

        let total_region_size = total_footer_size as u64 + footer.bytes_length();
        Ok((footer, payload_offset, total_region_size))
    }

    /// Read a series located by its stream-footer index entry, copying the
    /// payload into `sink` while verifying the checksum.
    ///
    /// With no sink the payload is still consumed so the checksum can be
    /// computed.
    ///
    /// # Returns
    ///
    /// `(footer, total_region_size, checksum_ok)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on a short payload read, [`Error::Usage`] if a
    /// callback sink consumes a different byte count than the payload holds,
    /// and the errors of [`read_series_footer`](StreamReader::read_series_footer).
    pub fn read_series(
        &mut self,
        info: &IndexedSeriesInfo,
        sink: Option<PayloadSink<'_>>,
    ) -> Result<(SeriesFooter, u64, bool)> {
        let boundary_position = u64::try_from(info.absolute_position).map_err(|_| {
            Error::Codec(format!(
                "indexed series {} has negative position {}",
                info.uuid, info.absolute_position
            ))
        })?;

        let (footer, payload_offset, total_region_size) =
            self.read_series_info_at(boundary_position)?;

        self.r.seek(SeekFrom::Start(payload_offset))?;

        let bytes_length = footer.bytes_length();
        let mut fnv = Fnv1a32::new();

        match sink {
            Some(PayloadSink::Reader(callback)) => {
                let mut consumed = 0u64;
                let mut tee = TeeReader {
                    inner: (&mut self.r).take(bytes_length),
                    fnv: &mut fnv,
                    count: &mut consumed,
                };
                callback.read_payload(&mut tee, &footer)?;
                if consumed != bytes_length {
                    return Err(Error::Usage(format!(
                        "payload callback consumed {consumed} of {bytes_length} bytes"
                    )));
                }
            }
            mut writer_or_none => {
                if self.copy_buf.is_empty() {
                    self.copy_buf.resize(PAYLOAD_COPY_BUFFER_SIZE, 0);
                }

                let mut remaining = bytes_length;
                while remaining > 0 {
                    let want = remaining.min(self.copy_buf.len() as u64) as usize;
                    let n = self.r.read(&mut self.copy_buf[..want])?;
                    if n == 0 {
                        return Err(Error::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            format!("payload ended with {remaining} bytes unread"),
                        )));
                    }

                    let chunk = &self.copy_buf[..n];
                    fnv.update(chunk);
                    if let Some(PayloadSink::Writer(w)) = writer_or_none.as_mut() {
                        w.write_all(chunk)?;
                    }
                    remaining -= n as u64;
                }
            }
        }

        let checksum_ok = fnv.digest() == footer.data_fnv1a_checksum();
        if !checksum_ok {
            tracing::warn!(
                uuid = %footer.uuid(),
                expected = footer.data_fnv1a_checksum(),
                computed = fnv.digest(),
                "series payload checksum mismatch"
            );
        }

        Ok((footer, total_region_size, checksum_ok))
    }
}

/// Read tee: forwards reads while feeding the checksum accumulator and
/// counting bytes.
struct TeeReader<'a, R: Read> {
    inner: R,
    fnv: &'a mut Fnv1a32,
    count: &'a mut u64,
}

impl<R: Read> Read for TeeReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.fnv.update(&buf[..n]);
        *self.count += n as u64;
        Ok(n)
    }
}
