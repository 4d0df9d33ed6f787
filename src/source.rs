//! Payload data-source and data-sink interfaces.
//!
//! The engine treats every payload as an opaque byte run; these types are the
//! seams where the caller supplies or consumes those bytes. Both directions
//! come in two shapes: a plain byte stream, or a callback that is handed the
//! engine's tee so it can materialize (or interpret) the payload on demand.
//! Whichever shape is used, the bytes pass through the engine's checksum
//! accumulator.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::SeriesFooter;

/// Caller-supplied producer of payload bytes on the write path.
pub enum PayloadSource<'a> {
    /// A byte stream copied into the stream until EOF.
    Reader(&'a mut dyn Read),
    /// A callback that writes the payload directly into the provided sink.
    Writer(&'a mut dyn WritePayload),
}

/// Callback shape of the write path: materialize the payload into `sink`.
///
/// `sink` is a tee that feeds the checksum accumulator; implementations must
/// write every payload byte through it and return the byte count written.
/// A count that disagrees with what actually passed through the sink is a
/// usage error.
pub trait WritePayload {
    /// Write the series' payload into `sink`.
    ///
    /// # Returns
    ///
    /// The number of payload bytes written.
    fn write_payload(&mut self, sink: &mut dyn Write, footer: &SeriesFooter) -> Result<u64>;
}

impl<F> WritePayload for F
where
    F: FnMut(&mut dyn Write, &SeriesFooter) -> Result<u64>,
{
    fn write_payload(&mut self, sink: &mut dyn Write, footer: &SeriesFooter) -> Result<u64> {
        self(sink, footer)
    }
}

/// Caller-supplied consumer of payload bytes on the read path.
pub enum PayloadSink<'a> {
    /// A byte sink the payload is copied into.
    Writer(&'a mut dyn Write),
    /// A callback that reads the payload from the provided source.
    Reader(&'a mut dyn ReadPayload),
}

/// Callback shape of the read path: consume the payload from `source`.
///
/// `source` is a tee over the on-disk payload that feeds the checksum
/// accumulator and stops at the payload's end. Implementations must consume
/// it fully and return the byte count read.
pub trait ReadPayload {
    /// Read the series' payload from `source`.
    ///
    /// # Returns
    ///
    /// The number of payload bytes read.
    fn read_payload(&mut self, source: &mut dyn Read, footer: &SeriesFooter) -> Result<u64>;
}

impl<F> ReadPayload for F
where
    F: FnMut(&mut dyn Read, &SeriesFooter) -> Result<u64>,
{
    fn read_payload(&mut self, source: &mut dyn Read, footer: &SeriesFooter) -> Result<u64> {
        self(source, footer)
    }
}

/// The updater's payload getter: materializes the payload for any series the
/// updater decides to (re)write.
pub trait SeriesDataSource {
    /// A byte stream yielding the payload described by `footer`.
    fn payload_reader<'a>(&'a mut self, footer: &SeriesFooter) -> Result<Box<dyn Read + 'a>>;
}

/// Map-backed data source keyed by series UUID. Covers the common case where
/// the caller holds re-encodable payloads in memory (and every test fixture).
impl SeriesDataSource for HashMap<Uuid, Vec<u8>> {
    fn payload_reader<'a>(&'a mut self, footer: &SeriesFooter) -> Result<Box<dyn Read + 'a>> {
        let uuid = footer.uuid();
        let payload = self
            .get(&uuid)
            .ok_or_else(|| Error::Usage(format!("no payload available for series {uuid}")))?;
        Ok(Box::new(Cursor::new(payload.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SeriesFooterV1, SOURCE_SHA1_SIZE};

    fn footer() -> SeriesFooter {
        SeriesFooter::V1(SeriesFooterV1::new(0, 0, 0, "", [0u8; SOURCE_SHA1_SIZE]))
    }

    #[test]
    fn closures_are_write_payload_callbacks() {
        let mut callback = |sink: &mut dyn Write, _footer: &SeriesFooter| -> Result<u64> {
            sink.write_all(b"generated")?;
            Ok(9)
        };

        let mut out = Vec::new();
        let n = callback.write_payload(&mut out, &footer()).unwrap();
        assert_eq!(n, 9);
        assert_eq!(out, b"generated");
    }

    #[test]
    fn closures_are_read_payload_callbacks() {
        let mut collected = Vec::new();
        let mut callback = |source: &mut dyn Read, _footer: &SeriesFooter| -> Result<u64> {
            let n = source.read_to_end(&mut collected)?;
            Ok(n as u64)
        };

        let mut source = Cursor::new(b"payload".to_vec());
        let n = callback.read_payload(&mut source, &footer()).unwrap();
        assert_eq!(n, 7);
        assert_eq!(collected, b"payload");
    }

    #[test]
    fn map_data_source_yields_payload_by_uuid() {
        let footer = footer();
        let mut map: HashMap<Uuid, Vec<u8>> = HashMap::new();
        map.insert(footer.uuid(), b"stored payload".to_vec());

        let mut reader = map.payload_reader(&footer).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"stored payload");
    }

    #[test]
    fn map_data_source_rejects_unknown_series() {
        let mut map: HashMap<Uuid, Vec<u8>> = HashMap::new();
        let result = map.payload_reader(&footer());
        assert!(matches!(result, Err(Error::Usage(_))), "unexpected result");
    }
}
