//! Seriesfold: a single-file append-and-update container for opaque time-series payloads.
//!
//! A stream is a sequence of regions, each holding one opaque payload
//! followed by its metadata footer and a fixed shadow footer ending in a
//! 0x00 boundary marker. The file ends with a stream footer indexing every
//! series by time range and byte offset, so readers parse tail-first and
//! random-access any series without scanning payload data. The
//! [`StreamBuilder`] appends, the [`SeriesIterator`] walks, and the
//! [`Updater`] rewrites a stream in place with the minimum I/O the change
//! set allows.

pub mod builder;
pub mod codec;
pub mod error;
pub mod fnv;
pub mod iterator;
pub mod medium;
pub mod reader;
pub mod source;
pub mod structure;
pub mod testing;
pub mod types;
pub mod updater;
pub mod writer;

pub use builder::StreamBuilder;
pub use error::{Error, Result};
pub use iterator::SeriesIterator;
pub use medium::{BouncebackReader, BouncebackWriter, Medium, SharedMedium};
pub use reader::StreamReader;
pub use source::{PayloadSink, PayloadSource, ReadPayload, SeriesDataSource, WritePayload};
pub use structure::{Milestone, MilestoneKind, Scope, StreamStructure};
pub use types::{
    FooterType, IndexedSeriesInfo, SeriesFooter, SeriesFooterV1, StreamFooter, StreamFooterV1,
    BOUNDARY_MARKER, SERIES_FOOTER_VERSION, SHADOW_FOOTER_SIZE, SOURCE_SHA1_SIZE,
    STREAM_FOOTER_VERSION,
};
pub use updater::{UpdateStats, Updater};
pub use writer::StreamWriter;
