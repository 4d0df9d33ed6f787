//! Medium abstraction and position-restoring I/O adapters.
//!
//! The updater interleaves reads from late regions of a file with writes to
//! early regions of the same file. Three pieces make that safe on one
//! underlying handle:
//!
//! - [`Medium`]: the random-access storage contract (read + write + seek,
//!   plus best-effort truncation).
//! - [`SharedMedium`]: a cloneable single-threaded handle so a reader cursor
//!   and a writer cursor can coexist over one medium.
//! - [`BouncebackWriter`] / [`BouncebackReader`]: adapters that track their
//!   own logical position and seek the medium there before every operation,
//!   so interleaved use by the other cursor never corrupts theirs.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

/// Random-access storage for an updater.
///
/// Truncation is best-effort: the default implementation reports the medium
/// cannot shrink, and the updater then leaves trailing bytes behind a
/// warning. Readers stay correct either way because they locate the stream
/// footer from the logical stream length, not the medium length.
pub trait Medium: Read + Write + Seek {
    /// Shrink the medium to `len` bytes.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the medium was truncated, `Ok(false)` if this medium
    /// does not support truncation.
    fn truncate_to(&mut self, len: u64) -> io::Result<bool> {
        let _ = len;
        Ok(false)
    }
}

impl Medium for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<bool> {
        self.set_len(len)?;
        Ok(true)
    }
}

impl Medium for Cursor<Vec<u8>> {
    fn truncate_to(&mut self, len: u64) -> io::Result<bool> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds usize"))?;
        self.get_mut().truncate(len);
        Ok(true)
    }
}

impl<M: Medium + ?Sized> Medium for &mut M {
    fn truncate_to(&mut self, len: u64) -> io::Result<bool> {
        (**self).truncate_to(len)
    }
}

/// Cloneable single-threaded handle to one medium.
///
/// Every clone refers to the same underlying object and the same cursor;
/// operations on a single medium are totally ordered by call order, and each
/// operation borrows the medium only for its own duration. This is the
/// ownership shape behind the updater's concurrent reader/writer cursors.
pub struct SharedMedium<M> {
    inner: Rc<RefCell<M>>,
}

impl<M> SharedMedium<M> {
    /// Wrap a medium for shared single-threaded use.
    pub fn new(medium: M) -> SharedMedium<M> {
        SharedMedium {
            inner: Rc::new(RefCell::new(medium)),
        }
    }
}

impl<M> Clone for SharedMedium<M> {
    fn clone(&self) -> SharedMedium<M> {
        SharedMedium {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<M: Read> Read for SharedMedium<M> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.borrow_mut().read(buf)
    }
}

impl<M: Write> Write for SharedMedium<M> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.borrow_mut().flush()
    }
}

impl<M: Seek> Seek for SharedMedium<M> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.borrow_mut().seek(pos)
    }
}

impl<M: Medium> Medium for SharedMedium<M> {
    fn truncate_to(&mut self, len: u64) -> io::Result<bool> {
        self.inner.borrow_mut().truncate_to(len)
    }
}

/// A writer that owns its logical position and restores it around every
/// write.
///
/// Before each write the underlying medium is seeked to this writer's
/// position; after the write the position advances by the bytes written.
/// Seeks made on the medium by other cursors in between are therefore
/// harmless.
pub struct BouncebackWriter<W: Write + Seek> {
    inner: W,
    position: u64,
}

impl<W: Write + Seek> BouncebackWriter<W> {
    /// Wrap `inner`, adopting its current position as the logical position.
    pub fn new(mut inner: W) -> io::Result<BouncebackWriter<W>> {
        let position = inner.stream_position()?;
        Ok(BouncebackWriter { inner, position })
    }

    /// The logical position the next write will land at.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<W: Write + Seek> Write for BouncebackWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.seek(SeekFrom::Start(self.position))?;
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Seek> Seek for BouncebackWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(offset) => {
                self.position = offset;
            }
            SeekFrom::Current(delta) => {
                self.position = seek_delta(self.position, delta)?;
            }
            SeekFrom::End(delta) => {
                self.position = self.inner.seek(SeekFrom::End(delta))?;
            }
        }
        Ok(self.position)
    }
}

/// The read-side twin of [`BouncebackWriter`]: seeks the medium to its own
/// logical position before every read.
pub struct BouncebackReader<R: Read + Seek> {
    inner: R,
    position: u64,
}

impl<R: Read + Seek> BouncebackReader<R> {
    /// Wrap `inner` with the logical position already chosen.
    pub fn with_position(inner: R, position: u64) -> BouncebackReader<R> {
        BouncebackReader { inner, position }
    }

    /// The logical position the next read will start from.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R: Read + Seek> Read for BouncebackReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.seek(SeekFrom::Start(self.position))?;
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for BouncebackReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(offset) => {
                self.position = offset;
            }
            SeekFrom::Current(delta) => {
                self.position = seek_delta(self.position, delta)?;
            }
            SeekFrom::End(delta) => {
                self.position = self.inner.seek(SeekFrom::End(delta))?;
            }
        }
        Ok(self.position)
    }
}

/// Apply a relative seek delta to a position, rejecting moves before byte 0.
fn seek_delta(position: u64, delta: i64) -> io::Result<u64> {
    let next = position as i64 + delta;
    u64::try_from(next).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "seek before the start of the medium",
        )
    })
}
