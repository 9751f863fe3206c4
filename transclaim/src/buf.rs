//! Output buffer shared by the render protocol and encoders.
//!
//! An [`OutBuf`] either measures (counts bytes without storing them),
//! writes into a buffer of one fixed capacity, or grows freely for
//! encoders that can stream. Encoders write the same sequence of calls in
//! every mode, which is what makes a measuring pass exact.

use std::io;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Measure,
    Fixed(usize),
    Growable,
}

/// Byte sink with measure, fixed and growable modes.
#[derive(Debug)]
pub struct OutBuf {
    mode: Mode,
    bytes: Vec<u8>,
    len: usize,
}

impl OutBuf {
    /// A sink that only counts bytes.
    pub fn measuring() -> Self {
        OutBuf {
            mode: Mode::Measure,
            bytes: Vec::new(),
            len: 0,
        }
    }

    /// A sink that holds at most `capacity` bytes.
    pub fn fixed(capacity: usize) -> Self {
        OutBuf {
            mode: Mode::Fixed(capacity),
            bytes: Vec::with_capacity(capacity),
            len: 0,
        }
    }

    /// A sink without a size limit.
    pub fn growable() -> Self {
        OutBuf {
            mode: Mode::Growable,
            bytes: Vec::new(),
            len: 0,
        }
    }

    pub fn is_measuring(&self) -> bool {
        self.mode == Mode::Measure
    }

    /// Bytes written (or counted) so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size limit, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        match self.mode {
            Mode::Fixed(capacity) => Some(capacity),
            Mode::Measure | Mode::Growable => None,
        }
    }

    pub fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        self.insert(self.len, data)
    }

    /// Inserts `data` at `offset`, shifting everything after it.
    pub fn insert(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
        if offset > self.len {
            return Err(Error::structure(format!(
                "insert at offset {offset} past end of output ({})",
                self.len
            )));
        }
        let needed = self.len + data.len();
        match self.mode {
            Mode::Measure => {}
            Mode::Fixed(capacity) if needed > capacity => {
                return Err(Error::BufferOverflow { needed, capacity });
            }
            Mode::Fixed(_) | Mode::Growable => {
                self.bytes.splice(offset..offset, data.iter().copied());
            }
        }
        self.len = needed;
        Ok(())
    }

    /// The written bytes, `None` for a measuring sink.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self.mode {
            Mode::Measure => None,
            Mode::Fixed(_) | Mode::Growable => Some(self.bytes),
        }
    }
}

impl io::Write for OutBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
