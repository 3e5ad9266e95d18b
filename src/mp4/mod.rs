//! ISO-BMFF (MP4) parsing: box tree, movie fragments, and segment
//! classification.
//!
//! [`BoxScanner`] iterates the top-level boxes of an append buffer;
//! [`classify`] decides what kind of segment the buffer holds; the
//! [`boxes`] and [`fragment`] submodules decode the `moov` and `moof`
//! trees the scanner hands out.

pub mod boxes;
pub mod classify;
pub mod fragment;

pub use boxes::{BoxHeader, BoxType, FullBoxHeader, Moov};
pub use classify::{classify, classify_webm, Classification, ParseState};
pub use fragment::Moof;

use crate::reader::ByteReader;
use crate::Result;

/// Iterator over the top-level `(header, payload)` pairs of a buffer.
///
/// The scanner only validates box framing; decoding a payload is the
/// caller's choice per box type.
#[derive(Debug)]
pub struct BoxScanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BoxScanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Offset of the next unread box.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Next box, or `None` once the buffer is exhausted.
    pub fn next_box(&mut self) -> Result<Option<(BoxHeader, &'a [u8])>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let mut r = ByteReader::new(&self.buf[self.pos..]);
        let header = BoxHeader::read(&mut r)?;
        let payload = r.take(header.payload_size() as usize)?;
        self.pos += header.size as usize;
        Ok(Some((header, payload)))
    }
}

/// Find the payload of the first top-level box of the given type.
pub fn find_box<'a>(buf: &'a [u8], box_type: BoxType) -> Result<Option<&'a [u8]>> {
    let mut scanner = BoxScanner::new(buf);
    while let Some((header, payload)) = scanner.next_box()? {
        if header.box_type == box_type {
            return Ok(Some(payload));
        }
    }
    Ok(None)
}
