//! Segment classification.
//!
//! A shallow scan over the top-level boxes of an appended buffer that
//! decides what kind of segment it holds without decoding any payload.
//! Unlike the strict container decode, unknown top-level types are
//! logged and skipped: streams legitimately carry boxes the classifier
//! has no use for.

use crate::mp4::boxes::BOX_HEADER_SIZE;
use crate::webm::ebml::{self, EBML_HEADER_ID, SEGMENT_ID};

/// What a classified append buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ParseState {
    /// Nothing recognizable yet.
    None,
    /// Complete initialization segment (ftyp + moov).
    InitSegment,
    /// Complete media segment (styp/moof/mdat), no init data.
    MediaSegment,
    /// Initialization segment followed by media boxes, all complete.
    InitMediaSegment,
    /// Init boxes started but the buffer ends mid-box.
    InitIncomplete,
    /// Media boxes (or nothing yet) with a truncated tail.
    MediaIncomplete,
    /// Init segment complete, media boxes truncated.
    InitMediaIncomplete,
    /// A full scan recognized nothing.
    Invalid,
    /// Decode failure. Never produced by classification itself (a
    /// failed append returns an error instead); callers that track the
    /// stream's last state record it with this variant.
    Error,
}

/// Classifier result with the byte accounting the coordinator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub state: ParseState,
    /// Offset of the moov box, when one was seen.
    pub moov_offset: Option<usize>,
    /// Bytes belonging to initialization boxes (ftyp, moov, free).
    pub init_len: usize,
    /// Bytes belonging to media boxes (styp, moof, mdat).
    pub media_len: usize,
}

/// Minimum ftyp box size for it to count as initialization data: header
/// plus major brand, minor version, and at least one compatible brand.
const MIN_FTYP_SIZE: u64 = 20;

/// Classify an ISO-BMFF append buffer by scanning its top-level boxes.
pub fn classify(buf: &[u8]) -> Classification {
    let mut offset = 0usize;
    let mut have_ftyp = false;
    let mut have_moov = false;
    let mut have_media = false;
    let mut moov_offset = None;
    let mut init_len = 0usize;
    let mut media_len = 0usize;

    while buf.len() - offset >= BOX_HEADER_SIZE {
        let size32 = u32::from_be_bytes([
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ]);
        let box_type = &buf[offset + 4..offset + 8];
        let box_size = if size32 == 1 {
            if buf.len() - offset < 16 {
                break; // largesize itself is truncated
            }
            let mut large = [0u8; 8];
            large.copy_from_slice(&buf[offset + 8..offset + 16]);
            u64::from_be_bytes(large)
        } else {
            u64::from(size32)
        };
        let header_size = if size32 == 1 { 16u64 } else { 8u64 };
        // A zero or self-contradictory size ends the scan; the leftover
        // bytes select an incomplete state below.
        if box_size < header_size {
            break;
        }
        if box_size > (buf.len() - offset) as u64 {
            break;
        }
        let box_size = box_size as usize;

        match box_type {
            b"ftyp" => {
                if box_size as u64 >= MIN_FTYP_SIZE {
                    have_ftyp = true;
                    init_len += box_size;
                } else {
                    tracing::debug!(size = box_size, "runt ftyp box ignored");
                }
            }
            b"moov" => {
                have_moov = true;
                moov_offset = Some(offset);
                init_len += box_size;
            }
            b"free" => init_len += box_size,
            b"styp" | b"moof" | b"mdat" => {
                have_media = true;
                media_len += box_size;
            }
            b"sidx" | b"mfra" | b"pdin" => {}
            other => {
                tracing::debug!(
                    box_type = %String::from_utf8_lossy(other),
                    offset,
                    "unknown top-level box skipped"
                );
            }
        }
        offset += box_size;
    }

    let consumed_all = offset == buf.len();
    let have_init = have_ftyp && have_moov;
    let state = if !consumed_all {
        if have_init {
            ParseState::InitMediaIncomplete
        } else if have_ftyp {
            ParseState::InitIncomplete
        } else {
            ParseState::MediaIncomplete
        }
    } else if have_init && have_media {
        ParseState::InitMediaSegment
    } else if have_init {
        ParseState::InitSegment
    } else if have_media {
        ParseState::MediaSegment
    } else if buf.is_empty() {
        ParseState::None
    } else {
        ParseState::Invalid
    };

    Classification {
        state,
        moov_offset,
        init_len,
        media_len,
    }
}

/// Classify a WebM append buffer: an EBML header immediately followed by
/// a Segment element is initialization data, anything else is not.
pub fn classify_webm(buf: &[u8]) -> ParseState {
    let Ok((id, id_len)) = ebml::read_element_id(buf) else {
        return ParseState::None;
    };
    if id != EBML_HEADER_ID {
        return ParseState::None;
    }
    let Ok((header_size, size_len)) = ebml::read_data_size(&buf[id_len..]) else {
        return ParseState::None;
    };
    if header_size == ebml::UNKNOWN_SIZE {
        return ParseState::None;
    }
    let segment_at = id_len + size_len + header_size as usize;
    if segment_at > buf.len() {
        return ParseState::None;
    }
    match ebml::read_element_id(&buf[segment_at..]) {
        Ok((SEGMENT_ID, _)) => ParseState::InitSegment,
        _ => ParseState::None,
    }
}
