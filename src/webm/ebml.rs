//! EBML variable-length integer primitives.
//!
//! Element IDs keep their length-marker bits (so `Segment` reads as
//! `0x18538067`, matching how the IDs are written in the Matroska
//! spec), while data sizes mask the marker off. A data size whose
//! mantissa is all ones is the "unknown length" sentinel.

use crate::{Error, Result};

/// Sentinel for an EBML element of unknown length: it extends to the
/// end of the enclosing scope.
pub const UNKNOWN_SIZE: u64 = u64::MAX;

pub const EBML_HEADER_ID: u32 = 0x1A45_DFA3;
pub const SEGMENT_ID: u32 = 0x1853_8067;
pub const INFO_ID: u32 = 0x1549_A966;
pub const TIMECODE_SCALE_ID: u32 = 0x002A_D7B1;
pub const DURATION_ID: u32 = 0x0000_4489;
pub const TRACKS_ID: u32 = 0x1654_AE6B;
pub const TRACK_ENTRY_ID: u32 = 0x0000_00AE;
pub const TRACK_NUMBER_ID: u32 = 0x0000_00D7;
pub const TRACK_UID_ID: u32 = 0x0000_73C5;
pub const TRACK_TYPE_ID: u32 = 0x0000_0083;
pub const VIDEO_ID: u32 = 0x0000_00E0;
pub const AUDIO_ID: u32 = 0x0000_00E1;
pub const PIXEL_WIDTH_ID: u32 = 0x0000_00B0;
pub const PIXEL_HEIGHT_ID: u32 = 0x0000_00BA;
pub const DISPLAY_WIDTH_ID: u32 = 0x0000_54B0;
pub const DISPLAY_HEIGHT_ID: u32 = 0x0000_54BA;

/// Width in bytes encoded by the leading-zero count of the first byte.
fn field_width(first: u8, max: u32) -> Result<u32> {
    let width = first.leading_zeros() + 1;
    if first == 0 || width > max {
        return Err(Error::InvalidEbmlVarint { offset: 0 });
    }
    Ok(width)
}

/// Read an element ID at the start of `buf`.
///
/// IDs are 1-4 bytes; the marker bit stays in the value. Returns the ID
/// and the number of bytes it occupied.
pub fn read_element_id(buf: &[u8]) -> Result<(u32, usize)> {
    let first = *buf.first().ok_or(Error::OutOfBounds { need: 1, have: 0 })?;
    let width = field_width(first, 4)? as usize;
    if buf.len() < width {
        return Err(Error::OutOfBounds {
            need: width as u64,
            have: buf.len() as u64,
        });
    }
    let mut id = 0u32;
    for &b in &buf[..width] {
        id = (id << 8) | u32::from(b);
    }
    Ok((id, width))
}

/// Read a data-size field at the start of `buf`.
///
/// Sizes are 1-8 bytes with the marker bit masked off. An all-ones
/// mantissa decodes to [`UNKNOWN_SIZE`]. Returns the size and the
/// number of bytes it occupied.
pub fn read_data_size(buf: &[u8]) -> Result<(u64, usize)> {
    let first = *buf.first().ok_or(Error::OutOfBounds { need: 1, have: 0 })?;
    let width = field_width(first, 8)? as usize;
    if buf.len() < width {
        return Err(Error::OutOfBounds {
            need: width as u64,
            have: buf.len() as u64,
        });
    }
    let mut size = u64::from(first) & (0xFFu64 >> width);
    for &b in &buf[1..width] {
        size = (size << 8) | u64::from(b);
    }
    let all_ones = (1u64 << (7 * width)) - 1;
    if size == all_ones {
        return Ok((UNKNOWN_SIZE, width));
    }
    Ok((size, width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_element_id_widths() {
        assert_eq!(read_element_id(&[0xAE]).unwrap(), (0xAE, 1));
        assert_eq!(read_element_id(&[0x42, 0x86]).unwrap(), (0x4286, 2));
        assert_eq!(
            read_element_id(&[0x2A, 0xD7, 0xB1]).unwrap(),
            (TIMECODE_SCALE_ID, 3)
        );
        assert_eq!(
            read_element_id(&[0x1A, 0x45, 0xDF, 0xA3]).unwrap(),
            (EBML_HEADER_ID, 4)
        );
    }

    #[test]
    fn test_element_id_too_wide_rejected() {
        // 5+ leading zeros would make a 5-byte ID
        assert_matches!(
            read_element_id(&[0x04, 0, 0, 0, 0]),
            Err(crate::Error::InvalidEbmlVarint { .. })
        );
        assert_matches!(
            read_element_id(&[0x00]),
            Err(crate::Error::InvalidEbmlVarint { .. })
        );
    }

    #[test]
    fn test_data_size_masks_marker() {
        assert_eq!(read_data_size(&[0x81]).unwrap(), (1, 1));
        assert_eq!(read_data_size(&[0x40, 0x7F]).unwrap(), (0x7F, 2));
        // 8-byte size: marker bit is the whole first byte
        let buf = [0x01, 0, 0, 0, 0, 0x12, 0x34, 0x56];
        assert_eq!(read_data_size(&buf).unwrap(), (0x123456, 8));
    }

    #[test]
    fn test_unknown_size_sentinel() {
        assert_eq!(read_data_size(&[0xFF]).unwrap(), (UNKNOWN_SIZE, 1));
        let buf = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(read_data_size(&buf).unwrap(), (UNKNOWN_SIZE, 8));
    }

    #[test]
    fn test_truncated_field_is_out_of_bounds() {
        assert_matches!(
            read_data_size(&[0x40]),
            Err(crate::Error::OutOfBounds { need: 2, have: 1 })
        );
        assert_matches!(read_element_id(&[]), Err(crate::Error::OutOfBounds { .. }));
    }
}
