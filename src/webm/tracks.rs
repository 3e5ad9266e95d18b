//! Shallow WebM track discovery.
//!
//! Walks `Segment` → `Info`/`Tracks` → `TrackEntry` and collects just
//! enough to describe the stream: track kinds, geometry, timescale,
//! duration. Unknown elements are skipped by length; WebM grows new
//! element IDs and the walk must tolerate all of them.

use crate::webm::ebml::{self, UNKNOWN_SIZE};
use crate::{Error, Result};

/// Track facts pulled out of a WebM initialization segment.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct WebmTracks {
    pub has_video: bool,
    pub has_audio: bool,
    pub width: u64,
    pub height: u64,
    /// TimecodeScale in nanoseconds per tick (1_000_000 when absent).
    pub timescale: u64,
    /// Segment duration in timescale ticks, bit-pattern decoded from the
    /// 4- or 8-byte float Duration element.
    pub duration: Option<f64>,
    pub video_track_uid: Option<u64>,
    pub audio_track_uid: Option<u64>,
    pub track_number: Option<u64>,
}

const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// Sequential reader over the children of one EBML scope.
struct ElementWalker<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ElementWalker<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Next `(id, payload)` pair, or `None` at the end of the scope. An
    /// unknown-size element claims the rest of the scope.
    fn next(&mut self) -> Result<Option<(u32, &'a [u8])>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let rest = &self.buf[self.pos..];
        let (id, id_len) = ebml::read_element_id(rest).map_err(|e| self.at_offset(e))?;
        let (size, size_len) =
            ebml::read_data_size(&rest[id_len..]).map_err(|e| self.at_offset(e))?;
        let body_start = id_len + size_len;
        let payload = if size == UNKNOWN_SIZE {
            &rest[body_start..]
        } else {
            let end = body_start
                .checked_add(size as usize)
                .filter(|&end| end <= rest.len())
                .ok_or(Error::OutOfBounds {
                    need: size,
                    have: (rest.len() - body_start) as u64,
                })?;
            &rest[body_start..end]
        };
        self.pos += body_start + payload.len();
        Ok(Some((id, payload)))
    }

    fn at_offset(&self, err: Error) -> Error {
        match err {
            Error::InvalidEbmlVarint { .. } => Error::InvalidEbmlVarint { offset: self.pos },
            other => other,
        }
    }
}

/// Big-endian unsigned integer from a 0-8 byte element payload.
fn read_uint(payload: &[u8]) -> u64 {
    let mut value = 0u64;
    for &b in payload.iter().take(8) {
        value = (value << 8) | u64::from(b);
    }
    value
}

/// Bit-pattern float from a 4- or 8-byte element payload.
fn read_float(payload: &[u8]) -> Option<f64> {
    match payload.len() {
        4 => {
            let mut bits = [0u8; 4];
            bits.copy_from_slice(payload);
            Some(f64::from(f32::from_be_bytes(bits)))
        }
        8 => {
            let mut bits = [0u8; 8];
            bits.copy_from_slice(payload);
            Some(f64::from_be_bytes(bits))
        }
        _ => None,
    }
}

/// Extract track metadata from a WebM initialization segment.
///
/// The buffer must start with an EBML header element followed by a
/// Segment element; everything inside the Segment beyond Info and
/// Tracks is skipped.
pub fn extract_tracks(buf: &[u8]) -> Result<WebmTracks> {
    let mut tracks = WebmTracks {
        timescale: DEFAULT_TIMECODE_SCALE,
        ..Default::default()
    };

    let mut top = ElementWalker::new(buf);
    let mut segment = None;
    while let Some((id, payload)) = top.next()? {
        match id {
            ebml::EBML_HEADER_ID => {}
            ebml::SEGMENT_ID => {
                segment = Some(payload);
                break;
            }
            other => {
                tracing::debug!(id = other, "top-level element skipped");
            }
        }
    }
    let Some(segment) = segment else {
        return Ok(tracks);
    };

    let mut walker = ElementWalker::new(segment);
    while let Some((id, payload)) = walker.next()? {
        match id {
            ebml::INFO_ID => parse_info(payload, &mut tracks)?,
            ebml::TRACKS_ID => parse_track_entries(payload, &mut tracks)?,
            _ => {}
        }
    }
    Ok(tracks)
}

fn parse_info(payload: &[u8], tracks: &mut WebmTracks) -> Result<()> {
    let mut walker = ElementWalker::new(payload);
    while let Some((id, body)) = walker.next()? {
        match id {
            ebml::TIMECODE_SCALE_ID => tracks.timescale = read_uint(body),
            ebml::DURATION_ID => tracks.duration = read_float(body),
            _ => {}
        }
    }
    Ok(())
}

fn parse_track_entries(payload: &[u8], tracks: &mut WebmTracks) -> Result<()> {
    let mut walker = ElementWalker::new(payload);
    while let Some((id, body)) = walker.next()? {
        if id == ebml::TRACK_ENTRY_ID {
            parse_track_entry(body, tracks)?;
        }
    }
    Ok(())
}

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;

fn parse_track_entry(payload: &[u8], tracks: &mut WebmTracks) -> Result<()> {
    let mut track_type = 0u64;
    let mut track_number = None;
    let mut track_uid = None;
    let mut pixel = (0u64, 0u64);
    let mut display = (0u64, 0u64);

    let mut walker = ElementWalker::new(payload);
    while let Some((id, body)) = walker.next()? {
        match id {
            ebml::TRACK_TYPE_ID => track_type = read_uint(body),
            ebml::TRACK_NUMBER_ID => track_number = Some(read_uint(body)),
            ebml::TRACK_UID_ID => track_uid = Some(read_uint(body)),
            ebml::VIDEO_ID => {
                let mut video = ElementWalker::new(body);
                while let Some((vid, vbody)) = video.next()? {
                    match vid {
                        ebml::PIXEL_WIDTH_ID => pixel.0 = read_uint(vbody),
                        ebml::PIXEL_HEIGHT_ID => pixel.1 = read_uint(vbody),
                        ebml::DISPLAY_WIDTH_ID => display.0 = read_uint(vbody),
                        ebml::DISPLAY_HEIGHT_ID => display.1 = read_uint(vbody),
                        _ => {}
                    }
                }
            }
            ebml::AUDIO_ID => {
                if track_type == 0 {
                    track_type = TRACK_TYPE_AUDIO;
                }
            }
            _ => {}
        }
    }

    match track_type {
        TRACK_TYPE_VIDEO => {
            // display geometry wins when present, pixel geometry backs it up
            let (width, height) = if display.0 > 0 && display.1 > 0 {
                display
            } else {
                pixel
            };
            if width > 0 && height > 0 {
                tracks.has_video = true;
                tracks.width = width;
                tracks.height = height;
                tracks.video_track_uid = track_uid;
                if tracks.track_number.is_none() {
                    tracks.track_number = track_number;
                }
            }
        }
        TRACK_TYPE_AUDIO => {
            tracks.has_audio = true;
            tracks.audio_track_uid = track_uid;
            if tracks.track_number.is_none() {
                tracks.track_number = track_number;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(id_bytes: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut out = id_bytes.to_vec();
        assert!(payload.len() < 0x7F);
        out.push(0x80 | payload.len() as u8);
        out.extend_from_slice(payload);
        out
    }

    fn uint_element(id_bytes: &[u8], value: u64) -> Vec<u8> {
        let bytes = value.to_be_bytes();
        let first = bytes.iter().position(|&b| b != 0).unwrap_or(7);
        element(id_bytes, &bytes[first..])
    }

    fn webm_init(track_entries: &[Vec<u8>], info: &[u8]) -> Vec<u8> {
        let mut tracks_body = Vec::new();
        for entry in track_entries {
            tracks_body.extend(element(&[0xAE], entry));
        }
        let mut segment_body = Vec::new();
        if !info.is_empty() {
            segment_body.extend(element(&[0x15, 0x49, 0xA9, 0x66], info));
        }
        segment_body.extend(element(&[0x16, 0x54, 0xAE, 0x6B], &tracks_body));

        let mut buf = element(&[0x1A, 0x45, 0xDF, 0xA3], &[]);
        buf.extend(element(&[0x18, 0x53, 0x80, 0x67], &segment_body));
        buf
    }

    #[test]
    fn test_video_track_pixel_geometry() {
        let mut entry = uint_element(&[0x83], 1); // TrackType video
        entry.extend(uint_element(&[0xD7], 1)); // TrackNumber
        entry.extend(uint_element(&[0x73, 0xC5], 0xDEAD)); // TrackUID
        let mut video = uint_element(&[0xB0], 1280);
        video.extend(uint_element(&[0xBA], 720));
        entry.extend(element(&[0xE0], &video));

        let buf = webm_init(&[entry], &[]);
        let tracks = extract_tracks(&buf).unwrap();
        assert!(tracks.has_video);
        assert!(!tracks.has_audio);
        assert_eq!((tracks.width, tracks.height), (1280, 720));
        assert_eq!(tracks.video_track_uid, Some(0xDEAD));
        assert_eq!(tracks.track_number, Some(1));
        assert_eq!(tracks.timescale, 1_000_000);
    }

    #[test]
    fn test_display_geometry_preferred() {
        let mut entry = uint_element(&[0x83], 1);
        let mut video = uint_element(&[0xB0], 1920);
        video.extend(uint_element(&[0xBA], 1080));
        video.extend(uint_element(&[0x54, 0xB0], 1280));
        video.extend(uint_element(&[0x54, 0xBA], 720));
        entry.extend(element(&[0xE0], &video));

        let tracks = extract_tracks(&webm_init(&[entry], &[])).unwrap();
        assert_eq!((tracks.width, tracks.height), (1280, 720));
    }

    #[test]
    fn test_video_without_geometry_does_not_count() {
        let entry = uint_element(&[0x83], 1);
        let tracks = extract_tracks(&webm_init(&[entry], &[])).unwrap();
        assert!(!tracks.has_video);
    }

    #[test]
    fn test_audio_track_and_info() {
        let mut entry = uint_element(&[0x83], 2);
        entry.extend(uint_element(&[0x73, 0xC5], 42));
        entry.extend(element(&[0xE1], &[]));

        let mut info = uint_element(&[0x2A, 0xD7, 0xB1], 500_000);
        info.extend(element(&[0x44, 0x89], &2000.0f64.to_be_bytes()));

        let tracks = extract_tracks(&webm_init(&[entry], &info)).unwrap();
        assert!(tracks.has_audio);
        assert_eq!(tracks.audio_track_uid, Some(42));
        assert_eq!(tracks.timescale, 500_000);
        assert_eq!(tracks.duration, Some(2000.0));
    }

    #[test]
    fn test_unknown_elements_skipped() {
        let mut entry = uint_element(&[0x83], 2);
        entry.extend(element(&[0x55, 0xEE], &[1, 2, 3])); // unknown id
        let tracks = extract_tracks(&webm_init(&[entry], &[])).unwrap();
        assert!(tracks.has_audio);
    }

    #[test]
    fn test_no_segment_yields_empty() {
        let buf = element(&[0x1A, 0x45, 0xDF, 0xA3], &[]);
        let tracks = extract_tracks(&buf).unwrap();
        assert!(!tracks.has_video && !tracks.has_audio);
    }
}
