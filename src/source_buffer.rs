//! Streaming coordinator.
//!
//! [`SourceBuffer`] drives one append at a time: classify the buffer,
//! decode initialization metadata, assemble samples, and report what
//! happened as plain return values. Track defaults survive across
//! appends as owned copies, so a media segment may arrive any number of
//! appends after the init segment that configured it.

use bytes::Bytes;

use crate::drm::{self, DrmInitData, TrackEncryption};
use crate::mp4::boxes::{BoxType, Moov};
use crate::mp4::fragment::Moof;
use crate::mp4::{classify, classify_webm, find_box, BoxScanner, ParseState};
use crate::sample::{assemble, MovieDefaults, Sample};
use crate::webm::{extract_tracks, WebmTracks};
use crate::{Error, Result};

/// Container format an append stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ContainerFormat {
    Mp4,
    Webm,
}

/// Kind of media a track holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackKind {
    Video,
    Audio,
}

/// Parsed MIME content type selecting the demux path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentType {
    pub container: ContainerFormat,
    pub kind: TrackKind,
}

impl ContentType {
    /// Parse one of the supported MIME types, ignoring any parameters
    /// after a `;`.
    pub fn parse(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        let (container, kind) = match essence {
            "video/mp4" => (ContainerFormat::Mp4, TrackKind::Video),
            "audio/mp4" => (ContainerFormat::Mp4, TrackKind::Audio),
            "video/webm" => (ContainerFormat::Webm, TrackKind::Video),
            "audio/webm" => (ContainerFormat::Webm, TrackKind::Audio),
            _ => return None,
        };
        Some(Self { container, kind })
    }
}

/// How an append left the stream: cleanly at a segment boundary, or
/// starved for bytes the caller must supply before progress resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum AppendEnd {
    None,
    EndOfStream,
    Underrun,
}

/// What an append produced.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    /// A new track configuration was committed.
    InitReady(TrackMeta),
    /// A fragment's samples, in decode order.
    SamplesReady(Vec<Sample>),
    /// Init segment and media segment in the same buffer.
    InitAndSamplesReady(TrackMeta, Vec<Sample>),
    /// Nothing actionable yet.
    Incomplete,
}

/// Result of one completed append.
#[derive(Debug, Clone)]
pub struct Appended {
    pub state: ParseState,
    pub outcome: ParseOutcome,
    pub end: AppendEnd,
    /// Every pssh blob seen in this append's moov and moof boxes, for
    /// the caller to hand to its DRM collaborator.
    pub drm_init_data: Vec<DrmInitData>,
}

/// One track's metadata from an initialization segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackInfo {
    pub track_id: u32,
    pub kind: TrackKind,
    pub timescale: u32,
    pub duration: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec_data: Option<Bytes>,
    pub encryption: Option<TrackEncryption>,
}

/// Movie-level metadata committed by an initialization segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackMeta {
    pub timescale: u32,
    pub duration: Option<u64>,
    pub tracks: Vec<TrackInfo>,
}

impl TrackMeta {
    fn from_moov(moov: &Moov) -> Self {
        let tracks = moov
            .traks
            .iter()
            .filter_map(|trak| {
                let track_id = trak.track_id()?;
                let mdia = trak.mdia.as_ref()?;
                let kind = match mdia.handler_type()? {
                    BoxType::VIDE => TrackKind::Video,
                    BoxType::SOUN => TrackKind::Audio,
                    _ => return None,
                };
                let tkhd = trak.tkhd.as_ref();
                let (width, height) = match kind {
                    TrackKind::Video => (
                        tkhd.map(|t| t.width).filter(|&w| w > 0),
                        tkhd.map(|t| t.height).filter(|&h| h > 0),
                    ),
                    TrackKind::Audio => (None, None),
                };
                let codec_data = mdia
                    .minf
                    .as_ref()
                    .and_then(|m| m.stbl.as_ref())
                    .and_then(|s| s.stsd.as_ref())
                    .and_then(|s| s.entries.first())
                    .and_then(|e| e.codec_data.clone());
                Some(TrackInfo {
                    track_id,
                    kind,
                    timescale: trak.timescale().unwrap_or(0),
                    duration: mdia.mdhd.as_ref().map(|m| m.duration).unwrap_or(0),
                    width,
                    height,
                    codec_data,
                    encryption: drm::track_encryption(trak),
                })
            })
            .collect();
        Self {
            timescale: moov.timescale().unwrap_or(0),
            duration: moov.duration(),
            tracks,
        }
    }

    fn from_webm(tracks: &WebmTracks) -> Self {
        let mut infos = Vec::new();
        let track_id = tracks.track_number.unwrap_or(0) as u32;
        if tracks.has_video {
            infos.push(TrackInfo {
                track_id,
                kind: TrackKind::Video,
                timescale: tracks.timescale.min(u64::from(u32::MAX)) as u32,
                duration: tracks.duration.unwrap_or(0.0) as u64,
                width: Some(tracks.width.min(u64::from(u32::MAX)) as u32),
                height: Some(tracks.height.min(u64::from(u32::MAX)) as u32),
                codec_data: None,
                encryption: None,
            });
        }
        if tracks.has_audio {
            infos.push(TrackInfo {
                track_id,
                kind: TrackKind::Audio,
                timescale: tracks.timescale.min(u64::from(u32::MAX)) as u32,
                duration: tracks.duration.unwrap_or(0.0) as u64,
                width: None,
                height: None,
                codec_data: None,
                encryption: None,
            });
        }
        Self {
            timescale: tracks.timescale.min(u64::from(u32::MAX)) as u32,
            duration: tracks.duration.map(|d| d as u64),
            tracks: infos,
        }
    }
}

/// Append-driven parsing state for one media stream.
#[derive(Debug)]
pub struct SourceBuffer {
    content_type: ContentType,
    committed_meta: Option<TrackMeta>,
    defaults: MovieDefaults,
}

impl SourceBuffer {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            committed_meta: None,
            defaults: MovieDefaults::default(),
        }
    }

    /// The last committed track configuration, if any init segment has
    /// been accepted since construction or the last reset.
    pub fn track_meta(&self) -> Option<&TrackMeta> {
        self.committed_meta.as_ref()
    }

    /// Drop all committed state and return to idle. Safe to call at any
    /// time; the next init segment will notify again.
    pub fn reset(&mut self) {
        self.committed_meta = None;
        self.defaults = MovieDefaults::default();
    }

    /// Process one appended buffer.
    ///
    /// A decode failure aborts only this append: previously committed
    /// track metadata and defaults stay usable for the next one.
    pub fn append(&mut self, data: &[u8]) -> Result<Appended> {
        match self.content_type.container {
            ContainerFormat::Mp4 => self.append_mp4(data),
            ContainerFormat::Webm => self.append_webm(data),
        }
    }

    fn append_mp4(&mut self, data: &[u8]) -> Result<Appended> {
        let classification = classify(data);
        let state = classification.state;
        let mut drm_init_data = Vec::new();

        // Full moov decode when the classifier saw a complete init segment.
        let init_bearing = matches!(
            state,
            ParseState::InitSegment | ParseState::InitMediaSegment | ParseState::InitMediaIncomplete
        );
        let mut pending: Option<(TrackMeta, MovieDefaults)> = None;
        if let Some(moov_offset) = classification.moov_offset.filter(|_| init_bearing) {
            let payload = find_box(&data[moov_offset..], BoxType::MOOV)?.ok_or_else(|| {
                Error::UnexpectedBoxType {
                    expected: BoxType::MOOV.to_string(),
                    found: "no box".to_string(),
                }
            })?;
            let moov = Moov::parse(payload)?;
            drm_init_data.extend(drm::drm_init_data(&moov));
            pending = Some((TrackMeta::from_moov(&moov), MovieDefaults::from_moov(&moov)));
        }

        // Assemble fragments with the defaults this append established,
        // or the committed ones from an earlier init segment.
        let mut samples = Vec::new();
        if matches!(state, ParseState::MediaSegment | ParseState::InitMediaSegment) {
            let active = pending
                .as_ref()
                .map(|(_, defaults)| defaults)
                .unwrap_or(&self.defaults);
            let mut scanner = BoxScanner::new(data);
            let mut moof: Option<Moof> = None;
            while let Some((header, payload)) = scanner.next_box()? {
                match header.box_type {
                    BoxType::MOOF => {
                        let decoded = Moof::parse(payload)?;
                        drm_init_data.extend(drm::drm_init_data_moof(&decoded));
                        moof = Some(decoded);
                    }
                    BoxType::MDAT => {
                        if let Some(moof) = moof.take() {
                            samples.extend(assemble(active, &moof, payload)?);
                        } else {
                            tracing::debug!("mdat with no preceding moof skipped");
                        }
                    }
                    _ => {}
                }
            }
        }

        // Commit only after every decode in this append succeeded.
        let init_ready = match pending {
            Some((meta, defaults)) => {
                let changed = self.committed_meta.as_ref() != Some(&meta);
                self.defaults = defaults;
                if changed {
                    self.committed_meta = Some(meta.clone());
                    Some(meta)
                } else {
                    None
                }
            }
            None => None,
        };

        let outcome = match (init_ready, samples.is_empty()) {
            (Some(meta), false) => ParseOutcome::InitAndSamplesReady(meta, samples),
            (Some(meta), true) => ParseOutcome::InitReady(meta),
            (None, false) => ParseOutcome::SamplesReady(samples),
            (None, true) => ParseOutcome::Incomplete,
        };

        Ok(Appended {
            state,
            outcome,
            end: append_end(state),
            drm_init_data,
        })
    }

    fn append_webm(&mut self, data: &[u8]) -> Result<Appended> {
        let scanned = classify_webm(data);
        let tracks = extract_tracks(data)?;
        if !tracks.has_video && !tracks.has_audio {
            return Ok(Appended {
                state: scanned,
                outcome: ParseOutcome::Incomplete,
                end: append_end(scanned),
                drm_init_data: Vec::new(),
            });
        }

        // Track discovery never distinguishes media from incomplete for
        // WebM: a successful scan always waits for more bytes.
        let state = ParseState::InitMediaIncomplete;
        let meta = TrackMeta::from_webm(&tracks);
        let changed = self.committed_meta.as_ref() != Some(&meta);
        let outcome = if changed {
            self.committed_meta = Some(meta.clone());
            ParseOutcome::InitReady(meta)
        } else {
            ParseOutcome::Incomplete
        };
        Ok(Appended {
            state,
            outcome,
            end: append_end(state),
            drm_init_data: Vec::new(),
        })
    }
}

/// EOS/underrun mapping per classified state.
fn append_end(state: ParseState) -> AppendEnd {
    match state {
        ParseState::InitMediaSegment | ParseState::MediaSegment => AppendEnd::EndOfStream,
        ParseState::MediaIncomplete
        | ParseState::InitIncomplete
        | ParseState::InitMediaIncomplete
        | ParseState::InitSegment => AppendEnd::Underrun,
        _ => AppendEnd::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("video/mp4; codecs=\"avc1.42E01E\"").unwrap();
        assert_eq!(ct.container, ContainerFormat::Mp4);
        assert_eq!(ct.kind, TrackKind::Video);
        assert_eq!(
            ContentType::parse("audio/webm").unwrap().container,
            ContainerFormat::Webm
        );
        assert!(ContentType::parse("text/plain").is_none());
        assert!(ContentType::parse("").is_none());
    }

    #[test]
    fn test_append_end_mapping() {
        assert_eq!(append_end(ParseState::InitMediaSegment), AppendEnd::EndOfStream);
        assert_eq!(append_end(ParseState::MediaSegment), AppendEnd::EndOfStream);
        assert_eq!(append_end(ParseState::InitSegment), AppendEnd::Underrun);
        assert_eq!(append_end(ParseState::MediaIncomplete), AppendEnd::Underrun);
        assert_eq!(append_end(ParseState::InitIncomplete), AppendEnd::Underrun);
        assert_eq!(append_end(ParseState::InitMediaIncomplete), AppendEnd::Underrun);
        assert_eq!(append_end(ParseState::None), AppendEnd::None);
        assert_eq!(append_end(ParseState::Invalid), AppendEnd::None);
    }

    #[test]
    fn test_reset_clears_committed_state() {
        let mut sb = SourceBuffer::new(ContentType {
            container: ContainerFormat::Mp4,
            kind: TrackKind::Video,
        });
        sb.committed_meta = Some(TrackMeta {
            timescale: 1000,
            duration: None,
            tracks: Vec::new(),
        });
        sb.reset();
        assert!(sb.track_meta().is_none());
        assert!(sb.defaults.is_empty());
    }
}
