//! MSE-style fragmented media parsing and sample assembly.
//!
//! Byte chunks appended by an application are classified as
//! initialization or media segments, their box/element trees decoded
//! (ISO-BMFF for MP4, EBML for WebM), and media payloads sliced into
//! timed, flagged samples ready for a downstream decoder. Everything is
//! synchronous and allocation happens only at the append boundary:
//! samples and committed track metadata are copied out of the caller's
//! buffer, nothing else is.
//!
//! ```no_run
//! use mse_media::{ContentType, ParseOutcome, SourceBuffer};
//!
//! let content_type = ContentType::parse("video/mp4").unwrap();
//! let mut buffer = SourceBuffer::new(content_type);
//!
//! let segment: Vec<u8> = std::fs::read("init.mp4").unwrap();
//! let appended = buffer.append(&segment).unwrap();
//! if let ParseOutcome::InitReady(meta) = appended.outcome {
//!     println!("{} tracks at timescale {}", meta.tracks.len(), meta.timescale);
//! }
//! ```

pub mod drm;
pub mod error;
pub mod media_time;
pub mod mp4;
pub mod reader;
pub mod sample;
pub mod source_buffer;
pub mod webm;

pub use drm::{DrmInitData, TrackEncryption};
pub use error::{Error, Result};
pub use media_time::MediaTime;
pub use mp4::{classify, BoxScanner, Classification, ParseState};
pub use sample::{assemble, MovieDefaults, Sample};
pub use source_buffer::{
    AppendEnd, Appended, ContainerFormat, ContentType, ParseOutcome, SourceBuffer, TrackInfo,
    TrackKind, TrackMeta,
};
pub use webm::{extract_tracks, WebmTracks};
