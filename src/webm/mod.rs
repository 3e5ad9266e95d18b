//! WebM (Matroska subset) parsing: EBML varints and shallow track
//! discovery. Deliberately flatter than the MP4 side; only the elements
//! the coordinator needs are decoded, everything else is skipped by
//! length.

pub mod ebml;
pub mod tracks;

pub use tracks::{extract_tracks, WebmTracks};
