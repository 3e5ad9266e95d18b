//! Sample defaulting and assembly.
//!
//! Turns a decoded `moof` plus its sibling `mdat` payload into timed
//! samples. Field values missing from a `trun` record fall back to the
//! `tfhd` defaults, then to the movie-level `trex` defaults; a field
//! with no value anywhere fails the whole fragment rather than being
//! zero-filled.

use bytes::Bytes;

use crate::media_time::MediaTime;
use crate::mp4::boxes::Moov;
use crate::mp4::boxes::Trex;
use crate::mp4::fragment::{Moof, Traf, SAMPLE_IS_NON_SYNC};
use crate::reader::ByteReader;
use crate::{Error, Result};

/// One decoded media sample with absolute timing.
#[derive(Debug, Clone)]
pub struct Sample {
    pub pts: MediaTime,
    pub dts: MediaTime,
    pub duration: MediaTime,
    pub is_sync: bool,
    pub track_id: u32,
    /// Payload copied out of the append buffer; outlives the append.
    pub payload: Bytes,
}

/// Fragment-assembly defaults for one track, cloned out of a decoded
/// moov so they survive after the append buffer is released.
#[derive(Debug, Clone, Copy)]
pub struct TrackDefaults {
    pub track_id: u32,
    pub timescale: u32,
    pub trex: Option<Trex>,
}

/// Owned per-track default table for a whole movie.
#[derive(Debug, Clone, Default)]
pub struct MovieDefaults {
    tracks: Vec<TrackDefaults>,
}

impl MovieDefaults {
    /// Snapshot the defaults a fragment needs from a decoded moov.
    pub fn from_moov(moov: &Moov) -> Self {
        let movie_timescale = moov.timescale().unwrap_or(0);
        let tracks = moov
            .traks
            .iter()
            .filter_map(|trak| {
                let track_id = trak.track_id()?;
                Some(TrackDefaults {
                    track_id,
                    timescale: trak.timescale().unwrap_or(movie_timescale),
                    trex: moov.trex_for(track_id).copied(),
                })
            })
            .collect();
        Self { tracks }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn track(&self, track_id: u32) -> Option<&TrackDefaults> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }
}

/// Assemble the samples of one `moof` + `mdat` fragment.
///
/// The mdat payload is walked sequentially: per-traf auxiliary data
/// (saiz) is consumed from the front, then each sample's bytes in run
/// order. Exhausting the payload mid-run fails the fragment; no partial
/// sample is ever emitted.
pub fn assemble(defaults: &MovieDefaults, moof: &Moof, mdat: &[u8]) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();
    let mut cursor = ByteReader::new(mdat);
    for traf in &moof.trafs {
        assemble_traf(defaults, traf, &mut cursor, &mut samples)?;
    }
    Ok(samples)
}

fn assemble_traf(
    defaults: &MovieDefaults,
    traf: &Traf,
    cursor: &mut ByteReader<'_>,
    out: &mut Vec<Sample>,
) -> Result<()> {
    let tfhd = traf.tfhd.as_ref().ok_or(Error::MissingDefault {
        track_id: 0,
        field: "tfhd",
    })?;
    let track = defaults
        .track(tfhd.track_id)
        .ok_or(Error::MissingDefault {
            track_id: tfhd.track_id,
            field: "track",
        })?;
    if track.timescale == 0 {
        return Err(Error::MissingDefault {
            track_id: tfhd.track_id,
            field: "timescale",
        });
    }
    let trex = track.trex.as_ref();

    // Encryption auxiliary data sits ahead of the first sample.
    if let Some(saiz) = &traf.saiz {
        let aux = saiz.total_size();
        cursor.skip(aux as usize).map_err(|_| Error::TruncatedPayload {
            need: aux,
            have: cursor.remaining() as u64,
        })?;
    }

    let base = traf
        .tfdt
        .map(|t| t.base_media_decode_time)
        .unwrap_or(0);
    let mut elapsed = 0u64;

    for trun in &traf.truns {
        for (index, entry) in trun.samples.iter().enumerate() {
            let duration = resolve(
                entry.duration,
                tfhd.default_sample_duration,
                trex.map(|t| t.default_sample_duration),
                tfhd.track_id,
                "duration",
            )?;
            let size = resolve(
                entry.size,
                tfhd.default_sample_size,
                trex.map(|t| t.default_sample_size),
                tfhd.track_id,
                "size",
            )?;
            let flags = if index == 0 && trun.first_sample_flags.is_some() {
                trun.first_sample_flags.ok_or(Error::MissingDefault {
                    track_id: tfhd.track_id,
                    field: "flags",
                })?
            } else {
                resolve(
                    entry.flags,
                    tfhd.default_sample_flags,
                    trex.map(|t| t.default_sample_flags),
                    tfhd.track_id,
                    "flags",
                )?
            };

            let payload = cursor
                .take(size as usize)
                .map_err(|_| Error::TruncatedPayload {
                    need: u64::from(size),
                    have: cursor.remaining() as u64,
                })?;

            let dts = MediaTime::new(base.saturating_add(elapsed), track.timescale);
            let pts = dts.offset_ticks(entry.composition_time_offset.unwrap_or(0));
            out.push(Sample {
                pts,
                dts,
                duration: MediaTime::new(u64::from(duration), track.timescale),
                is_sync: flags & SAMPLE_IS_NON_SYNC == 0,
                track_id: tfhd.track_id,
                payload: Bytes::copy_from_slice(payload),
            });
            elapsed += u64::from(duration);
        }
    }
    Ok(())
}

/// trun value, else tfhd default, else trex default, else failure.
fn resolve(
    from_trun: Option<u32>,
    from_tfhd: Option<u32>,
    from_trex: Option<u32>,
    track_id: u32,
    field: &'static str,
) -> Result<u32> {
    from_trun
        .or(from_tfhd)
        .or(from_trex)
        .ok_or(Error::MissingDefault { track_id, field })
}
