//! Movie-fragment boxes: `moof` and everything under it.
//!
//! `tfhd` and `trun` encode most of their fields conditionally behind
//! flag bits; the structs here keep those fields as `Option` so the
//! defaulting pass in the assembly engine can tell "absent" from "zero".

use crate::mp4::boxes::{walk_children, BoxType, FullBoxHeader, Pssh};
use crate::reader::ByteReader;
use crate::{Error, Result};

/// `tfhd` presence flags.
pub const TFHD_BASE_DATA_OFFSET: u32 = 0x0000_0001;
pub const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x0000_0002;
pub const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x0000_0008;
pub const TFHD_DEFAULT_SAMPLE_SIZE: u32 = 0x0000_0010;
pub const TFHD_DEFAULT_SAMPLE_FLAGS: u32 = 0x0000_0020;
pub const TFHD_DURATION_IS_EMPTY: u32 = 0x0001_0000;
pub const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x0002_0000;

/// `trun` presence flags.
pub const TRUN_DATA_OFFSET: u32 = 0x0000_0001;
pub const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x0000_0004;
pub const TRUN_SAMPLE_DURATION: u32 = 0x0000_0100;
pub const TRUN_SAMPLE_SIZE: u32 = 0x0000_0200;
pub const TRUN_SAMPLE_FLAGS: u32 = 0x0000_0400;
pub const TRUN_SAMPLE_COMPOSITION_TIME_OFFSET: u32 = 0x0000_0800;

/// Sample-flags bit marking a non-sync ("difference") sample.
pub const SAMPLE_IS_NON_SYNC: u32 = 0x0001_0000;

/// `mfhd` — movie fragment header.
#[derive(Debug, Clone, Copy)]
pub struct Mfhd {
    pub sequence_number: u32,
}

impl Mfhd {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let _full = FullBoxHeader::read(&mut r)?;
        Ok(Self {
            sequence_number: r.read_u32()?,
        })
    }
}

/// `tfhd` — track fragment header with flagged optional defaults.
#[derive(Debug, Clone, Copy)]
pub struct Tfhd {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    pub duration_is_empty: bool,
    pub default_base_is_moof: bool,
}

impl Tfhd {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let flags = full.flags;
        let track_id = r.read_u32()?;
        let base_data_offset = if flags & TFHD_BASE_DATA_OFFSET != 0 {
            Some(r.read_u64()?)
        } else {
            None
        };
        let sample_description_index = if flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 {
            Some(r.read_u32()?)
        } else {
            None
        };
        let default_sample_duration = if flags & TFHD_DEFAULT_SAMPLE_DURATION != 0 {
            Some(r.read_u32()?)
        } else {
            None
        };
        let default_sample_size = if flags & TFHD_DEFAULT_SAMPLE_SIZE != 0 {
            Some(r.read_u32()?)
        } else {
            None
        };
        let default_sample_flags = if flags & TFHD_DEFAULT_SAMPLE_FLAGS != 0 {
            Some(r.read_u32()?)
        } else {
            None
        };
        Ok(Self {
            track_id,
            base_data_offset,
            sample_description_index,
            default_sample_duration,
            default_sample_size,
            default_sample_flags,
            duration_is_empty: flags & TFHD_DURATION_IS_EMPTY != 0,
            default_base_is_moof: flags & TFHD_DEFAULT_BASE_IS_MOOF != 0,
        })
    }
}

/// One `trun` sample record. Absent fields fall back to tfhd then trex.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrunSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_time_offset: Option<i64>,
}

/// `trun` — track fragment run.
#[derive(Debug, Clone)]
pub struct Trun {
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: Vec<TrunSample>,
}

impl Trun {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let flags = full.flags;
        let sample_count = r.read_u32()?;
        let data_offset = if flags & TRUN_DATA_OFFSET != 0 {
            Some(r.read_i32()?)
        } else {
            None
        };
        let first_sample_flags = if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
            Some(r.read_u32()?)
        } else {
            None
        };
        let mut samples = Vec::with_capacity(sample_count.min(1 << 20) as usize);
        for _ in 0..sample_count {
            let mut sample = TrunSample::default();
            if flags & TRUN_SAMPLE_DURATION != 0 {
                sample.duration = Some(r.read_u32()?);
            }
            if flags & TRUN_SAMPLE_SIZE != 0 {
                sample.size = Some(r.read_u32()?);
            }
            if flags & TRUN_SAMPLE_FLAGS != 0 {
                sample.flags = Some(r.read_u32()?);
            }
            if flags & TRUN_SAMPLE_COMPOSITION_TIME_OFFSET != 0 {
                // version 0 stores an unsigned offset, version 1 signed
                sample.composition_time_offset = Some(if full.version == 0 {
                    i64::from(r.read_u32()?)
                } else {
                    i64::from(r.read_i32()?)
                });
            }
            samples.push(sample);
        }
        Ok(Self {
            data_offset,
            first_sample_flags,
            samples,
        })
    }
}

/// `tfdt` — track fragment decode time.
#[derive(Debug, Clone, Copy)]
pub struct Tfdt {
    pub base_media_decode_time: u64,
}

impl Tfdt {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let base_media_decode_time = if full.version != 0 {
            r.read_u64()?
        } else {
            u64::from(r.read_u32()?)
        };
        Ok(Self {
            base_media_decode_time,
        })
    }
}

/// `saio` — sample auxiliary information offsets.
#[derive(Debug, Clone)]
pub struct Saio {
    pub aux_info: Option<(u32, u32)>,
    pub offsets: Vec<u64>,
}

impl Saio {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let aux_info = if full.flags & 0x01 != 0 {
            Some((r.read_u32()?, r.read_u32()?))
        } else {
            None
        };
        let entry_count = r.read_u32()?;
        let mut offsets = Vec::with_capacity(entry_count.min(1 << 20) as usize);
        for _ in 0..entry_count {
            offsets.push(if full.version == 0 {
                u64::from(r.read_u32()?)
            } else {
                r.read_u64()?
            });
        }
        Ok(Self { aux_info, offsets })
    }
}

/// `saiz` — sample auxiliary information sizes. The auxiliary blob sits
/// at the front of the fragment's mdat, ahead of the first sample.
#[derive(Debug, Clone)]
pub struct Saiz {
    pub aux_info: Option<(u32, u32)>,
    pub default_sample_info_size: u8,
    pub sample_count: u32,
    pub sizes: Vec<u8>,
}

impl Saiz {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let aux_info = if full.flags & 0x01 != 0 {
            Some((r.read_u32()?, r.read_u32()?))
        } else {
            None
        };
        let default_sample_info_size = r.read_u8()?;
        let sample_count = r.read_u32()?;
        let mut sizes = Vec::new();
        if default_sample_info_size == 0 {
            sizes = r.take(sample_count as usize)?.to_vec();
        }
        Ok(Self {
            aux_info,
            default_sample_info_size,
            sample_count,
            sizes,
        })
    }

    /// Total auxiliary bytes occupying the front of the mdat payload.
    pub fn total_size(&self) -> u64 {
        if self.default_sample_info_size != 0 {
            u64::from(self.default_sample_info_size) * u64::from(self.sample_count)
        } else {
            self.sizes.iter().map(|&s| u64::from(s)).sum()
        }
    }
}

/// `senc` — per-sample encryption data. Only the count is decoded; the
/// IV/subsample layout needs the tenc IV size to interpret and the
/// engine does not decrypt.
#[derive(Debug, Clone, Copy)]
pub struct Senc {
    pub sample_count: u32,
}

impl Senc {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let _full = FullBoxHeader::read(&mut r)?;
        Ok(Self {
            sample_count: r.read_u32()?,
        })
    }
}

/// `traf` — track fragment container.
#[derive(Debug, Clone, Default)]
pub struct Traf {
    pub tfhd: Option<Tfhd>,
    pub tfdt: Option<Tfdt>,
    pub truns: Vec<Trun>,
    pub saio: Option<Saio>,
    pub saiz: Option<Saiz>,
    pub senc: Option<Senc>,
}

impl Traf {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut traf = Self::default();
        walk_children("traf", payload, |header, body| {
            match &header.box_type.0 {
                b"tfhd" => traf.tfhd = Some(Tfhd::parse(body)?),
                b"tfdt" => traf.tfdt = Some(Tfdt::parse(body)?),
                b"trun" => traf.truns.push(Trun::parse(body)?),
                b"saio" => traf.saio = Some(Saio::parse(body)?),
                b"saiz" => traf.saiz = Some(Saiz::parse(body)?),
                b"senc" => traf.senc = Some(Senc::parse(body)?),
                b"sdtp" | b"sbgp" | b"subs" => {}
                _ => {
                    return Err(Error::UnsupportedBox {
                        container: "traf".to_string(),
                        child: header.box_type.to_string(),
                    })
                }
            }
            Ok(())
        })?;
        Ok(traf)
    }
}

/// `moof` — movie fragment container.
#[derive(Debug, Clone, Default)]
pub struct Moof {
    pub mfhd: Option<Mfhd>,
    pub trafs: Vec<Traf>,
    pub pssh: Vec<Pssh>,
}

impl Moof {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut moof = Self::default();
        walk_children("moof", payload, |header, body| {
            match header.box_type {
                BoxType::MFHD => moof.mfhd = Some(Mfhd::parse(body)?),
                BoxType::TRAF => moof.trafs.push(Traf::parse(body)?),
                BoxType::PSSH => moof.pssh.push(Pssh::parse(body)?),
                other => {
                    return Err(Error::UnsupportedBox {
                        container: "moof".to_string(),
                        child: other.to_string(),
                    })
                }
            }
            Ok(())
        })?;
        Ok(moof)
    }
}
