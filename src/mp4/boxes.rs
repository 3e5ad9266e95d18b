//! ISO-BMFF box definitions and parsing.
//!
//! Containers decode their children against a closed set: a child type
//! the container does not know is a decode failure, except for `uuid`
//! boxes, which are always skipped wherever they appear. Leaf boxes
//! follow ISO/IEC 14496-12 field layouts, with version-dependent 32/64
//! bit time fields.

use bytes::Bytes;

use crate::reader::ByteReader;
use crate::{Error, Result};

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const STYP: Self = Self(*b"styp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MOOF: Self = Self(*b"moof");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const TREF: Self = Self(*b"tref");
    pub const EDTS: Self = Self(*b"edts");
    pub const ELST: Self = Self(*b"elst");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const CTTS: Self = Self(*b"ctts");
    pub const STSZ: Self = Self(*b"stsz");
    pub const MVEX: Self = Self(*b"mvex");
    pub const MEHD: Self = Self(*b"mehd");
    pub const TREX: Self = Self(*b"trex");
    pub const PSSH: Self = Self(*b"pssh");
    pub const SINF: Self = Self(*b"sinf");
    pub const FRMA: Self = Self(*b"frma");
    pub const SCHM: Self = Self(*b"schm");
    pub const SCHI: Self = Self(*b"schi");
    pub const TENC: Self = Self(*b"tenc");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TRUN: Self = Self(*b"trun");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const SAIO: Self = Self(*b"saio");
    pub const SAIZ: Self = Self(*b"saiz");
    pub const SENC: Self = Self(*b"senc");
    pub const MFRA: Self = Self(*b"mfra");
    pub const MFRO: Self = Self(*b"mfro");
    pub const META: Self = Self(*b"meta");
    pub const FREE: Self = Self(*b"free");
    pub const UUID: Self = Self(*b"uuid");
    pub const SIDX: Self = Self(*b"sidx");
    pub const PDIN: Self = Self(*b"pdin");

    pub const VIDE: Self = Self(*b"vide");
    pub const SOUN: Self = Self(*b"soun");
    pub const HINT: Self = Self(*b"hint");

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Minimum bytes needed to start parsing a box: 4-byte size + 4-byte type.
pub const BOX_HEADER_SIZE: usize = 8;

/// Parsed box header.
#[derive(Debug, Clone, Copy)]
pub struct BoxHeader {
    /// Box type code.
    pub box_type: BoxType,
    /// Total box size including the header.
    pub size: u64,
    /// Header size: 8, or 16 when a 64-bit largesize follows.
    pub header_size: u8,
}

impl BoxHeader {
    /// Read a box header at the reader's cursor.
    ///
    /// A declared size of 1 switches to the 64-bit largesize form. A size
    /// smaller than the header itself is rejected.
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let size32 = r.read_u32()?;
        let box_type = BoxType(r.read_array()?);
        let (size, header_size) = if size32 == 1 {
            (r.read_u64()?, 16u8)
        } else {
            (u64::from(size32), 8u8)
        };
        if size < u64::from(header_size) {
            return Err(Error::InvalidBoxSize {
                box_type: box_type.to_string(),
                size,
            });
        }
        Ok(Self {
            box_type,
            size,
            header_size,
        })
    }

    /// Payload size (total size minus header).
    pub fn payload_size(&self) -> u64 {
        self.size - u64::from(self.header_size)
    }
}

/// Version + 24-bit flags prefix shared by all "full" boxes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullBoxHeader {
    pub version: u8,
    pub flags: u32,
}

impl FullBoxHeader {
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            version: r.read_u8()?,
            flags: r.read_u24()?,
        })
    }
}

/// Walk the children of a container payload with a strict size contract.
///
/// The cursor must advance by exactly each child's declared size; the
/// walk succeeds only when the children consume the payload completely.
/// `uuid` children are skipped here, before the visitor sees them.
pub(crate) fn walk_children<'a, F>(
    container: &'static str,
    payload: &'a [u8],
    mut visit: F,
) -> Result<()>
where
    F: FnMut(&BoxHeader, &'a [u8]) -> Result<()>,
{
    let mut r = ByteReader::new(payload);
    while !r.is_empty() {
        let consumed = r.position() as u64;
        let mismatch = |_| Error::SizeMismatch {
            container,
            consumed,
            declared: payload.len() as u64,
        };
        let header = BoxHeader::read(&mut r).map_err(mismatch)?;
        let body = r.take(header.payload_size() as usize).map_err(mismatch)?;
        if header.box_type == BoxType::UUID {
            continue;
        }
        visit(&header, body)?;
    }
    Ok(())
}

fn unsupported(container: &str, child: BoxType) -> Error {
    Error::UnsupportedBox {
        container: container.to_string(),
        child: child.to_string(),
    }
}

/// `ftyp` — file type and compatible brands.
#[derive(Debug, Clone)]
pub struct Ftyp {
    pub major_brand: BoxType,
    pub minor_version: u32,
    pub compatible_brands: Vec<BoxType>,
}

impl Ftyp {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let major_brand = BoxType(r.read_array()?);
        let minor_version = r.read_u32()?;
        let mut compatible_brands = Vec::new();
        while !r.is_empty() {
            compatible_brands.push(BoxType(r.read_array()?));
        }
        Ok(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }
}

/// `mvhd` — movie header.
#[derive(Debug, Clone)]
pub struct Mvhd {
    pub timescale: u32,
    pub duration: u64,
    pub rate: i32,
    pub volume: i16,
    pub next_track_id: u32,
}

impl Mvhd {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let (timescale, duration) = if full.version != 0 {
            r.skip(16)?; // creation + modification time
            (r.read_u32()?, r.read_u64()?)
        } else {
            r.skip(8)?;
            (r.read_u32()?, u64::from(r.read_u32()?))
        };
        let rate = r.read_i32()?;
        let volume = r.read_i16()?;
        r.skip(2 + 4 + 4)?; // reserved
        r.skip(9 * 4)?; // matrix
        r.skip(6 * 4)?; // pre_defined
        let next_track_id = r.read_u32()?;
        Ok(Self {
            timescale,
            duration,
            rate,
            volume,
            next_track_id,
        })
    }
}

/// `tkhd` — track header. Width/height are stored already shifted out of
/// their 16.16 fixed-point encoding.
#[derive(Debug, Clone)]
pub struct Tkhd {
    pub track_id: u32,
    pub duration: u64,
    pub layer: i16,
    pub alternate_group: i16,
    pub volume: i16,
    pub width: u32,
    pub height: u32,
}

impl Tkhd {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let (track_id, duration) = if full.version != 0 {
            r.skip(16)?;
            let id = r.read_u32()?;
            r.skip(4)?; // reserved
            (id, r.read_u64()?)
        } else {
            r.skip(8)?;
            let id = r.read_u32()?;
            r.skip(4)?;
            (id, u64::from(r.read_u32()?))
        };
        r.skip(8)?; // reserved
        let layer = r.read_i16()?;
        let alternate_group = r.read_i16()?;
        let volume = r.read_i16()?;
        r.skip(2)?;
        r.skip(9 * 4)?; // matrix
        let width = r.read_u32()? >> 16;
        let height = r.read_u32()? >> 16;
        Ok(Self {
            track_id,
            duration,
            layer,
            alternate_group,
            volume,
            width,
            height,
        })
    }
}

/// `mdhd` — media header. Language is the unpacked 3x5-bit ISO-639 code.
#[derive(Debug, Clone)]
pub struct Mdhd {
    pub timescale: u32,
    pub duration: u64,
    pub language: [u8; 3],
}

impl Mdhd {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let (timescale, duration) = if full.version != 0 {
            r.skip(16)?;
            (r.read_u32()?, r.read_u64()?)
        } else {
            r.skip(8)?;
            (r.read_u32()?, u64::from(r.read_u32()?))
        };
        let packed = r.read_u16()?;
        let language = [
            ((packed >> 10) & 0x1f) as u8,
            ((packed >> 5) & 0x1f) as u8,
            (packed & 0x1f) as u8,
        ];
        Ok(Self {
            timescale,
            duration,
            language,
        })
    }
}

/// `hdlr` — handler reference.
#[derive(Debug, Clone)]
pub struct Hdlr {
    pub handler_type: BoxType,
    pub name: String,
}

impl Hdlr {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let _full = FullBoxHeader::read(&mut r)?;
        r.skip(4)?; // pre_defined
        let handler_type = BoxType(r.read_array()?);
        r.skip(12)?; // reserved
        let rest = r.take(r.remaining())?;
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let name = String::from_utf8_lossy(&rest[..end]).into_owned();
        Ok(Self { handler_type, name })
    }
}

/// One `elst` edit-list entry.
#[derive(Debug, Clone, Copy)]
pub struct ElstEntry {
    pub segment_duration: u64,
    pub media_time: i64,
    pub media_rate_integer: i16,
    pub media_rate_fraction: i16,
}

/// `elst` — edit list.
#[derive(Debug, Clone)]
pub struct Elst {
    pub entries: Vec<ElstEntry>,
}

impl Elst {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let entry_count = r.read_u32()?;
        let mut entries = Vec::new();
        for _ in 0..entry_count {
            let (segment_duration, media_time) = if full.version != 0 {
                (r.read_u64()?, r.read_u64()? as i64)
            } else {
                (u64::from(r.read_u32()?), i64::from(r.read_i32()?))
            };
            entries.push(ElstEntry {
                segment_duration,
                media_time,
                media_rate_integer: r.read_i16()?,
                media_rate_fraction: r.read_i16()?,
            });
        }
        Ok(Self { entries })
    }
}

/// `edts` — edit container.
#[derive(Debug, Clone, Default)]
pub struct Edts {
    pub elst: Option<Elst>,
}

impl Edts {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut edts = Self::default();
        walk_children("edts", payload, |header, body| {
            match header.box_type {
                BoxType::ELST => edts.elst = Some(Elst::parse(body)?),
                other => return Err(unsupported("edts", other)),
            }
            Ok(())
        })?;
        Ok(edts)
    }
}

/// `stts` — decoding time to sample, `(sample_count, sample_delta)` runs.
#[derive(Debug, Clone, Default)]
pub struct Stts {
    pub entries: Vec<(u32, u32)>,
}

impl Stts {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let _full = FullBoxHeader::read(&mut r)?;
        let entry_count = r.read_u32()?;
        let mut entries = Vec::new();
        for _ in 0..entry_count {
            entries.push((r.read_u32()?, r.read_u32()?));
        }
        Ok(Self { entries })
    }
}

/// `ctts` — composition time offsets, `(sample_count, offset)` runs.
#[derive(Debug, Clone, Default)]
pub struct Ctts {
    pub entries: Vec<(u32, i32)>,
}

impl Ctts {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let entry_count = r.read_u32()?;
        let mut entries = Vec::new();
        for _ in 0..entry_count {
            let count = r.read_u32()?;
            let offset = if full.version == 0 {
                r.read_u32()? as i32
            } else {
                r.read_i32()?
            };
            entries.push((count, offset));
        }
        Ok(Self { entries })
    }
}

/// `stsz` — sample sizes. `default_size != 0` means all samples share it.
#[derive(Debug, Clone, Default)]
pub struct Stsz {
    pub default_size: u32,
    pub sample_count: u32,
    pub sizes: Vec<u32>,
}

impl Stsz {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let _full = FullBoxHeader::read(&mut r)?;
        let default_size = r.read_u32()?;
        let sample_count = r.read_u32()?;
        let mut sizes = Vec::new();
        if default_size == 0 {
            sizes.reserve(sample_count.min(1 << 20) as usize);
            for _ in 0..sample_count {
                sizes.push(r.read_u32()?);
            }
        }
        Ok(Self {
            default_size,
            sample_count,
            sizes,
        })
    }
}

/// `tenc` — default track encryption parameters from the `sinf` chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Tenc {
    pub default_is_encrypted: bool,
    pub default_iv_size: u8,
    pub default_kid: [u8; 16],
}

impl Tenc {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let _full = FullBoxHeader::read(&mut r)?;
        let default_is_encrypted = r.read_u24()? != 0;
        let default_iv_size = r.read_u8()?;
        let default_kid = r.read_array()?;
        Ok(Self {
            default_is_encrypted,
            default_iv_size,
            default_kid,
        })
    }
}

/// `sinf` — protection scheme information chain.
#[derive(Debug, Clone, Default)]
pub struct Sinf {
    /// Original sample entry format from `frma`.
    pub data_format: Option<BoxType>,
    /// Scheme type from `schm` (e.g. `cenc`).
    pub scheme_type: Option<BoxType>,
    pub scheme_version: u32,
    pub tenc: Option<Tenc>,
}

impl Sinf {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut sinf = Self::default();
        walk_children("sinf", payload, |header, body| {
            match &header.box_type.0 {
                b"frma" => {
                    let mut r = ByteReader::new(body);
                    sinf.data_format = Some(BoxType(r.read_array()?));
                }
                b"schm" => {
                    let mut r = ByteReader::new(body);
                    let _full = FullBoxHeader::read(&mut r)?;
                    sinf.scheme_type = Some(BoxType(r.read_array()?));
                    sinf.scheme_version = r.read_u32()?;
                    // scheme URI, when flagged, occupies the rest
                }
                b"schi" => {
                    sinf.tenc = Self::parse_schi(body)?;
                }
                b"imif" => {}
                _ => return Err(unsupported("sinf", header.box_type)),
            }
            Ok(())
        })?;
        Ok(sinf)
    }

    fn parse_schi(payload: &[u8]) -> Result<Option<Tenc>> {
        let mut tenc = None;
        walk_children("schi", payload, |header, body| {
            // tenc is what we are after; other scheme-specific boxes are
            // opaque to us and carried by the scheme owner.
            if header.box_type == BoxType::TENC {
                tenc = Some(Tenc::parse(body)?);
            }
            Ok(())
        })?;
        Ok(tenc)
    }
}

/// What kind of media a sample description describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEntryKind {
    Visual { width: u16, height: u16 },
    Audio { channel_count: u16, sample_rate: u32 },
    Hint,
}

/// One entry of an `stsd` box.
#[derive(Debug, Clone)]
pub struct SampleDescription {
    /// Sample entry format (`avc1`, `mp4a`, `encv`, ...).
    pub format: BoxType,
    pub data_reference_index: u16,
    pub kind: SampleEntryKind,
    /// Codec private data (`avcC`, `hvcC`, `esds`, ...), header stripped.
    pub codec_data: Option<Bytes>,
    /// Protection chain for encrypted sample entries.
    pub protection: Option<Sinf>,
}

impl SampleDescription {
    fn parse(handler: BoxType, format: BoxType, body: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(body);
        r.skip(6)?; // reserved
        let data_reference_index = r.read_u16()?;
        let kind = match handler {
            BoxType::VIDE => {
                r.skip(2 + 2 + 12)?; // pre_defined + reserved + pre_defined[3]
                let width = r.read_u16()?;
                let height = r.read_u16()?;
                r.skip(4 + 4 + 4)?; // resolutions + reserved
                r.skip(2)?; // frame_count
                r.skip(32)?; // compressor name
                r.skip(2 + 2)?; // depth + pre_defined
                SampleEntryKind::Visual { width, height }
            }
            BoxType::SOUN => {
                r.skip(8)?; // reserved
                let channel_count = r.read_u16()?;
                r.skip(2 + 2 + 2)?; // sample size, pre_defined, reserved
                let sample_rate = r.read_u32()? >> 16;
                SampleEntryKind::Audio {
                    channel_count,
                    sample_rate,
                }
            }
            BoxType::HINT => SampleEntryKind::Hint,
            other => {
                return Err(Error::UnexpectedBoxType {
                    expected: "vide/soun/hint handler".to_string(),
                    found: other.to_string(),
                })
            }
        };

        let mut entry = Self {
            format,
            data_reference_index,
            kind,
            codec_data: None,
            protection: None,
        };
        entry.scan_children(&mut r)?;
        Ok(entry)
    }

    /// Scan the trailing child boxes of a sample entry. This scan is
    /// deliberately lenient: sample entries grow codec-specific children
    /// and a malformed tail only stops the scan.
    fn scan_children(&mut self, r: &mut ByteReader<'_>) -> Result<()> {
        while r.remaining() >= BOX_HEADER_SIZE {
            let header = match BoxHeader::read(r) {
                Ok(h) => h,
                Err(_) => break,
            };
            let body = match r.take(header.payload_size() as usize) {
                Ok(b) => b,
                Err(_) => break,
            };
            match &header.box_type.0 {
                b"avcC" | b"hvcC" | b"esds" | b"vpcC" | b"av1C" | b"dOps" => {
                    self.codec_data = Some(Bytes::copy_from_slice(body));
                }
                b"sinf" => self.protection = Some(Sinf::parse(body)?),
                _ => {} // pasp, colr, btrt, ...
            }
        }
        Ok(())
    }
}

/// `stsd` — sample descriptions, typed by the track's handler.
#[derive(Debug, Clone, Default)]
pub struct Stsd {
    pub entries: Vec<SampleDescription>,
}

impl Stsd {
    pub fn parse(handler: BoxType, payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let _full = FullBoxHeader::read(&mut r)?;
        let entry_count = r.read_u32()?;
        let mut entries = Vec::new();
        for _ in 0..entry_count {
            let header = BoxHeader::read(&mut r)?;
            let body = r.take(header.payload_size() as usize)?;
            entries.push(SampleDescription::parse(handler, header.box_type, body)?);
        }
        Ok(Self { entries })
    }
}

/// `stbl` — sample table container.
#[derive(Debug, Clone, Default)]
pub struct Stbl {
    pub stsd: Option<Stsd>,
    pub stts: Option<Stts>,
    pub ctts: Option<Ctts>,
    pub stsz: Option<Stsz>,
}

impl Stbl {
    pub fn parse(handler: BoxType, payload: &[u8]) -> Result<Self> {
        let mut stbl = Self::default();
        walk_children("stbl", payload, |header, body| {
            match &header.box_type.0 {
                b"stsd" => stbl.stsd = Some(Stsd::parse(handler, body)?),
                b"stts" => stbl.stts = Some(Stts::parse(body)?),
                b"ctts" => stbl.ctts = Some(Ctts::parse(body)?),
                b"stsz" => stbl.stsz = Some(Stsz::parse(body)?),
                // Sample-to-chunk machinery is meaningless for fragmented
                // movies; these are known siblings we skip by size.
                b"stsc" | b"stz2" | b"stco" | b"co64" | b"stsh" | b"stss" | b"padb" | b"sdtp"
                | b"sbgp" | b"sgpd" | b"subs" => {}
                _ => return Err(unsupported("stbl", header.box_type)),
            }
            Ok(())
        })?;
        Ok(stbl)
    }
}

/// Media-specific header inside `minf`.
#[derive(Debug, Clone, Copy)]
pub enum MediaHeader {
    Video { graphics_mode: u16 },
    Sound { balance: i16 },
    Hint,
    Null,
}

/// `minf` — media information container.
#[derive(Debug, Clone, Default)]
pub struct Minf {
    pub media_header: Option<MediaHeader>,
    pub stbl: Option<Stbl>,
}

impl Minf {
    pub fn parse(handler: BoxType, payload: &[u8]) -> Result<Self> {
        let mut minf = Self::default();
        walk_children("minf", payload, |header, body| {
            match &header.box_type.0 {
                b"vmhd" => {
                    let mut r = ByteReader::new(body);
                    let _full = FullBoxHeader::read(&mut r)?;
                    minf.media_header = Some(MediaHeader::Video {
                        graphics_mode: r.read_u16()?,
                    });
                }
                b"smhd" => {
                    let mut r = ByteReader::new(body);
                    let _full = FullBoxHeader::read(&mut r)?;
                    minf.media_header = Some(MediaHeader::Sound {
                        balance: r.read_i16()?,
                    });
                }
                b"hmhd" => minf.media_header = Some(MediaHeader::Hint),
                b"nmhd" => minf.media_header = Some(MediaHeader::Null),
                b"dinf" => {} // data references are irrelevant to in-memory streams
                b"stbl" => minf.stbl = Some(Stbl::parse(handler, body)?),
                _ => return Err(unsupported("minf", header.box_type)),
            }
            Ok(())
        })?;
        Ok(minf)
    }
}

/// `mdia` — media container.
#[derive(Debug, Clone, Default)]
pub struct Mdia {
    pub mdhd: Option<Mdhd>,
    pub hdlr: Option<Hdlr>,
    pub minf: Option<Minf>,
}

impl Mdia {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut mdia = Self::default();
        // minf needs the handler type from hdlr, so its payload is held
        // until the walk is done.
        let mut minf_body: Option<&[u8]> = None;
        walk_children("mdia", payload, |header, body| {
            match header.box_type {
                BoxType::MDHD => mdia.mdhd = Some(Mdhd::parse(body)?),
                BoxType::HDLR => mdia.hdlr = Some(Hdlr::parse(body)?),
                BoxType::MINF => minf_body = Some(body),
                other => return Err(unsupported("mdia", other)),
            }
            Ok(())
        })?;
        if let Some(body) = minf_body {
            let handler = mdia
                .hdlr
                .as_ref()
                .map(|h| h.handler_type)
                .unwrap_or(BoxType::HINT);
            mdia.minf = Some(Minf::parse(handler, body)?);
        }
        Ok(mdia)
    }

    /// Handler type, zeroed when no hdlr was present.
    pub fn handler_type(&self) -> Option<BoxType> {
        self.hdlr.as_ref().map(|h| h.handler_type)
    }
}

/// `trak` — track container.
#[derive(Debug, Clone, Default)]
pub struct Trak {
    pub tkhd: Option<Tkhd>,
    pub edts: Option<Edts>,
    pub mdia: Option<Mdia>,
}

impl Trak {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut trak = Self::default();
        walk_children("trak", payload, |header, body| {
            match header.box_type {
                BoxType::TKHD => trak.tkhd = Some(Tkhd::parse(body)?),
                BoxType::EDTS => trak.edts = Some(Edts::parse(body)?),
                BoxType::MDIA => trak.mdia = Some(Mdia::parse(body)?),
                BoxType::TREF => {} // track references carry no timing we need
                other => return Err(unsupported("trak", other)),
            }
            Ok(())
        })?;
        Ok(trak)
    }

    pub fn track_id(&self) -> Option<u32> {
        self.tkhd.as_ref().map(|t| t.track_id)
    }

    /// Media timescale from mdhd.
    pub fn timescale(&self) -> Option<u32> {
        self.mdia.as_ref()?.mdhd.as_ref().map(|m| m.timescale)
    }
}

/// `mehd` — movie extends header (whole-movie fragment duration).
#[derive(Debug, Clone, Copy)]
pub struct Mehd {
    pub fragment_duration: u64,
}

impl Mehd {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let fragment_duration = if full.version != 0 {
            r.read_u64()?
        } else {
            u64::from(r.read_u32()?)
        };
        Ok(Self { fragment_duration })
    }
}

/// `trex` — per-track defaults for movie fragments.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Trex {
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

impl Trex {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let _full = FullBoxHeader::read(&mut r)?;
        Ok(Self {
            track_id: r.read_u32()?,
            default_sample_description_index: r.read_u32()?,
            default_sample_duration: r.read_u32()?,
            default_sample_size: r.read_u32()?,
            default_sample_flags: r.read_u32()?,
        })
    }
}

/// `mvex` — movie extends container.
#[derive(Debug, Clone, Default)]
pub struct Mvex {
    pub mehd: Option<Mehd>,
    pub trex: Vec<Trex>,
}

impl Mvex {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut mvex = Self::default();
        walk_children("mvex", payload, |header, body| {
            match header.box_type {
                BoxType::MEHD => mvex.mehd = Some(Mehd::parse(body)?),
                BoxType::TREX => mvex.trex.push(Trex::parse(body)?),
                other => return Err(unsupported("mvex", other)),
            }
            Ok(())
        })?;
        Ok(mvex)
    }

    /// Defaults for a given track, if declared.
    pub fn trex_for(&self, track_id: u32) -> Option<&Trex> {
        self.trex.iter().find(|t| t.track_id == track_id)
    }
}

/// `pssh` — protection system specific header.
#[derive(Debug, Clone)]
pub struct Pssh {
    pub system_id: [u8; 16],
    pub data: Bytes,
}

impl Pssh {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let full = FullBoxHeader::read(&mut r)?;
        let system_id = r.read_array()?;
        if full.version > 0 {
            let kid_count = r.read_u32()?;
            r.skip((kid_count as usize).saturating_mul(16))?;
        }
        let data_size = r.read_u32()? as usize;
        let data = Bytes::copy_from_slice(r.take(data_size)?);
        Ok(Self { system_id, data })
    }
}

/// `moov` — movie container: the initialization segment's metadata root.
#[derive(Debug, Clone, Default)]
pub struct Moov {
    pub mvhd: Option<Mvhd>,
    pub mvex: Option<Mvex>,
    pub traks: Vec<Trak>,
    pub pssh: Vec<Pssh>,
}

impl Moov {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut moov = Self::default();
        walk_children("moov", payload, |header, body| {
            match &header.box_type.0 {
                b"mvhd" => moov.mvhd = Some(Mvhd::parse(body)?),
                b"mvex" => moov.mvex = Some(Mvex::parse(body)?),
                b"trak" => moov.traks.push(Trak::parse(body)?),
                b"pssh" => moov.pssh.push(Pssh::parse(body)?),
                b"ipmc" | b"udta" | b"meta" => {} // opaque to playback
                _ => return Err(unsupported("moov", header.box_type)),
            }
            Ok(())
        })?;
        Ok(moov)
    }

    /// Find a track by its tkhd track id.
    pub fn track_by_id(&self, track_id: u32) -> Option<&Trak> {
        self.traks.iter().find(|t| t.track_id() == Some(track_id))
    }

    /// trex defaults for a track, if an mvex declares them.
    pub fn trex_for(&self, track_id: u32) -> Option<&Trex> {
        self.mvex.as_ref()?.trex_for(track_id)
    }

    /// Movie timescale from mvhd.
    pub fn timescale(&self) -> Option<u32> {
        self.mvhd.as_ref().map(|m| m.timescale)
    }

    /// Whole-movie duration: mehd fragment duration when present, else
    /// the mvhd duration when non-zero.
    pub fn duration(&self) -> Option<u64> {
        if let Some(mehd) = self.mvex.as_ref().and_then(|m| m.mehd.as_ref()) {
            if mehd.fragment_duration > 0 {
                return Some(mehd.fragment_duration);
            }
        }
        self.mvhd.as_ref().map(|m| m.duration).filter(|&d| d > 0)
    }
}

/// `mfro` — movie fragment random access offset.
#[derive(Debug, Clone, Copy)]
pub struct Mfro {
    pub parent_size: u32,
}

/// `mfra` — movie fragment random access container.
#[derive(Debug, Clone, Default)]
pub struct Mfra {
    pub mfro: Option<Mfro>,
}

impl Mfra {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut mfra = Self::default();
        walk_children("mfra", payload, |header, body| {
            match &header.box_type.0 {
                b"mfro" => {
                    let mut r = ByteReader::new(body);
                    let _full = FullBoxHeader::read(&mut r)?;
                    mfra.mfro = Some(Mfro {
                        parent_size: r.read_u32()?,
                    });
                }
                b"tfra" => {}
                _ => return Err(unsupported("mfra", header.box_type)),
            }
            Ok(())
        })?;
        Ok(mfra)
    }
}

/// `meta` — metadata container (a full box, unlike the other containers).
#[derive(Debug, Clone, Default)]
pub struct Meta {
    pub hdlr: Option<Hdlr>,
    pub primary_item_id: Option<u16>,
}

impl Meta {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let _full = FullBoxHeader::read(&mut r)?;
        let children = r.take(r.remaining())?;
        let mut meta = Self::default();
        walk_children("meta", children, |header, body| {
            match &header.box_type.0 {
                b"hdlr" => meta.hdlr = Some(Hdlr::parse(body)?),
                b"pitm" => {
                    let mut r = ByteReader::new(body);
                    let _full = FullBoxHeader::read(&mut r)?;
                    meta.primary_item_id = Some(r.read_u16()?);
                }
                b"dinf" | b"iloc" | b"ipro" => {}
                _ => return Err(unsupported("meta", header.box_type)),
            }
            Ok(())
        })?;
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bytes::{BufMut, BytesMut};

    fn boxed(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32((8 + payload.len()) as u32);
        buf.put_slice(box_type);
        buf.put_slice(payload);
        buf.to_vec()
    }

    fn full_boxed(box_type: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(payload.len() + 4);
        body.push(version);
        body.extend_from_slice(&flags.to_be_bytes()[1..]);
        body.extend_from_slice(payload);
        boxed(box_type, &body)
    }

    #[test]
    fn test_box_header_largesize() {
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_slice(b"mdat");
        buf.put_u64(24); // 16-byte header + 8 payload bytes
        buf.put_slice(&[0u8; 8]);
        let mut r = ByteReader::new(&buf);
        let header = BoxHeader::read(&mut r).unwrap();
        assert_eq!(header.box_type, BoxType::MDAT);
        assert_eq!(header.size, 24);
        assert_eq!(header.header_size, 16);
        assert_eq!(header.payload_size(), 8);
    }

    #[test]
    fn test_box_header_smaller_than_header_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(4);
        buf.put_slice(b"free");
        let mut r = ByteReader::new(&buf);
        assert_matches!(
            BoxHeader::read(&mut r),
            Err(crate::Error::InvalidBoxSize { size: 4, .. })
        );
    }

    #[test]
    fn test_ftyp_compatible_brands() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"isom");
        payload.extend_from_slice(&0x200u32.to_be_bytes());
        payload.extend_from_slice(b"iso5");
        payload.extend_from_slice(b"dash");
        let ftyp = Ftyp::parse(&payload).unwrap();
        assert_eq!(ftyp.major_brand, BoxType(*b"isom"));
        assert_eq!(ftyp.minor_version, 0x200);
        assert_eq!(
            ftyp.compatible_brands,
            vec![BoxType(*b"iso5"), BoxType(*b"dash")]
        );
    }

    #[test]
    fn test_mvhd_version0() {
        let mut p = Vec::new();
        p.extend_from_slice(&[0u8; 8]); // times
        p.extend_from_slice(&1000u32.to_be_bytes());
        p.extend_from_slice(&60_000u32.to_be_bytes());
        p.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate
        p.extend_from_slice(&0x0100u16.to_be_bytes()); // volume
        p.extend_from_slice(&[0u8; 2 + 4 + 4 + 36 + 24]);
        p.extend_from_slice(&3u32.to_be_bytes()); // next track id
        let body = full_boxed(b"mvhd", 0, 0, &p);
        let mvhd = Mvhd::parse(&body[8..]).unwrap();
        assert_eq!(mvhd.timescale, 1000);
        assert_eq!(mvhd.duration, 60_000);
        assert_eq!(mvhd.next_track_id, 3);
    }

    #[test]
    fn test_mdhd_language_unpack() {
        let mut p = Vec::new();
        p.extend_from_slice(&[0u8; 8]);
        p.extend_from_slice(&90_000u32.to_be_bytes());
        p.extend_from_slice(&0u32.to_be_bytes());
        // "und" packed: (21)(14)(4) in 5-bit letters
        let packed: u16 = (21 << 10) | (14 << 5) | 4;
        p.extend_from_slice(&packed.to_be_bytes());
        p.extend_from_slice(&0u16.to_be_bytes());
        let body = full_boxed(b"mdhd", 0, 0, &p);
        let mdhd = Mdhd::parse(&body[8..]).unwrap();
        assert_eq!(mdhd.timescale, 90_000);
        assert_eq!(mdhd.language, [21, 14, 4]);
    }

    #[test]
    fn test_mvex_with_trex_and_mehd() {
        let mut trex_payload = Vec::new();
        for v in [1u32, 1, 1000, 188, 0x0101_0000] {
            trex_payload.extend_from_slice(&v.to_be_bytes());
        }
        let mut mehd_payload = Vec::new();
        mehd_payload.extend_from_slice(&120_000u32.to_be_bytes());
        let mut payload = full_boxed(b"mehd", 0, 0, &mehd_payload);
        payload.extend_from_slice(&full_boxed(b"trex", 0, 0, &trex_payload));
        let mvex = Mvex::parse(&payload).unwrap();
        assert_eq!(mvex.mehd.unwrap().fragment_duration, 120_000);
        let trex = mvex.trex_for(1).unwrap();
        assert_eq!(trex.default_sample_duration, 1000);
        assert_eq!(trex.default_sample_size, 188);
        assert!(mvex.trex_for(2).is_none());
    }

    #[test]
    fn test_container_rejects_unknown_child_but_skips_uuid() {
        // uuid child inside mvex: fine
        let uuid = boxed(b"uuid", &[0xab; 20]);
        assert!(Mvex::parse(&uuid).is_ok());

        // unknown child inside mvex: hard failure
        let junk = boxed(b"zzzz", &[0; 4]);
        assert_matches!(
            Mvex::parse(&junk),
            Err(crate::Error::UnsupportedBox { .. })
        );
    }

    #[test]
    fn test_container_size_mismatch() {
        // child declares 100 bytes but container only has 16
        let mut payload = Vec::new();
        payload.extend_from_slice(&100u32.to_be_bytes());
        payload.extend_from_slice(b"trex");
        payload.extend_from_slice(&[0u8; 8]);
        assert_matches!(
            Mvex::parse(&payload),
            Err(crate::Error::SizeMismatch {
                container: "mvex",
                ..
            })
        );
    }

    #[test]
    fn test_pssh_v0() {
        let mut p = Vec::new();
        p.extend_from_slice(&[0x11u8; 16]);
        p.extend_from_slice(&4u32.to_be_bytes());
        p.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let body = full_boxed(b"pssh", 0, 0, &p);
        let pssh = Pssh::parse(&body[8..]).unwrap();
        assert_eq!(pssh.system_id, [0x11; 16]);
        assert_eq!(&pssh.data[..], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_pssh_truncated_data_is_out_of_bounds() {
        let mut p = Vec::new();
        p.extend_from_slice(&[0u8; 16]);
        p.extend_from_slice(&100u32.to_be_bytes()); // claims 100 bytes
        p.extend_from_slice(&[1, 2, 3]);
        let body = full_boxed(b"pssh", 0, 0, &p);
        assert_matches!(
            Pssh::parse(&body[8..]),
            Err(crate::Error::OutOfBounds { .. })
        );
    }

    #[test]
    fn test_stsd_visual_entry_with_codec_data() {
        let mut entry_body = vec![0u8; 6]; // reserved
        entry_body.extend_from_slice(&1u16.to_be_bytes()); // data ref index
        entry_body.extend_from_slice(&[0u8; 2 + 2 + 12]);
        entry_body.extend_from_slice(&640u16.to_be_bytes());
        entry_body.extend_from_slice(&480u16.to_be_bytes());
        entry_body.extend_from_slice(&[0u8; 4 + 4 + 4 + 2 + 32 + 2 + 2]);
        entry_body.extend_from_slice(&boxed(b"avcC", &[1, 2, 3]));
        let avc1 = boxed(b"avc1", &entry_body);

        let mut payload = vec![0u8; 4]; // version + flags
        payload.extend_from_slice(&1u32.to_be_bytes()); // entry count
        payload.extend_from_slice(&avc1);
        let stsd = Stsd::parse(BoxType::VIDE, &payload).unwrap();
        let entry = &stsd.entries[0];
        assert_eq!(entry.format, BoxType(*b"avc1"));
        assert_matches!(
            entry.kind,
            SampleEntryKind::Visual {
                width: 640,
                height: 480
            }
        );
        assert_eq!(entry.codec_data.as_deref(), Some(&[1u8, 2, 3][..]));
        assert!(entry.protection.is_none());
    }

    #[test]
    fn test_minf_sound_header_and_stbl() {
        let mut stsz_body = Vec::new();
        stsz_body.extend_from_slice(&4u32.to_be_bytes()); // uniform size
        stsz_body.extend_from_slice(&3u32.to_be_bytes());
        let mut payload = full_boxed(b"smhd", 0, 0, &[0x00, 0x10, 0, 0]);
        payload.extend_from_slice(&boxed(b"stbl", &full_boxed(b"stsz", 0, 0, &stsz_body)));

        let minf = Minf::parse(BoxType::SOUN, &payload).unwrap();
        assert_matches!(minf.media_header, Some(MediaHeader::Sound { balance: 0x10 }));
        let stsz = minf.stbl.unwrap().stsz.unwrap();
        assert_eq!(stsz.default_size, 4);
        assert_eq!(stsz.sample_count, 3);
        assert!(stsz.sizes.is_empty());
    }

    #[test]
    fn test_mdia_parses_minf_with_handler_from_hdlr() {
        let mut mdhd_body = Vec::new();
        mdhd_body.extend_from_slice(&[0u8; 8]);
        mdhd_body.extend_from_slice(&48_000u32.to_be_bytes());
        mdhd_body.extend_from_slice(&0u32.to_be_bytes());
        mdhd_body.extend_from_slice(&[0u8; 4]);

        let mut hdlr_body = vec![0u8; 4];
        hdlr_body.extend_from_slice(b"soun");
        hdlr_body.extend_from_slice(&[0u8; 12]);
        hdlr_body.extend_from_slice(b"SoundHandler\0");

        // hdlr precedes minf; the minf decode must pick up the handler
        let mut payload = full_boxed(b"mdhd", 0, 0, &mdhd_body);
        payload.extend_from_slice(&full_boxed(b"hdlr", 0, 0, &hdlr_body));
        payload.extend_from_slice(&boxed(
            b"minf",
            &full_boxed(b"smhd", 0, 0, &[0x00, 0x20, 0, 0]),
        ));

        let mdia = Mdia::parse(&payload).unwrap();
        assert_eq!(mdia.handler_type(), Some(BoxType::SOUN));
        assert_eq!(mdia.mdhd.as_ref().unwrap().timescale, 48_000);
        assert_matches!(
            mdia.minf.unwrap().media_header,
            Some(MediaHeader::Sound { balance: 0x20 })
        );
    }

    #[test]
    fn test_edts_elst_v0() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_be_bytes()); // entry count
        body.extend_from_slice(&5000u32.to_be_bytes());
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&1i16.to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes());
        let payload = full_boxed(b"elst", 0, 0, &body);
        let edts = Edts::parse(&payload).unwrap();
        let entry = edts.elst.unwrap().entries[0];
        assert_eq!(entry.segment_duration, 5000);
        assert_eq!(entry.media_time, -1);
        assert_eq!(entry.media_rate_integer, 1);
    }

    #[test]
    fn test_meta_pitm_and_skips() {
        let mut payload = vec![0u8; 4]; // version + flags
        payload.extend_from_slice(&full_boxed(b"pitm", 0, 0, &1u16.to_be_bytes()));
        payload.extend_from_slice(&boxed(b"iloc", &[0u8; 6]));
        let meta = Meta::parse(&payload).unwrap();
        assert_eq!(meta.primary_item_id, Some(1));
        assert!(meta.hdlr.is_none());
    }

    #[test]
    fn test_mfra_mfro_and_tfra_skip() {
        let mut payload = full_boxed(b"mfro", 0, 0, &32u32.to_be_bytes());
        payload.extend_from_slice(&boxed(b"tfra", &[0u8; 12]));
        let mfra = Mfra::parse(&payload).unwrap();
        assert_eq!(mfra.mfro.unwrap().parent_size, 32);
    }

    #[test]
    fn test_tenc_parse() {
        let mut p = Vec::new();
        p.extend_from_slice(&[0, 0, 1]); // default_is_encrypted
        p.push(8); // iv size
        p.extend_from_slice(&[0x22; 16]);
        let body = full_boxed(b"tenc", 0, 0, &p);
        let tenc = Tenc::parse(&body[8..]).unwrap();
        assert!(tenc.default_is_encrypted);
        assert_eq!(tenc.default_iv_size, 8);
        assert_eq!(tenc.default_kid, [0x22; 16]);
    }
}
