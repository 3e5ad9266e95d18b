//! DRM metadata extraction.
//!
//! Read-only surfacing of `pssh` payloads and `tenc` track-encryption
//! defaults from an already-decoded box tree. Key exchange belongs to
//! the caller's DRM collaborator; nothing here blocks or talks to it.

use bytes::Bytes;

use crate::mp4::boxes::{Moov, Pssh, Tenc, Trak};
use crate::mp4::fragment::Moof;

/// One protection system's initialization blob from a `pssh` box.
#[derive(Debug, Clone)]
pub struct DrmInitData {
    pub system_id: [u8; 16],
    pub data: Bytes,
}

impl From<&Pssh> for DrmInitData {
    fn from(pssh: &Pssh) -> Self {
        Self {
            system_id: pssh.system_id,
            data: pssh.data.clone(),
        }
    }
}

/// Per-track encryption defaults from the `sinf → schi → tenc` chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackEncryption {
    pub default_is_encrypted: bool,
    pub default_iv_size: u8,
    pub default_kid: [u8; 16],
}

impl From<Tenc> for TrackEncryption {
    fn from(tenc: Tenc) -> Self {
        Self {
            default_is_encrypted: tenc.default_is_encrypted,
            default_iv_size: tenc.default_iv_size,
            default_kid: tenc.default_kid,
        }
    }
}

/// All pssh blobs carried by a moov.
pub fn drm_init_data(moov: &Moov) -> Vec<DrmInitData> {
    moov.pssh.iter().map(DrmInitData::from).collect()
}

/// All pssh blobs carried by a moof.
pub fn drm_init_data_moof(moof: &Moof) -> Vec<DrmInitData> {
    moof.pssh.iter().map(DrmInitData::from).collect()
}

/// Encryption defaults for a track, from the first sample entry whose
/// protection chain carries a tenc.
pub fn track_encryption(trak: &Trak) -> Option<TrackEncryption> {
    let stsd = trak.mdia.as_ref()?.minf.as_ref()?.stbl.as_ref()?.stsd.as_ref()?;
    stsd.entries
        .iter()
        .filter_map(|entry| entry.protection.as_ref())
        .find_map(|sinf| sinf.tenc)
        .map(TrackEncryption::from)
}
