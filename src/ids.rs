//! Spotify identifiers: canonical uris, base62 ids and hex gids.
//!
//! Every collection entity has three interchangeable forms:
//!   uri:  `spotify:track:6rqhFgbbKwnb9MLmUQDhG6`
//!   id:   `d1a7ec2b...` (32 lower-case hex chars, the 128-bit gid)
//!   gid:  16 raw bytes, as carried by metadata records and push events
//!
//! Typed mirror tables are keyed by the hex id, so the same remote entity
//! always lands on the same row no matter which form it arrived in.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

const BASE62: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const BASE62_LEN: usize = 22;
const GID_LEN: usize = 16;

/// Kind of a collection entity, taken from the uri's type segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Track,
    Album,
    Artist,
    Show,
    Episode,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Show => "show",
            Self::Episode => "episode",
        }
    }

    /// Kind named by the type segment of `uri`, if it is one we mirror.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri.split(':').nth(1)? {
            "track" => Some(Self::Track),
            "album" => Some(Self::Album),
            "artist" => Some(Self::Artist),
            "show" => Some(Self::Show),
            "episode" => Some(Self::Episode),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a uri for removal bookkeeping.
///
/// An unknown type segment is an error: dropping a removal we cannot route
/// would leave a stale row behind forever.
pub fn classify(uri: &str) -> Result<EntityKind> {
    EntityKind::from_uri(uri).ok_or_else(|| SyncError::UnsupportedEntityKind(uri.to_string()))
}

/// A decoded entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpotifyId {
    pub kind: EntityKind,
    pub gid: u128,
}

impl SpotifyId {
    pub fn from_uri(uri: &str) -> Result<Self> {
        let mut parts = uri.split(':');
        let (Some("spotify"), Some(_), Some(b62), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SyncError::InvalidId(uri.to_string()));
        };
        let kind = classify(uri)?;
        let gid = decode_base62(b62).ok_or_else(|| SyncError::InvalidId(uri.to_string()))?;
        Ok(Self { kind, gid })
    }

    /// Decode raw gid bytes (big-endian, 16 bytes).
    pub fn from_gid(kind: EntityKind, gid: &[u8]) -> Result<Self> {
        let bytes: [u8; GID_LEN] = gid
            .try_into()
            .map_err(|_| SyncError::InvalidId(hex::encode(gid)))?;
        Ok(Self {
            kind,
            gid: u128::from_be_bytes(bytes),
        })
    }

    pub fn hex_id(&self) -> String {
        hex::encode(self.gid.to_be_bytes())
    }

    pub fn base62(&self) -> String {
        let mut out = [b'0'; BASE62_LEN];
        let mut n = self.gid;
        for slot in out.iter_mut().rev() {
            *slot = BASE62[(n % 62) as usize];
            n /= 62;
        }
        out.iter().map(|&b| b as char).collect()
    }

    pub fn to_uri(&self) -> String {
        format!("spotify:{}:{}", self.kind, self.base62())
    }
}

fn decode_base62(s: &str) -> Option<u128> {
    if s.len() != BASE62_LEN {
        return None;
    }
    s.bytes().try_fold(0u128, |acc, c| {
        let digit = BASE62.iter().position(|&b| b == c)? as u128;
        acc.checked_mul(62)?.checked_add(digit)
    })
}

/// Stable table key for a uri of a known kind.
pub fn uri_to_id(uri: &str) -> Result<String> {
    Ok(SpotifyId::from_uri(uri)?.hex_id())
}

/// Canonical uri for raw gid bytes of the given kind.
pub fn gid_to_uri(kind: EntityKind, gid: &[u8]) -> Result<String> {
    Ok(SpotifyId::from_gid(kind, gid)?.to_uri())
}
