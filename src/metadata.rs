//! Metadata records returned by the remote resolver.
//!
//! The resolver batches heterogeneous ids in one call and returns records
//! keyed by uri. Records are best-effort: any field may be missing, and ids
//! the resolver could not service are simply absent from the batch.

use std::collections::HashMap;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::api::wire::base64_bytes;
use crate::ids::{self, EntityKind};

/// What the resolver should return for an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionKind {
    TrackV4,
    AlbumV4,
    ArtistV4,
    ShowV4,
    EpisodeV4,
    TrackDescriptor,
    UnknownExtension,
}

impl ExtensionKind {
    /// Metadata hint for a uri. Unknown types get a hint the resolver will
    /// not service, so the entry is skipped instead of failing the batch.
    pub fn for_uri(uri: &str) -> Self {
        match EntityKind::from_uri(uri) {
            Some(EntityKind::Track) => Self::TrackV4,
            Some(EntityKind::Album) => Self::AlbumV4,
            Some(EntityKind::Artist) => Self::ArtistV4,
            Some(EntityKind::Show) => Self::ShowV4,
            Some(EntityKind::Episode) => Self::EpisodeV4,
            None => Self::UnknownExtension,
        }
    }
}

/// One resolver query: an id plus the extensions wanted for it.
pub type MetadataQuery = (String, Vec<ExtensionKind>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageSize {
    Default,
    Small,
    Large,
    Xlarge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(with = "base64_bytes")]
    pub file_id: Vec<u8>,
    pub size: ImageSize,
}

/// Hex image id of the default-size variant, or empty when there is none.
pub fn default_image_id(images: &[Image]) -> String {
    images
        .iter()
        .find(|img| img.size == ImageSize::Default)
        .map(|img| hex::encode(&img.file_id))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistRef {
    #[serde(with = "base64_bytes")]
    pub gid: Vec<u8>,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbumRef {
    #[serde(with = "base64_bytes")]
    pub gid: Vec<u8>,
    pub name: String,
    pub cover_group: Vec<Image>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowRef {
    #[serde(with = "base64_bytes")]
    pub gid: Vec<u8>,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackMetadata {
    #[serde(with = "base64_bytes")]
    pub gid: Vec<u8>,
    pub name: String,
    pub album: AlbumRef,
    pub artists: Vec<ArtistRef>,
    pub has_lyrics: bool,
    pub explicit: bool,
    pub duration: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbumMetadata {
    #[serde(with = "base64_bytes")]
    pub gid: Vec<u8>,
    pub name: String,
    pub artists: Vec<ArtistRef>,
    pub cover_group: Vec<Image>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistMetadata {
    #[serde(with = "base64_bytes")]
    pub gid: Vec<u8>,
    pub name: String,
    pub portrait_group: Vec<Image>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowMetadata {
    #[serde(with = "base64_bytes")]
    pub gid: Vec<u8>,
    pub name: String,
    pub publisher: String,
    pub cover_image: Vec<Image>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeMetadata {
    #[serde(with = "base64_bytes")]
    pub gid: Vec<u8>,
    pub name: String,
    pub description: String,
    pub show: ShowRef,
    pub cover_image: Vec<Image>,
}

/// Resolver response, every map keyed by uri.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataBatch {
    pub tracks: HashMap<String, TrackMetadata>,
    pub albums: HashMap<String, AlbumMetadata>,
    pub artists: HashMap<String, ArtistMetadata>,
    pub shows: HashMap<String, ShowMetadata>,
    pub episodes: HashMap<String, EpisodeMetadata>,
    pub descriptors: HashMap<String, Vec<String>>,
}

impl AddAssign for MetadataBatch {
    fn add_assign(&mut self, other: Self) {
        self.tracks.extend(other.tracks);
        self.albums.extend(other.albums);
        self.artists.extend(other.artists);
        self.shows.extend(other.shows);
        self.episodes.extend(other.episodes);
        self.descriptors.extend(other.descriptors);
    }
}

/// `artistUri=name` pairs joined by `|`. Artists without a usable gid are left out.
pub fn raw_artists_data(artists: &[ArtistRef]) -> String {
    artists
        .iter()
        .filter_map(|artist| {
            ids::gid_to_uri(EntityKind::Artist, &artist.gid)
                .ok()
                .map(|uri| format!("{}={}", uri, artist.name))
        })
        .collect::<Vec<_>>()
        .join("|")
}
