//! Turning fetched adds and removes into mirror rows.
//!
//! A merge resolves metadata for every added uri, builds rows from whatever
//! came back and commits rows plus removals as one transaction. Records the
//! resolver could not produce, or whose gid is missing or malformed, are
//! skipped; the next scan that sees them again retries.

use std::collections::{BTreeMap, HashMap};

use futures_util::future::try_join_all;

use super::CollectionSync;
use crate::api::wire::PlaylistMeta;
use crate::error::Result;
use crate::ids::{self, EntityKind, SpotifyId};
use crate::metadata::{
    default_image_id, raw_artists_data, ExtensionKind, MetadataBatch, MetadataQuery,
};
use crate::model::{
    CollectionAlbum, CollectionArtist, CollectionEpisode, CollectionPinnedItem, CollectionShow,
    CollectionTrack, MirrorChanges,
};

/// Where the display fields of a pinned uri come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRoute {
    /// Single-playlist lookup
    Playlist,
    /// Collection pseudo-uri (liked songs, episodes); no display fields
    Collection,
    /// Generic metadata resolver (albums, artists, shows)
    Entity,
}

impl PinRoute {
    pub fn of(uri: &str) -> Self {
        if uri.contains("playlist") {
            Self::Playlist
        } else if uri.contains("collection") {
            Self::Collection
        } else {
            Self::Entity
        }
    }
}

fn queries_for<'a>(uris: impl IntoIterator<Item = &'a String>) -> Vec<MetadataQuery> {
    uris.into_iter()
        .map(|uri| (uri.clone(), vec![ExtensionKind::for_uri(uri)]))
        .collect()
}

/// Rebuild the uri of a resolved record and look up when it was added.
///
/// None when the gid is empty or malformed, or when the uri was never
/// requested.
fn requested(
    to_add: &HashMap<String, i64>,
    kind: EntityKind,
    gid: &[u8],
) -> Option<(SpotifyId, i64)> {
    if gid.is_empty() {
        tracing::debug!("Skipping {} record without gid", kind);
        return None;
    }
    let id = match SpotifyId::from_gid(kind, gid) {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!("Skipping {} record: {}", kind, e);
            return None;
        }
    };
    match to_add.get(&id.to_uri()) {
        Some(&added_at) => Some((id, added_at)),
        None => {
            tracing::debug!("Skipping {} {}: not part of this batch", kind, id.to_uri());
            None
        }
    }
}

fn hex_or_empty(kind: EntityKind, gid: &[u8]) -> String {
    SpotifyId::from_gid(kind, gid)
        .map(|id| id.hex_id())
        .unwrap_or_default()
}

/// Rows for every resolved record of a batch.
fn collection_changes(metadata: &MetadataBatch, to_add: &HashMap<String, i64>) -> MirrorChanges {
    let mut changes = MirrorChanges::default();

    for track in metadata.tracks.values() {
        let Some((id, added_at)) = requested(to_add, EntityKind::Track, &track.gid) else {
            continue;
        };
        let uri = id.to_uri();
        let main_artist = track.artists.first();
        changes.tracks.push(CollectionTrack {
            id: id.hex_id(),
            name: track.name.clone(),
            album_id: hex_or_empty(EntityKind::Album, &track.album.gid),
            album_name: track.album.name.clone(),
            main_artist_name: main_artist.map(|a| a.name.clone()).unwrap_or_default(),
            main_artist_id: main_artist
                .map(|a| hex_or_empty(EntityKind::Artist, &a.gid))
                .unwrap_or_default(),
            raw_artists_data: raw_artists_data(&track.artists),
            has_lyrics: track.has_lyrics,
            is_explicit: track.explicit,
            duration_ms: track.duration,
            picture: default_image_id(&track.album.cover_group),
            descriptors: metadata
                .descriptors
                .get(&uri)
                .map(|tags| tags.join("|"))
                .unwrap_or_default(),
            added_at,
            uri,
        });
    }

    for album in metadata.albums.values() {
        let Some((id, added_at)) = requested(to_add, EntityKind::Album, &album.gid) else {
            continue;
        };
        changes.albums.push(CollectionAlbum {
            id: id.hex_id(),
            uri: id.to_uri(),
            raw_artists_data: raw_artists_data(&album.artists),
            name: album.name.clone(),
            picture: default_image_id(&album.cover_group),
            added_at,
        });
    }

    for artist in metadata.artists.values() {
        let Some((id, added_at)) = requested(to_add, EntityKind::Artist, &artist.gid) else {
            continue;
        };
        changes.artists.push(CollectionArtist {
            id: id.hex_id(),
            uri: id.to_uri(),
            name: artist.name.clone(),
            picture: default_image_id(&artist.portrait_group),
            added_at,
        });
    }

    for show in metadata.shows.values() {
        let Some((id, added_at)) = requested(to_add, EntityKind::Show, &show.gid) else {
            continue;
        };
        changes.shows.push(CollectionShow {
            id: id.hex_id(),
            uri: id.to_uri(),
            name: show.name.clone(),
            publisher: show.publisher.clone(),
            picture: default_image_id(&show.cover_image),
            added_at,
        });
    }

    for episode in metadata.episodes.values() {
        let Some((id, added_at)) = requested(to_add, EntityKind::Episode, &episode.gid) else {
            continue;
        };
        changes.episodes.push(CollectionEpisode {
            id: id.hex_id(),
            uri: id.to_uri(),
            name: episode.name.clone(),
            description: episode.description.clone(),
            show_uri: ids::gid_to_uri(EntityKind::Show, &episode.show.gid).unwrap_or_default(),
            show_name: episode.show.name.clone(),
            picture: default_image_id(&episode.cover_image),
            added_at,
        });
    }

    changes
}

/// Pins for resolved albums, artists and shows.
fn entity_pins(metadata: &MetadataBatch, to_add: &HashMap<String, i64>) -> Vec<CollectionPinnedItem> {
    let mut pins = Vec::new();

    for album in metadata.albums.values() {
        if let Some((id, added_at)) = requested(to_add, EntityKind::Album, &album.gid) {
            pins.push(CollectionPinnedItem {
                uri: id.to_uri(),
                name: album.name.clone(),
                subtitle: album
                    .artists
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                picture: default_image_id(&album.cover_group),
                added_at,
            });
        }
    }
    for artist in metadata.artists.values() {
        if let Some((id, added_at)) = requested(to_add, EntityKind::Artist, &artist.gid) {
            pins.push(CollectionPinnedItem {
                uri: id.to_uri(),
                name: artist.name.clone(),
                subtitle: String::new(),
                picture: default_image_id(&artist.portrait_group),
                added_at,
            });
        }
    }
    for show in metadata.shows.values() {
        if let Some((id, added_at)) = requested(to_add, EntityKind::Show, &show.gid) {
            pins.push(CollectionPinnedItem {
                uri: id.to_uri(),
                name: show.name.clone(),
                subtitle: show.publisher.clone(),
                picture: default_image_id(&show.cover_image),
                added_at,
            });
        }
    }

    pins
}

fn playlist_pin(uri: &str, meta: PlaylistMeta, added_at: i64) -> CollectionPinnedItem {
    CollectionPinnedItem {
        uri: uri.to_string(),
        name: meta.attributes.name,
        subtitle: meta.owner_username,
        picture: hex::encode(&meta.attributes.picture),
        added_at,
    }
}

fn collection_pin(uri: &str, added_at: i64) -> CollectionPinnedItem {
    CollectionPinnedItem {
        uri: uri.to_string(),
        name: String::new(),
        subtitle: String::new(),
        picture: String::new(),
        added_at,
    }
}

impl CollectionSync {
    /// Descriptor tags for the track uris of a batch. Failure only costs
    /// the tags, never the merge.
    async fn resolve_descriptors(&self, to_add: &HashMap<String, i64>) -> MetadataBatch {
        let queries: Vec<MetadataQuery> = to_add
            .keys()
            .filter(|uri| EntityKind::from_uri(uri) == Some(EntityKind::Track))
            .map(|uri| (uri.clone(), vec![ExtensionKind::TrackDescriptor]))
            .collect();
        if queries.is_empty() {
            return MetadataBatch::default();
        }
        match self.apis.metadata.request(queries).await {
            Ok(batch) => MetadataBatch {
                descriptors: batch.descriptors,
                ..MetadataBatch::default()
            },
            Err(e) => {
                tracing::warn!("Track descriptors unavailable, storing without: {}", e);
                MetadataBatch::default()
            }
        }
    }

    /// Resolve `to_add`, build rows and commit them with `to_remove` in one
    /// transaction. Returns what was written.
    pub async fn merge_collection(
        &self,
        to_add: &HashMap<String, i64>,
        to_remove: &BTreeMap<EntityKind, Vec<String>>,
    ) -> Result<MirrorChanges> {
        let mut changes = if to_add.is_empty() {
            MirrorChanges::default()
        } else {
            let mut metadata = self.apis.metadata.request(queries_for(to_add.keys())).await?;
            metadata += self.resolve_descriptors(to_add).await;
            collection_changes(&metadata, to_add)
        };

        for (kind, uris) in to_remove {
            if !uris.is_empty() {
                changes
                    .removed
                    .entry(*kind)
                    .or_default()
                    .extend(uris.iter().cloned());
            }
        }

        if !changes.is_empty() {
            self.store.apply(&changes).await?;
        }
        tracing::debug!(
            "Merged {} upsert(s), {} delete(s) of {} requested",
            changes.upsert_count(),
            changes.delete_count(),
            to_add.len()
        );
        Ok(changes)
    }

    /// Merge pinned items. Playlists go through the playlist service,
    /// collection pseudo-uris get empty display fields, everything else
    /// goes through the metadata resolver.
    pub async fn merge_pins(
        &self,
        to_add: &HashMap<String, i64>,
        to_remove: &[String],
    ) -> Result<MirrorChanges> {
        let mut changes = MirrorChanges::default();
        let mut entities = Vec::new();
        let mut playlists = Vec::new();

        for (uri, &added_at) in to_add {
            match PinRoute::of(uri) {
                PinRoute::Playlist => playlists.push((uri.as_str(), added_at)),
                PinRoute::Collection => changes.pins.push(collection_pin(uri, added_at)),
                PinRoute::Entity => entities.push(uri),
            }
        }

        if !entities.is_empty() {
            let metadata = self.apis.metadata.request(queries_for(entities)).await?;
            changes.pins.extend(entity_pins(&metadata, to_add));
        }

        let lookups = playlists.into_iter().map(|(uri, added_at)| async move {
            match self.apis.playlists.playlist(uri).await {
                Ok(meta) => Ok(Some(playlist_pin(uri, meta, added_at))),
                Err(e) if e.is_transport() => Err(e),
                Err(e) => {
                    tracing::warn!("Skipping pinned playlist {}: {}", uri, e);
                    Ok(None)
                }
            }
        });
        changes
            .pins
            .extend(try_join_all(lookups).await?.into_iter().flatten());

        changes.removed_pins = to_remove.to_vec();

        if !changes.is_empty() {
            self.store.apply(&changes).await?;
        }
        Ok(changes)
    }
}
