//! Local mirror rows and the transient values that flow through a scan.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EntityKind;

/// Collection set holding saved tracks, albums, shows and episodes.
pub const SET_COLLECTION: &str = "collection";
/// Collection set holding pinned shortcuts.
pub const SET_PINS: &str = "ylpin";
/// Pseudo-set for the user's ordered playlist root list.
pub const SET_ROOTLIST: &str = "rootlist";

/// Last-seen sync token (or rootlist revision) of one collection set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub set: String,
    pub token: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionTrack {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub album_id: String,
    pub album_name: String,
    pub main_artist_name: String,
    pub main_artist_id: String,
    /// `artistUri=name` pairs joined by `|`
    pub raw_artists_data: String,
    pub has_lyrics: bool,
    pub is_explicit: bool,
    pub duration_ms: i32,
    pub picture: String,
    /// Descriptor tags joined by `|`
    pub descriptors: String,
    pub added_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionAlbum {
    pub id: String,
    pub uri: String,
    pub raw_artists_data: String,
    pub name: String,
    pub picture: String,
    pub added_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionArtist {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub picture: String,
    pub added_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionShow {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub publisher: String,
    pub picture: String,
    pub added_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionEpisode {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub description: String,
    pub show_uri: String,
    pub show_name: String,
    pub picture: String,
    pub added_at: i64,
}

/// Pinned shortcut. Keyed by uri: pins include playlists and
/// `collection` pseudo-uris that have no gid form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPinnedItem {
    pub uri: String,
    pub name: String,
    pub subtitle: String,
    pub picture: String,
    pub added_at: i64,
}

/// Entry of the user's playlist root list. Keyed by uri.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRootlistItem {
    pub uri: String,
    pub timestamp: i64,
    pub name: String,
    pub owner_username: String,
    pub picture: String,
}

/// Saved search shortcut over the collection ("Downloaded", "Podcasts", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilter {
    pub name: String,
    pub query: String,
}

/// Adds and removes fetched for one set, consumed immediately by the merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDeltaBatch {
    /// uri → added-at (epoch seconds)
    pub to_add: HashMap<String, i64>,
    /// kind → removed uris
    pub to_remove: BTreeMap<EntityKind, Vec<String>>,
    pub next_token: String,
    pub has_more_pages: bool,
}

impl SyncDeltaBatch {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.values().all(Vec::is_empty)
    }
}

/// Everything one merge writes, applied by the store as a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorChanges {
    pub tracks: Vec<CollectionTrack>,
    pub albums: Vec<CollectionAlbum>,
    pub artists: Vec<CollectionArtist>,
    pub shows: Vec<CollectionShow>,
    pub episodes: Vec<CollectionEpisode>,
    pub pins: Vec<CollectionPinnedItem>,
    pub rootlist: Vec<CollectionRootlistItem>,
    /// kind → uris to delete from that kind's table
    pub removed: BTreeMap<EntityKind, Vec<String>>,
    pub removed_pins: Vec<String>,
    pub removed_rootlist: Vec<String>,
    /// Clear the rootlist table before upserting `rootlist`.
    pub replace_rootlist: bool,
}

impl MirrorChanges {
    pub fn is_empty(&self) -> bool {
        !self.replace_rootlist && self.upsert_count() == 0 && self.delete_count() == 0
    }

    pub fn upsert_count(&self) -> usize {
        self.tracks.len()
            + self.albums.len()
            + self.artists.len()
            + self.shows.len()
            + self.episodes.len()
            + self.pins.len()
            + self.rootlist.len()
    }

    pub fn delete_count(&self) -> usize {
        self.removed.values().map(Vec::len).sum::<usize>()
            + self.removed_pins.len()
            + self.removed_rootlist.len()
    }
}

/// A locally-originated collection mutation waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWriteOp {
    /// `added_at` is captured when the op is created, not when it is flushed.
    Add { uri: String, set: String, added_at: i64 },
    Remove { uri: String, set: String },
}

impl PendingWriteOp {
    pub fn add(uri: impl Into<String>, set: impl Into<String>) -> Self {
        Self::Add {
            uri: uri.into(),
            set: set.into(),
            added_at: Utc::now().timestamp(),
        }
    }

    pub fn remove(uri: impl Into<String>, set: impl Into<String>) -> Self {
        Self::Remove {
            uri: uri.into(),
            set: set.into(),
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Self::Add { uri, .. } | Self::Remove { uri, .. } => uri,
        }
    }

    pub fn set(&self) -> &str {
        match self {
            Self::Add { set, .. } | Self::Remove { set, .. } => set,
        }
    }
}

/// Outcome of one successful scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub set: String,
    pub bootstrap: bool,
    pub pages: usize,
    pub upserted: usize,
    pub deleted: usize,
    pub token: String,
}
