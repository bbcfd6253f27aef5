//! redb-backed collection mirror.
//!
//! One table per entity kind, values are JSON rows:
//!   sync_state:      set name   → SyncState
//!   tracks/albums/artists/shows/episodes:  hex id → row
//!   pins/rootlist:   uri        → row
//!   content_filters: name       → ContentFilter

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::CollectionStore;
use crate::error::Result;
use crate::ids::{self, EntityKind};
use crate::model::{
    CollectionAlbum, CollectionArtist, CollectionEpisode, CollectionPinnedItem,
    CollectionRootlistItem, CollectionShow, CollectionTrack, ContentFilter, MirrorChanges,
    SyncState,
};

type RowTable = TableDefinition<'static, &'static str, &'static [u8]>;

const SYNC_STATE: RowTable = TableDefinition::new("sync_state");
const TRACKS: RowTable = TableDefinition::new("tracks");
const ALBUMS: RowTable = TableDefinition::new("albums");
const ARTISTS: RowTable = TableDefinition::new("artists");
const SHOWS: RowTable = TableDefinition::new("shows");
const EPISODES: RowTable = TableDefinition::new("episodes");
const PINS: RowTable = TableDefinition::new("pins");
const ROOTLIST: RowTable = TableDefinition::new("rootlist");
const CONTENT_FILTERS: RowTable = TableDefinition::new("content_filters");

const ALL_TABLES: [RowTable; 9] = [
    SYNC_STATE,
    TRACKS,
    ALBUMS,
    ARTISTS,
    SHOWS,
    EPISODES,
    PINS,
    ROOTLIST,
    CONTENT_FILTERS,
];

fn table_for(kind: EntityKind) -> RowTable {
    match kind {
        EntityKind::Track => TRACKS,
        EntityKind::Album => ALBUMS,
        EntityKind::Artist => ARTISTS,
        EntityKind::Show => SHOWS,
        EntityKind::Episode => EPISODES,
    }
}

/// Handle to the mirror database.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the mirror at `path`, ensuring every table exists.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        for def in ALL_TABLES {
            txn.open_table(def)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    fn upsert<T: Serialize>(
        txn: &WriteTransaction,
        def: RowTable,
        rows: &[T],
        key: impl Fn(&T) -> &str,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut table = txn.open_table(def)?;
        for row in rows {
            let data = serde_json::to_vec(row)?;
            table.insert(key(row), data.as_slice())?;
        }
        Ok(())
    }

    fn delete(txn: &WriteTransaction, def: RowTable, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut table = txn.open_table(def)?;
        for key in keys {
            table.remove(key.as_str())?;
        }
        Ok(())
    }

    fn list<T: DeserializeOwned>(&self, def: RowTable) -> Result<Vec<T>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(def)?;
        let mut rows = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            rows.push(serde_json::from_slice(value.value())?);
        }
        Ok(rows)
    }

    fn clear(txn: &WriteTransaction, def: RowTable) -> Result<()> {
        let mut table = txn.open_table(def)?;
        let keys: Vec<String> = table
            .iter()?
            .map(|r| r.map(|(k, _)| k.value().to_string()))
            .collect::<std::result::Result<_, _>>()?;
        for key in keys {
            table.remove(key.as_str())?;
        }
        Ok(())
    }
}

#[async_trait]
impl CollectionStore for RedbStore {
    fn backend_name(&self) -> &str {
        "redb"
    }

    async fn sync_state(&self, set: &str) -> Result<Option<SyncState>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SYNC_STATE)?;
        match table.get(set)? {
            Some(data) => Ok(Some(serde_json::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    async fn put_sync_state(&self, set: &str, token: &str) -> Result<()> {
        let state = SyncState {
            set: set.to_string(),
            token: token.to_string(),
            last_updated: Utc::now(),
        };
        let data = serde_json::to_vec(&state)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SYNC_STATE)?;
            table.insert(set, data.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    async fn sync_states(&self) -> Result<Vec<SyncState>> {
        self.list(SYNC_STATE)
    }

    async fn apply(&self, changes: &MirrorChanges) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        Self::upsert(&txn, TRACKS, &changes.tracks, |t| t.id.as_str())?;
        Self::upsert(&txn, ALBUMS, &changes.albums, |a| a.id.as_str())?;
        Self::upsert(&txn, ARTISTS, &changes.artists, |a| a.id.as_str())?;
        Self::upsert(&txn, SHOWS, &changes.shows, |s| s.id.as_str())?;
        Self::upsert(&txn, EPISODES, &changes.episodes, |e| e.id.as_str())?;
        Self::upsert(&txn, PINS, &changes.pins, |p| p.uri.as_str())?;
        if changes.replace_rootlist {
            Self::clear(&txn, ROOTLIST)?;
        }
        Self::upsert(&txn, ROOTLIST, &changes.rootlist, |r| r.uri.as_str())?;

        for (kind, uris) in &changes.removed {
            let keys: Vec<String> = uris
                .iter()
                .filter_map(|uri| match ids::uri_to_id(uri) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        tracing::warn!("Skipping {} removal of {}: {}", kind, uri, e);
                        None
                    }
                })
                .collect();
            Self::delete(&txn, table_for(*kind), &keys)?;
        }
        Self::delete(&txn, PINS, &changes.removed_pins)?;
        Self::delete(&txn, ROOTLIST, &changes.removed_rootlist)?;
        txn.commit()?;
        Ok(())
    }

    async fn contains(&self, kind: EntityKind, uri: &str) -> Result<bool> {
        let id = ids::uri_to_id(uri)?;
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table_for(kind))?;
        Ok(table.get(id.as_str())?.is_some())
    }

    async fn tracks(&self) -> Result<Vec<CollectionTrack>> {
        self.list(TRACKS)
    }

    async fn albums(&self) -> Result<Vec<CollectionAlbum>> {
        self.list(ALBUMS)
    }

    async fn artists(&self) -> Result<Vec<CollectionArtist>> {
        self.list(ARTISTS)
    }

    async fn shows(&self) -> Result<Vec<CollectionShow>> {
        self.list(SHOWS)
    }

    async fn episodes(&self) -> Result<Vec<CollectionEpisode>> {
        self.list(EPISODES)
    }

    async fn pins(&self) -> Result<Vec<CollectionPinnedItem>> {
        self.list(PINS)
    }

    async fn rootlist(&self) -> Result<Vec<CollectionRootlistItem>> {
        self.list(ROOTLIST)
    }

    async fn content_filters(&self) -> Result<Vec<ContentFilter>> {
        self.list(CONTENT_FILTERS)
    }

    async fn replace_content_filters(&self, filters: &[ContentFilter]) -> Result<()> {
        let txn = self.db.begin_write()?;
        Self::clear(&txn, CONTENT_FILTERS)?;
        Self::upsert(&txn, CONTENT_FILTERS, filters, |f| f.name.as_str())?;
        txn.commit()?;
        Ok(())
    }

    async fn wipe(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        for def in ALL_TABLES {
            Self::clear(&txn, def)?;
        }
        txn.commit()?;
        Ok(())
    }
}
