//! Storage abstraction for the local collection mirror.
//!
//! - [`RedbStore`]: redb file with one table per entity kind (default)
//!
//! The engine holds an `Arc<dyn CollectionStore>` and every read and write
//! of the mirror goes through it. Besides the typed tables the store keeps
//! one [`SyncState`] row per collection set: its absence is the only signal
//! that a set needs a full bootstrap.

pub mod redb_store;

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::EntityKind;
use crate::model::{
    CollectionAlbum, CollectionArtist, CollectionEpisode, CollectionPinnedItem,
    CollectionRootlistItem, CollectionShow, CollectionTrack, ContentFilter, MirrorChanges,
    SyncState,
};

pub use redb_store::RedbStore;

/// Core storage trait for the mirror.
///
/// All methods are async so remote or pooled backends can implement it;
/// the redb backend just opens a transaction and calls through.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Human-readable backend name (e.g., "redb").
    fn backend_name(&self) -> &str;

    // ── Sync tokens ─────────────────────────────────────────────────

    /// Last token/revision stored for a set. None means "never synced".
    async fn sync_state(&self, set: &str) -> Result<Option<SyncState>>;

    /// Record a set's new token. Must only be called after the data it
    /// covers has been committed with [`CollectionStore::apply`].
    async fn put_sync_state(&self, set: &str, token: &str) -> Result<()>;

    /// Every stored sync state, ordered by set name.
    async fn sync_states(&self) -> Result<Vec<SyncState>>;

    // ── Mirror ──────────────────────────────────────────────────────

    /// Apply all upserts and deletes of one merge as a single transaction.
    /// Upserts overwrite rows with the same key.
    async fn apply(&self, changes: &MirrorChanges) -> Result<()>;

    /// Whether an entity of `kind` with this uri is mirrored.
    async fn contains(&self, kind: EntityKind, uri: &str) -> Result<bool>;

    async fn tracks(&self) -> Result<Vec<CollectionTrack>>;
    async fn albums(&self) -> Result<Vec<CollectionAlbum>>;
    async fn artists(&self) -> Result<Vec<CollectionArtist>>;
    async fn shows(&self) -> Result<Vec<CollectionShow>>;
    async fn episodes(&self) -> Result<Vec<CollectionEpisode>>;
    async fn pins(&self) -> Result<Vec<CollectionPinnedItem>>;
    async fn rootlist(&self) -> Result<Vec<CollectionRootlistItem>>;

    // ── Content filters ─────────────────────────────────────────────

    async fn content_filters(&self) -> Result<Vec<ContentFilter>>;

    /// Replace the stored filters with `filters`.
    async fn replace_content_filters(&self, filters: &[ContentFilter]) -> Result<()>;

    /// Delete every mirrored row and every sync state.
    async fn wipe(&self) -> Result<()>;
}
