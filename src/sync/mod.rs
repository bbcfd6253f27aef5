//! Collection synchronization engine.
//!
//! `CollectionSync` keeps the local mirror consistent with the remote
//! collection. Each scan picks bootstrap or delta from the stored sync token,
//! merges what it fetched, and only then advances the token:
//!
//! ```text
//! scan(set) → sync_state(set) ─ None ──→ bootstrap (paging.rs) ─┐
//!                              └ token ─→ delta (delta.rs) ──────┤
//!                                                                ├→ merge (merge.rs) → apply → put_sync_state
//! scan("rootlist") → rootlist.rs (revision-addressed) ───────────┘
//! ```
//!
//! Local writes go through the write queue (queue.rs); real-time
//! notifications re-enter the same merge path (push.rs).

mod delta;
mod merge;
mod paging;
mod push;
mod queue;
mod rootlist;

#[cfg(test)]
mod testing;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::api::RemoteApis;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::model::{ContentFilter, ScanReport, SET_PINS, SET_ROOTLIST};
use crate::store::CollectionStore;

pub use delta::batch_from_items;
pub use merge::PinRoute;
pub use queue::{build_write_request, ToggleOutcome, WriteQueue};
pub use rootlist::{picture_url, Revision, IMAGE_URL_PREFIX};

/// How a set's entries are resolved and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetKind {
    /// Typed entity tables (tracks, albums, artists, shows, episodes)
    Collection,
    /// The pinned-items table
    Pins,
}

impl SetKind {
    fn of(set: &str) -> Self {
        if set == SET_PINS {
            Self::Pins
        } else {
            Self::Collection
        }
    }
}

/// Tunables taken from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub page_limit: u32,
    pub write_queue_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            page_limit: 300,
            write_queue_capacity: 64,
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            page_limit: config.api.page_limit,
            write_queue_capacity: config.sync.write_queue_capacity,
        }
    }
}

pub struct CollectionSync {
    username: String,
    apis: RemoteApis,
    store: Arc<dyn CollectionStore>,
    options: EngineOptions,
    writes: WriteQueue,
    /// One lock per set so two scans of the same set never interleave.
    scan_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CollectionSync {
    /// Build an engine. Spawns the write-queue worker, so this must run
    /// inside a tokio runtime.
    pub fn new(
        username: impl Into<String>,
        apis: RemoteApis,
        store: Arc<dyn CollectionStore>,
        options: EngineOptions,
    ) -> Self {
        let username = username.into();
        let writes = WriteQueue::spawn(
            apis.collection.clone(),
            username.clone(),
            options.write_queue_capacity,
        );
        Self {
            username,
            apis,
            store,
            options,
            writes,
            scan_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn store(&self) -> &Arc<dyn CollectionStore> {
        &self.store
    }

    fn scan_lock(&self, set: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .scan_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(set.to_string()).or_default().clone()
    }

    /// Scan a set and swallow failures.
    ///
    /// Scans run in the background and heal on the next run, so a failure
    /// is only logged; the stored token is left where it was.
    pub async fn perform_scan(&self, set: &str) -> Option<ScanReport> {
        tracing::debug!("Performing scan of {}", set);
        match self.scan(set).await {
            Ok(report) => {
                tracing::info!(
                    set = %report.set,
                    bootstrap = report.bootstrap,
                    pages = report.pages,
                    upserted = report.upserted,
                    deleted = report.deleted,
                    "Scan completed"
                );
                Some(report)
            }
            Err(e) => {
                tracing::error!("Scan of {} failed: {}", set, e);
                None
            }
        }
    }

    /// Scan a set, holding that set's lock for the whole scan.
    pub async fn scan(&self, set: &str) -> Result<ScanReport> {
        let lock = self.scan_lock(set);
        let _guard = lock.lock().await;

        if set == SET_ROOTLIST {
            return self.rootlist_scan_locked(None).await;
        }

        let kind = SetKind::of(set);
        let existing = self
            .store
            .sync_state(set)
            .await?
            .map(|state| state.token)
            .filter(|token| !token.is_empty());

        let report = match existing {
            Some(token) => self.delta_scan(set, kind, &token).await?,
            None => self.bootstrap(set, kind).await?,
        };

        // Data is committed; only now may the token move.
        self.store.put_sync_state(set, &report.token).await?;
        Ok(report)
    }

    /// Refresh the saved content filters.
    ///
    /// A failed fetch keeps the filters already stored.
    pub async fn scan_content_filters(&self) -> Result<usize> {
        let response = match self.apis.collection.content_filters().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Keeping stored content filters, fetch failed: {}", e);
                return Ok(self.store.content_filters().await?.len());
            }
        };
        let filters: Vec<ContentFilter> = response
            .content_filters
            .into_iter()
            .map(|f| ContentFilter {
                name: f.title,
                query: f.query,
            })
            .collect();
        self.store.replace_content_filters(&filters).await?;
        Ok(filters.len())
    }

    /// Drop the whole mirror, tokens included. The next scan of every set
    /// bootstraps from scratch.
    pub async fn wipe(&self) -> Result<()> {
        // Hold every known set lock so no scan commits into a wiped mirror.
        let locks: Vec<_> = {
            let locks = self
                .scan_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.values().cloned().collect()
        };
        let mut guards = Vec::with_capacity(locks.len());
        for lock in &locks {
            guards.push(lock.lock().await);
        }
        self.store.wipe().await
    }

    fn require_username(&self) -> Result<&str> {
        if self.username.is_empty() {
            return Err(SyncError::InvalidId("empty username".to_string()));
        }
        Ok(&self.username)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::api::wire::{CollectionItem, ContentFilterEntry, ContentFilterResponse};
    use crate::ids::EntityKind;

    #[tokio::test]
    async fn test_pins_scan_advances_past_deleted_playlist() {
        let remote = FakeRemote::new();
        let liked = "spotify:user:bob:collection";
        remote.page("ylpin", "", &[(PLAYLIST_B, 1), (liked, 2)], "", "P1");
        let (_dir, engine) = engine(remote.clone());

        let report = engine.scan("ylpin").await.unwrap();

        assert_eq!(report.token, "P1");
        let state = engine.store().sync_state("ylpin").await.unwrap().unwrap();
        assert_eq!(state.token, "P1");
        let pins = engine.store().pins().await.unwrap();
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].uri, liked);
        assert_eq!(remote.playlist_lookups(), vec![PLAYLIST_B.to_string()]);
    }

    #[tokio::test]
    async fn test_bootstrap_pagination_stores_final_token() {
        let remote = FakeRemote::new();
        remote.catalog_tracks(&[T_A, T_B, T_C, T_D]);
        remote.page("collection", "", &[(T_A, 1), (T_B, 2)], "t1", "");
        remote.page("collection", "t1", &[(T_C, 3)], "t2", "");
        remote.page("collection", "t2", &[(T_D, 4)], "", "S");
        let (_dir, engine) = engine(remote.clone());

        let report = engine.scan("collection").await.unwrap();

        assert!(report.bootstrap);
        assert_eq!(report.pages, 3);
        assert_eq!(report.token, "S");
        let state = engine.store().sync_state("collection").await.unwrap().unwrap();
        assert_eq!(state.token, "S");

        let mut uris: Vec<_> = engine
            .store()
            .tracks()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.uri)
            .collect();
        uris.sort();
        let mut expected = vec![T_A, T_B, T_C, T_D];
        expected.sort();
        assert_eq!(uris, expected);
    }

    #[tokio::test]
    async fn test_existing_token_uses_delta() {
        let remote = FakeRemote::new();
        remote.catalog_tracks(&[T_A, T_B]);
        remote.page("collection", "", &[(T_A, 1)], "", "S1");
        remote.delta(
            "collection",
            "S1",
            vec![
                item(T_B, 5, false),
                item(T_A, 0, true),
            ],
            "S2",
        );
        let (_dir, engine) = engine(remote.clone());

        engine.scan("collection").await.unwrap();
        let report = engine.scan("collection").await.unwrap();

        assert!(!report.bootstrap);
        assert_eq!(report.token, "S2");
        assert_eq!(remote.paging_calls(), 1);
        let tracks = engine.store().tracks().await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].uri, T_B);
        assert_eq!(tracks[0].added_at, 5);
    }

    #[tokio::test]
    async fn test_unsupported_kind_aborts_batch_and_keeps_token() {
        let remote = FakeRemote::new();
        remote.catalog_tracks(&[T_A, T_B]);
        remote.page("collection", "", &[(T_A, 1)], "", "S1");
        remote.delta(
            "collection",
            "S1",
            vec![
                item(T_B, 5, false),
                item("spotify:widget:xyz", 0, true),
            ],
            "S2",
        );
        let (_dir, engine) = engine(remote.clone());
        engine.scan("collection").await.unwrap();

        let err = engine.scan("collection").await.unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedEntityKind(_)));
        assert!(engine.perform_scan("collection").await.is_none());

        let state = engine.store().sync_state("collection").await.unwrap().unwrap();
        assert_eq!(state.token, "S1");
        // Nothing from the aborted batch was merged
        assert!(!engine.store().contains(EntityKind::Track, T_B).await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_mid_bootstrap_keeps_no_token() {
        let remote = FakeRemote::new();
        remote.catalog_tracks(&[T_A, T_B]);
        remote.page("collection", "", &[(T_A, 1)], "t1", "");
        // no page registered for "t1" → remote error
        let (_dir, engine) = engine(remote.clone());

        assert!(engine.perform_scan("collection").await.is_none());
        assert!(engine.store().sync_state("collection").await.unwrap().is_none());
        // First page was merged before the failure
        assert!(engine.store().contains(EntityKind::Track, T_A).await.unwrap());

        // Retry re-fetches from page one; rows are overwritten, not duplicated
        remote.page("collection", "t1", &[(T_B, 2)], "", "S");
        let report = engine.scan("collection").await.unwrap();
        assert_eq!(report.token, "S");
        assert_eq!(engine.store().tracks().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_crash_between_commit_and_token_write_is_idempotent() {
        let remote = FakeRemote::new();
        remote.catalog_tracks(&[T_A, T_B]);
        remote.page("collection", "", &[(T_A, 1)], "", "S1");
        remote.delta("collection", "S1", vec![item(T_B, 7, false)], "S2");
        let (_dir, store) = flaky_store();
        let engine = engine_with_store(remote.clone(), store.clone());

        engine.scan("collection").await.unwrap();

        store.fail_token_writes(true);
        assert!(engine.scan("collection").await.is_err());
        assert_eq!(
            engine.store().sync_state("collection").await.unwrap().unwrap().token,
            "S1"
        );
        let after_crash = engine.store().tracks().await.unwrap();

        store.fail_token_writes(false);
        engine.scan("collection").await.unwrap();

        let after_rerun = engine.store().tracks().await.unwrap();
        assert_eq!(after_rerun.len(), 2);
        assert_eq!(sorted(after_crash), sorted(after_rerun));
        assert_eq!(remote.delta_calls(), 2);
        assert_eq!(
            engine.store().sync_state("collection").await.unwrap().unwrap().token,
            "S2"
        );
    }

    #[tokio::test]
    async fn test_same_set_scans_are_serialized() {
        let remote = FakeRemote::new();
        remote.catalog_tracks(&[T_A]);
        remote.page("collection", "", &[(T_A, 1)], "", "S1");
        remote.delta("collection", "S1", Vec::new(), "S2");
        let (_dir, engine) = engine(remote.clone());

        let (a, b) = tokio::join!(engine.scan("collection"), engine.scan("collection"));
        let (a, b) = (a.unwrap(), b.unwrap());

        // Exactly one bootstrap; the second scan saw its token
        assert_eq!(remote.paging_calls(), 1);
        assert_eq!(remote.delta_calls(), 1);
        assert!(a.bootstrap != b.bootstrap);
    }

    #[tokio::test]
    async fn test_content_filters_replaced_and_kept_on_failure() {
        let remote = FakeRemote::new();
        remote.set_content_filters(Some(ContentFilterResponse {
            content_filters: vec![ContentFilterEntry {
                title: "Downloaded".to_string(),
                query: "available_offline eq true".to_string(),
            }],
        }));
        let (_dir, engine) = engine(remote.clone());

        assert_eq!(engine.scan_content_filters().await.unwrap(), 1);

        remote.set_content_filters(None);
        assert_eq!(engine.scan_content_filters().await.unwrap(), 1);
        assert_eq!(engine.store().content_filters().await.unwrap()[0].name, "Downloaded");
    }

    #[tokio::test]
    async fn test_wipe_forces_bootstrap() {
        let remote = FakeRemote::new();
        remote.catalog_tracks(&[T_A]);
        remote.page("collection", "", &[(T_A, 1)], "", "S1");
        let (_dir, engine) = engine(remote.clone());
        engine.scan("collection").await.unwrap();

        engine.wipe().await.unwrap();
        assert!(engine.store().tracks().await.unwrap().is_empty());

        let report = engine.scan("collection").await.unwrap();
        assert!(report.bootstrap);
        assert_eq!(remote.paging_calls(), 2);
    }

    fn item(uri: &str, added_at: i64, is_removed: bool) -> CollectionItem {
        CollectionItem {
            uri: uri.to_string(),
            added_at,
            is_removed,
        }
    }
}
