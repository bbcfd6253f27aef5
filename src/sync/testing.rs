//! Scripted fakes for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use super::{CollectionSync, EngineOptions};
use crate::api::wire::{
    CollectionItem, ContentFilterResponse, DeltaRequest, DeltaResponse, PageRequest,
    PageResponse, PlaylistMeta, Rootlist, RootlistDelta, WriteRequest,
};
use crate::api::{CollectionApi, MetadataResolver, PlaylistApi, RemoteApis};
use crate::error::{Result, SyncError};
use crate::ids::{EntityKind, SpotifyId};
use crate::metadata::{
    AlbumMetadata, AlbumRef, ArtistMetadata, ArtistRef, EpisodeMetadata, ExtensionKind, Image,
    ImageSize, MetadataBatch, MetadataQuery, ShowMetadata, TrackMetadata,
};
use crate::model::{
    CollectionAlbum, CollectionArtist, CollectionEpisode, CollectionPinnedItem,
    CollectionRootlistItem, CollectionShow, CollectionTrack, ContentFilter, MirrorChanges,
    SyncState,
};
use crate::store::{CollectionStore, RedbStore};

pub const T_A: &str = "spotify:track:4uLU6hMCjMI75M1A2tKUQC";
pub const T_B: &str = "spotify:track:7GhIk7Il098yCjg4BQjzvb";
pub const T_C: &str = "spotify:track:3n3Ppam7vgaVa1iaRUc9Lp";
pub const T_D: &str = "spotify:track:0VjIjW4GlUZAMYd2vXMi3b";
pub const ALBUM_A: &str = "spotify:album:4aawyAB9vmqN3uQ7FjRGTy";
pub const ARTIST_A: &str = "spotify:artist:0gxyHStUsqpMadRV0Di1Qt";
pub const SHOW_A: &str = "spotify:show:4rOoJ6Egrf8K2IrywzwOMk";
pub const EPISODE_A: &str = "spotify:episode:512ojhOuo1ktJprKbVcKyQ";
pub const PLAYLIST_A: &str = "spotify:playlist:37i9dQZF1DXcBWIGoYBM5M";
pub const PLAYLIST_B: &str = "spotify:playlist:37i9dQZF1DX0XUsuxWHRQd";

pub fn gid_of(uri: &str) -> Vec<u8> {
    SpotifyId::from_uri(uri).unwrap().gid.to_be_bytes().to_vec()
}

pub fn default_image(byte: u8) -> Vec<Image> {
    vec![Image {
        file_id: vec![byte; 20],
        size: ImageSize::Default,
    }]
}

pub fn sorted(mut tracks: Vec<CollectionTrack>) -> Vec<CollectionTrack> {
    tracks.sort_by(|a, b| a.uri.cmp(&b.uri));
    tracks
}

fn missing(what: &str) -> SyncError {
    SyncError::NotFound(what.to_string())
}

#[derive(Default)]
struct RemoteState {
    pages: HashMap<(String, String), PageResponse>,
    deltas: HashMap<(String, String), DeltaResponse>,
    catalog: MetadataBatch,
    fail_descriptors: bool,
    playlists: HashMap<String, PlaylistMeta>,
    rootlist: Option<Rootlist>,
    rootlist_deltas: HashMap<(String, String), RootlistDelta>,
    content_filters: Option<ContentFilterResponse>,
    write_error: Option<String>,
    writes: Vec<WriteRequest>,
    paging_calls: usize,
    delta_calls: usize,
    metadata_requests: Vec<Vec<MetadataQuery>>,
    playlist_lookups: Vec<String>,
    rootlist_delta_calls: Vec<(String, String)>,
}

/// One fake standing in for every remote interface.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut RemoteState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    // ── scripting ───────────────────────────────────────────────────

    /// Catalog each uri as a track on ALBUM_A by ARTIST_A.
    pub fn catalog_tracks(&self, uris: &[&str]) {
        for (i, uri) in uris.iter().enumerate() {
            self.catalog_track(
                uri,
                TrackMetadata {
                    gid: gid_of(uri),
                    name: format!("Track {}", i + 1),
                    album: AlbumRef {
                        gid: gid_of(ALBUM_A),
                        name: "Album A".to_string(),
                        cover_group: default_image(0xaa),
                    },
                    artists: vec![ArtistRef {
                        gid: gid_of(ARTIST_A),
                        name: "Artist A".to_string(),
                    }],
                    has_lyrics: true,
                    explicit: false,
                    duration: 200_000,
                },
            );
        }
    }

    pub fn catalog_track(&self, uri: &str, track: TrackMetadata) {
        self.with(|s| s.catalog.tracks.insert(uri.to_string(), track));
    }

    pub fn catalog_album(&self, uri: &str, album: AlbumMetadata) {
        self.with(|s| s.catalog.albums.insert(uri.to_string(), album));
    }

    pub fn catalog_artist(&self, uri: &str, artist: ArtistMetadata) {
        self.with(|s| s.catalog.artists.insert(uri.to_string(), artist));
    }

    pub fn catalog_show(&self, uri: &str, show: ShowMetadata) {
        self.with(|s| s.catalog.shows.insert(uri.to_string(), show));
    }

    pub fn catalog_episode(&self, uri: &str, episode: EpisodeMetadata) {
        self.with(|s| s.catalog.episodes.insert(uri.to_string(), episode));
    }

    pub fn descriptors(&self, uri: &str, tags: &[&str]) {
        let tags = tags.iter().map(|t| t.to_string()).collect();
        self.with(|s| s.catalog.descriptors.insert(uri.to_string(), tags));
    }

    pub fn fail_descriptors(&self, fail: bool) {
        self.with(|s| s.fail_descriptors = fail);
    }

    pub fn page(
        &self,
        set: &str,
        pagination_token: &str,
        items: &[(&str, i64)],
        next_page_token: &str,
        sync_token: &str,
    ) {
        let response = PageResponse {
            items: items
                .iter()
                .map(|(uri, added_at)| CollectionItem {
                    uri: uri.to_string(),
                    added_at: *added_at,
                    is_removed: false,
                })
                .collect(),
            next_page_token: next_page_token.to_string(),
            sync_token: sync_token.to_string(),
        };
        self.with(|s| {
            s.pages
                .insert((set.to_string(), pagination_token.to_string()), response)
        });
    }

    pub fn delta(&self, set: &str, last_token: &str, items: Vec<CollectionItem>, sync_token: &str) {
        let response = DeltaResponse {
            items,
            sync_token: sync_token.to_string(),
        };
        self.with(|s| {
            s.deltas
                .insert((set.to_string(), last_token.to_string()), response)
        });
    }

    pub fn playlist(&self, uri: &str, meta: PlaylistMeta) {
        self.with(|s| s.playlists.insert(uri.to_string(), meta));
    }

    pub fn set_rootlist(&self, rootlist: Rootlist) {
        self.with(|s| s.rootlist = Some(rootlist));
    }

    pub fn rootlist_delta(&self, revision: &str, target: &str, delta: RootlistDelta) {
        self.with(|s| {
            s.rootlist_deltas
                .insert((revision.to_string(), target.to_string()), delta)
        });
    }

    pub fn set_content_filters(&self, filters: Option<ContentFilterResponse>) {
        self.with(|s| s.content_filters = filters);
    }

    pub fn fail_writes(&self, message: Option<&str>) {
        self.with(|s| s.write_error = message.map(str::to_string));
    }

    // ── inspection ──────────────────────────────────────────────────

    pub fn paging_calls(&self) -> usize {
        self.with(|s| s.paging_calls)
    }

    pub fn delta_calls(&self) -> usize {
        self.with(|s| s.delta_calls)
    }

    pub fn writes(&self) -> Vec<WriteRequest> {
        self.with(|s| s.writes.clone())
    }

    pub fn metadata_requests(&self) -> Vec<Vec<MetadataQuery>> {
        self.with(|s| s.metadata_requests.clone())
    }

    pub fn playlist_lookups(&self) -> Vec<String> {
        self.with(|s| s.playlist_lookups.clone())
    }

    pub fn rootlist_delta_calls(&self) -> Vec<(String, String)> {
        self.with(|s| s.rootlist_delta_calls.clone())
    }
}

#[async_trait]
impl CollectionApi for FakeRemote {
    async fn paging(&self, request: PageRequest) -> Result<PageResponse> {
        self.with(|s| {
            s.paging_calls += 1;
            s.pages
                .get(&(request.set.clone(), request.pagination_token.clone()))
                .cloned()
                .ok_or_else(|| missing("page"))
        })
    }

    async fn delta(&self, request: DeltaRequest) -> Result<DeltaResponse> {
        self.with(|s| {
            s.delta_calls += 1;
            s.deltas
                .get(&(request.set.clone(), request.last_sync_token.clone()))
                .cloned()
                .ok_or_else(|| missing("delta"))
        })
    }

    async fn write(&self, request: WriteRequest) -> Result<()> {
        self.with(|s| {
            s.writes.push(request);
            match &s.write_error {
                Some(message) => Err(SyncError::Remote {
                    status: 500,
                    body: message.clone(),
                }),
                None => Ok(()),
            }
        })
    }

    async fn content_filters(&self) -> Result<ContentFilterResponse> {
        self.with(|s| s.content_filters.clone().ok_or_else(|| missing("filters")))
    }
}

#[async_trait]
impl PlaylistApi for FakeRemote {
    async fn rootlist(&self, _username: &str) -> Result<Rootlist> {
        self.with(|s| s.rootlist.clone().ok_or_else(|| missing("rootlist")))
    }

    async fn rootlist_delta(
        &self,
        _username: &str,
        revision: &str,
        target_revision: &str,
    ) -> Result<RootlistDelta> {
        self.with(|s| {
            let key = (revision.to_string(), target_revision.to_string());
            s.rootlist_delta_calls.push(key.clone());
            s.rootlist_deltas
                .get(&key)
                .cloned()
                .ok_or_else(|| missing("rootlist diff"))
        })
    }

    async fn playlist(&self, uri: &str) -> Result<PlaylistMeta> {
        self.with(|s| {
            s.playlist_lookups.push(uri.to_string());
            s.playlists.get(uri).cloned().ok_or_else(|| missing("playlist"))
        })
    }
}

#[async_trait]
impl MetadataResolver for FakeRemote {
    async fn request(&self, queries: Vec<MetadataQuery>) -> Result<MetadataBatch> {
        self.with(|s| {
            s.metadata_requests.push(queries.clone());
            let wants_descriptors = queries
                .iter()
                .any(|(_, kinds)| kinds.contains(&ExtensionKind::TrackDescriptor));
            if wants_descriptors && s.fail_descriptors {
                return Err(SyncError::Remote {
                    status: 503,
                    body: "descriptors unavailable".to_string(),
                });
            }

            let mut batch = MetadataBatch::default();
            for (uri, kinds) in &queries {
                for kind in kinds {
                    match kind {
                        ExtensionKind::TrackV4 => {
                            if let Some(t) = s.catalog.tracks.get(uri) {
                                batch.tracks.insert(uri.clone(), t.clone());
                            }
                        }
                        ExtensionKind::AlbumV4 => {
                            if let Some(a) = s.catalog.albums.get(uri) {
                                batch.albums.insert(uri.clone(), a.clone());
                            }
                        }
                        ExtensionKind::ArtistV4 => {
                            if let Some(a) = s.catalog.artists.get(uri) {
                                batch.artists.insert(uri.clone(), a.clone());
                            }
                        }
                        ExtensionKind::ShowV4 => {
                            if let Some(sh) = s.catalog.shows.get(uri) {
                                batch.shows.insert(uri.clone(), sh.clone());
                            }
                        }
                        ExtensionKind::EpisodeV4 => {
                            if let Some(e) = s.catalog.episodes.get(uri) {
                                batch.episodes.insert(uri.clone(), e.clone());
                            }
                        }
                        ExtensionKind::TrackDescriptor => {
                            if let Some(d) = s.catalog.descriptors.get(uri) {
                                batch.descriptors.insert(uri.clone(), d.clone());
                            }
                        }
                        ExtensionKind::UnknownExtension => {}
                    }
                }
            }
            Ok(batch)
        })
    }
}

pub fn apis(remote: &Arc<FakeRemote>) -> RemoteApis {
    RemoteApis {
        collection: remote.clone(),
        playlists: remote.clone(),
        metadata: remote.clone(),
    }
}

/// Engine for user "bob" over a fresh redb mirror.
pub fn engine(remote: Arc<FakeRemote>) -> (TempDir, Arc<CollectionSync>) {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbStore::create(&dir.path().join("mirror.redb")).unwrap();
    let engine = engine_with_store(remote, Arc::new(store));
    (dir, engine)
}

pub fn engine_with_store(
    remote: Arc<FakeRemote>,
    store: Arc<dyn CollectionStore>,
) -> Arc<CollectionSync> {
    Arc::new(CollectionSync::new(
        "bob",
        apis(&remote),
        store,
        EngineOptions::default(),
    ))
}

/// Mirror whose token writes can be made to fail, simulating a crash
/// between the data commit and the token write.
pub struct FlakyStore {
    inner: RedbStore,
    fail_tokens: AtomicBool,
}

impl FlakyStore {
    pub fn fail_token_writes(&self, fail: bool) {
        self.fail_tokens.store(fail, Ordering::SeqCst);
    }
}

pub fn flaky_store() -> (TempDir, Arc<FlakyStore>) {
    let dir = tempfile::tempdir().unwrap();
    let inner = RedbStore::create(&dir.path().join("mirror.redb")).unwrap();
    let store = Arc::new(FlakyStore {
        inner,
        fail_tokens: AtomicBool::new(false),
    });
    (dir, store)
}

#[async_trait]
impl CollectionStore for FlakyStore {
    fn backend_name(&self) -> &str {
        "flaky"
    }

    async fn sync_state(&self, set: &str) -> Result<Option<SyncState>> {
        self.inner.sync_state(set).await
    }

    async fn put_sync_state(&self, set: &str, token: &str) -> Result<()> {
        if self.fail_tokens.load(Ordering::SeqCst) {
            return Err(SyncError::Io(std::io::Error::other("simulated crash")));
        }
        self.inner.put_sync_state(set, token).await
    }

    async fn sync_states(&self) -> Result<Vec<SyncState>> {
        self.inner.sync_states().await
    }

    async fn apply(&self, changes: &MirrorChanges) -> Result<()> {
        self.inner.apply(changes).await
    }

    async fn contains(&self, kind: EntityKind, uri: &str) -> Result<bool> {
        self.inner.contains(kind, uri).await
    }

    async fn tracks(&self) -> Result<Vec<CollectionTrack>> {
        self.inner.tracks().await
    }

    async fn albums(&self) -> Result<Vec<CollectionAlbum>> {
        self.inner.albums().await
    }

    async fn artists(&self) -> Result<Vec<CollectionArtist>> {
        self.inner.artists().await
    }

    async fn shows(&self) -> Result<Vec<CollectionShow>> {
        self.inner.shows().await
    }

    async fn episodes(&self) -> Result<Vec<CollectionEpisode>> {
        self.inner.episodes().await
    }

    async fn pins(&self) -> Result<Vec<CollectionPinnedItem>> {
        self.inner.pins().await
    }

    async fn rootlist(&self) -> Result<Vec<CollectionRootlistItem>> {
        self.inner.rootlist().await
    }

    async fn content_filters(&self) -> Result<Vec<ContentFilter>> {
        self.inner.content_filters().await
    }

    async fn replace_content_filters(&self, filters: &[ContentFilter]) -> Result<()> {
        self.inner.replace_content_filters(filters).await
    }

    async fn wipe(&self) -> Result<()> {
        self.inner.wipe().await
    }
}
