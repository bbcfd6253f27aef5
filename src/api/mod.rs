//! Remote service interfaces consumed by the sync engine.
//!
//! The engine never talks HTTP directly: it holds these traits so the
//! transport ([`SpClient`]) can be swapped for scripted fakes in tests.

pub mod http;
pub mod wire;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::metadata::{MetadataBatch, MetadataQuery};
use wire::{
    ContentFilterResponse, DeltaRequest, DeltaResponse, PageRequest, PageResponse, PlaylistMeta,
    Rootlist, RootlistDelta, WriteRequest,
};

pub use http::SpClient;

/// Paginated snapshots, token deltas and batched writes of collection sets.
#[async_trait]
pub trait CollectionApi: Send + Sync {
    /// Fetch one page of a set. An empty `next_page_token` marks the last page.
    async fn paging(&self, request: PageRequest) -> Result<PageResponse>;

    /// Fetch everything that changed since `last_sync_token`.
    async fn delta(&self, request: DeltaRequest) -> Result<DeltaResponse>;

    /// Submit adds/removes. Acknowledgement only.
    async fn write(&self, request: WriteRequest) -> Result<()>;

    /// Saved content filters of the user's collection.
    async fn content_filters(&self) -> Result<ContentFilterResponse>;
}

/// Revision-addressed root list and single-playlist lookups.
#[async_trait]
pub trait PlaylistApi: Send + Sync {
    async fn rootlist(&self, username: &str) -> Result<Rootlist>;

    /// Diff from `revision` to `target_revision` (empty = latest).
    async fn rootlist_delta(
        &self,
        username: &str,
        revision: &str,
        target_revision: &str,
    ) -> Result<RootlistDelta>;

    /// Display attributes and owner of one playlist.
    async fn playlist(&self, uri: &str) -> Result<PlaylistMeta>;
}

/// Batch metadata lookup by id and extension kind.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Ids the resolver cannot service are absent from the result.
    async fn request(&self, queries: Vec<MetadataQuery>) -> Result<MetadataBatch>;
}

/// The remote collaborators of one engine instance.
#[derive(Clone)]
pub struct RemoteApis {
    pub collection: Arc<dyn CollectionApi>,
    pub playlists: Arc<dyn PlaylistApi>,
    pub metadata: Arc<dyn MetadataResolver>,
}

impl RemoteApis {
    /// Route every interface through one HTTP client.
    pub fn from_client(client: Arc<SpClient>) -> Self {
        Self {
            collection: client.clone(),
            playlists: client.clone(),
            metadata: client,
        }
    }
}
