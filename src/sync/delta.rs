//! Incremental sync from a stored token.

use std::collections::HashMap;

use super::{CollectionSync, SetKind};
use crate::api::wire::{CollectionItem, DeltaRequest, DeltaResponse};
use crate::error::Result;
use crate::ids;
use crate::model::{ScanReport, SyncDeltaBatch};

/// Partition delta items into adds and per-kind removals.
///
/// A removal whose kind cannot be classified fails the whole batch, so the
/// caller never advances past a removal it could not route.
pub fn batch_from_items(items: Vec<CollectionItem>, sync_token: String) -> Result<SyncDeltaBatch> {
    let mut batch = SyncDeltaBatch {
        next_token: sync_token,
        ..SyncDeltaBatch::default()
    };
    for item in items {
        if item.is_removed {
            let kind = ids::classify(&item.uri)?;
            batch.to_remove.entry(kind).or_default().push(item.uri);
        } else {
            batch.to_add.insert(item.uri, item.added_at);
        }
    }
    Ok(batch)
}

/// Pins removals stay flat: playlists and collection pseudo-uris are not
/// entity kinds.
fn split_pins(items: Vec<CollectionItem>) -> (HashMap<String, i64>, Vec<String>) {
    let mut to_add = HashMap::new();
    let mut to_remove = Vec::new();
    for item in items {
        if item.is_removed {
            to_remove.push(item.uri);
        } else {
            to_add.insert(item.uri, item.added_at);
        }
    }
    (to_add, to_remove)
}

impl CollectionSync {
    async fn request_delta(&self, set: &str, last_token: &str) -> Result<DeltaResponse> {
        let request = DeltaRequest {
            username: self.require_username()?.to_string(),
            set: set.to_string(),
            last_sync_token: last_token.to_string(),
        };
        self.apis.collection.delta(request).await
    }

    /// Fetch and classify everything that changed in `set` since `last_token`.
    pub async fn fetch_delta(&self, set: &str, last_token: &str) -> Result<SyncDeltaBatch> {
        let response = self.request_delta(set, last_token).await?;
        batch_from_items(response.items, response.sync_token)
    }

    pub(crate) async fn delta_scan(&self, set: &str, kind: SetKind, last_token: &str) -> Result<ScanReport> {
        tracing::debug!("Performing delta request of {} [token = {}]", set, last_token);

        let (changes, token) = match kind {
            SetKind::Collection => {
                let batch = self.fetch_delta(set, last_token).await?;
                let changes = self.merge_collection(&batch.to_add, &batch.to_remove).await?;
                (changes, batch.next_token)
            }
            SetKind::Pins => {
                let response = self.request_delta(set, last_token).await?;
                let (to_add, to_remove) = split_pins(response.items);
                let changes = self.merge_pins(&to_add, &to_remove).await?;
                (changes, response.sync_token)
            }
        };

        Ok(ScanReport {
            set: set.to_string(),
            bootstrap: false,
            pages: 1,
            upserted: changes.upsert_count(),
            deleted: changes.delete_count(),
            token,
        })
    }
}
