//! Real-time change notifications.
//!
//! Collection pushes carry raw gids and go straight into the merge; they do
//! not touch the set's sync token, so the next delta may replay them, which
//! the idempotent merge absorbs. Rootlist pushes only carry the new
//! revision, which drives a targeted rootlist diff.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::{CollectionSync, Revision};
use crate::api::wire::{CollectionUpdate, PlaylistModificationInfo};
use crate::error::Result;
use crate::ids;
use crate::model::{MirrorChanges, ScanReport};

impl CollectionSync {
    /// Uri a rootlist push must carry to concern this user.
    pub fn rootlist_uri(&self) -> String {
        format!("spotify:user:{}:rootlist", self.username)
    }

    /// Merge a decoded collection update.
    ///
    /// Entries of an unrecognized type or with a malformed identifier are
    /// skipped; the rest is merged as one batch.
    pub async fn apply_collection_push(&self, update: &CollectionUpdate) -> Result<MirrorChanges> {
        let mut to_add = HashMap::new();
        let mut to_remove: BTreeMap<_, Vec<String>> = BTreeMap::new();

        for entry in &update.items {
            let Some(kind) = entry.kind.entity_kind() else {
                tracing::warn!("Skipping pushed entry of unrecognized type");
                continue;
            };
            let uri = match ids::gid_to_uri(kind, &entry.identifier) {
                Ok(uri) => uri,
                Err(e) => {
                    tracing::warn!("Skipping pushed {}: {}", kind, e);
                    continue;
                }
            };
            if entry.removed {
                to_remove.entry(kind).or_default().push(uri);
            } else {
                to_add.insert(uri, entry.added_at);
            }
        }

        tracing::debug!(
            "Collection push: {} add(s), {} removal(s)",
            to_add.len(),
            to_remove.values().map(Vec::len).sum::<usize>()
        );
        self.merge_collection(&to_add, &to_remove).await
    }

    /// Sync the rootlist up to the pushed revision. Pushes for other users'
    /// rootlists are ignored with `Ok(None)`.
    pub async fn apply_rootlist_push(
        &self,
        info: &PlaylistModificationInfo,
    ) -> Result<Option<ScanReport>> {
        if info.uri != self.rootlist_uri() {
            tracing::debug!("Ignoring playlist push for {}", info.uri);
            return Ok(None);
        }
        let target = Revision::from_bytes(&info.new_revision)?.to_string();
        self.scan_rootlist(Some(&target)).await.map(Some)
    }

    /// Handle a collection push in the background. Failures are logged.
    pub fn on_collection_push(self: &Arc<Self>, update: CollectionUpdate) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.apply_collection_push(&update).await {
                tracing::error!("Failed to apply collection push: {}", e);
            }
        })
    }

    /// Handle a rootlist push in the background. Failures are logged.
    pub fn on_rootlist_push(self: &Arc<Self>, info: PlaylistModificationInfo) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.apply_rootlist_push(&info).await {
                tracing::error!("Failed to apply rootlist push: {}", e);
            }
        })
    }
}
