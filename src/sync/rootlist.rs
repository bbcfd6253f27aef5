//! The user's playlist root list, synchronized by revision instead of token.

use std::collections::BTreeMap;
use std::fmt;

use futures_util::future::try_join_all;

use super::CollectionSync;
use crate::api::wire::{ListAttributes, ListItem, PlaylistMeta, RootlistOp};
use crate::error::{Result, SyncError};
use crate::model::{CollectionRootlistItem, MirrorChanges, ScanReport, SET_ROOTLIST};

pub const IMAGE_URL_PREFIX: &str = "https://i.scdn.co/image/";

/// Rootlist revision: a big-endian counter followed by a content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub counter: u32,
    pub hash: Vec<u8>,
}

impl Revision {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(SyncError::InvalidId(format!(
                "revision {:?} is shorter than its counter",
                hex::encode(bytes)
            )));
        }
        let (counter, hash) = bytes.split_at(4);
        Ok(Self {
            counter: u32::from_be_bytes([counter[0], counter[1], counter[2], counter[3]]),
            hash: hash.to_vec(),
        })
    }
}

/// `counter,lowerhex(hash)`, the form the diff endpoint accepts.
impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.counter, hex::encode(&self.hash))
    }
}

/// Display picture of a playlist: the "default" sized url when present,
/// else the CDN url of the raw picture id, else empty.
pub fn picture_url(attributes: &ListAttributes) -> String {
    if let Some(size) = attributes
        .picture_size
        .iter()
        .find(|size| size.target_name == "default")
    {
        return size.url.clone();
    }
    if attributes.picture.is_empty() {
        return String::new();
    }
    format!("{}{}", IMAGE_URL_PREFIX, hex::encode(&attributes.picture))
}

fn rootlist_row(item: &ListItem, meta: Option<&PlaylistMeta>) -> CollectionRootlistItem {
    CollectionRootlistItem {
        uri: item.uri.clone(),
        timestamp: item.attributes.timestamp,
        name: meta.map(|m| m.attributes.name.clone()).unwrap_or_default(),
        owner_username: meta.map(|m| m.owner_username.clone()).unwrap_or_default(),
        picture: meta.map(|m| picture_url(&m.attributes)).unwrap_or_default(),
    }
}

impl CollectionSync {
    /// Sync the root list, bootstrapping when no revision is stored.
    ///
    /// `target_revision` pins the diff to a known revision (from a push);
    /// None diffs to the latest.
    pub async fn scan_rootlist(&self, target_revision: Option<&str>) -> Result<ScanReport> {
        let lock = self.scan_lock(SET_ROOTLIST);
        let _guard = lock.lock().await;
        self.rootlist_scan_locked(target_revision).await
    }

    pub(crate) async fn rootlist_scan_locked(&self, target_revision: Option<&str>) -> Result<ScanReport> {
        let local = self
            .store
            .sync_state(SET_ROOTLIST)
            .await?
            .map(|state| state.token)
            .filter(|token| !token.is_empty());

        match local {
            Some(local) if target_revision == Some(local.as_str()) => {
                tracing::debug!("Rootlist already at revision {}", local);
                Ok(ScanReport {
                    set: SET_ROOTLIST.to_string(),
                    token: local,
                    ..ScanReport::default()
                })
            }
            Some(local) => self.rootlist_delta(&local, target_revision.unwrap_or("")).await,
            None => self.rootlist_bootstrap().await,
        }
    }

    async fn rootlist_bootstrap(&self) -> Result<ScanReport> {
        let username = self.require_username()?;
        tracing::debug!("Bootstrapping rootlist of {}", username);

        let rootlist = self.apis.playlists.rootlist(username).await?;
        let revision = Revision::from_bytes(&rootlist.revision)?.to_string();

        let contents = rootlist.contents;
        let changes = MirrorChanges {
            rootlist: contents
                .items
                .iter()
                .enumerate()
                .map(|(i, item)| rootlist_row(item, contents.meta_items.get(i)))
                .collect(),
            replace_rootlist: true,
            ..MirrorChanges::default()
        };

        self.store.apply(&changes).await?;
        self.store.put_sync_state(SET_ROOTLIST, &revision).await?;

        Ok(ScanReport {
            set: SET_ROOTLIST.to_string(),
            bootstrap: true,
            pages: 1,
            upserted: changes.upsert_count(),
            deleted: 0,
            token: revision,
        })
    }

    /// Rows for added playlists, looked up concurrently. A playlist the
    /// service no longer knows keeps its entry with empty display fields.
    async fn added_rootlist_rows(&self, items: &[ListItem]) -> Result<Vec<CollectionRootlistItem>> {
        let lookups = items.iter().map(|item| async move {
            match self.apis.playlists.playlist(&item.uri).await {
                Ok(meta) => Ok(rootlist_row(item, Some(&meta))),
                Err(e) if e.is_transport() => Err(e),
                Err(e) => {
                    tracing::warn!("No metadata for rootlist entry {}: {}", item.uri, e);
                    Ok(rootlist_row(item, None))
                }
            }
        });
        try_join_all(lookups).await
    }

    async fn rootlist_delta(&self, local: &str, target: &str) -> Result<ScanReport> {
        let username = self.require_username()?;
        tracing::debug!("Performing rootlist diff {} -> {:?}", local, target);

        let diff = self
            .apis
            .playlists
            .rootlist_delta(username, local, target)
            .await?
            .diff;
        let revision = Revision::from_bytes(&diff.to_revision)?.to_string();

        // Ops fold into the last state of each uri, so order is preserved
        // while everything commits in one transaction.
        let mut net: BTreeMap<String, Option<CollectionRootlistItem>> = BTreeMap::new();
        for op in &diff.ops {
            match op {
                RootlistOp::Add { items, .. } => {
                    for row in self.added_rootlist_rows(items).await? {
                        net.insert(row.uri.clone(), Some(row));
                    }
                }
                RootlistOp::Remove { items, .. } => {
                    for item in items {
                        net.insert(item.uri.clone(), None);
                    }
                }
                RootlistOp::Move { .. }
                | RootlistOp::UpdateItemAttributes { .. }
                | RootlistOp::UpdateListAttributes { .. }
                | RootlistOp::Unknown => {
                    tracing::debug!("Ignoring rootlist op {}", op.name());
                }
            }
        }

        let mut changes = MirrorChanges::default();
        for (uri, row) in net {
            match row {
                Some(row) => changes.rootlist.push(row),
                None => changes.removed_rootlist.push(uri),
            }
        }

        if !changes.is_empty() {
            self.store.apply(&changes).await?;
        }
        self.store.put_sync_state(SET_ROOTLIST, &revision).await?;

        Ok(ScanReport {
            set: SET_ROOTLIST.to_string(),
            bootstrap: false,
            pages: 1,
            upserted: changes.upsert_count(),
            deleted: changes.delete_count(),
            token: revision,
        })
    }
}
