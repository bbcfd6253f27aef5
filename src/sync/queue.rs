//! Outbound collection writes.
//!
//! Callers enqueue [`PendingWriteOp`]s through a [`WriteQueue`] handle. A
//! single worker task drains whatever is ready, sends one write request per
//! set and replies to every waiting caller with the request's outcome.
//! Nothing is retried and the mirror is not touched: the change comes back
//! through the next delta or push.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};

use super::CollectionSync;
use crate::api::wire::{CollectionItem, WriteRequest};
use crate::api::CollectionApi;
use crate::error::{Result, SyncError};
use crate::ids::{self, EntityKind};
use crate::model::{PendingWriteOp, SET_COLLECTION};

const CLIENT_UPDATE_ID_LEN: usize = 16;

struct WriteJob {
    op: PendingWriteOp,
    reply: oneshot::Sender<Result<()>>,
}

/// Handle for submitting writes to the queue worker.
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::Sender<WriteJob>,
}

impl WriteQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(api: Arc<dyn CollectionApi>, username: String, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(api, username, rx));
        Self { tx }
    }

    /// Enqueue `op` and wait until the request carrying it was answered.
    pub async fn submit(&self, op: PendingWriteOp) -> Result<()> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(WriteJob { op, reply })
            .await
            .map_err(|_| SyncError::QueueClosed)?;
        outcome.await.map_err(|_| SyncError::QueueClosed)?
    }
}

async fn run_worker(api: Arc<dyn CollectionApi>, username: String, mut rx: mpsc::Receiver<WriteJob>) {
    while let Some(first) = rx.recv().await {
        let mut ready = vec![first];
        while let Ok(job) = rx.try_recv() {
            ready.push(job);
        }
        flush(api.as_ref(), &username, ready).await;
    }
    tracing::debug!("Write queue closed");
}

/// One request per set, in first-seen order of ops within each set.
async fn flush(api: &dyn CollectionApi, username: &str, jobs: Vec<WriteJob>) {
    let mut by_set: BTreeMap<String, Vec<WriteJob>> = BTreeMap::new();
    for job in jobs {
        by_set.entry(job.op.set().to_string()).or_default().push(job);
    }

    for (set, jobs) in by_set {
        let request = build_write_request(username, &set, jobs.iter().map(|job| &job.op));
        tracing::debug!(
            "Writing {} op(s) to {} [client_update_id = {}]",
            request.items.len(),
            set,
            request.client_update_id
        );

        let rejected = match api.write(request).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Write to {} failed: {}", set, e);
                Some(e.to_string())
            }
        };
        for job in jobs {
            let outcome = match &rejected {
                None => Ok(()),
                Some(message) => Err(SyncError::WriteRejected(message.clone())),
            };
            // Caller may have stopped waiting
            let _ = job.reply.send(outcome);
        }
    }
}

fn client_update_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CLIENT_UPDATE_ID_LEN)
        .map(char::from)
        .collect()
}

/// Wire request for a group of ops targeting the same set.
pub fn build_write_request<'a>(
    username: &str,
    set: &str,
    ops: impl IntoIterator<Item = &'a PendingWriteOp>,
) -> WriteRequest {
    WriteRequest {
        username: username.to_string(),
        set: set.to_string(),
        client_update_id: client_update_id(),
        items: ops
            .into_iter()
            .map(|op| match op {
                PendingWriteOp::Add { uri, added_at, .. } => CollectionItem {
                    uri: uri.clone(),
                    added_at: *added_at,
                    is_removed: false,
                },
                PendingWriteOp::Remove { uri, .. } => CollectionItem {
                    uri: uri.clone(),
                    added_at: 0,
                    is_removed: true,
                },
            })
            .collect(),
    }
}

/// What [`CollectionSync::toggle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
}

impl CollectionSync {
    /// Add `uri` to `set` remotely. Resolves once the write was answered.
    pub async fn perform_add(&self, uri: &str, set: &str) -> Result<()> {
        self.writes.submit(PendingWriteOp::add(uri, set)).await
    }

    pub async fn perform_remove(&self, uri: &str, set: &str) -> Result<()> {
        self.writes.submit(PendingWriteOp::remove(uri, set)).await
    }

    /// Flip the saved state of a track or album, judged by the local mirror.
    pub async fn toggle(&self, uri: &str) -> Result<ToggleOutcome> {
        let kind = ids::classify(uri)?;
        if !matches!(kind, EntityKind::Track | EntityKind::Album) {
            return Err(SyncError::UnsupportedEntityKind(uri.to_string()));
        }

        if self.store.contains(kind, uri).await? {
            self.perform_remove(uri, SET_COLLECTION).await?;
            Ok(ToggleOutcome::Removed)
        } else {
            self.perform_add(uri, SET_COLLECTION).await?;
            Ok(ToggleOutcome::Added)
        }
    }
}
