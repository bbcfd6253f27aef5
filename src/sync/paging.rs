//! Full bootstrap of a set by walking its paginated snapshot.

use std::collections::BTreeMap;

use super::{CollectionSync, SetKind};
use crate::api::wire::{PageRequest, PageResponse};
use crate::error::Result;
use crate::model::{ScanReport, SyncDeltaBatch};

/// Turn one page into a batch.
///
/// Every non-removed item is an add. `next_token` is the pagination token
/// while more pages follow, and the set's sync token on the last page.
pub(crate) fn batch_from_page(page: PageResponse) -> SyncDeltaBatch {
    let has_more_pages = !page.next_page_token.is_empty();
    let to_add = page
        .items
        .into_iter()
        .filter(|item| !item.is_removed)
        .map(|item| (item.uri, item.added_at))
        .collect();
    SyncDeltaBatch {
        to_add,
        to_remove: BTreeMap::new(),
        next_token: if has_more_pages {
            page.next_page_token
        } else {
            page.sync_token
        },
        has_more_pages,
    }
}

impl CollectionSync {
    pub(crate) async fn fetch_page(&self, set: &str, pagination_token: &str) -> Result<SyncDeltaBatch> {
        let request = PageRequest {
            username: self.require_username()?.to_string(),
            set: set.to_string(),
            pagination_token: pagination_token.to_string(),
            limit: self.options.page_limit,
        };
        let page = self.apis.collection.paging(request).await?;
        Ok(batch_from_page(page))
    }

    /// Fetch and merge pages until the last one, returning its sync token in
    /// the report. Each page is committed as it arrives; the caller stores
    /// the token once the loop finishes.
    pub(crate) async fn bootstrap(&self, set: &str, kind: SetKind) -> Result<ScanReport> {
        let mut report = ScanReport {
            set: set.to_string(),
            bootstrap: true,
            ..ScanReport::default()
        };
        let mut pagination_token = String::new();

        loop {
            tracing::debug!("Performing page request of {} [pToken = {:?}]", set, pagination_token);
            let batch = self.fetch_page(set, &pagination_token).await?;
            report.pages += 1;

            let changes = match kind {
                SetKind::Collection => {
                    self.merge_collection(&batch.to_add, &batch.to_remove).await?
                }
                SetKind::Pins => self.merge_pins(&batch.to_add, &[]).await?,
            };
            report.upserted += changes.upsert_count();

            if !batch.has_more_pages {
                report.token = batch.next_token;
                break;
            }
            pagination_token = batch.next_token;
        }

        tracing::debug!("Bootstrap of {} finished after {} page(s)", set, report.pages);
        Ok(report)
    }
}
