//! AI relay stage: dedup-filter new items, submit them to the
//! rewriting service, and advance their status.
//!
//! Two duplicate checks run here, deliberately independent of each
//! other. The in-memory cache filters raw text before anything is
//! sent; the store-backed check compares the rewritten text against
//! everything posted in the trailing 24 hours before the item is
//! approved for publishing. They share no state and can disagree:
//! the cache dies with the process, while the store query only sees
//! what actually got posted.

mod client;
mod error;

pub use client::{HttpRewriter, MIN_USABLE_LEN, Rewriter};
pub use error::RelayError;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as TimeDelta;
use tracing::{debug, info, warn};

use crate::dedup::{BatchFilter, Clock, DedupCache, Verdict, fingerprint};
use crate::model::{ContentItem, ContentStatus};
use crate::store::{ContentStore, StoreResult};

/// Trailing window, in hours, for the store-backed duplicate check at
/// the publish-approval boundary.
const POSTED_WINDOW_HOURS: i64 = 24;

/// Runs the relay boundary of the pipeline.
pub struct RelayStage {
    store: Arc<dyn ContentStore>,
    rewriter: Arc<dyn Rewriter>,
    cache: Arc<DedupCache>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    item_delay: Duration,
}

impl RelayStage {
    pub fn new(
        store: Arc<dyn ContentStore>,
        rewriter: Arc<dyn Rewriter>,
        cache: Arc<DedupCache>,
        clock: Arc<dyn Clock>,
        batch_size: usize,
        item_delay: Duration,
    ) -> Self {
        Self {
            store,
            rewriter,
            cache,
            clock,
            batch_size,
            item_delay,
        }
    }

    /// Process up to one batch of `New` items. Returns how many were
    /// handled. Per-item relay failures become item statuses, never
    /// errors; only store failures abort the batch.
    pub async fn run(&self) -> StoreResult<usize> {
        let items = self
            .store
            .items_with_status(ContentStatus::New, self.batch_size)
            .await?;
        if items.is_empty() {
            return Ok(0);
        }

        let mut filter = self.cache.begin_batch();
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.item_delay).await;
            }
            self.process_item(item, &mut filter).await?;
        }
        Ok(items.len())
    }

    async fn process_item(
        &self,
        item: &ContentItem,
        filter: &mut BatchFilter<'_>,
    ) -> StoreResult<()> {
        self.store
            .set_status(item.id, ContentStatus::SentToAi, None)
            .await?;

        if filter.check(&item.raw_text) == Verdict::Duplicate {
            debug!(item = item.id, "raw text duplicates cached content");
            return self
                .store
                .set_status(
                    item.id,
                    ContentStatus::ErrorAiProcessing,
                    Some("duplicate of recently relayed content"),
                )
                .await;
        }

        let posts = [item.raw_text.clone()];
        match self.rewriter.rewrite(&posts).await {
            Err(RelayError::Transport(message)) => {
                warn!(item = item.id, error = %message, "relay unreachable");
                self.store
                    .set_status(item.id, ContentStatus::ErrorSendingToAi, Some(&message))
                    .await
            }
            Err(err) => {
                warn!(item = item.id, error = %err, "relay rejected request");
                self.store
                    .set_status(item.id, ContentStatus::ErrorAiProcessing, Some(&err.to_string()))
                    .await
            }
            Ok(None) => {
                debug!(item = item.id, "relay produced nothing usable");
                self.store
                    .set_status(
                        item.id,
                        ContentStatus::ErrorAiProcessing,
                        Some("relay returned no usable text"),
                    )
                    .await
            }
            Ok(Some(text)) => {
                if self.duplicates_recent_post(&text).await? {
                    info!(item = item.id, "rewritten text duplicates a recent post");
                    self.store
                        .set_status(
                            item.id,
                            ContentStatus::ErrorAiProcessing,
                            Some("rewritten text duplicates a post from the last 24h"),
                        )
                        .await
                } else {
                    debug!(item = item.id, "rewritten text accepted");
                    self.store.set_ai_text(item.id, &text).await
                }
            }
        }
    }

    /// Store-backed check: does `text` fingerprint-match anything
    /// posted within the trailing window?
    async fn duplicates_recent_post(&self, text: &str) -> StoreResult<bool> {
        let Some(fp) = fingerprint(text) else {
            return Ok(false);
        };
        let since = self.clock.now() - TimeDelta::hours(POSTED_WINDOW_HOURS);
        let recent = self.store.recently_posted_texts(since).await?;
        Ok(recent.iter().any(|posted| fingerprint(posted) == Some(fp)))
    }
}
