//! Retry and permanent-failure sweeps.
//!
//! Both recoverable error kinds share one ceiling. An item is charged
//! exactly one retry per sweep pass, whichever recoverable state it
//! is in; once the ceiling is reached the promotion sweep moves it to
//! the terminal failure state in bulk.

use std::sync::Arc;

use tracing::{info, warn};

use crate::model::{ContentItem, ContentStatus};
use crate::store::{ContentStore, StoreResult};

/// Runs the two classifier sweeps of each scheduler cycle.
pub struct RetryClassifier {
    store: Arc<dyn ContentStore>,
    ceiling: u32,
    batch_size: usize,
}

impl RetryClassifier {
    pub fn new(store: Arc<dyn ContentStore>, ceiling: u32, batch_size: usize) -> Self {
        Self {
            store,
            ceiling,
            batch_size,
        }
    }

    /// Requeue sweep: give recoverable-error items below the ceiling
    /// another pass. Returns how many items were swept.
    pub async fn requeue(&self) -> StoreResult<usize> {
        let items = self
            .store
            .items_awaiting_retry(self.ceiling, self.batch_size)
            .await?;
        for item in &items {
            let retries = self.store.increment_retry(item.id).await?;
            let Some(target) = item.status.requeue_target() else {
                // items_awaiting_retry only returns recoverable states.
                continue;
            };
            match missing_prerequisite(item, target) {
                Some(reason) => {
                    warn!(item = item.id, reason, "cannot requeue, failing permanently");
                    self.store
                        .set_status(item.id, ContentStatus::ErrorPermanent, Some(reason))
                        .await?;
                }
                None => {
                    info!(item = item.id, retry = retries, target = %target, "item requeued");
                    self.store.set_status(item.id, target, None).await?;
                }
            }
        }
        Ok(items.len())
    }

    /// Promotion sweep: exhausted items become permanent failures.
    pub async fn promote(&self) -> StoreResult<u64> {
        let moved = self.store.promote_exhausted(self.ceiling).await?;
        if moved > 0 {
            info!(items = moved, "promoted exhausted items to permanent failure");
        }
        Ok(moved)
    }
}

/// An item requeued into `target` must carry the data that state
/// needs: raw text to resend to the relay, rewritten text to
/// republish.
fn missing_prerequisite(item: &ContentItem, target: ContentStatus) -> Option<&'static str> {
    match target {
        ContentStatus::New if item.raw_text.trim().is_empty() => {
            Some("no raw text to resend to the relay")
        }
        ContentStatus::AiProcessed
            if item.ai_text.as_deref().is_none_or(|t| t.trim().is_empty()) =>
        {
            Some("no rewritten text to republish")
        }
        _ => None,
    }
}
