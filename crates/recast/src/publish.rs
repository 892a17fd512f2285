//! Publishing stage: fan an approved item out to its destination's
//! bound channels.
//!
//! Delivery is all-or-nothing per item: `Posted` only when every
//! bound channel accepted it, `ErrorPosting` when any channel failed,
//! however many others succeeded. There is no per-channel retry
//! memory; a requeued item is resent to every bound channel.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use recast_gateway_protocol::{ChannelPublisher, PublishError};

use crate::model::{ChannelId, ContentItem, ContentStatus, Destination};
use crate::routing::RoutingResolver;
use crate::store::{ContentStore, StoreResult};

/// Runs the publish boundary of the pipeline for one destination at a
/// time.
pub struct PublishStage {
    store: Arc<dyn ContentStore>,
    publisher: Arc<dyn ChannelPublisher>,
    resolver: RoutingResolver,
    batch_size: usize,
    item_delay: Duration,
}

impl PublishStage {
    pub fn new(
        store: Arc<dyn ContentStore>,
        publisher: Arc<dyn ChannelPublisher>,
        batch_size: usize,
        item_delay: Duration,
    ) -> Self {
        let resolver = RoutingResolver::new(store.clone());
        Self {
            store,
            publisher,
            resolver,
            batch_size,
            item_delay,
        }
    }

    /// Select and publish up to one batch of eligible items for
    /// `destination`. Returns how many items were handled.
    pub async fn run_for_destination(&self, destination: &Destination) -> StoreResult<usize> {
        let channels = self.resolver.resolve(destination).await?;
        if channels.is_empty() {
            debug!(
                destination = destination.id,
                "no resolvable channels, nothing to publish"
            );
            return Ok(0);
        }

        let items = self
            .store
            .items_ready_for_publish(&channels, self.batch_size)
            .await?;
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.item_delay).await;
            }
            self.publish_item(item, &channels).await?;
        }
        Ok(items.len())
    }

    async fn publish_item(&self, item: &ContentItem, channels: &[ChannelId]) -> StoreResult<()> {
        let Some(text) = item.ai_text.as_deref() else {
            // AiProcessed without rewritten text should not exist; the
            // requeue sweep would fail it permanently, so do the same.
            warn!(item = item.id, "approved item has no rewritten text");
            return self
                .store
                .set_status(
                    item.id,
                    ContentStatus::ErrorPosting,
                    Some("no rewritten text to publish"),
                )
                .await;
        };

        let mut failures: Vec<String> = Vec::new();
        for channel in channels {
            match self.deliver(*channel, text).await {
                Ok(()) => debug!(item = item.id, channel = %channel, "delivered"),
                Err(message) => {
                    warn!(item = item.id, channel = %channel, error = %message, "delivery failed");
                    failures.push(message);
                }
            }
        }

        if failures.is_empty() {
            info!(item = item.id, channels = channels.len(), "item posted");
            self.store
                .set_status(item.id, ContentStatus::Posted, None)
                .await
        } else {
            self.store
                .set_status(item.id, ContentStatus::ErrorPosting, Some(&failures.join("; ")))
                .await
        }
    }

    /// One channel attempt. Membership is verified before the send so
    /// permission failures read differently from transient delivery
    /// failures in the recorded diagnostic.
    async fn deliver(&self, channel: ChannelId, text: &str) -> Result<(), String> {
        match self.publisher.is_member(channel).await {
            Ok(true) => {}
            Ok(false) => return Err(PublishError::NotMember(channel).to_string()),
            Err(err) => {
                return Err(format!("membership check for channel {channel} failed: {err}"));
            }
        }
        self.publisher
            .send_text(channel, text)
            .await
            .map_err(|err| err.to_string())
    }
}
