//! In-memory record store.
//!
//! Backs tests and the single-process deployment. The ingestion-side
//! writes (`insert_*`) are inherent methods rather than part of the
//! [`ContentStore`] contract: the pipeline never creates records, only
//! the collaborator does.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::{
    ChannelId, ContentItem, ContentStatus, Destination, KnownChannel, ParsingSource,
    SourceIdentifier, truncate_error,
};

use super::{ContentStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    items: Vec<ContentItem>,
    channels: Vec<KnownChannel>,
    destinations: Vec<Destination>,
    sources: Vec<ParsingSource>,
    next_item_id: i64,
    next_destination_id: i64,
    next_source_id: i64,
}

/// Process-local [`ContentStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ingestion-side write: record a scraped message as `New`.
    ///
    /// `(source_channel, source_message_id)` is unique; re-ingesting
    /// an already-known message returns the existing record's id
    /// without touching it.
    pub fn insert_content(
        &self,
        source_channel: ChannelId,
        source_message_id: i64,
        raw_text: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> i64 {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .items
            .iter()
            .find(|i| i.source_channel == source_channel && i.source_message_id == source_message_id)
        {
            debug!(item = existing.id, "message already ingested");
            return existing.id;
        }
        inner.next_item_id += 1;
        let id = inner.next_item_id;
        inner.items.push(ContentItem {
            id,
            source_channel,
            source_message_id,
            raw_text: raw_text.into(),
            ai_text: None,
            status: ContentStatus::New,
            retry_count: 0,
            last_error: None,
            captured_at,
        });
        id
    }

    /// Ingestion-side write: remember a channel observed on the wire.
    pub fn insert_known_channel(
        &self,
        identity: ChannelId,
        username: Option<&str>,
        title: impl Into<String>,
    ) {
        let mut inner = self.lock();
        if inner.channels.iter().any(|c| c.identity == identity) {
            return;
        }
        inner.channels.push(KnownChannel {
            identity,
            username: username.map(|u| u.to_lowercase()),
            title: title.into(),
        });
    }

    /// Operator-side write: register a publish target.
    pub fn insert_destination(
        &self,
        chat_identifier: impl Into<String>,
        display_title: impl Into<String>,
        is_active: bool,
    ) -> i64 {
        let mut inner = self.lock();
        inner.next_destination_id += 1;
        let id = inner.next_destination_id;
        inner.destinations.push(Destination {
            id,
            chat_identifier: chat_identifier.into(),
            display_title: display_title.into(),
            is_active,
        });
        id
    }

    /// Operator-side write: bind a source identifier to a destination.
    /// `(source_identifier, destination_id)` is unique; a repeated
    /// binding returns the existing row's id.
    pub fn insert_source(&self, identifier: SourceIdentifier, destination_id: i64) -> i64 {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .sources
            .iter()
            .find(|s| s.source_identifier == identifier && s.destination_id == destination_id)
        {
            return existing.id;
        }
        inner.next_source_id += 1;
        let id = inner.next_source_id;
        inner.sources.push(ParsingSource {
            id,
            source_identifier: identifier,
            destination_id,
        });
        id
    }

    /// Test/ops helper: look at one item.
    pub fn get_item(&self, id: i64) -> Option<ContentItem> {
        self.lock().items.iter().find(|i| i.id == id).cloned()
    }
}

fn oldest_first(items: &mut [ContentItem]) {
    items.sort_by_key(|i| (i.captured_at, i.id));
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn items_with_status(
        &self,
        status: ContentStatus,
        limit: usize,
    ) -> StoreResult<Vec<ContentItem>> {
        let inner = self.lock();
        let mut matched: Vec<ContentItem> = inner
            .items
            .iter()
            .filter(|i| i.status == status)
            .cloned()
            .collect();
        drop(inner);
        oldest_first(&mut matched);
        matched.truncate(limit);
        Ok(matched)
    }

    async fn items_ready_for_publish(
        &self,
        sources: &[ChannelId],
        limit: usize,
    ) -> StoreResult<Vec<ContentItem>> {
        let inner = self.lock();
        let mut matched: Vec<ContentItem> = inner
            .items
            .iter()
            .filter(|i| i.status == ContentStatus::AiProcessed && sources.contains(&i.source_channel))
            .cloned()
            .collect();
        drop(inner);
        oldest_first(&mut matched);
        matched.truncate(limit);
        Ok(matched)
    }

    async fn items_awaiting_retry(
        &self,
        ceiling: u32,
        limit: usize,
    ) -> StoreResult<Vec<ContentItem>> {
        let inner = self.lock();
        let mut matched: Vec<ContentItem> = inner
            .items
            .iter()
            .filter(|i| i.status.is_recoverable_error() && i.retry_count < ceiling)
            .cloned()
            .collect();
        drop(inner);
        oldest_first(&mut matched);
        matched.truncate(limit);
        Ok(matched)
    }

    async fn set_status(
        &self,
        id: i64,
        status: ContentStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        let item = inner
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(StoreError::NotFound(id))?;
        if !ContentStatus::can_transition(item.status, status) {
            return Err(StoreError::IllegalTransition {
                id,
                from: item.status,
                to: status,
            });
        }
        item.status = status;
        if let Some(message) = error {
            item.last_error = Some(truncate_error(message));
        }
        Ok(())
    }

    async fn set_ai_text(&self, id: i64, text: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        let item = inner
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(StoreError::NotFound(id))?;
        if !ContentStatus::can_transition(item.status, ContentStatus::AiProcessed) {
            return Err(StoreError::IllegalTransition {
                id,
                from: item.status,
                to: ContentStatus::AiProcessed,
            });
        }
        item.ai_text = Some(text.to_string());
        item.status = ContentStatus::AiProcessed;
        Ok(())
    }

    async fn increment_retry(&self, id: i64) -> StoreResult<u32> {
        let mut inner = self.lock();
        let item = inner
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(StoreError::NotFound(id))?;
        item.retry_count += 1;
        Ok(item.retry_count)
    }

    async fn promote_exhausted(&self, ceiling: u32) -> StoreResult<u64> {
        let mut inner = self.lock();
        let mut moved = 0;
        for item in &mut inner.items {
            if item.status.is_recoverable_error() && item.retry_count >= ceiling {
                item.status = ContentStatus::ErrorPermanent;
                item.last_error = Some(truncate_error(&format!(
                    "retry ceiling of {} reached",
                    ceiling
                )));
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn recently_posted_texts(&self, since: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let inner = self.lock();
        Ok(inner
            .items
            .iter()
            .filter(|i| i.status == ContentStatus::Posted && i.captured_at >= since)
            .filter_map(|i| i.ai_text.clone())
            .collect())
    }

    async fn status_counts(&self) -> StoreResult<Vec<(ContentStatus, u64)>> {
        let inner = self.lock();
        Ok(ContentStatus::all()
            .into_iter()
            .map(|status| {
                let count = inner.items.iter().filter(|i| i.status == status).count() as u64;
                (status, count)
            })
            .collect())
    }

    async fn active_destinations(&self) -> StoreResult<Vec<Destination>> {
        let inner = self.lock();
        Ok(inner
            .destinations
            .iter()
            .filter(|d| d.is_active)
            .cloned()
            .collect())
    }

    async fn sources_for_destination(
        &self,
        destination_id: i64,
    ) -> StoreResult<Vec<ParsingSource>> {
        let inner = self.lock();
        Ok(inner
            .sources
            .iter()
            .filter(|s| s.destination_id == destination_id)
            .cloned()
            .collect())
    }

    async fn resolve_channel(
        &self,
        identifier: &SourceIdentifier,
    ) -> StoreResult<Option<KnownChannel>> {
        let inner = self.lock();
        let found = match identifier {
            SourceIdentifier::Username(name) => inner
                .channels
                .iter()
                .find(|c| c.username.as_deref() == Some(name.to_lowercase().as_str())),
            SourceIdentifier::Numeric(id) => {
                inner.channels.iter().find(|c| c.identity == ChannelId(*id))
            }
        };
        Ok(found.cloned())
    }
}
