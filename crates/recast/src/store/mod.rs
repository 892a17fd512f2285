//! Record-store contract and the in-process implementation.
//!
//! The pipeline only ever sees [`ContentStore`]; whatever relational
//! backend sits behind it is an external collaborator. Every call is a
//! single short-lived operation. No transaction spans a stage
//! boundary, so each status transition commits independently.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    ChannelId, ContentItem, ContentStatus, Destination, KnownChannel, ParsingSource,
    SourceIdentifier,
};

/// Errors from record-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("content item {0} not found")]
    NotFound(i64),

    #[error("illegal status transition for item {id}: {from} -> {to}")]
    IllegalTransition {
        id: i64,
        from: ContentStatus,
        to: ContentStatus,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Narrow contract the pipeline consumes from the record store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Items in `status`, oldest `captured_at` first.
    async fn items_with_status(
        &self,
        status: ContentStatus,
        limit: usize,
    ) -> StoreResult<Vec<ContentItem>>;

    /// `AiProcessed` items originating from one of `sources`, oldest
    /// `captured_at` first.
    async fn items_ready_for_publish(
        &self,
        sources: &[ChannelId],
        limit: usize,
    ) -> StoreResult<Vec<ContentItem>>;

    /// Recoverable-error items with `retry_count` below `ceiling`,
    /// oldest first.
    async fn items_awaiting_retry(
        &self,
        ceiling: u32,
        limit: usize,
    ) -> StoreResult<Vec<ContentItem>>;

    /// Move item `id` to `status`. A present `error` is truncated and
    /// recorded; an absent one leaves the previous diagnostic in
    /// place. Rejects updates that do not follow an edge of the
    /// status machine.
    async fn set_status(
        &self,
        id: i64,
        status: ContentStatus,
        error: Option<&str>,
    ) -> StoreResult<()>;

    /// Record the rewritten text and mark the item `AiProcessed`.
    async fn set_ai_text(&self, id: i64, text: &str) -> StoreResult<()>;

    /// Increment the retry counter, returning the new value.
    async fn increment_retry(&self, id: i64) -> StoreResult<u32>;

    /// Promote every recoverable-error item at or past `ceiling` to
    /// `ErrorPermanent`. Returns how many items moved.
    async fn promote_exhausted(&self, ceiling: u32) -> StoreResult<u64>;

    /// Rewritten text of items posted with `captured_at` inside the
    /// trailing window.
    async fn recently_posted_texts(&self, since: DateTime<Utc>) -> StoreResult<Vec<String>>;

    /// Item counts per status, for telemetry.
    async fn status_counts(&self) -> StoreResult<Vec<(ContentStatus, u64)>>;

    /// All destinations currently marked active.
    async fn active_destinations(&self) -> StoreResult<Vec<Destination>>;

    /// Source bindings of one destination.
    async fn sources_for_destination(
        &self,
        destination_id: i64,
    ) -> StoreResult<Vec<ParsingSource>>;

    /// Resolve a source identifier against the ingestion-observed
    /// channel registry.
    async fn resolve_channel(
        &self,
        identifier: &SourceIdentifier,
    ) -> StoreResult<Option<KnownChannel>>;
}
