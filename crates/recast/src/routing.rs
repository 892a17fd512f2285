//! Source-to-destination routing.
//!
//! Resolution is recomputed from scratch every scheduler cycle: there
//! is no cached routing table, so operator edits to sources or
//! destinations take effect on the very next cycle. The scheduler's
//! settings-changed signal only shortens the idle wait.

use std::sync::Arc;

use tracing::warn;

use crate::model::{ChannelId, Destination};
use crate::store::{ContentStore, StoreResult};

/// Resolves a destination's registered source identifiers to internal
/// channel identities.
pub struct RoutingResolver {
    store: Arc<dyn ContentStore>,
}

impl RoutingResolver {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Channel identities bound to `destination`, in binding order.
    ///
    /// Identifiers that match no ingestion-observed channel are
    /// skipped with a warning rather than failing the destination.
    /// Distinct identifiers resolving to the same channel (`@name`
    /// plus the numeric id) collapse to one entry, so fan-out never
    /// delivers twice to one channel.
    pub async fn resolve(&self, destination: &Destination) -> StoreResult<Vec<ChannelId>> {
        let sources = self.store.sources_for_destination(destination.id).await?;
        let mut channels: Vec<ChannelId> = Vec::with_capacity(sources.len());
        for source in &sources {
            match self.store.resolve_channel(&source.source_identifier).await? {
                Some(channel) => {
                    if !channels.contains(&channel.identity) {
                        channels.push(channel.identity);
                    }
                }
                None => warn!(
                    destination = destination.id,
                    identifier = %source.source_identifier,
                    "source identifier matches no known channel, skipping"
                ),
            }
        }
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceIdentifier;
    use crate::store::MemoryStore;

    fn destination(store: &MemoryStore, active: bool) -> Destination {
        let id = store.insert_destination("@target", "Target", active);
        Destination {
            id,
            chat_identifier: "@target".to_string(),
            display_title: "Target".to_string(),
            is_active: active,
        }
    }

    #[tokio::test]
    async fn test_resolves_username_and_numeric_forms() {
        let store = Arc::new(MemoryStore::new());
        store.insert_known_channel(ChannelId(-100), Some("alpha"), "Alpha");
        store.insert_known_channel(ChannelId(-200), None, "Beta");
        let dest = destination(&store, true);
        store.insert_source(SourceIdentifier::parse("@Alpha"), dest.id);
        store.insert_source(SourceIdentifier::Numeric(-200), dest.id);

        let resolver = RoutingResolver::new(store);
        let channels = resolver.resolve(&dest).await.unwrap();
        assert_eq!(channels, vec![ChannelId(-100), ChannelId(-200)]);
    }

    #[tokio::test]
    async fn test_unresolved_identifier_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.insert_known_channel(ChannelId(-100), Some("alpha"), "Alpha");
        let dest = destination(&store, true);
        store.insert_source(SourceIdentifier::parse("@alpha"), dest.id);
        store.insert_source(SourceIdentifier::parse("@nosuchchannel"), dest.id);

        let resolver = RoutingResolver::new(store);
        let channels = resolver.resolve(&dest).await.unwrap();
        assert_eq!(channels, vec![ChannelId(-100)]);
    }

    #[tokio::test]
    async fn test_same_channel_through_two_identifiers_collapses() {
        let store = Arc::new(MemoryStore::new());
        store.insert_known_channel(ChannelId(-100), Some("alpha"), "Alpha");
        let dest = destination(&store, true);
        store.insert_source(SourceIdentifier::parse("@alpha"), dest.id);
        store.insert_source(SourceIdentifier::Numeric(-100), dest.id);

        let resolver = RoutingResolver::new(store);
        let channels = resolver.resolve(&dest).await.unwrap();
        assert_eq!(channels, vec![ChannelId(-100)]);
    }

    #[tokio::test]
    async fn test_destination_without_bindings_resolves_empty() {
        let store = Arc::new(MemoryStore::new());
        let dest = destination(&store, true);

        let resolver = RoutingResolver::new(store);
        assert!(resolver.resolve(&dest).await.unwrap().is_empty());
    }
}
