//! Pipeline data model: content items, source bindings, destinations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use recast_gateway_protocol::ChannelId;

/// Upper bound on a stored error diagnostic, in characters.
pub const MAX_ERROR_LEN: usize = 500;

/// Truncate a diagnostic to [`MAX_ERROR_LEN`] characters.
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_LEN {
        message.to_string()
    } else {
        message.chars().take(MAX_ERROR_LEN).collect()
    }
}

// ============================================================================
// ContentStatus
// ============================================================================

/// Processing status of a content item.
///
/// Happy path: `New → SentToAi → AiProcessed → Posted`. The error
/// branches feed the retry sweeps; `Posted` and `ErrorPermanent` are
/// terminal. `SentToAi` and `ErrorSendingToAi` have no automatic
/// recovery edge: an item stranded there (crash between dispatch and
/// response, or an unreachable relay) stays put until an operator
/// intervenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    New,
    SentToAi,
    AiProcessed,
    Posted,
    ErrorSendingToAi,
    ErrorAiProcessing,
    ErrorPosting,
    ErrorPermanent,
}

impl ContentStatus {
    /// Statuses that never leave the pipeline again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Posted | Self::ErrorPermanent)
    }

    /// Statuses the requeue sweep may bring back into the pipeline.
    pub fn is_recoverable_error(self) -> bool {
        matches!(self, Self::ErrorAiProcessing | Self::ErrorPosting)
    }

    /// Where a requeued item resumes, if this status is requeueable.
    pub fn requeue_target(self) -> Option<Self> {
        match self {
            Self::ErrorAiProcessing => Some(Self::New),
            Self::ErrorPosting => Some(Self::AiProcessed),
            _ => None,
        }
    }

    /// Whether `from → to` follows an edge of the status machine.
    ///
    /// The store rejects updates that fail this predicate, so an
    /// illegal transition is a hard error rather than silent state
    /// corruption.
    pub fn can_transition(from: Self, to: Self) -> bool {
        use ContentStatus::*;
        matches!(
            (from, to),
            (New, SentToAi)
                | (SentToAi, ErrorSendingToAi)
                | (SentToAi, ErrorAiProcessing)
                | (SentToAi, AiProcessed)
                | (ErrorAiProcessing, New)
                | (ErrorAiProcessing, ErrorPermanent)
                | (AiProcessed, Posted)
                | (AiProcessed, ErrorPosting)
                | (ErrorPosting, AiProcessed)
                | (ErrorPosting, ErrorPermanent)
        )
    }

    /// Stable lowercase name used in logs and the admin API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::SentToAi => "sent_to_ai",
            Self::AiProcessed => "ai_processed",
            Self::Posted => "posted",
            Self::ErrorSendingToAi => "error_sending_to_ai",
            Self::ErrorAiProcessing => "error_ai_processing",
            Self::ErrorPosting => "error_posting",
            Self::ErrorPermanent => "error_permanent",
        }
    }

    /// All statuses, for per-status telemetry.
    pub fn all() -> [Self; 8] {
        [
            Self::New,
            Self::SentToAi,
            Self::AiProcessed,
            Self::Posted,
            Self::ErrorSendingToAi,
            Self::ErrorAiProcessing,
            Self::ErrorPosting,
            Self::ErrorPermanent,
        ]
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ContentItem
// ============================================================================

/// One ingested post and its progress through the pipeline.
///
/// Created by the ingestion side with `status = New`; mutated only by
/// the pipeline stages; never physically deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    /// Stable internal identity of the originating channel.
    pub source_channel: ChannelId,
    /// Message id within the source channel. `(source_channel,
    /// source_message_id)` is unique: re-ingesting the same message
    /// resolves to the existing record.
    pub source_message_id: i64,
    pub raw_text: String,
    /// Rewritten text, present once the relay accepted the item.
    pub ai_text: Option<String>,
    pub status: ContentStatus,
    pub retry_count: u32,
    /// Latest diagnostic, truncated to [`MAX_ERROR_LEN`].
    pub last_error: Option<String>,
    pub captured_at: DateTime<Utc>,
}

// ============================================================================
// Sources and destinations
// ============================================================================

/// External identifier of a parsing source, as registered by operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceIdentifier {
    /// `@username` form; resolves by the stored channel username.
    Username(String),
    /// Raw numeric channel identity.
    Numeric(i64),
}

impl SourceIdentifier {
    /// Parse the operator-entered form. A leading `@` or any
    /// non-numeric text is a username (lowercased, since platform
    /// usernames are case-insensitive); otherwise a numeric identity.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(stripped) = trimmed.strip_prefix('@') {
            Self::Username(stripped.to_lowercase())
        } else if let Ok(id) = trimmed.parse::<i64>() {
            Self::Numeric(id)
        } else {
            Self::Username(trimmed.to_lowercase())
        }
    }
}

impl fmt::Display for SourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Username(name) => write!(f, "@{}", name),
            Self::Numeric(id) => id.fmt(f),
        }
    }
}

/// Binding from one external source identifier to one destination.
///
/// `(source_identifier, destination_id)` is unique: the same source
/// may feed several destinations through separate bindings, but is
/// never bound twice to the same destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingSource {
    pub id: i64,
    pub source_identifier: SourceIdentifier,
    pub destination_id: i64,
}

/// A configured publish target.
///
/// Several destinations may be active at once; fan-out is
/// per-destination, not globally exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: i64,
    pub chat_identifier: String,
    pub display_title: String,
    pub is_active: bool,
}

/// A channel previously observed by the ingestion side. Source
/// identifiers resolve against this registry: username forms by the
/// stored username, numeric forms by the stored identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownChannel {
    pub identity: ChannelId,
    pub username: Option<String>,
    pub title: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_edges() {
        use ContentStatus::*;
        assert!(ContentStatus::can_transition(New, SentToAi));
        assert!(ContentStatus::can_transition(SentToAi, AiProcessed));
        assert!(ContentStatus::can_transition(AiProcessed, Posted));
    }

    #[test]
    fn test_error_and_requeue_edges() {
        use ContentStatus::*;
        assert!(ContentStatus::can_transition(SentToAi, ErrorSendingToAi));
        assert!(ContentStatus::can_transition(SentToAi, ErrorAiProcessing));
        assert!(ContentStatus::can_transition(ErrorAiProcessing, New));
        assert!(ContentStatus::can_transition(ErrorAiProcessing, ErrorPermanent));
        assert!(ContentStatus::can_transition(AiProcessed, ErrorPosting));
        assert!(ContentStatus::can_transition(ErrorPosting, AiProcessed));
        assert!(ContentStatus::can_transition(ErrorPosting, ErrorPermanent));
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for from in [ContentStatus::Posted, ContentStatus::ErrorPermanent] {
            for to in ContentStatus::all() {
                assert!(
                    !ContentStatus::can_transition(from, to),
                    "unexpected edge {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_error_sending_to_ai_is_dead_letter() {
        for to in ContentStatus::all() {
            assert!(
                !ContentStatus::can_transition(ContentStatus::ErrorSendingToAi, to),
                "unexpected edge error_sending_to_ai -> {to}"
            );
        }
    }

    #[test]
    fn test_requeue_targets() {
        assert_eq!(
            ContentStatus::ErrorAiProcessing.requeue_target(),
            Some(ContentStatus::New)
        );
        assert_eq!(
            ContentStatus::ErrorPosting.requeue_target(),
            Some(ContentStatus::AiProcessed)
        );
        assert_eq!(ContentStatus::ErrorSendingToAi.requeue_target(), None);
        assert_eq!(ContentStatus::Posted.requeue_target(), None);
    }

    #[test]
    fn test_recoverable_matches_requeue_targets() {
        for status in ContentStatus::all() {
            assert_eq!(
                status.is_recoverable_error(),
                status.requeue_target().is_some()
            );
        }
    }

    #[test]
    fn test_truncate_error_bounds_length() {
        let long = "x".repeat(MAX_ERROR_LEN * 2);
        assert_eq!(truncate_error(&long).chars().count(), MAX_ERROR_LEN);
        assert_eq!(truncate_error("short"), "short");
    }

    #[test]
    fn test_source_identifier_parse() {
        assert_eq!(
            SourceIdentifier::parse("@CryptoNews"),
            SourceIdentifier::Username("cryptonews".to_string())
        );
        assert_eq!(
            SourceIdentifier::parse("-1001234567"),
            SourceIdentifier::Numeric(-1001234567)
        );
        assert_eq!(
            SourceIdentifier::parse("  plainname "),
            SourceIdentifier::Username("plainname".to_string())
        );
    }
}
