//! Shared test doubles for the pipeline stages.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use recast_gateway_protocol::{ChannelId, ChannelPublisher, PublishError};

use crate::dedup::Clock;
use crate::relay::{RelayError, Rewriter};

/// Test clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Scripted [`Rewriter`]: pops queued responses in order, echoing the
/// input once the queue runs dry.
#[derive(Default)]
pub struct MockRewriter {
    responses: Mutex<VecDeque<Result<Option<String>, RelayError>>>,
    call_count: Mutex<usize>,
}

impl MockRewriter {
    pub fn push(&self, response: Result<Option<String>, RelayError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// How many times `rewrite` was called.
    pub fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl Rewriter for MockRewriter {
    async fn rewrite(&self, posts: &[String]) -> Result<Option<String>, RelayError> {
        *self.call_count.lock().unwrap() += 1;
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(Some(format!("rewritten: {}", posts.join(" ")))),
        }
    }
}

/// Recording [`ChannelPublisher`] with injectable failures.
#[derive(Default)]
pub struct RecordingPublisher {
    not_member: Mutex<HashSet<i64>>,
    failing: Mutex<HashSet<i64>>,
    sent: Mutex<Vec<(i64, String)>>,
}

impl RecordingPublisher {
    /// Make the membership check fail for `channel`.
    pub fn deny_membership(&self, channel: ChannelId) {
        self.not_member.lock().unwrap().insert(channel.0);
    }

    /// Make sends to `channel` fail.
    pub fn fail_channel(&self, channel: ChannelId) {
        self.failing.lock().unwrap().insert(channel.0);
    }

    /// Every `(channel, text)` delivered so far.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelPublisher for RecordingPublisher {
    async fn is_member(&self, channel: ChannelId) -> Result<bool, PublishError> {
        Ok(!self.not_member.lock().unwrap().contains(&channel.0))
    }

    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<(), PublishError> {
        if self.failing.lock().unwrap().contains(&channel.0) {
            return Err(PublishError::Api {
                channel,
                message: "send rejected".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.0, text.to_string()));
        Ok(())
    }
}
