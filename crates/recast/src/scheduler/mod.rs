//! Cooperative scheduling loop driving the pipeline stages.
//!
//! A single loop runs one iteration at a time: relay batch, then
//! routing + publishing per active destination, then the two
//! classifier sweeps. Between iterations it waits on whichever fires
//! first, the settings-changed notification or the idle timeout, and
//! the whole loop cancels as a unit at shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::publish::PublishStage;
use crate::relay::RelayStage;
use crate::retry::RetryClassifier;
use crate::store::ContentStore;

/// How often the routing telemetry line is emitted. Purely a log
/// cadence: routing itself is recomputed live every cycle.
const ROUTING_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Handle for poking the scheduler from outside the loop.
#[derive(Clone)]
pub struct SchedulerHandle {
    settings_changed: Arc<Notify>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    /// Wake the loop early. Called when operators edit sources or
    /// destinations; routing is recomputed every cycle regardless, so
    /// this only shortens the wait.
    pub fn notify_settings_changed(&self) {
        self.settings_changed.notify_one();
    }

    /// Stop the loop after the current iteration.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// A handle not driving any loop; enough for exercising the admin
/// surface in tests.
#[cfg(test)]
pub(crate) fn detached_handle() -> SchedulerHandle {
    SchedulerHandle {
        settings_changed: Arc::new(Notify::new()),
        cancel: CancellationToken::new(),
    }
}

/// The single pipeline worker.
pub struct Scheduler {
    store: Arc<dyn ContentStore>,
    relay: RelayStage,
    publish: PublishStage,
    retry: RetryClassifier,
    idle_interval: Duration,
    destination_delay: Duration,
    settings_changed: Arc<Notify>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ContentStore>,
        relay: RelayStage,
        publish: PublishStage,
        retry: RetryClassifier,
        idle_interval: Duration,
        destination_delay: Duration,
    ) -> (Self, SchedulerHandle) {
        let settings_changed = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let handle = SchedulerHandle {
            settings_changed: settings_changed.clone(),
            cancel: cancel.clone(),
        };
        let scheduler = Self {
            store,
            relay,
            publish,
            retry,
            idle_interval,
            destination_delay,
            settings_changed,
            cancel,
        };
        (scheduler, handle)
    }

    /// Run until the handle cancels. One iteration is in flight at any
    /// time; a slow external call delays the current iteration only.
    pub async fn run(self) {
        info!("pipeline scheduler started");
        let mut last_routing_log = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.run_cycle(&mut last_routing_log).await;

            tokio::select! {
                _ = self.settings_changed.notified() => {
                    debug!("woken early by settings change");
                }
                _ = tokio::time::sleep(self.idle_interval) => {}
                _ = self.cancel.cancelled() => break,
            }
        }
        info!("pipeline scheduler stopped");
    }

    /// One full pass over the stages. Failures are confined to the
    /// items being processed; the loop always continues.
    async fn run_cycle(&self, last_routing_log: &mut Instant) {
        if let Err(err) = self.relay.run().await {
            error!(error = %err, "relay stage failed");
        }

        match self.store.active_destinations().await {
            Ok(destinations) => {
                if last_routing_log.elapsed() >= ROUTING_LOG_INTERVAL {
                    debug!(active = destinations.len(), "routing check");
                    *last_routing_log = Instant::now();
                }
                for (index, destination) in destinations.iter().enumerate() {
                    if index > 0 {
                        tokio::time::sleep(self.destination_delay).await;
                    }
                    if let Err(err) = self.publish.run_for_destination(destination).await {
                        error!(
                            destination = destination.id,
                            error = %err,
                            "publish stage failed"
                        );
                    }
                }
            }
            Err(err) => error!(error = %err, "could not list active destinations"),
        }

        if let Err(err) = self.retry.requeue().await {
            error!(error = %err, "requeue sweep failed");
        }
        if let Err(err) = self.retry.promote().await {
            error!(error = %err, "promotion sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::dedup::{DedupCache, SystemClock};
    use crate::model::{ChannelId, ContentStatus, SourceIdentifier};
    use crate::store::MemoryStore;
    use crate::testutil::{MockRewriter, RecordingPublisher};

    struct Fixture {
        store: Arc<MemoryStore>,
        rewriter: Arc<MockRewriter>,
        publisher: Arc<RecordingPublisher>,
        scheduler: Scheduler,
        handle: SchedulerHandle,
    }

    /// A destination bound to two source channels and a scheduler
    /// wired entirely to in-process doubles.
    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store.insert_known_channel(ChannelId(-1), Some("alpha"), "Alpha");
        store.insert_known_channel(ChannelId(-2), Some("beta"), "Beta");
        let dest = store.insert_destination("@network", "Network", true);
        store.insert_source(SourceIdentifier::parse("@alpha"), dest);
        store.insert_source(SourceIdentifier::parse("@beta"), dest);

        let rewriter = Arc::new(MockRewriter::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let cache = Arc::new(DedupCache::new(24, Arc::new(SystemClock)));

        let relay = RelayStage::new(
            store.clone(),
            rewriter.clone(),
            cache,
            Arc::new(SystemClock),
            2,
            Duration::ZERO,
        );
        let publish = PublishStage::new(store.clone(), publisher.clone(), 2, Duration::ZERO);
        let retry = RetryClassifier::new(store.clone(), 3, 2);
        let (scheduler, handle) = Scheduler::new(
            store.clone(),
            relay,
            publish,
            retry,
            Duration::from_secs(10),
            Duration::ZERO,
        );

        Fixture {
            store,
            rewriter,
            publisher,
            scheduler,
            handle,
        }
    }

    #[tokio::test]
    async fn test_item_reaches_posted_in_one_cycle() {
        let fx = fixture();
        let id = fx
            .store
            .insert_content(ChannelId(-1), 1, "Bitcoin hit $100k", Utc::now());

        let mut mark = Instant::now();
        // The publish pass of a cycle already sees what its relay
        // pass approved.
        fx.scheduler.run_cycle(&mut mark).await;

        let item = fx.store.get_item(id).unwrap();
        assert_eq!(item.status, ContentStatus::Posted);
        // Fan-out hit both bound channels.
        assert_eq!(fx.publisher.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_relay_retries_until_permanent() {
        let fx = fixture();
        let id = fx
            .store
            .insert_content(ChannelId(-1), 1, "Bitcoin hit $100k", Utc::now());

        // The relay answers "nothing usable" forever.
        for _ in 0..16 {
            fx.rewriter.push(Ok(None));
        }

        let mut mark = Instant::now();
        for _ in 0..8 {
            fx.scheduler.run_cycle(&mut mark).await;
        }

        let item = fx.store.get_item(id).unwrap();
        assert_eq!(item.status, ContentStatus::ErrorPermanent);
        assert_eq!(item.retry_count, 3);
    }

    #[tokio::test]
    async fn test_inactive_destination_is_skipped() {
        let fx = fixture();
        let inactive = fx.store.insert_destination("@idle", "Idle", false);
        fx.store
            .insert_source(SourceIdentifier::parse("@alpha"), inactive);
        let id = fx
            .store
            .insert_content(ChannelId(-1), 1, "Bitcoin hit $100k", Utc::now());

        let mut mark = Instant::now();
        fx.scheduler.run_cycle(&mut mark).await;

        // Published once per bound channel of the single active
        // destination, not doubled by the inactive one.
        assert_eq!(fx.store.get_item(id).unwrap().status, ContentStatus::Posted);
        assert_eq!(fx.publisher.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let fx = fixture();
        let task = tokio::spawn(fx.scheduler.run());
        fx.handle.shutdown();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("loop did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_change_wakes_the_loop_early() {
        let fx = fixture();
        let store = fx.store.clone();
        let handle = fx.handle.clone();
        let task = tokio::spawn(fx.scheduler.run());

        // Let the first cycle run and the loop park on the idle wait.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let id = store.insert_content(ChannelId(-1), 1, "Bitcoin hit $100k", Utc::now());
        handle.notify_settings_changed();
        // Well under the 10s idle interval: only the notification can
        // have triggered the next cycle.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.get_item(id).unwrap().status, ContentStatus::Posted);
        handle.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
    }
}
