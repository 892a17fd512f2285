//! Process-wide duplicate suppression with wall-clock TTL expiry.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::{Fingerprint, fingerprint};

/// How many recent fingerprints the stats snapshot exposes.
const RECENT_LIMIT: usize = 10;

/// How far back a forced early clear rewinds the last-clear timestamp.
const FORCE_REWIND_HOURS: i64 = 25;

/// Wall-clock source, injected so TTL behavior is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Snapshot of cache state for the admin API.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub size: usize,
    /// Hex fingerprints, most recent first, at most ten.
    pub recent: Vec<String>,
    pub last_cleared: DateTime<Utc>,
    pub hours_since_clear: f64,
    pub hours_until_clear: f64,
    pub next_clear: DateTime<Utc>,
}

/// Outcome of checking one text against a [`BatchFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// First sighting; recorded in both sets.
    Unique,
    /// Seen earlier in this batch or within the durable window.
    Duplicate,
    /// Nothing survives normalization; never cached or compared.
    Empty,
}

struct Inner {
    seen: HashSet<Fingerprint>,
    recent: VecDeque<Fingerprint>,
    last_cleared: DateTime<Utc>,
}

/// Durable-for-the-process fingerprint set with wholesale TTL expiry.
///
/// Entries are never expired individually. Once `ttl_hours` have
/// elapsed since the last clear, the next filter pass wipes the whole
/// set and resets the timestamp. The set lives only as long as the
/// process; a restart starts from empty and only the store-backed
/// posted-window check covers earlier content.
pub struct DedupCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl DedupCache {
    pub fn new(ttl_hours: i64, clock: Arc<dyn Clock>) -> Self {
        let last_cleared = clock.now();
        Self {
            clock,
            ttl: Duration::hours(ttl_hours),
            inner: Mutex::new(Inner {
                seen: HashSet::new(),
                recent: VecDeque::new(),
                last_cleared,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a relay-batch filter pass. Runs the TTL check first, so a
    /// due auto-clear happens before any text is compared.
    pub fn begin_batch(&self) -> BatchFilter<'_> {
        self.expire_if_due();
        BatchFilter {
            cache: self,
            ephemeral: HashSet::new(),
        }
    }

    /// Convenience over [`Self::begin_batch`]: filter `texts` in
    /// order, keeping everything that is not a duplicate.
    pub fn filter_batch<'t>(&self, texts: &[&'t str]) -> Vec<&'t str> {
        let mut filter = self.begin_batch();
        texts
            .iter()
            .filter(|text| filter.check(text) != Verdict::Duplicate)
            .copied()
            .collect()
    }

    /// Wipe the durable set now. Returns how many entries were
    /// dropped.
    pub fn clear(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let cleared = inner.seen.len();
        inner.seen.clear();
        inner.recent.clear();
        inner.last_cleared = now;
        info!(cleared, "dedup cache cleared manually");
        cleared
    }

    /// Rewind the last-clear timestamp by 25 hours, then re-run the
    /// TTL check. Returns whether the check actually cleared the set.
    pub fn force_auto_clear(&self) -> bool {
        {
            let mut inner = self.lock();
            inner.last_cleared -= Duration::hours(FORCE_REWIND_HOURS);
        }
        self.expire_if_due()
    }

    /// Passive snapshot; does not trigger expiry.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let inner = self.lock();
        let since = now - inner.last_cleared;
        let hours_since = since.num_seconds() as f64 / 3600.0;
        let hours_until = (self.ttl - since).num_seconds() as f64 / 3600.0;
        CacheStats {
            size: inner.seen.len(),
            recent: inner.recent.iter().rev().map(|fp| fp.to_string()).collect(),
            last_cleared: inner.last_cleared,
            hours_since_clear: hours_since,
            hours_until_clear: hours_until.max(0.0),
            next_clear: inner.last_cleared + self.ttl,
        }
    }

    /// Number of fingerprints currently held.
    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expire_if_due(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock();
        if now - inner.last_cleared < self.ttl {
            return false;
        }
        let cleared = inner.seen.len();
        inner.seen.clear();
        inner.recent.clear();
        inner.last_cleared = now;
        info!(cleared, "dedup cache TTL elapsed, cleared");
        true
    }

    fn check_and_record(&self, fp: Fingerprint) -> Verdict {
        let mut inner = self.lock();
        if inner.seen.contains(&fp) {
            return Verdict::Duplicate;
        }
        inner.seen.insert(fp);
        inner.recent.push_back(fp);
        if inner.recent.len() > RECENT_LIMIT {
            inner.recent.pop_front();
        }
        Verdict::Unique
    }
}

/// One relay-batch filter pass over the durable set.
///
/// Holds the per-invocation ephemeral set: each accepted text is
/// recorded in both sets before the next text is checked, so
/// duplicates inside a single batch are suppressed too.
pub struct BatchFilter<'a> {
    cache: &'a DedupCache,
    ephemeral: HashSet<Fingerprint>,
}

impl BatchFilter<'_> {
    pub fn check(&mut self, text: &str) -> Verdict {
        let Some(fp) = fingerprint(text) else {
            debug!("text is empty after normalization, not cached");
            return Verdict::Empty;
        };
        if self.ephemeral.contains(&fp) {
            return Verdict::Duplicate;
        }
        let verdict = self.cache.check_and_record(fp);
        if verdict == Verdict::Unique {
            self.ephemeral.insert(fp);
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ManualClock;

    fn cache_with_manual_clock() -> (Arc<ManualClock>, DedupCache) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = DedupCache::new(24, clock.clone());
        (clock, cache)
    }

    #[test]
    fn test_batch_filter_suppresses_near_duplicates() {
        let (_clock, cache) = cache_with_manual_clock();
        let kept = cache.filter_batch(&[
            "Bitcoin hit $100k",
            "bitcoin hit 100k",
            "Ethereum upgraded",
        ]);
        assert_eq!(kept, vec!["Bitcoin hit $100k", "Ethereum upgraded"]);
    }

    #[test]
    fn test_durable_set_suppresses_across_batches() {
        let (_clock, cache) = cache_with_manual_clock();
        let first = cache.filter_batch(&["Bitcoin hit $100k"]);
        assert_eq!(first.len(), 1);
        let second = cache.filter_batch(&["BITCOIN hit 100k!!"]);
        assert!(second.is_empty());
    }

    #[test]
    fn test_empty_text_never_cached() {
        let (_clock, cache) = cache_with_manual_clock();
        let kept = cache.filter_batch(&["!!!", "???"]);
        // Neither text has a fingerprint: both pass through, nothing
        // is recorded.
        assert_eq!(kept.len(), 2);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_ttl_clears_after_25_hours() {
        let (clock, cache) = cache_with_manual_clock();
        assert_eq!(cache.filter_batch(&["Bitcoin hit $100k"]).len(), 1);
        assert_eq!(cache.len(), 1);

        clock.advance(Duration::hours(25));
        let kept = cache.filter_batch(&["bitcoin hit 100k"]);
        // Auto-clear ran before filtering, so the text is new again.
        assert_eq!(kept.len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ttl_does_not_clear_early() {
        let (clock, cache) = cache_with_manual_clock();
        cache.filter_batch(&["Bitcoin hit $100k"]);
        clock.advance(Duration::hours(23));
        assert!(cache.filter_batch(&["bitcoin hit 100k"]).is_empty());
    }

    #[test]
    fn test_manual_clear_reports_count() {
        let (_clock, cache) = cache_with_manual_clock();
        cache.filter_batch(&["one fine post", "another fine post"]);
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_force_auto_clear_rewinds_and_clears() {
        let (_clock, cache) = cache_with_manual_clock();
        cache.filter_batch(&["Bitcoin hit $100k"]);
        assert!(cache.force_auto_clear());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_force_auto_clear_respects_long_ttl() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = DedupCache::new(48, clock);
        cache.filter_batch(&["Bitcoin hit $100k"]);
        // The 25h rewind stays inside a 48h TTL: nothing is due.
        assert!(!cache.force_auto_clear());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stats_snapshot() {
        let (clock, cache) = cache_with_manual_clock();
        cache.filter_batch(&["Bitcoin hit $100k", "Ethereum upgraded"]);
        clock.advance(Duration::hours(6));

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.recent.len(), 2);
        assert!((stats.hours_since_clear - 6.0).abs() < 0.01);
        assert!((stats.hours_until_clear - 18.0).abs() < 0.01);
        assert_eq!(stats.next_clear, stats.last_cleared + Duration::hours(24));
    }

    #[test]
    fn test_recent_keeps_at_most_ten() {
        let (_clock, cache) = cache_with_manual_clock();
        let texts: Vec<String> = (0..15).map(|i| format!("post number {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        cache.filter_batch(&refs);

        let stats = cache.stats();
        assert_eq!(stats.size, 15);
        assert_eq!(stats.recent.len(), 10);
        // Most recent first.
        assert_eq!(
            stats.recent[0],
            fingerprint("post number 14").unwrap().to_string()
        );
    }
}
