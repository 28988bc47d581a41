use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::client_id::ClientKey;
use crate::metrics::QUOTA_ENTRIES;

// Quota entry - two independent fixed windows per client key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaEntry {
    pub short_count: u32,
    pub short_window_end: DateTime<Utc>,
    pub long_count: u32,
    pub long_window_end: DateTime<Utc>,
}

impl QuotaEntry {
    fn new(now: DateTime<Utc>, short_window: TimeDelta, long_window: TimeDelta) -> Self {
        Self {
            short_count: 0,
            short_window_end: window_end(now, short_window),
            long_count: 0,
            long_window_end: window_end(now, long_window),
        }
    }

    // Lazy reset. Each window is reset on its own, never together.
    fn roll_windows(&mut self, now: DateTime<Utc>, short_window: TimeDelta, long_window: TimeDelta) {
        if now >= self.short_window_end {
            self.short_count = 0;
            self.short_window_end = window_end(now, short_window);
        }
        if now >= self.long_window_end {
            self.long_count = 0;
            self.long_window_end = window_end(now, long_window);
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.short_window_end && now >= self.long_window_end
    }
}

// Result of one admission decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmitOutcome {
    pub allowed: bool,
    pub short_remaining: u32,
    pub short_reset_at: DateTime<Utc>,
    pub long_remaining: u32,
    pub long_reset_at: DateTime<Utc>,
}

// Fixed-window limiter. An admit holds its key's shard guard from the window
// roll through the increment; other shards are not blocked.
pub struct RateLimiter {
    entries: DashMap<ClientKey, QuotaEntry>,
    short_window: TimeDelta,
    long_window: TimeDelta,
}

impl RateLimiter {
    pub fn new(short_window: Duration, long_window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            short_window: TimeDelta::from_std(short_window).unwrap_or(TimeDelta::MAX),
            long_window: TimeDelta::from_std(long_window).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn admit(&self, key: &ClientKey, short_limit: u32, long_limit: u32) -> AdmitOutcome {
        self.admit_at(key, short_limit, long_limit, Utc::now())
    }

    pub fn admit_at(
        &self,
        key: &ClientKey,
        short_limit: u32,
        long_limit: u32,
        now: DateTime<Utc>,
    ) -> AdmitOutcome {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| QuotaEntry::new(now, self.short_window, self.long_window));

        entry.roll_windows(now, self.short_window, self.long_window);

        let allowed = entry.short_count < short_limit && entry.long_count < long_limit;
        if allowed {
            entry.short_count += 1;
            entry.long_count += 1;
        }

        AdmitOutcome {
            allowed,
            short_remaining: short_limit.saturating_sub(entry.short_count),
            short_reset_at: entry.short_window_end,
            long_remaining: long_limit.saturating_sub(entry.long_count),
            long_reset_at: entry.long_window_end,
        }
    }

    // Drop entries whose windows have both run out. Returns how many went.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    // retain() write-locks each shard in turn, the same lock admit takes, so an
    // entry created concurrently is either seen with fresh window ends or not at all.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &ClientKey) -> Option<QuotaEntry> {
        self.entries.get(key).map(|e| e.clone())
    }
}

fn window_end(now: DateTime<Utc>, len: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(len).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// Background sweep - runs on its own schedule, independent of requests
pub async fn run_sweeper(limiter: Arc<RateLimiter>, sweep_interval: Duration) {
    let mut interval = interval(sweep_interval);

    tracing::info!(interval = ?sweep_interval, "quota sweeper started");

    loop {
        interval.tick().await;

        let removed = limiter.sweep();
        let remaining = limiter.len();
        QUOTA_ENTRIES.set(remaining as f64);

        if removed > 0 {
            tracing::debug!(removed, remaining, "swept expired quota entries");
        }
    }
}
