use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::index::SortedIndex;
use crate::scheduler::{BackgroundTask, Context};

/// Server-wide counters, shared by all sessions.
#[derive(Debug, Default)]
pub struct Stats {
    connections_total: AtomicU64,
    connections_active: AtomicU64,
    scans: AtomicU64,
    entries_returned: AtomicU64,
    mutations: AtomicU64,
    protocol_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub scans: u64,
    pub entries_returned: u64,
    pub mutations: u64,
    pub protocol_errors: u64,
}

impl Stats {
    /// Count a new connection; it stays active until the guard is dropped.
    pub fn connection_opened(self: &Arc<Self>) -> ConnectionGuard {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            stats: Arc::clone(self),
        }
    }

    pub fn record_scan(&self, entries: usize) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.entries_returned
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            entries_returned: self.entries_returned.load(Ordering::Relaxed),
            mutations: self.mutations.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
        }
    }
}

/// Marks a connection as active for as long as it lives.
pub struct ConnectionGuard {
    stats: Arc<Stats>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.stats
            .connections_active
            .fetch_sub(1, Ordering::Relaxed);
    }
}

/// Periodically logs server stats and index size.
pub struct StatsTask<I> {
    stats: Arc<Stats>,
    index: Arc<I>,
    interval: Duration,
}

impl<I> StatsTask<I> {
    pub fn new(stats: Arc<Stats>, index: Arc<I>, interval: Duration) -> Self {
        Self {
            stats,
            index,
            interval,
        }
    }
}

#[async_trait::async_trait]
impl<I> BackgroundTask for StatsTask<I>
where
    I: SortedIndex + 'static,
{
    fn name(&self) -> &'static str {
        "stats"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self, ctx: Context) -> Result<()> {
        let snapshot = self.stats.snapshot();
        tracing::info!(
            run_id = ctx.run_id,
            entries = self.index.len(),
            connections_active = snapshot.connections_active,
            connections_total = snapshot.connections_total,
            scans = snapshot.scans,
            entries_returned = snapshot.entries_returned,
            mutations = snapshot.mutations,
            protocol_errors = snapshot.protocol_errors,
            "Server stats"
        );
        Ok(())
    }
}
