//! Periodic background work.
//!
//! Each [`BackgroundTask`] gets its own tokio task that wakes on a fixed
//! period. All of them watch one [`CancellationToken`]; a token that is
//! already cancelled when a task is spawned stops it before its first run.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Handed to a task on every run.
pub struct Context {
    pub task_name: &'static str,
    /// 1 for the first run, counting up.
    pub run_id: u64,
}

#[async_trait::async_trait]
pub trait BackgroundTask: Send + Sync {
    fn name(&self) -> &'static str;

    /// Time between runs. The first run happens one period after spawning.
    fn interval(&self) -> Duration;

    /// A failed run is logged; the task keeps its schedule.
    async fn execute(&self, ctx: Context) -> Result<()>;
}

pub struct Scheduler {
    running: JoinSet<()>,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Tasks stop when `cancel` (or a parent of it) is cancelled, or on
    /// [`Scheduler::shutdown`].
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            running: JoinSet::new(),
            cancel,
        }
    }

    pub fn spawn<T: BackgroundTask + 'static>(&mut self, task: Arc<T>) {
        debug!(task = task.name(), period = ?task.interval(), "Spawning background task");
        self.running.spawn(run_periodically(task, self.cancel.clone()));
    }

    /// Cancels every task and waits for the ones mid-run to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        while let Some(joined) = self.running.join_next().await {
            joined.map_err(|e| Error::InvalidState(format!("background task panicked: {e}")))?;
        }
        Ok(())
    }
}

async fn run_periodically<T: BackgroundTask>(task: Arc<T>, cancel: CancellationToken) {
    let period = task.interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for run_id in 1u64.. {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let ctx = Context {
            task_name: task.name(),
            run_id,
        };
        if let Err(e) = task.execute(ctx).await {
            warn!(task = task.name(), run_id, error = %e, "Background task run failed");
        }
    }
    debug!(task = task.name(), "Background task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Counter {
        runs: AtomicU64,
        last_run_id: AtomicU64,
        fail: bool,
    }

    impl Counter {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicU64::new(0),
                last_run_id: AtomicU64::new(0),
                fail,
            })
        }

        fn runs(&self) -> u64 {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl BackgroundTask for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn execute(&self, ctx: Context) -> Result<()> {
            assert_eq!(ctx.task_name, "counter");
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.last_run_id.store(ctx.run_id, Ordering::SeqCst);
            if self.fail {
                return Err(Error::InvalidState("boom".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_runs_periodically_with_increasing_run_ids() -> Result<()> {
        let mut scheduler = Scheduler::new(CancellationToken::new());
        let counter = Counter::new(false);
        scheduler.spawn(counter.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.shutdown().await?;

        let runs = counter.runs();
        assert!(runs > 1);
        assert_eq!(counter.last_run_id.load(Ordering::SeqCst), runs);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_runs_keep_schedule() -> Result<()> {
        let mut scheduler = Scheduler::new(CancellationToken::new());
        let counter = Counter::new(true);
        scheduler.spawn(counter.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(counter.runs() > 1);
        scheduler.shutdown().await
    }

    #[tokio::test]
    async fn test_no_runs_after_shutdown() -> Result<()> {
        let mut scheduler = Scheduler::new(CancellationToken::new());
        let counter = Counter::new(false);
        scheduler.spawn(counter.clone());
        tokio::time::sleep(Duration::from_millis(25)).await;

        tokio::time::timeout(Duration::from_millis(100), scheduler.shutdown())
            .await
            .expect("shutdown took too long")?;
        let runs = counter.runs();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.runs(), runs);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_before_spawn_never_runs() -> Result<()> {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut scheduler = Scheduler::new(cancel);
        let counter = Counter::new(false);
        scheduler.spawn(counter.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.runs(), 0);
        scheduler.shutdown().await
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_tasks() -> Result<()> {
        let parent = CancellationToken::new();
        let mut scheduler = Scheduler::new(parent.child_token());
        let counter = Counter::new(false);
        scheduler.spawn(counter.clone());
        tokio::time::sleep(Duration::from_millis(25)).await;

        parent.cancel();
        // Give a run that was already in flight time to finish.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let runs = counter.runs();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.runs(), runs);
        scheduler.shutdown().await
    }
}
