//! Cancellable recurring tasks
//!
//! Each schedule owns a loop driven by `tokio::time::interval`. Every
//! tick spawns the operation as its own task, so a slow request never
//! delays the next tick. Errors and panics are logged and the schedule
//! keeps running; there is no backoff or retry cap.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::error::Result;

/// Boxed recurring operation
pub type Operation = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Handle to one schedule; stopping it also aborts its in-flight runs
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: Arc<str>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop(&self) {
        // send_replace never fails, even with the loop already gone
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }
}

/// Owner of all scheduled tasks
#[derive(Debug, Default)]
pub struct Poller {
    tasks: Vec<(TaskHandle, JoinHandle<()>)>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` now and then every `interval` until stopped
    pub fn schedule<F, Fut>(&mut self, name: &str, interval: Duration, operation: F) -> TaskHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let operation: Operation = Arc::new(move || operation().boxed());
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = TaskHandle {
            name: Arc::from(name),
            stop_tx: Arc::new(stop_tx),
        };

        let join = tokio::spawn(run_schedule(
            Arc::clone(&handle.name),
            interval,
            operation,
            stop_rx,
        ));

        tracing::debug!(task = name, interval_ms = interval.as_millis() as u64, "scheduled");
        self.tasks.push((handle.clone(), join));
        handle
    }

    pub fn handles(&self) -> impl Iterator<Item = &TaskHandle> {
        self.tasks.iter().map(|(h, _)| h)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop every schedule and wait for the loops to exit
    pub async fn shutdown(self) {
        for (handle, _) in &self.tasks {
            handle.stop();
        }
        for (handle, join) in self.tasks {
            if let Err(e) = join.await {
                tracing::warn!(task = handle.name(), error = %e, "schedule ended abnormally");
            }
        }
        tracing::debug!("poller stopped");
    }
}

async fn run_schedule(
    name: Arc<str>,
    interval: Duration,
    operation: Operation,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let op = Arc::clone(&operation);
                let task = Arc::clone(&name);
                running.spawn(async move {
                    if let Err(e) = op().await {
                        tracing::warn!(task = %task, kind = e.kind(), error = %e, "scheduled operation failed");
                    }
                });
            }
            Some(joined) = running.join_next(), if !running.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        tracing::error!(task = %name, "scheduled operation panicked");
                    }
                }
            }
        }
    }

    // Abort runs still in flight
    running.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_op(counter: &Arc<AtomicUsize>, fail: bool) -> impl Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(DashboardError::Network("connection refused".into()))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_and_repeats() {
        let mut poller = Poller::new();
        let count = Arc::new(AtomicUsize::new(0));
        poller.schedule("market", Duration::from_millis(100), counter_op(&count, false));

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(count.load(Ordering::SeqCst) >= 3);
        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_cancel_or_affect_others() {
        let mut poller = Poller::new();
        let failing = Arc::new(AtomicUsize::new(0));
        let healthy = Arc::new(AtomicUsize::new(0));
        poller.schedule("wallet", Duration::from_millis(100), counter_op(&failing, true));
        poller.schedule("status", Duration::from_millis(100), counter_op(&healthy, false));

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!(failing.load(Ordering::SeqCst) >= 4);
        assert!(healthy.load(Ordering::SeqCst) >= 4);
        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_one_schedule() {
        let mut poller = Poller::new();
        let stopped = Arc::new(AtomicUsize::new(0));
        let kept = Arc::new(AtomicUsize::new(0));
        let handle = poller.schedule("trades", Duration::from_millis(100), counter_op(&stopped, false));
        poller.schedule("status", Duration::from_millis(100), counter_op(&kept, false));

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.stop();
        assert!(handle.is_stopped());
        tokio::time::sleep(Duration::from_millis(10)).await;
        let frozen = stopped.load(Ordering::SeqCst);
        let kept_before = kept.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(stopped.load(Ordering::SeqCst), frozen);
        assert!(kept.load(Ordering::SeqCst) > kept_before);
        assert_eq!(poller.len(), 2);
        poller.shutdown().await;
    }
}
