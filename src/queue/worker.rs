//! Background retry task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::{Dispatch, OutboundQueue};

/// Shortest period the worker ticks at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Runs retry passes on a fixed period, or sooner when the queue is woken.
#[derive(Debug)]
pub struct RetryWorker {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RetryWorker {
    /// Spawn the worker on the current runtime.
    ///
    /// `interval` is raised to at least one millisecond.
    pub fn spawn<D: Dispatch>(
        queue: Arc<OutboundQueue>,
        dispatcher: Arc<D>,
        interval: Duration,
    ) -> Self {
        if interval < MIN_INTERVAL {
            warn!(?interval, "retry interval too short, using {:?}", MIN_INTERVAL);
        }
        let interval = interval.max(MIN_INTERVAL);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(queue, dispatcher, interval, shutdown_rx));
        Self { shutdown, task }
    }

    /// Stop the worker, abandoning any attempt in flight. Entries already
    /// delivered stay delivered; the interrupted entry goes back to pending.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "retry worker ended abnormally");
        }
    }
}

async fn run<D: Dispatch>(
    queue: Arc<OutboundQueue>,
    dispatcher: Arc<D>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
            _ = queue.woken() => {}
        }
        if queue.is_closed() {
            break;
        }
        if queue.is_empty() {
            continue;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                queue.requeue_in_flight();
                break;
            }
            report = queue.retry_pass(dispatcher.as_ref()) => {
                if !report.completed.is_empty() || report.failed.is_some() {
                    debug!(
                        completed = report.completed.len(),
                        exhausted = report.exhausted.len(),
                        remaining = queue.len(),
                        "retry pass finished"
                    );
                }
            }
        }
    }
    debug!("retry worker stopped");
}
