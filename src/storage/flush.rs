//! Debounced flush worker.
//!
//! One background thread owns a single pending deadline. Every `schedule` call replaces the
//! deadline, so a burst of updates collapses into one write at `last request + delay`.

use crate::core::Result;
use std::future::pending;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

const WORKER_THREAD_NAME: &str = "persist-atoms-flush";

pub struct FlushScheduler {
    sender: Option<mpsc::UnboundedSender<Duration>>,
    worker: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    /// Starts the worker thread. `action` runs on that thread each time a deadline expires,
    /// and once more on shutdown if a flush is still pending.
    pub fn spawn<F>(action: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (sender, receiver) = mpsc::unbounded_channel();

        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(run_worker(receiver, action)))?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Replaces the pending deadline with `now + delay`.
    pub fn schedule(&self, delay: Duration) {
        let delivered = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(delay).is_ok());
        if !delivered {
            warn!("flush worker is gone, dropping flush request");
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        // Closing the channel makes the worker run any pending flush and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == std::thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                warn!("flush worker panicked");
            }
        }
    }
}

async fn run_worker<F: Fn()>(mut receiver: mpsc::UnboundedReceiver<Duration>, action: F) {
    let mut deadline: Option<Instant> = None;
    loop {
        let sleeper = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            request = receiver.recv() => match request {
                Some(delay) => deadline = Some(Instant::now() + delay),
                None => {
                    if deadline.take().is_some() {
                        debug!("running pending flush before shutdown");
                        action();
                    }
                    break;
                }
            },
            _ = sleeper => {
                deadline = None;
                action();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::sleep;

    fn counting_scheduler() -> (FlushScheduler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let scheduler = FlushScheduler::spawn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (scheduler, count)
    }

    #[test]
    fn test_burst_collapses_into_one_flush() {
        let (scheduler, count) = counting_scheduler();
        for _ in 0..5 {
            scheduler.schedule(Duration::from_millis(50));
        }
        sleep(Duration::from_millis(400));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_last_request_wins() {
        let (scheduler, count) = counting_scheduler();
        scheduler.schedule(Duration::from_secs(60));
        scheduler.schedule(Duration::from_millis(20));
        sleep(Duration::from_millis(400));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pending_flush_runs_on_drop() {
        let (scheduler, count) = counting_scheduler();
        scheduler.schedule(Duration::from_secs(60));
        drop(scheduler);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_idle_worker_does_not_flush() {
        let (scheduler, count) = counting_scheduler();
        drop(scheduler);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
