//! An outer delivery loop for a group.
//!
//! Actors never wait for one another: a busy actor hands its message straight
//! back. The driver is one answer to what happens next. It drains the group's
//! delivery queue on a set of worker tasks and applies the group's
//! [`RetryPolicy`] to messages whose recipient was busy.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actor::Dispatch;
use crate::config::RetryPolicy;
use crate::group::{DeliveryError, Group, Pending};

#[cfg(test)]
#[path = "driver.test.rs"]
mod tests;

#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    /// The queue was already taken by a driver, running or shut down.
    #[error("Group '{0}' is already being driven")]
    AlreadyDriven(String),
}

/// Delivery counters of a running driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Messages an actor reacted to successfully.
    pub delivered: u64,
    /// Busy rejections that were scheduled for another attempt.
    pub retried: u64,
    /// Messages discarded by the retry policy or because the recipient is unknown.
    pub dropped: u64,
    /// Reactions that returned an error or panicked.
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DriverStats {
        DriverStats {
            delivered: self.delivered.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

pub struct Driver {
    group: Group,
}

impl Driver {
    pub fn new(group: Group) -> Self {
        Self { group }
    }

    /// Take over the group's delivery queue and start the worker tasks.
    ///
    /// Must be called from within a tokio runtime. Cancelling `cancellation`
    /// stops the workers; queued and backing-off messages are discarded.
    /// Once the workers have stopped the queue is closed for good, and sending
    /// through the group fails with [`GroupError::QueueClosed`](crate::group::GroupError::QueueClosed).
    pub fn start(self, cancellation: CancellationToken) -> Result<DriverHandle, DriverError> {
        let receiver = self
            .group
            .take_receiver()
            .ok_or_else(|| DriverError::AlreadyDriven(self.group.name().to_string()))?;
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let counters = Arc::new(Counters::default());
        let workers = self.group.config().workers.max(1);

        tracing::info!(group = %self.group.name(), workers, "starting driver");
        let workers = (0..workers)
            .map(|worker| {
                let runtime = WorkerRuntime {
                    worker,
                    group: self.group.clone(),
                    receiver: receiver.clone(),
                    counters: counters.clone(),
                    cancellation: cancellation.clone(),
                };
                tokio::spawn(runtime.run())
            })
            .collect();

        Ok(DriverHandle {
            cancellation,
            workers,
            counters,
        })
    }
}

pub struct DriverHandle {
    cancellation: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl DriverHandle {
    pub fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }

    /// Stop all workers and wait for them to exit.
    pub async fn shutdown(self) -> DriverStats {
        self.cancellation.cancel();
        for result in futures::future::join_all(self.workers).await {
            if let Err(err) = result {
                tracing::error!(error = %err, "driver worker exited abnormally");
            }
        }
        self.counters.snapshot()
    }
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("workers", &self.workers.len())
            .field("stats", &self.stats())
            .finish()
    }
}

struct WorkerRuntime {
    worker: usize,
    group: Group,
    receiver: Arc<AsyncMutex<mpsc::Receiver<Pending>>>,
    counters: Arc<Counters>,
    cancellation: CancellationToken,
}

impl WorkerRuntime {
    #[tracing::instrument(name = "driver", skip(self), fields(group = %self.group.name(), worker = self.worker))]
    async fn run(self) {
        tracing::debug!("starting worker loop");
        loop {
            let pending = tokio::select! {
                _ = self.cancellation.cancelled() => break,
                pending = async { self.receiver.lock().await.recv().await } => pending,
            };
            match pending {
                Some(pending) => self.tick(pending).await,
                None => break,
            }
        }
        tracing::debug!("worker loop stopped");
    }

    async fn tick(&self, pending: Pending) {
        let Pending { message, attempts } = pending;
        let recipient = message.recipient();
        let group = self.group.clone();

        // Reactions are synchronous and may block.
        let outcome = tokio::task::spawn_blocking(move || group.deliver(message)).await;

        match outcome {
            Ok(Ok(Dispatch::Accepted)) => {
                self.counters.delivered.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Ok(Dispatch::Busy(message))) => {
                self.retry(Pending {
                    message,
                    attempts: attempts + 1,
                });
            }
            Ok(Err(DeliveryError::UnknownActor(id))) => {
                tracing::warn!(actor = %id, "dropping message for unknown actor");
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(err)) => {
                tracing::error!(actor = %recipient, error = %err, "reaction failed");
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => {
                tracing::error!(actor = %recipient, error = %err, "reaction panicked");
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn retry(&self, pending: Pending) {
        let recipient = pending.message.recipient();
        let policy: &RetryPolicy = &self.group.config().retry;
        let Some(delay) = policy.next_delay(pending.attempts) else {
            tracing::warn!(actor = %recipient, attempts = pending.attempts, "actor busy, dropping message");
            self.counters.dropped.fetch_add(1, Ordering::SeqCst);
            return;
        };

        tracing::debug!(actor = %recipient, attempts = pending.attempts, ?delay, "actor busy, retrying");
        self.counters.retried.fetch_add(1, Ordering::SeqCst);

        let queue = self.group.queue();
        let cancellation = self.cancellation.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancellation.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if queue.send(pending).await.is_err() {
                        tracing::warn!(actor = %recipient, "delivery queue closed, dropping retry");
                    }
                }
            }
        });
    }
}
