//! Group and driver configuration.
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_WORKERS: usize = 4;

/// What a driver does with a message whose recipient was busy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// Discard the message.
    Drop,
    /// Requeue the message after an exponentially growing delay.
    Backoff {
        initial: Duration,
        max: Duration,
        /// Delivery attempts before the message is dropped. `None` retries forever.
        max_attempts: Option<u32>,
    },
}

impl RetryPolicy {
    /// Delay before the retry following `attempts` failed deliveries, or
    /// `None` if the message should be dropped instead.
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        match self {
            RetryPolicy::Drop => None,
            RetryPolicy::Backoff {
                initial,
                max,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|limit| attempts >= limit) {
                    return None;
                }
                let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
                Some(initial.saturating_mul(factor).min(*max))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Backoff {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(50),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name used in logs.
    pub name: String,
    /// Capacity of the group's delivery queue.
    pub queue_capacity: usize,
    /// Number of driver worker tasks.
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
