//! Fixed-interval polling loops with a stale-response guard.
//!
//! Each loop ticks on its own wall-clock interval and spawns one fetch per
//! tick, so a slow response never delays the next tick. Every tick carries a
//! monotonic sequence number; a result older than the latest applied one is
//! dropped instead of overwriting newer data.
//!
//! # Structured Concurrency
//!
//! Loops and their in-flight ticks are spawned on a `TaskTracker` and observe
//! a shared `CancellationToken`. [`PollGroup::shutdown`] cancels, closes the
//! tracker and waits; a fetch that completes after cancellation is never
//! applied.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::error::ConsoleResult;
use crate::metrics;

/// Latest result of one polling loop.
///
/// `value` is only replaced by a successful fetch; a failed tick records its
/// error and keeps the last good value.
#[derive(Debug, Clone)]
pub struct PollSlot<T> {
    pub value: Option<T>,
    /// Sequence number of the tick that produced `value` (0 = never)
    pub applied_seq: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Responses dropped because a newer tick had already been applied
    pub stale_discarded: u64,
}

impl<T> Default for PollSlot<T> {
    fn default() -> Self {
        Self {
            value: None,
            applied_seq: 0,
            last_updated: None,
            last_error: None,
            stale_discarded: 0,
        }
    }
}

impl<T> PollSlot<T> {
    /// Apply the result of tick `seq`.
    ///
    /// Returns `false` if the result was older than the applied value and was
    /// discarded.
    pub fn accept(&mut self, loop_name: &'static str, seq: u64, result: ConsoleResult<T>) -> bool {
        if seq <= self.applied_seq {
            debug!(
                loop_name,
                seq,
                applied = self.applied_seq,
                "Discarding stale poll response"
            );
            metrics::record_stale_response(loop_name);
            self.stale_discarded += 1;
            return false;
        }

        match result {
            Ok(value) => {
                self.value = Some(value);
                self.applied_seq = seq;
                self.last_updated = Some(Utc::now());
                self.last_error = None;
                metrics::record_poll_tick(loop_name, "ok");
                trace!(loop_name, seq, "Poll result applied");
            }
            Err(e) => {
                // Keep the last good value, the next tick self-heals
                warn!(loop_name, seq, error = %e, "Poll tick failed");
                self.last_error = Some(e.user_message());
                metrics::record_poll_tick(loop_name, "error");
            }
        }
        true
    }
}

/// Shared handle to a poll slot.
pub type SharedSlot<T> = Arc<RwLock<PollSlot<T>>>;

/// A set of polling loops started and torn down together.
#[derive(Clone, Default)]
pub struct PollGroup {
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl PollGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Start a loop that calls `fetch` every `period`, first tick immediately,
    /// and applies results to `slot`.
    pub fn spawn_loop<T, F, Fut>(
        &self,
        loop_name: &'static str,
        period: Duration,
        slot: SharedSlot<T>,
        fetch: F,
    ) where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ConsoleResult<T>> + Send + 'static,
    {
        let cancel = self.cancellation_token.clone();
        let tracker = self.task_tracker.clone();
        let sequence = Arc::new(AtomicU64::new(0));

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!(loop_name, "Poll loop received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let seq = sequence.fetch_add(1, Ordering::Relaxed) + 1;
                        let tick = fetch();
                        let cancel = cancel.clone();
                        let slot = slot.clone();

                        // Fire-and-forget relative to the next tick
                        tracker.spawn(async move {
                            let result = tokio::select! {
                                biased;
                                _ = cancel.cancelled() => return,
                                result = tick => result,
                            };
                            if cancel.is_cancelled() {
                                return;
                            }
                            slot.write().await.accept(loop_name, seq, result);
                        });
                    }
                }
            }

            debug!(loop_name, "Poll loop shutting down");
        });
    }

    /// Stop every loop and wait for in-flight ticks to finish.
    pub async fn shutdown(&self) {
        info!("Stopping polling loops");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All polling loops have completed");
    }
}
