//! Sync scheduler - reliably gets every pending write to the remote store.
//!
//! At-least-once in transmission, exactly-once in effect (the remote
//! `mark_read` is idempotent by contract). A single worker task owns the
//! flush loop, so flushes are serialized by construction: triggers arriving
//! while a flush is outstanding coalesce into the next cycle, and no two
//! remote calls are ever in flight at once.
//!
//! Local mutations are batched behind a short debounce window (rapid-fire
//! marks while scrolling a list become one remote call). Failures retry with
//! capped exponential backoff and never drop an id: a lost "read" event is
//! invisible and unrecoverable to the user, so attempts are unbounded and
//! only the interval is bounded.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use readsync_domain::ReadStateEvent;

use crate::infrastructure::messaging::SyncBus;
use crate::ports::outbound::ReadStateRemotePort;
use crate::state::OptimisticStore;

/// Configuration for debounce and retry behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Debounce window coalescing bursts of local mutations (milliseconds)
    pub debounce_ms: u64,
    /// Base delay before the first retry (milliseconds)
    pub base_delay_ms: u64,
    /// Maximum retry delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) for randomizing retry delays
    pub jitter_factor: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
        }
    }
}

impl SyncConfig {
    /// Delay before retry number `attempt` (1-based): exponential with jitter.
    fn retry_delay_ms(&self, attempt: u32) -> u64 {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.max_delay_ms);

        let jitter_range = (capped as f64 * self.jitter_factor) as i64;
        if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        }
    }
}

/// Wake-up reasons sent to the worker task.
enum SyncTrigger {
    /// A local mutation happened; flush after the debounce window
    Debounced,
    /// Mount/unmount/tab-focus: flush now, skipping the debounce window
    Force,
    /// Stop the worker after a final best-effort drain
    Shutdown,
}

#[derive(Debug, PartialEq, Eq)]
enum LoopControl {
    Continue,
    Shutdown,
}

/// Handle to the flush worker.
///
/// Dropping the scheduler closes the trigger channel; the worker performs a
/// final best-effort drain and exits.
pub struct SyncScheduler {
    tx: mpsc::UnboundedSender<SyncTrigger>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    /// Spawn the worker task over the shared store, bus and remote port.
    pub fn spawn(
        store: Arc<OptimisticStore>,
        bus: SyncBus,
        remote: Arc<dyn ReadStateRemotePort>,
        config: SyncConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx, store, bus, remote, config));
        Self {
            tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Request a flush after the debounce window.
    ///
    /// If a flush is already in flight the trigger coalesces into the next
    /// cycle; flushes never run concurrently.
    pub fn schedule_flush(&self) {
        if self.tx.send(SyncTrigger::Debounced).is_err() {
            tracing::debug!("flush requested after scheduler shutdown");
        }
    }

    /// Request an immediate flush, bypassing the debounce window and cutting
    /// any backoff sleep short. Best-effort drain, not a blocking guarantee.
    pub fn force_sync(&self) {
        if self.tx.send(SyncTrigger::Force).is_err() {
            tracing::debug!("force_sync requested after scheduler shutdown");
        }
    }

    /// Stop the worker after one final drain attempt and wait for it to
    /// finish. Pending ids that still fail remain persisted for the next
    /// session.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(SyncTrigger::Shutdown);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "sync worker ended abnormally");
            }
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<SyncTrigger>,
    store: Arc<OptimisticStore>,
    bus: SyncBus,
    remote: Arc<dyn ReadStateRemotePort>,
    config: SyncConfig,
) {
    loop {
        let Some(trigger) = rx.recv().await else { break };
        let control = match trigger {
            SyncTrigger::Shutdown => break,
            SyncTrigger::Force => LoopControl::Continue,
            SyncTrigger::Debounced => debounce(&mut rx, config.debounce_ms).await,
        };
        if control == LoopControl::Shutdown {
            break;
        }
        if flush_until_drained(&mut rx, &store, &bus, &remote, &config).await
            == LoopControl::Shutdown
        {
            break;
        }
    }
    final_drain(&store, &bus, &remote).await;
}

/// Wait out the debounce window, absorbing further debounced triggers so a
/// burst of marks becomes one flush. A force trigger ends the window early.
async fn debounce(rx: &mut mpsc::UnboundedReceiver<SyncTrigger>, window_ms: u64) -> LoopControl {
    let deadline = Instant::now() + Duration::from_millis(window_ms);
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return LoopControl::Continue,
            trigger = rx.recv() => match trigger {
                Some(SyncTrigger::Debounced) => continue,
                Some(SyncTrigger::Force) => return LoopControl::Continue,
                Some(SyncTrigger::Shutdown) | None => return LoopControl::Shutdown,
            }
        }
    }
}

/// Flush until the queue is empty, retrying failures with backoff.
///
/// Each attempt takes a fresh snapshot, so ids marked during a backoff sleep
/// ride the next attempt instead of waiting for a new trigger.
async fn flush_until_drained(
    rx: &mut mpsc::UnboundedReceiver<SyncTrigger>,
    store: &OptimisticStore,
    bus: &SyncBus,
    remote: &Arc<dyn ReadStateRemotePort>,
    config: &SyncConfig,
) -> LoopControl {
    let mut consecutive_failures: u32 = 0;
    loop {
        let snapshot = store.flush_snapshot();
        if snapshot.is_empty() {
            return LoopControl::Continue;
        }
        let ids: Vec<String> = snapshot.iter().map(|(id, _)| id.clone()).collect();

        match remote.mark_read(&ids).await {
            Ok(()) => {
                consecutive_failures = 0;
                let confirmed = store.confirm_flushed(&snapshot);
                if !confirmed.is_empty() {
                    tracing::debug!(id_count = confirmed.len(), "flush confirmed");
                    bus.dispatch(ReadStateEvent::Confirmed { ids: confirmed });
                }
                // Ids mutated mid-flight are still queued; the next iteration
                // picks them up with their new versions.
            }
            Err(e) => {
                consecutive_failures += 1;
                store.record_failed_attempt(&snapshot, Utc::now());
                let delay_ms = config.retry_delay_ms(consecutive_failures);
                tracing::warn!(
                    id_count = ids.len(),
                    attempt = consecutive_failures,
                    delay_ms,
                    error = %e,
                    "flush failed, retrying"
                );
                if wait_for_retry(rx, delay_ms).await == LoopControl::Shutdown {
                    return LoopControl::Shutdown;
                }
            }
        }
    }
}

/// Back off before the next retry. A force trigger (tab focus) cuts the
/// sleep short; debounced triggers are absorbed since a retry is already due.
async fn wait_for_retry(rx: &mut mpsc::UnboundedReceiver<SyncTrigger>, delay_ms: u64) -> LoopControl {
    let deadline = Instant::now() + Duration::from_millis(delay_ms);
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return LoopControl::Continue,
            trigger = rx.recv() => match trigger {
                Some(SyncTrigger::Debounced) => continue,
                Some(SyncTrigger::Force) => return LoopControl::Continue,
                Some(SyncTrigger::Shutdown) | None => return LoopControl::Shutdown,
            }
        }
    }
}

/// One last flush attempt on teardown, without retries. Failures are fine:
/// the pending queue is persisted and the next session picks it up.
async fn final_drain(store: &OptimisticStore, bus: &SyncBus, remote: &Arc<dyn ReadStateRemotePort>) {
    let snapshot = store.flush_snapshot();
    if snapshot.is_empty() {
        return;
    }
    let ids: Vec<String> = snapshot.iter().map(|(id, _)| id.clone()).collect();
    match remote.mark_read(&ids).await {
        Ok(()) => {
            let confirmed = store.confirm_flushed(&snapshot);
            if !confirmed.is_empty() {
                bus.dispatch(ReadStateEvent::Confirmed { ids: confirmed });
            }
        }
        Err(e) => {
            tracing::warn!(id_count = ids.len(), error = %e, "final drain failed; pending queue left for next session");
        }
    }
}
