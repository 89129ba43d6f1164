//! Background sweep scheduler
//!
//! One loop per process. Every `interval` it runs an incremental sweep over
//! all users. A tick that arrives while the previous sweep is still running is
//! skipped and counted, never queued.

use crate::cancel::CancellationToken;
use crate::error::{Result, ScoutError};
use crate::report::SweepReport;
use crate::sync::{SyncEngine, SyncMode};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// What a single tick did.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    Ran(SweepReport),
    /// A sweep was already running
    Skipped,
    /// The archive root could not be listed
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub sweeps_completed: u64,
    pub sweeps_skipped: u64,
    pub sweeps_failed: u64,
    pub in_progress: bool,
}

struct SchedulerInner {
    engine: SyncEngine,
    interval: Duration,
    cancel: CancellationToken,
    shutdown: Notify,
    started: AtomicBool,
    sweep_running: AtomicBool,
    completed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    last_report: Mutex<Option<SweepReport>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Marks a sweep as running until dropped.
struct SweepSlot {
    inner: Arc<SchedulerInner>,
}

impl Drop for SweepSlot {
    fn drop(&mut self) {
        self.inner.sweep_running.store(false, Ordering::SeqCst);
    }
}

/// Periodic sweep service with an explicit `start`/`stop` lifecycle.
#[derive(Clone)]
pub struct ScanScheduler {
    inner: Arc<SchedulerInner>,
}

impl ScanScheduler {
    pub fn new(engine: SyncEngine, interval: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                engine,
                interval,
                cancel: CancellationToken::new(),
                shutdown: Notify::new(),
                started: AtomicBool::new(false),
                sweep_running: AtomicBool::new(false),
                completed: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                last_report: Mutex::new(None),
                loop_handle: Mutex::new(None),
                sweep_handle: Mutex::new(None),
            }),
        }
    }

    /// Spawn the loop. The first sweep starts immediately.
    pub fn start(&self) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(ScoutError::InvalidState("Scheduler already stopped".to_string()));
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(ScoutError::InvalidState("Scheduler already started".to_string()));
        }

        let scheduler = self.clone();
        let handle = tokio::spawn(async move { scheduler.run_loop().await });
        *lock(&self.inner.loop_handle) = Some(handle);

        info!(interval_secs = self.inner.interval.as_secs(), "Scheduler started");
        Ok(())
    }

    /// Stop the loop and wait for an in-flight sweep.
    ///
    /// The running sweep finishes the user scans it has started; users not
    /// yet started are skipped.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        self.inner.shutdown.notify_one();

        if let Some(handle) = take_handle(&self.inner.loop_handle) {
            let _ = handle.await;
        }
        if let Some(handle) = take_handle(&self.inner.sweep_handle) {
            let _ = handle.await;
        }

        info!("Scheduler stopped");
    }

    /// Run one sweep inline, or skip if one is already running.
    pub async fn tick(&self) -> TickOutcome {
        match self.claim() {
            Some(slot) => self.inner.run_sweep(slot).await,
            None => self.record_skip(),
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            sweeps_completed: self.inner.completed.load(Ordering::SeqCst),
            sweeps_skipped: self.inner.skipped.load(Ordering::SeqCst),
            sweeps_failed: self.inner.failed.load(Ordering::SeqCst),
            in_progress: self.inner.sweep_running.load(Ordering::SeqCst),
        }
    }

    pub fn last_report(&self) -> Option<SweepReport> {
        lock(&self.inner.last_report).clone()
    }

    async fn run_loop(&self) {
        let mut ticker = tokio::time::interval(self.inner.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.inner.shutdown.notified() => break,

                _ = ticker.tick() => {
                    if self.inner.cancel.is_cancelled() {
                        break;
                    }
                    self.spawn_sweep();
                }
            }
        }
    }

    fn spawn_sweep(&self) {
        let Some(slot) = self.claim() else {
            self.record_skip();
            return;
        };

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            inner.run_sweep(slot).await;
        });
        *lock(&self.inner.sweep_handle) = Some(handle);
    }

    fn claim(&self) -> Option<SweepSlot> {
        self.inner
            .sweep_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SweepSlot {
                inner: Arc::clone(&self.inner),
            })
    }

    fn record_skip(&self) -> TickOutcome {
        let skipped = self.inner.skipped.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(skipped_total = skipped, "Previous sweep still running, skipping this tick");
        TickOutcome::Skipped
    }
}

impl SchedulerInner {
    async fn run_sweep(&self, slot: SweepSlot) -> TickOutcome {
        let outcome = match self.engine.sync_all(SyncMode::Incremental, &self.cancel).await {
            Ok(report) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                *lock(&self.last_report) = Some(report.clone());
                TickOutcome::Ran(report)
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                error!(error = %e, "Sweep failed");
                TickOutcome::Failed(e.to_string())
            }
        };
        drop(slot);
        outcome
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn take_handle(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
    lock(slot).take()
}
