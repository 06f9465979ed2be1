//! One worker: a closed loop driving its own adapter at its share of the
//! target rate.
//!
//! The throttle sleeps to absolute deadlines (`start + k × tick`) so that a
//! slow operation is followed by a burst that restores the long-term rate,
//! and the deadline of the next tick is the *intended* start handed to the
//! measuring wrapper.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::Stage;
use crate::error::Result;
use crate::store::wrapper::MeasuredStore;
use crate::workload::CoreWorkload;

/// Progress counters observable by the status reporter.
#[derive(Debug)]
pub struct WorkerProgress {
    done: AtomicU64,
    total: u64,
}

impl WorkerProgress {
    fn new(total: u64) -> Self {
        Self {
            done: AtomicU64::new(0),
            total,
        }
    }

    pub fn ops_done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Remaining share; zero when the share is unbounded.
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.ops_done())
    }
}

/// What a worker hands back when its loop ends.
pub struct WorkerOutcome {
    pub id: usize,
    pub store: MeasuredStore,
    pub ops_done: u64,
    pub result: Result<()>,
}

pub struct Worker {
    id: usize,
    store: MeasuredStore,
    workload: Arc<CoreWorkload>,
    stage: Stage,
    /// This worker's share of the total op count; 0 means unbounded.
    op_count: u64,
    /// Inter-op deadline interval; `None` disables throttling.
    tick: Option<Duration>,
    rng: SmallRng,
    progress: Arc<WorkerProgress>,
    stop: watch::Receiver<bool>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        store: MeasuredStore,
        workload: Arc<CoreWorkload>,
        stage: Stage,
        op_count: u64,
        target_ops_per_ms: f64,
        seed: u64,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let tick = (target_ops_per_ms > 0.0)
            .then(|| Duration::from_nanos((1_000_000.0 / target_ops_per_ms) as u64));
        Self {
            id,
            store,
            workload,
            stage,
            op_count,
            tick,
            rng: SmallRng::seed_from_u64(seed),
            progress: Arc::new(WorkerProgress::new(op_count)),
            stop,
        }
    }

    pub fn progress(&self) -> Arc<WorkerProgress> {
        Arc::clone(&self.progress)
    }

    /// Adapter init; a failure here is fatal to the whole run.
    pub async fn init(&mut self) -> Result<()> {
        self.store.init().await
    }

    pub async fn run(mut self) -> WorkerOutcome {
        let result = self.drive().await;
        let ops_done = self.progress.ops_done();
        if let Err(err) = &result {
            tracing::error!(worker = self.id, %err, "worker aborted");
        }
        tracing::debug!(worker = self.id, ops_done, "worker finished");
        WorkerOutcome {
            id: self.id,
            store: self.store,
            ops_done,
            result,
        }
    }

    async fn drive(&mut self) -> Result<()> {
        // Spread workers over the tick so they do not all hit the backend
        // at the same instant. Only meaningful for ticks of 1 ms or more.
        if let Some(tick) = self.tick {
            if tick >= Duration::from_millis(1) {
                let delay = self.rng.random_range(0..tick.as_nanos() as u64);
                self.sleep_until(Instant::now() + Duration::from_nanos(delay))
                    .await;
            }
        }

        let start = Instant::now();
        let mut intended = start;
        let mut done: u64 = 0;

        while (self.op_count == 0 || done < self.op_count) && !self.workload.stop_requested() {
            let planned = if self.tick.is_some() {
                intended
            } else {
                Instant::now()
            };
            let keep_going = match self.stage {
                Stage::Load => {
                    self.workload
                        .do_insert(&mut self.store, &mut self.rng, planned)
                        .await?
                }
                Stage::Transactions => {
                    self.workload
                        .do_transaction(&mut self.store, &mut self.rng, planned)
                        .await?
                }
            };
            if !keep_going {
                break;
            }

            done += 1;
            self.progress.done.store(done, Ordering::Relaxed);

            if let Some(tick) = self.tick {
                // Absolute deadline: the k-th op may start only after
                // start + k * tick, and that deadline is the intended
                // start of the next op.
                let deadline =
                    start + Duration::from_nanos((tick.as_nanos() as u64).saturating_mul(done));
                self.sleep_until(deadline).await;
                intended = deadline;
            } else if done % 256 == 0 {
                // Unthrottled loops over an always-ready adapter would
                // otherwise never give the terminator and status tasks a
                // chance to run.
                tokio::task::yield_now().await;
            }
        }
        Ok(())
    }

    /// Park until `deadline`, waking early on a stop signal.
    async fn sleep_until(&mut self, deadline: Instant) {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            closed = async { self.stop.wait_for(|stopped| *stopped).await.is_err() } => {
                // A closed channel is not a stop signal; finish the sleep.
                if closed {
                    tokio::time::sleep_until(deadline).await;
                }
            }
        }
    }
}
