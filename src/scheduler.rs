//! Fixed-interval, single-flight sweep loop over all poll targets.
//!
//! One sweep walks every target returned by the [`TargetRegistry`]. Each
//! target runs inside its own error boundary:
//!
//! 1. head + parent block → live sample (best effort)
//! 2. checkpoint lookup, or bootstrap `initial_backfill_blocks` behind head
//! 3. per-block gas samples for at most `max_blocks_per_cycle` blocks
//! 4. transfer scan over the blocks the gas pass reached
//! 5. persist both batches, then advance the checkpoint
//!
//! The checkpoint only moves after step 5 persisted everything up to the new
//! value. A chain error in steps 3 or 4 shortens the batch; a store error leaves
//! the checkpoint where it was. Persisting a transfer span replaces whatever an
//! earlier, uncommitted attempt wrote for overlapping blocks.

use crate::config::CollectorSettings;
use crate::error::{CollectorError, Result};
use crate::metrics::{LiveSampleOutcome, compute_live_sample, gas_utilization_sample};
use crate::models::{GasUtilizationSample, PollTarget};
use crate::observer::{CollectorEvent, SweepObserver, TracingObserver};
use crate::rpc::ChainSource;
use crate::scanner::TransferScanner;
use crate::sink::{CheckpointStore, SampleSink, TargetRegistry};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Blocks fetched concurrently during the gas pass of one target.
const GAS_FETCH_CONCURRENCY: usize = 8;

/// An extended-pass error tagged with the stage reported in `target_failed`.
type StageResult<T> = std::result::Result<T, (&'static str, CollectorError)>;

fn at(stage: &'static str) -> impl FnOnce(CollectorError) -> (&'static str, CollectorError) {
    move |error| (stage, error)
}

/// Everything the scheduler persists to or reads from.
pub trait CollectorStore: SampleSink + CheckpointStore + TargetRegistry {}

impl<T: SampleSink + CheckpointStore + TargetRegistry> CollectorStore for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug)]
pub enum SweepReport {
    /// Another sweep held the scheduler; nothing was done.
    Skipped,
    /// The target registry could not be read.
    RegistryUnavailable(CollectorError),
    Completed(SweepSummary),
}

#[derive(Debug)]
pub struct SweepSummary {
    pub targets: Vec<TargetReport>,
    pub elapsed: Duration,
}

impl SweepSummary {
    pub fn target(&self, target_id: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.target_id == target_id)
    }
}

#[derive(Debug)]
pub struct TargetReport {
    pub target_id: String,
    pub head: Option<u64>,
    pub live_sample_block: Option<u64>,
    /// Inclusive block range the extended pass set out to cover.
    pub planned_range: Option<(u64, u64)>,
    /// Checkpoint written by this sweep.
    pub checkpoint: Option<u64>,
    pub gas_samples: usize,
    pub transfers: u64,
    /// The same target id was already being swept.
    pub skipped: bool,
    pub error: Option<CollectorError>,
}

impl TargetReport {
    fn new(target_id: &str) -> Self {
        TargetReport {
            target_id: target_id.to_string(),
            head: None,
            live_sample_block: None,
            planned_range: None,
            checkpoint: None,
            gas_samples: 0,
            transfers: 0,
            skipped: false,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.skipped && self.error.is_none()
    }
}

/// First block of the extended pass for a target that has no checkpoint yet.
///
/// Covers `backfill` blocks ending at `head`, clamped at genesis.
pub fn bootstrap_from_block(head: u64, backfill: u64) -> u64 {
    head.saturating_sub(backfill.saturating_sub(1))
}

/// Last block of the extended pass starting at `from_block`.
pub fn cycle_end(from_block: u64, head: u64, max_blocks_per_cycle: u64) -> u64 {
    head.min(from_block.saturating_add(max_blocks_per_cycle.max(1) - 1))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SweepGuard<'a> {
    state: &'a Mutex<SchedulerState>,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = SchedulerState::Idle;
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    target_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.target_id);
    }
}

#[derive(Default)]
struct GasPass {
    samples: Vec<GasUtilizationSample>,
    timestamps: HashMap<u64, u64>,
    last_attempted: Option<u64>,
    error: Option<CollectorError>,
}

pub struct PollScheduler<C, S> {
    chain: C,
    store: S,
    settings: CollectorSettings,
    observer: Arc<dyn SweepObserver>,
    state: Mutex<SchedulerState>,
    in_flight: Mutex<HashSet<String>>,
}

impl<C: ChainSource, S: CollectorStore> PollScheduler<C, S> {
    pub fn new(chain: C, store: S, settings: CollectorSettings) -> Self {
        PollScheduler {
            chain,
            store,
            settings,
            observer: Arc::new(TracingObserver),
            state: Mutex::new(SchedulerState::Idle),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SweepObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> SchedulerState {
        *lock(&self.state)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    fn emit(&self, event: CollectorEvent) {
        self.observer.on_event(&event);
    }

    fn try_begin_sweep(&self) -> Option<SweepGuard<'_>> {
        let mut state = lock(&self.state);
        if *state == SchedulerState::Running {
            return None;
        }
        *state = SchedulerState::Running;
        Some(SweepGuard { state: &self.state })
    }

    /// Runs sweeps every `poll_interval` until `cancel` fires.
    ///
    /// A timer task produces ticks; ticks that arrive while a sweep is running
    /// are dropped. A sweep in progress is allowed to finish on cancellation.
    pub async fn run(&self, cancel: CancellationToken) {
        let (tick_tx, mut tick_rx) = mpsc::channel::<()>(1);
        let interval = self.settings.poll_interval;
        let timer_cancel = cancel.child_token();

        let timer = tokio::spawn({
            let timer_cancel = timer_cancel.clone();
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = timer_cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if tick_tx.try_send(()).is_err() {
                                debug!("Tick dropped, sweep in progress");
                            }
                        }
                    }
                }
            }
        });

        info!(
            "Poll scheduler started with {}s interval",
            interval.as_secs_f64()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                tick = tick_rx.recv() => {
                    if tick.is_none() {
                        break;
                    }
                    self.sweep().await;
                    // Ticks that piled up during the sweep are stale.
                    while tick_rx.try_recv().is_ok() {
                        self.emit(CollectorEvent::SweepSkipped);
                    }
                }
            }
        }

        timer_cancel.cancel();
        let _ = timer.await;
        info!("Poll scheduler stopped");
    }

    /// One pass over all targets, or [`SweepReport::Skipped`] if a sweep is
    /// already running.
    pub async fn sweep(&self) -> SweepReport {
        let Some(_guard) = self.try_begin_sweep() else {
            self.emit(CollectorEvent::SweepSkipped);
            return SweepReport::Skipped;
        };

        let started = Instant::now();
        let targets = match self.store.list_targets() {
            Ok(targets) => targets,
            Err(e) => {
                self.emit(CollectorEvent::TargetFailed {
                    target: "*".to_string(),
                    stage: "list_targets",
                    error_kind: e.kind(),
                    error: e.to_string(),
                });
                return SweepReport::RegistryUnavailable(e);
            }
        };

        self.emit(CollectorEvent::SweepStarted {
            targets: targets.len(),
        });

        let reports: Vec<TargetReport> = stream::iter(targets.iter())
            .map(|target| self.sweep_target_exclusive(target))
            .buffer_unordered(self.settings.max_concurrent_targets.max(1))
            .collect()
            .await;

        let succeeded = reports.iter().filter(|r| r.succeeded()).count();
        let elapsed = started.elapsed();
        self.emit(CollectorEvent::SweepFinished {
            succeeded,
            failed: reports.len() - succeeded,
            elapsed,
        });

        SweepReport::Completed(SweepSummary {
            targets: reports,
            elapsed,
        })
    }

    async fn sweep_target_exclusive(&self, target: &PollTarget) -> TargetReport {
        if !lock(&self.in_flight).insert(target.id.clone()) {
            debug!(target_id = %target.id, "Target already in flight, skipping");
            let mut report = TargetReport::new(&target.id);
            report.skipped = true;
            return report;
        }
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            target_id: target.id.clone(),
        };

        self.sweep_target(target).await
    }

    async fn sweep_target(&self, target: &PollTarget) -> TargetReport {
        let mut report = TargetReport::new(&target.id);

        let head = match self.record_live_sample(target, &mut report).await {
            Ok(head) => head,
            Err(e) => return self.fail(report, target, "live_sample", e),
        };

        if let Err((stage, e)) = self.process_extended_metrics(target, head, &mut report).await {
            return self.fail(report, target, stage, e);
        }

        report
    }

    fn fail(
        &self,
        mut report: TargetReport,
        target: &PollTarget,
        stage: &'static str,
        error: CollectorError,
    ) -> TargetReport {
        self.emit(CollectorEvent::TargetFailed {
            target: target.id.clone(),
            stage,
            error_kind: error.kind(),
            error: error.to_string(),
        });
        report.error = Some(error);
        report
    }

    /// Returns the head block number. Persistence is best effort.
    async fn record_live_sample(&self, target: &PollTarget, report: &mut TargetReport) -> Result<u64> {
        let head = self.chain.head_block_number(target).await?;
        report.head = Some(head);

        let curr = self.chain.get_block(target, head, true).await?;
        if head == 0 {
            return Ok(head);
        }
        let prev = self.chain.get_block(target, head - 1, false).await?;

        match compute_live_sample(&target.id, &curr, &prev) {
            LiveSampleOutcome::Sample(sample) => match self.store.upsert_live_sample(&sample) {
                Ok(()) => {
                    report.live_sample_block = Some(head);
                    self.emit(CollectorEvent::LiveSampleRecorded {
                        target: target.id.clone(),
                        block: head,
                    });
                }
                Err(e) => {
                    self.emit(CollectorEvent::TargetFailed {
                        target: target.id.clone(),
                        stage: "persist_live_sample",
                        error_kind: e.kind(),
                        error: e.to_string(),
                    });
                }
            },
            LiveSampleOutcome::Skipped(reason) => {
                self.emit(CollectorEvent::BlockSkipped {
                    target: target.id.clone(),
                    block: head,
                    reason: reason.as_str(),
                });
            }
        }

        Ok(head)
    }

    async fn process_extended_metrics(
        &self,
        target: &PollTarget,
        head: u64,
        report: &mut TargetReport,
    ) -> StageResult<()> {
        let checkpoint = self
            .store
            .get_checkpoint(&target.id)
            .map_err(at("checkpoint_lookup"))?;
        let from_block = match checkpoint {
            Some(last_processed) => last_processed.saturating_add(1),
            None => {
                let from_block = bootstrap_from_block(head, self.settings.initial_backfill_blocks);
                self.emit(CollectorEvent::CheckpointBootstrapped {
                    target: target.id.clone(),
                    head,
                    from_block,
                });
                from_block
            }
        };

        let to_block = cycle_end(from_block, head, self.settings.max_blocks_per_cycle);
        if from_block > to_block {
            debug!(target_id = %target.id, head, "No new blocks for extended metrics");
            return Ok(());
        }
        report.planned_range = Some((from_block, to_block));

        let gas = self.collect_gas_samples(target, from_block, to_block).await;
        // `gas_pass` with `block_not_found` below head usually means a pruned
        // node; the target cannot progress until the endpoint serves the block.
        let Some(gas_end) = gas.last_attempted else {
            let error = gas
                .error
                .unwrap_or_else(|| CollectorError::rpc(&target.rpc_endpoint, "no blocks fetched"));
            return Err(("gas_pass", error));
        };

        let scanner = TransferScanner::new(&self.chain, self.settings.log_batch_size);
        let scan = scanner
            .scan_with_timestamps(target, from_block, gas_end, gas.timestamps)
            .await;
        let Some(scanned_end) = scan.last_fully_scanned_block else {
            let error = scan
                .error
                .unwrap_or_else(|| CollectorError::rpc(&target.rpc_endpoint, "no logs scanned"));
            return Err(("transfer_scan", error));
        };

        let samples: Vec<GasUtilizationSample> = gas
            .samples
            .into_iter()
            .filter(|sample| sample.block_number <= scanned_end)
            .collect();
        report.gas_samples = self
            .store
            .upsert_gas_utilization_batch(&samples)
            .map_err(at("persist_gas_samples"))?;
        self.store
            .replace_transfer_span(&target.id, from_block..=scanned_end, &scan.buckets)
            .map_err(at("persist_transfers"))?;
        report.transfers = scan.transfers;

        self.store
            .set_checkpoint(&target.id, scanned_end)
            .map_err(at("advance_checkpoint"))?;
        report.checkpoint = Some(scanned_end);
        self.emit(CollectorEvent::CheckpointAdvanced {
            target: target.id.clone(),
            previous: checkpoint,
            block: scanned_end,
        });

        // The batch was shortened; report why once the progress is saved.
        match (gas.error, scan.error) {
            (Some(e), _) => Err(("gas_pass", e)),
            (None, Some(e)) => Err(("transfer_scan", e)),
            (None, None) => Ok(()),
        }
    }

    /// Fetches blocks in order and stops at the first chain error.
    async fn collect_gas_samples(&self, target: &PollTarget, from_block: u64, to_block: u64) -> GasPass {
        let mut pass = GasPass::default();
        let mut blocks = stream::iter(from_block..=to_block)
            .map(|number| self.chain.get_block(target, number, false))
            .buffered(GAS_FETCH_CONCURRENCY);

        while let Some(result) = blocks.next().await {
            let block = match result {
                Ok(block) => block,
                Err(e) => {
                    pass.error = Some(e);
                    break;
                }
            };

            pass.timestamps.insert(block.number, block.timestamp);
            match gas_utilization_sample(&target.id, &block) {
                Ok(sample) => pass.samples.push(sample),
                Err(e) => {
                    debug!(target_id = %target.id, error = %e, "Skipping gas sample");
                    self.emit(CollectorEvent::BlockSkipped {
                        target: target.id.clone(),
                        block: block.number,
                        reason: "invalid_gas",
                    });
                }
            }
            pass.last_attempted = Some(block.number);
        }

        pass
    }
}
