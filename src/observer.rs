//! Structured collector events.
//!
//! The scheduler reports what it does through a [`SweepObserver`] instead of
//! logging directly, so operators can plug in metrics or alerting without
//! touching the core.

use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum CollectorEvent {
    SweepStarted {
        targets: usize,
    },
    /// A tick arrived while the previous sweep was still running.
    SweepSkipped,
    SweepFinished {
        succeeded: usize,
        failed: usize,
        elapsed: Duration,
    },
    TargetFailed {
        target: String,
        stage: &'static str,
        error_kind: &'static str,
        error: String,
    },
    LiveSampleRecorded {
        target: String,
        block: u64,
    },
    BlockSkipped {
        target: String,
        block: u64,
        reason: &'static str,
    },
    CheckpointBootstrapped {
        target: String,
        head: u64,
        from_block: u64,
    },
    CheckpointAdvanced {
        target: String,
        previous: Option<u64>,
        block: u64,
    },
}

impl CollectorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CollectorEvent::SweepStarted { .. } => "sweep_started",
            CollectorEvent::SweepSkipped => "sweep_skipped",
            CollectorEvent::SweepFinished { .. } => "sweep_finished",
            CollectorEvent::TargetFailed { .. } => "target_failed",
            CollectorEvent::LiveSampleRecorded { .. } => "live_sample_recorded",
            CollectorEvent::BlockSkipped { .. } => "block_skipped",
            CollectorEvent::CheckpointBootstrapped { .. } => "checkpoint_bootstrapped",
            CollectorEvent::CheckpointAdvanced { .. } => "checkpoint_advanced",
        }
    }
}

pub trait SweepObserver: Send + Sync {
    fn on_event(&self, event: &CollectorEvent);
}

/// Default observer: one `tracing` event per collector event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SweepObserver for TracingObserver {
    fn on_event(&self, event: &CollectorEvent) {
        let name = event.name();
        match event {
            CollectorEvent::SweepStarted { targets } => {
                info!(event = name, targets, "Sweep started");
            }
            CollectorEvent::SweepSkipped => {
                warn!(event = name, "Previous sweep still running, tick dropped");
            }
            CollectorEvent::SweepFinished {
                succeeded,
                failed,
                elapsed,
            } => {
                info!(
                    event = name,
                    succeeded,
                    failed,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Sweep finished"
                );
            }
            CollectorEvent::TargetFailed {
                target,
                stage,
                error_kind,
                error,
            } => {
                warn!(event = name, target = %target, stage, error_kind, error = %error, "Target failed");
            }
            CollectorEvent::LiveSampleRecorded { target, block } => {
                debug!(event = name, target = %target, block, "Live sample recorded");
            }
            CollectorEvent::BlockSkipped {
                target,
                block,
                reason,
            } => {
                warn!(event = name, target = %target, block, reason, "Block skipped");
            }
            CollectorEvent::CheckpointBootstrapped {
                target,
                head,
                from_block,
            } => {
                info!(event = name, target = %target, head, from_block, "No checkpoint, bootstrapping");
            }
            CollectorEvent::CheckpointAdvanced {
                target,
                previous,
                block,
            } => {
                info!(event = name, target = %target, previous = ?previous, block, "Checkpoint advanced");
            }
        }
    }
}

/// Keeps every event in memory, mostly useful in tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<CollectorEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CollectorEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(CollectorEvent::name).collect()
    }
}

impl SweepObserver for RecordingObserver {
    fn on_event(&self, event: &CollectorEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
