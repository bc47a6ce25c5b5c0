//! Storage seams consumed by the scheduler.
//!
//! The collector only relies on the idempotency guarantees spelled out on each
//! method; [`crate::repository::Database`] is the SQLite implementation.

use crate::error::Result;
use crate::models::{GasUtilizationSample, LiveSample, PollTarget, TransferBucket};
use std::ops::RangeInclusive;

pub trait SampleSink {
    /// Replaces any earlier sample for `(target_id, block_number)`.
    fn upsert_live_sample(&self, sample: &LiveSample) -> Result<()>;

    /// Idempotent on `(target_id, block_number)`.
    fn upsert_gas_utilization(&self, sample: &GasUtilizationSample) -> Result<()>;

    /// Adds to the `(target_id, bucket_start_minute, kind)` total. Writing the
    /// same `source_from_block` contribution twice counts it once.
    fn upsert_transfer_bucket(&self, bucket: &TransferBucket) -> Result<()>;

    /// All-or-nothing: on error none of the samples are recorded.
    fn upsert_gas_utilization_batch(&self, samples: &[GasUtilizationSample]) -> Result<usize>;

    /// Replaces every contribution of `target_id` whose span overlaps `span`
    /// with `buckets`, even when `buckets` is empty. All-or-nothing.
    fn replace_transfer_span(
        &self,
        target_id: &str,
        span: RangeInclusive<u64>,
        buckets: &[TransferBucket],
    ) -> Result<usize>;
}

pub trait CheckpointStore {
    fn get_checkpoint(&self, target_id: &str) -> Result<Option<u64>>;

    fn set_checkpoint(&self, target_id: &str, block_number: u64) -> Result<()>;
}

pub trait TargetRegistry {
    fn list_targets(&self) -> Result<Vec<PollTarget>>;
}
