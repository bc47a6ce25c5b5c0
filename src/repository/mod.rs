pub mod checkpoint_repository;
pub mod database;
pub mod sample_repository;
pub mod target_repository;

pub use checkpoint_repository::CheckpointRepository;
pub use database::Database;
pub use sample_repository::{GasStats, SampleRepository, TransferBucketTotal};
pub use target_repository::TargetRepository;

use crate::error::{CollectorError, Result};
use crate::models::{GasUtilizationSample, LiveSample, PollTarget, TransferBucket};
use crate::sink::{CheckpointStore, SampleSink, TargetRegistry};
use std::ops::RangeInclusive;

fn store_error(operation: &'static str) -> impl FnOnce(anyhow::Error) -> CollectorError {
    move |e| CollectorError::Store {
        operation,
        source: e.into(),
    }
}

impl SampleSink for Database {
    fn upsert_live_sample(&self, sample: &LiveSample) -> Result<()> {
        SampleRepository::new(&self.conn)
            .upsert_live_sample(sample)
            .map_err(store_error("upsert_live_sample"))
    }

    fn upsert_gas_utilization(&self, sample: &GasUtilizationSample) -> Result<()> {
        SampleRepository::new(&self.conn)
            .upsert_gas_utilization(sample)
            .map_err(store_error("upsert_gas_utilization"))
    }

    fn upsert_transfer_bucket(&self, bucket: &TransferBucket) -> Result<()> {
        SampleRepository::new(&self.conn)
            .upsert_transfer_bucket(bucket)
            .map_err(store_error("upsert_transfer_bucket"))
    }

    fn upsert_gas_utilization_batch(&self, samples: &[GasUtilizationSample]) -> Result<usize> {
        SampleRepository::new(&self.conn)
            .upsert_gas_utilization_batch(samples)
            .map_err(store_error("upsert_gas_utilization_batch"))
    }

    fn replace_transfer_span(
        &self,
        target_id: &str,
        span: RangeInclusive<u64>,
        buckets: &[TransferBucket],
    ) -> Result<usize> {
        SampleRepository::new(&self.conn)
            .replace_transfer_span(target_id, span, buckets)
            .map_err(store_error("replace_transfer_span"))
    }
}

impl CheckpointStore for Database {
    fn get_checkpoint(&self, target_id: &str) -> Result<Option<u64>> {
        CheckpointRepository::new(&self.conn)
            .get_last_processed_block(target_id)
            .map_err(store_error("get_checkpoint"))
    }

    fn set_checkpoint(&self, target_id: &str, block_number: u64) -> Result<()> {
        CheckpointRepository::new(&self.conn)
            .advance(target_id, block_number)
            .map_err(store_error("set_checkpoint"))
    }
}

impl TargetRegistry for Database {
    fn list_targets(&self) -> Result<Vec<PollTarget>> {
        TargetRepository::new(&self.conn)
            .list()
            .map_err(store_error("list_targets"))
    }
}
