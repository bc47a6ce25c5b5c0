#![allow(dead_code)]

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chain_metrics_collector::config::CollectorSettings;
use chain_metrics_collector::error::{CollectorError, Result};
use chain_metrics_collector::events::TRANSFER_TOPIC;
use chain_metrics_collector::models::{
    GasUtilizationSample, LiveSample, LogEntry, PollTarget, RawBlock, TransferBucket,
};
use chain_metrics_collector::repository::{Database, TargetRepository};
use chain_metrics_collector::rpc::ChainSource;
use chain_metrics_collector::sink::{CheckpointStore, SampleSink, TargetRegistry};
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
pub const BLOCK_TIME: u64 = 2;

/// Deterministic chain: block `n` has timestamp `GENESIS_TIMESTAMP + n * BLOCK_TIME`,
/// 10 transactions and 50% gas utilization unless overridden.
pub struct MockChain {
    head: Mutex<u64>,
    overrides: Mutex<HashMap<u64, RawBlock>>,
    logs: Mutex<Vec<LogEntry>>,
    failing_blocks: Mutex<HashSet<u64>>,
    missing_blocks: Mutex<HashSet<u64>>,
    failing_log_blocks: Mutex<HashSet<u64>>,
    failing_heads: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    block_calls: Mutex<Vec<u64>>,
    log_calls: Mutex<Vec<(u64, u64)>>,
    active_head_calls: AtomicUsize,
    max_active_head_calls: AtomicUsize,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        MockChain {
            head: Mutex::new(head),
            overrides: Mutex::new(HashMap::new()),
            logs: Mutex::new(Vec::new()),
            failing_blocks: Mutex::new(HashSet::new()),
            missing_blocks: Mutex::new(HashSet::new()),
            failing_log_blocks: Mutex::new(HashSet::new()),
            failing_heads: Mutex::new(HashSet::new()),
            delay: None,
            block_calls: Mutex::new(Vec::new()),
            log_calls: Mutex::new(Vec::new()),
            active_head_calls: AtomicUsize::new(0),
            max_active_head_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = head;
    }

    pub fn override_block(&self, block: RawBlock) {
        self.overrides.lock().unwrap().insert(block.number, block);
    }

    pub fn add_transfer(&self, block_number: u64, topic_count: usize) {
        let mut topics = vec![TRANSFER_TOPIC];
        topics.extend(std::iter::repeat_n(B256::ZERO, topic_count.saturating_sub(1)));
        self.add_log(block_number, topics);
    }

    pub fn add_log(&self, block_number: u64, topics: Vec<B256>) {
        let mut logs = self.logs.lock().unwrap();
        let log_index = logs.len() as u64;
        logs.push(LogEntry {
            address: Address::repeat_byte(0x11),
            block_number,
            topics,
            transaction_hash: Some(B256::repeat_byte(0x22)),
            log_index: Some(log_index),
            removed: false,
        });
    }

    pub fn fail_block(&self, number: u64) {
        self.failing_blocks.lock().unwrap().insert(number);
    }

    pub fn remove_block(&self, number: u64) {
        self.missing_blocks.lock().unwrap().insert(number);
    }

    /// Any `eth_getLogs` range containing `number` fails.
    pub fn fail_logs_at(&self, number: u64) {
        self.failing_log_blocks.lock().unwrap().insert(number);
    }

    pub fn heal(&self) {
        self.failing_blocks.lock().unwrap().clear();
        self.missing_blocks.lock().unwrap().clear();
        self.failing_log_blocks.lock().unwrap().clear();
        self.failing_heads.lock().unwrap().clear();
    }

    /// `eth_blockNumber` fails for this target only.
    pub fn fail_head(&self, target_id: &str) {
        self.failing_heads.lock().unwrap().insert(target_id.to_string());
    }

    pub fn block_calls(&self) -> Vec<u64> {
        self.block_calls.lock().unwrap().clone()
    }

    pub fn log_calls(&self) -> Vec<(u64, u64)> {
        self.log_calls.lock().unwrap().clone()
    }

    pub fn max_concurrent_head_calls(&self) -> usize {
        self.max_active_head_calls.load(Ordering::SeqCst)
    }

    pub fn block_at(number: u64) -> RawBlock {
        RawBlock {
            number,
            timestamp: GENESIS_TIMESTAMP + number * BLOCK_TIME,
            tx_count: 10,
            size_bytes: Some(1_024),
            gas_used: 15_000_000,
            gas_limit: 30_000_000,
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn head_block_number(&self, target: &PollTarget) -> Result<u64> {
        let active = self.active_head_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_head_calls.fetch_max(active, Ordering::SeqCst);
        self.pause().await;
        self.active_head_calls.fetch_sub(1, Ordering::SeqCst);

        if self.failing_heads.lock().unwrap().contains(&target.id) {
            return Err(CollectorError::rpc(&target.rpc_endpoint, "connection refused"));
        }
        Ok(*self.head.lock().unwrap())
    }

    async fn get_block(
        &self,
        target: &PollTarget,
        number: u64,
        _include_txs: bool,
    ) -> Result<RawBlock> {
        self.block_calls.lock().unwrap().push(number);
        self.pause().await;

        if self.failing_blocks.lock().unwrap().contains(&number) {
            return Err(CollectorError::rpc(&target.rpc_endpoint, "request timeout"));
        }
        let head = *self.head.lock().unwrap();
        if number > head || self.missing_blocks.lock().unwrap().contains(&number) {
            return Err(CollectorError::BlockNotFound {
                endpoint: target.rpc_endpoint.clone(),
                number,
            });
        }

        let overridden = self.overrides.lock().unwrap().get(&number).cloned();
        Ok(overridden.unwrap_or_else(|| Self::block_at(number)))
    }

    async fn get_logs(
        &self,
        target: &PollTarget,
        from_block: u64,
        to_block: u64,
        topic0: B256,
    ) -> Result<Vec<LogEntry>> {
        self.log_calls.lock().unwrap().push((from_block, to_block));
        self.pause().await;

        let failing = self
            .failing_log_blocks
            .lock()
            .unwrap()
            .iter()
            .any(|n| (from_block..=to_block).contains(n));
        if failing {
            return Err(CollectorError::rpc(
                &target.rpc_endpoint,
                "query returned more than 10000 results",
            ));
        }

        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| (from_block..=to_block).contains(&log.block_number))
            .filter(|log| log.topics.first() == Some(&topic0))
            .cloned()
            .collect())
    }
}

/// SQLite store with switchable write failures.
pub struct FlakyStore {
    pub db: Database,
    pub fail_checkpoint: AtomicBool,
    pub fail_gas_batch: AtomicBool,
    pub fail_live_sample: AtomicBool,
    pub fail_transfer_span: AtomicBool,
    pub fail_list_targets: AtomicBool,
}

impl FlakyStore {
    pub fn new(targets: &[PollTarget]) -> Self {
        let db = Database::in_memory().unwrap();
        let repo = TargetRepository::new(&db.conn);
        for target in targets {
            repo.upsert(target).unwrap();
        }
        FlakyStore {
            db,
            fail_checkpoint: AtomicBool::new(false),
            fail_gas_batch: AtomicBool::new(false),
            fail_live_sample: AtomicBool::new(false),
            fail_transfer_span: AtomicBool::new(false),
            fail_list_targets: AtomicBool::new(false),
        }
    }

    fn injected(operation: &'static str) -> CollectorError {
        CollectorError::store(operation, std::io::Error::other("database is locked"))
    }
}

impl SampleSink for FlakyStore {
    fn upsert_live_sample(&self, sample: &LiveSample) -> Result<()> {
        if self.fail_live_sample.load(Ordering::SeqCst) {
            return Err(Self::injected("upsert_live_sample"));
        }
        self.db.upsert_live_sample(sample)
    }

    fn upsert_gas_utilization(&self, sample: &GasUtilizationSample) -> Result<()> {
        self.db.upsert_gas_utilization(sample)
    }

    fn upsert_transfer_bucket(&self, bucket: &TransferBucket) -> Result<()> {
        self.db.upsert_transfer_bucket(bucket)
    }

    fn upsert_gas_utilization_batch(&self, samples: &[GasUtilizationSample]) -> Result<usize> {
        if self.fail_gas_batch.load(Ordering::SeqCst) {
            return Err(Self::injected("upsert_gas_utilization_batch"));
        }
        self.db.upsert_gas_utilization_batch(samples)
    }

    fn replace_transfer_span(
        &self,
        target_id: &str,
        span: RangeInclusive<u64>,
        buckets: &[TransferBucket],
    ) -> Result<usize> {
        if self.fail_transfer_span.load(Ordering::SeqCst) {
            return Err(Self::injected("replace_transfer_span"));
        }
        self.db.replace_transfer_span(target_id, span, buckets)
    }
}

impl CheckpointStore for FlakyStore {
    fn get_checkpoint(&self, target_id: &str) -> Result<Option<u64>> {
        self.db.get_checkpoint(target_id)
    }

    fn set_checkpoint(&self, target_id: &str, block_number: u64) -> Result<()> {
        if self.fail_checkpoint.load(Ordering::SeqCst) {
            return Err(Self::injected("set_checkpoint"));
        }
        self.db.set_checkpoint(target_id, block_number)
    }
}

impl TargetRegistry for FlakyStore {
    fn list_targets(&self) -> Result<Vec<PollTarget>> {
        if self.fail_list_targets.load(Ordering::SeqCst) {
            return Err(Self::injected("list_targets"));
        }
        self.db.list_targets()
    }
}

pub fn target(id: &str) -> PollTarget {
    PollTarget::new(id, format!("http://{id}.invalid:8545"))
}

pub fn settings(log_batch_size: u64, max_blocks_per_cycle: u64) -> CollectorSettings {
    CollectorSettings {
        log_batch_size,
        max_blocks_per_cycle,
        initial_backfill_blocks: 2_000,
        ..CollectorSettings::default()
    }
}

pub fn count_rows(db: &Database, sql: &str) -> u64 {
    db.conn.query_row(sql, [], |row| row.get(0)).unwrap()
}
