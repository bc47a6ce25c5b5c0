use crate::error::{CollectorError, Result};
use crate::events::{TRANSFER_TOPIC, classify_transfer};
use crate::models::{PollTarget, TransferBucket, TransferKind, minute_bucket};
use crate::rpc::ChainSource;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

pub const DEFAULT_LOG_BATCH_SIZE: u64 = 500;

type MinuteCounts = BTreeMap<(u64, TransferKind), u64>;

/// Result of one [`TransferScanner::scan`] call.
///
/// `last_fully_scanned_block` is the end of the last sub-range whose logs were
/// fetched and dated, `None` if the first sub-range already failed. Buckets
/// only cover blocks up to that point.
#[derive(Debug)]
pub struct ScanOutcome {
    pub last_fully_scanned_block: Option<u64>,
    pub buckets: Vec<TransferBucket>,
    pub transfers: u64,
    pub error: Option<CollectorError>,
}

pub struct TransferScanner<'a, C: ?Sized> {
    chain: &'a C,
    log_batch_size: u64,
}

impl<'a, C: ChainSource + ?Sized> TransferScanner<'a, C> {
    pub fn new(chain: &'a C, log_batch_size: u64) -> Self {
        TransferScanner {
            chain,
            log_batch_size: log_batch_size.max(1),
        }
    }

    pub async fn scan(&self, target: &PollTarget, from_block: u64, to_block: u64) -> ScanOutcome {
        self.scan_with_timestamps(target, from_block, to_block, HashMap::new())
            .await
    }

    /// Same as [`scan`](Self::scan), with block timestamps the caller already
    /// holds so those blocks are not fetched again.
    pub async fn scan_with_timestamps(
        &self,
        target: &PollTarget,
        from_block: u64,
        to_block: u64,
        mut timestamps: HashMap<u64, u64>,
    ) -> ScanOutcome {
        let mut totals = MinuteCounts::new();
        let mut last_fully_scanned_block = None;
        let mut error = None;

        for (start, end) in sub_ranges(from_block, to_block, self.log_batch_size) {
            match self.scan_sub_range(target, start, end, &mut timestamps).await {
                Ok(counts) => {
                    for (key, count) in counts {
                        *totals.entry(key).or_insert(0) += count;
                    }
                    last_fully_scanned_block = Some(end);
                }
                Err(e) => {
                    warn!(
                        target_id = %target.id,
                        from = start,
                        to = end,
                        error = %e,
                        "Transfer scan stopped"
                    );
                    error = Some(e);
                    break;
                }
            }
        }

        let transfers = totals.values().sum();
        let buckets = match last_fully_scanned_block {
            Some(last) => totals
                .into_iter()
                .map(|((bucket_start_minute, kind), count)| TransferBucket {
                    target_id: target.id.clone(),
                    bucket_start_minute,
                    kind,
                    count,
                    source_from_block: from_block,
                    source_to_block: last,
                })
                .collect(),
            None => Vec::new(),
        };

        if let Some(last) = last_fully_scanned_block {
            info!(
                target_id = %target.id,
                "Scanned transfers for blocks {} to {}: {} transfers",
                from_block, last, transfers
            );
        }

        ScanOutcome {
            last_fully_scanned_block,
            buckets,
            transfers,
            error,
        }
    }

    async fn scan_sub_range(
        &self,
        target: &PollTarget,
        start: u64,
        end: u64,
        timestamps: &mut HashMap<u64, u64>,
    ) -> Result<MinuteCounts> {
        let logs = self
            .chain
            .get_logs(target, start, end, TRANSFER_TOPIC)
            .await?;
        debug!(target_id = %target.id, "Received {} logs for blocks {} to {}", logs.len(), start, end);

        let mut counts = MinuteCounts::new();
        for log in &logs {
            let Some(kind) = classify_transfer(log) else {
                continue;
            };

            let timestamp = match timestamps.get(&log.block_number) {
                Some(timestamp) => *timestamp,
                None => {
                    let block = self.chain.get_block(target, log.block_number, false).await?;
                    timestamps.insert(log.block_number, block.timestamp);
                    block.timestamp
                }
            };

            *counts.entry((minute_bucket(timestamp), kind)).or_insert(0) += 1;
        }

        Ok(counts)
    }
}

/// Inclusive `[from, to]` split into consecutive chunks of at most `size` blocks.
pub fn sub_ranges(from_block: u64, to_block: u64, size: u64) -> Vec<(u64, u64)> {
    let size = size.max(1);
    let mut ranges = Vec::new();
    let mut start = from_block;

    while start <= to_block {
        let end = start.saturating_add(size - 1).min(to_block);
        ranges.push((start, end));
        if end == to_block {
            break;
        }
        start = end + 1;
    }

    ranges
}
