use crate::models::{GasUtilizationSample, LiveSample, TransferBucket, TransferKind};
use anyhow::Result;
use rusqlite::{Row, ToSql, params, params_from_iter};
use serde::Serialize;
use std::ops::RangeInclusive;
use tracing::debug;

pub struct SampleRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> SampleRepository<'a> {
    const UPSERT_LIVE_SAMPLE: &'static str = "INSERT OR REPLACE INTO live_samples (
            target_id, block_number, block_timestamp, block_time_seconds,
            tx_count, gas_used, gas_limit, utilization_percent, tps
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

    const UPSERT_GAS_UTILIZATION: &'static str = "INSERT OR REPLACE INTO gas_utilization (
            target_id, block_number, block_timestamp, gas_used, gas_limit, utilization_percent
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

    const UPSERT_TRANSFER_CONTRIBUTION: &'static str =
        "INSERT INTO transfer_bucket_contributions (
            target_id, bucket_start_minute, kind, source_from_block, source_to_block, count
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(target_id, bucket_start_minute, kind, source_from_block)
        DO UPDATE SET source_to_block = excluded.source_to_block, count = excluded.count";

    const DELETE_OVERLAPPING_CONTRIBUTIONS: &'static str =
        "DELETE FROM transfer_bucket_contributions
        WHERE target_id = ?1 AND source_from_block <= ?3 AND source_to_block >= ?2";

    const SELECT_LIVE_SAMPLES: &'static str = "SELECT target_id, block_number, block_timestamp,
            block_time_seconds, tx_count, gas_used, gas_limit, utilization_percent, tps
        FROM live_samples WHERE target_id = ?1
        ORDER BY block_number DESC LIMIT ?2";

    const SELECT_GAS_UTILIZATION: &'static str = "SELECT target_id, block_number, block_timestamp,
            gas_used, gas_limit, utilization_percent
        FROM gas_utilization";

    const SELECT_TRANSFER_BUCKETS: &'static str =
        "SELECT target_id, bucket_start_minute, kind, count
        FROM transfer_buckets WHERE target_id = ?1 AND bucket_start_minute >= ?2
        ORDER BY bucket_start_minute DESC, kind LIMIT ?3";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert_live_sample(&self, sample: &LiveSample) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_LIVE_SAMPLE,
            params![
                sample.target_id,
                sample.block_number,
                sample.block_timestamp,
                sample.block_time_seconds,
                sample.tx_count,
                sample.gas_used,
                sample.gas_limit,
                sample.utilization_percent,
                sample.tps,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_gas_utilization(&self, sample: &GasUtilizationSample) -> Result<()> {
        self.upsert_gas_utilization_batch(std::slice::from_ref(sample))?;
        Ok(())
    }

    pub fn upsert_gas_utilization_batch(&self, samples: &[GasUtilizationSample]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(Self::UPSERT_GAS_UTILIZATION)?;

            for sample in samples {
                stmt.execute(params![
                    sample.target_id,
                    sample.block_number,
                    sample.block_timestamp,
                    sample.gas_used,
                    sample.gas_limit,
                    sample.utilization_percent,
                ])?;
            }
        }

        tx.commit()?;
        Ok(samples.len())
    }

    pub fn upsert_transfer_bucket(&self, bucket: &TransferBucket) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_TRANSFER_CONTRIBUTION,
            params![
                bucket.target_id,
                bucket.bucket_start_minute,
                bucket.kind.as_str(),
                bucket.source_from_block,
                bucket.source_to_block,
                bucket.count,
            ],
        )?;
        Ok(())
    }

    /// Drops contributions from any earlier scan overlapping `span`, then
    /// writes `buckets`, in one transaction.
    pub fn replace_transfer_span(
        &self,
        target_id: &str,
        span: RangeInclusive<u64>,
        buckets: &[TransferBucket],
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        let removed = tx.execute(
            Self::DELETE_OVERLAPPING_CONTRIBUTIONS,
            params![target_id, span.start(), span.end()],
        )?;
        if removed > 0 {
            debug!(
                target_id,
                removed,
                "Replacing transfer contributions for blocks {} to {}",
                span.start(),
                span.end()
            );
        }

        {
            let mut stmt = tx.prepare(Self::UPSERT_TRANSFER_CONTRIBUTION)?;

            for bucket in buckets {
                stmt.execute(params![
                    bucket.target_id,
                    bucket.bucket_start_minute,
                    bucket.kind.as_str(),
                    bucket.source_from_block,
                    bucket.source_to_block,
                    bucket.count,
                ])?;
            }
        }

        tx.commit()?;
        Ok(buckets.len())
    }

    pub fn recent_live_samples(&self, target_id: &str, limit: usize) -> Result<Vec<LiveSample>> {
        let mut stmt = self.conn.prepare(Self::SELECT_LIVE_SAMPLES)?;
        let samples = stmt
            .query_map(params![target_id, limit as i64], Self::row_to_live_sample)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    pub fn query_gas_utilization(
        &self,
        target_id: &str,
        block_range: Option<(u64, u64)>,
        limit: usize,
    ) -> Result<Vec<GasUtilizationSample>> {
        let mut query = Self::SELECT_GAS_UTILIZATION.to_string();
        let mut conditions = vec!["target_id = ?"];
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(target_id.to_string())];

        if let Some((start, end)) = block_range {
            conditions.push("block_number >= ?");
            params.push(Box::new(start));
            conditions.push("block_number <= ?");
            params.push(Box::new(end));
        }

        query.push_str(" WHERE ");
        query.push_str(&conditions.join(" AND "));
        query.push_str(&format!(" ORDER BY block_number DESC LIMIT {limit}"));

        let mut stmt = self.conn.prepare(&query)?;
        let samples = stmt
            .query_map(params_from_iter(params), Self::row_to_gas_sample)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    pub fn transfer_bucket_totals(
        &self,
        target_id: &str,
        since_minute: u64,
        limit: usize,
    ) -> Result<Vec<TransferBucketTotal>> {
        let mut stmt = self.conn.prepare(Self::SELECT_TRANSFER_BUCKETS)?;
        let totals = stmt
            .query_map(params![target_id, since_minute, limit as i64], |row| {
                let kind: String = row.get(2)?;
                let kind = kind.parse::<TransferKind>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        2,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?;
                Ok(TransferBucketTotal {
                    target_id: row.get(0)?,
                    bucket_start_minute: row.get(1)?,
                    kind,
                    count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(totals)
    }

    pub fn gas_statistics(&self, target_id: &str) -> Result<GasStats> {
        let stats = self.conn.query_row(
            "SELECT COUNT(*), AVG(utilization_percent), MAX(utilization_percent),
                    MIN(block_number), MAX(block_number)
             FROM gas_utilization WHERE target_id = ?1",
            params![target_id],
            |row| {
                Ok(GasStats {
                    samples: row.get(0)?,
                    average_utilization: row.get(1)?,
                    peak_utilization: row.get(2)?,
                    earliest_block: row.get(3)?,
                    latest_block: row.get(4)?,
                })
            },
        )?;
        Ok(stats)
    }

    fn row_to_live_sample(row: &Row) -> rusqlite::Result<LiveSample> {
        Ok(LiveSample {
            target_id: row.get(0)?,
            block_number: row.get(1)?,
            block_timestamp: row.get(2)?,
            block_time_seconds: row.get(3)?,
            tx_count: row.get(4)?,
            gas_used: row.get(5)?,
            gas_limit: row.get(6)?,
            utilization_percent: row.get(7)?,
            tps: row.get(8)?,
        })
    }

    fn row_to_gas_sample(row: &Row) -> rusqlite::Result<GasUtilizationSample> {
        Ok(GasUtilizationSample {
            target_id: row.get(0)?,
            block_number: row.get(1)?,
            block_timestamp: row.get(2)?,
            gas_used: row.get(3)?,
            gas_limit: row.get(4)?,
            utilization_percent: row.get(5)?,
        })
    }
}

/// Merged count of all contributions for one `(target, minute, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferBucketTotal {
    pub target_id: String,
    pub bucket_start_minute: u64,
    pub kind: TransferKind,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GasStats {
    pub samples: u64,
    pub average_utilization: Option<f64>,
    pub peak_utilization: Option<f64>,
    pub earliest_block: Option<u64>,
    pub latest_block: Option<u64>,
}
