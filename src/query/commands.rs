use crate::config::parse_poll_targets;
use crate::models::{PollTarget, minute_bucket};
use crate::query::formatters::{
    OutputFormat, format_checkpoints, format_gas_samples, format_gas_stats, format_live_samples,
    format_targets, format_transfer_buckets,
};
use crate::repository::{CheckpointRepository, SampleRepository, TargetRepository};
use anyhow::Result;

pub fn cmd_list_targets(repo: &TargetRepository, format: &OutputFormat) -> Result<String> {
    let targets = repo.list()?;
    Ok(format_targets(&targets, format))
}

pub fn cmd_add_target(
    repo: &TargetRepository,
    id: &str,
    rpc_endpoint: &str,
    display_name: Option<String>,
) -> Result<String> {
    let mut target = parse_poll_targets(&format!("{id}={rpc_endpoint}"))?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("Target id and RPC endpoint are required"))?;
    if let Some(name) = display_name {
        target = target.with_display_name(name);
    }

    repo.upsert(&target)?;
    Ok(format!("Registered target {}", target.id))
}

pub fn cmd_remove_target(repo: &TargetRepository, id: &str) -> Result<String> {
    if repo.remove(id)? {
        Ok(format!("Removed target {id}"))
    } else {
        Err(anyhow::anyhow!("Unknown target: {}", id))
    }
}

/// Registers targets from configuration, leaving others untouched.
pub fn seed_targets(repo: &TargetRepository, targets: &[PollTarget]) -> Result<usize> {
    for target in targets {
        repo.upsert(target)?;
    }
    Ok(targets.len())
}

pub fn cmd_checkpoints(repo: &CheckpointRepository, format: &OutputFormat) -> Result<String> {
    let checkpoints = repo.list()?;
    Ok(format_checkpoints(&checkpoints, format))
}

pub fn cmd_live(
    repo: &SampleRepository,
    target_id: &str,
    limit: usize,
    format: &OutputFormat,
) -> Result<String> {
    let samples = repo.recent_live_samples(target_id, limit)?;
    Ok(format_live_samples(&samples, format))
}

#[derive(Debug, Default)]
pub struct GasQuery {
    pub target_id: String,
    pub block_range: Option<(u64, u64)>,
    pub limit: usize,
    pub stats: bool,
}

pub fn cmd_gas(repo: &SampleRepository, query: GasQuery, format: &OutputFormat) -> Result<String> {
    if let Some((start, end)) = query.block_range {
        if start > end {
            return Err(anyhow::anyhow!(
                "Invalid block range: {} is after {}",
                start,
                end
            ));
        }
    }

    if query.stats {
        let stats = repo.gas_statistics(&query.target_id)?;
        return Ok(format_gas_stats(&stats, format));
    }

    let samples = repo.query_gas_utilization(&query.target_id, query.block_range, query.limit)?;
    Ok(format_gas_samples(&samples, format))
}

pub fn cmd_transfers(
    repo: &SampleRepository,
    target_id: &str,
    since: Option<u64>,
    limit: usize,
    format: &OutputFormat,
) -> Result<String> {
    let since_minute = since.map(minute_bucket).unwrap_or(0);
    let totals = repo.transfer_bucket_totals(target_id, since_minute, limit)?;
    Ok(format_transfer_buckets(&totals, format))
}
