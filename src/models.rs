use alloy_primitives::{Address, B256};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// One chain/subnet to monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollTarget {
    pub id: String,
    pub rpc_endpoint: String,
    pub display_name: String,
}

impl PollTarget {
    pub fn new(id: impl Into<String>, rpc_endpoint: impl Into<String>) -> Self {
        let id = id.into();
        PollTarget {
            display_name: id.clone(),
            id,
            rpc_endpoint: rpc_endpoint.into(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }
}

/// Block header fields the collector needs, validated at the RPC boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub number: u64,
    pub timestamp: u64,
    pub tx_count: u64,
    pub size_bytes: Option<u64>,
    pub gas_used: u64,
    pub gas_limit: u64,
}

/// A single `eth_getLogs` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub block_number: u64,
    pub topics: Vec<B256>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
    pub removed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveSample {
    pub target_id: String,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub block_time_seconds: u64,
    pub tx_count: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub utilization_percent: f64,
    pub tps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GasUtilizationSample {
    pub target_id: String,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Erc20,
    Erc721,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Erc20 => "erc20",
            TransferKind::Erc721 => "erc721",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "erc20" => Ok(TransferKind::Erc20),
            "erc721" => Ok(TransferKind::Erc721),
            other => Err(anyhow::anyhow!("Unknown transfer kind: {}", other)),
        }
    }
}

/// Transfer count for one `(target, minute, kind)` window.
///
/// `source_from_block..=source_to_block` is the scan span that produced the
/// count. The store adds contributions from disjoint spans; persisting a span
/// drops every stored contribution whose span overlaps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferBucket {
    pub target_id: String,
    pub bucket_start_minute: u64,
    pub kind: TransferKind,
    pub count: u64,
    pub source_from_block: u64,
    pub source_to_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub target_id: String,
    pub last_processed_block: u64,
    pub updated_at: i64,
}

/// Start of the one-minute window containing `timestamp` (unix seconds, UTC).
pub fn minute_bucket(timestamp: u64) -> u64 {
    timestamp - timestamp % 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_bucket_truncates_seconds() {
        assert_eq!(minute_bucket(1_700_000_000), 1_699_999_980);
        assert_eq!(minute_bucket(1_699_999_980), 1_699_999_980);
        assert_eq!(minute_bucket(59), 0);
    }

    #[test]
    fn transfer_kind_parses_case_insensitively() {
        assert_eq!("ERC20".parse::<TransferKind>().unwrap(), TransferKind::Erc20);
        assert_eq!("erc721".parse::<TransferKind>().unwrap(), TransferKind::Erc721);
        assert!("erc1155".parse::<TransferKind>().is_err());
    }

    #[test]
    fn display_name_defaults_to_id() {
        let target = PollTarget::new("fuji", "https://api.avax-test.network/ext/bc/C/rpc");
        assert_eq!(target.display_name, "fuji");
        let named = target.with_display_name("Avalanche Fuji");
        assert_eq!(named.display_name, "Avalanche Fuji");
    }
}
