use crate::error::{CollectorError, Result};
use crate::models::{LogEntry, PollTarget, RawBlock};
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Block, BlockNumberOrTag, Filter, Log};
use alloy_primitives::B256;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(7);
pub const DEFAULT_LOGS_TIMEOUT: Duration = Duration::from_secs(25);

/// Read-only view of a chain, one call per JSON-RPC method the collector uses.
///
/// Implementations never retry; a failed call surfaces as an error and the
/// next sweep picks the work up again.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// `eth_blockNumber`
    async fn head_block_number(&self, target: &PollTarget) -> Result<u64>;

    /// `eth_getBlockByNumber`, [`CollectorError::BlockNotFound`] on a null result.
    async fn get_block(&self, target: &PollTarget, number: u64, include_txs: bool)
    -> Result<RawBlock>;

    /// `eth_getLogs` over an inclusive range filtered on `topics[0]`.
    async fn get_logs(
        &self,
        target: &PollTarget,
        from_block: u64,
        to_block: u64,
        topic0: B256,
    ) -> Result<Vec<LogEntry>>;
}

/// HTTP JSON-RPC client with one cached provider per endpoint.
pub struct RpcClient {
    providers: Mutex<HashMap<String, AlloyFullProvider>>,
    block_timeout: Duration,
    logs_timeout: Duration,
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_TIMEOUT, DEFAULT_LOGS_TIMEOUT)
    }
}

impl RpcClient {
    pub fn new(block_timeout: Duration, logs_timeout: Duration) -> Self {
        RpcClient {
            providers: Mutex::new(HashMap::new()),
            block_timeout,
            logs_timeout,
        }
    }

    fn get_provider(&self, target: &PollTarget) -> Result<AlloyFullProvider> {
        let endpoint = &target.rpc_endpoint;
        let mut providers = self
            .providers
            .lock()
            .map_err(|_| CollectorError::rpc(endpoint, "provider cache lock poisoned"))?;

        if let Some(provider) = providers.get(endpoint) {
            return Ok(provider.clone());
        }

        let parsed_url = endpoint
            .parse()
            .map_err(|_| CollectorError::rpc(endpoint, "invalid RPC URL"))?;
        let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
        debug!(target_id = %target.id, endpoint = %endpoint, "created RPC provider");

        providers.insert(endpoint.clone(), provider.clone());
        Ok(provider)
    }

    fn handle_error(&self, target: &PollTarget, error: impl ToString) -> CollectorError {
        let error_str = error.to_string();
        warn!(target_id = %target.id, endpoint = %target.rpc_endpoint, error = %error_str, "RPC error");
        CollectorError::rpc(&target.rpc_endpoint, error_str)
    }

    fn handle_timeout(&self, target: &PollTarget, limit: Duration) -> CollectorError {
        warn!(
            target_id = %target.id,
            endpoint = %target.rpc_endpoint,
            "Request timeout after {} seconds",
            limit.as_secs()
        );
        CollectorError::rpc(
            &target.rpc_endpoint,
            format!("request timeout after {} seconds", limit.as_secs()),
        )
    }
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn head_block_number(&self, target: &PollTarget) -> Result<u64> {
        let provider = self.get_provider(target)?;
        match timeout(self.block_timeout, provider.get_block_number()).await {
            Ok(Ok(block_number)) => Ok(block_number),
            Ok(Err(e)) => Err(self.handle_error(target, e)),
            Err(_) => Err(self.handle_timeout(target, self.block_timeout)),
        }
    }

    async fn get_block(
        &self,
        target: &PollTarget,
        number: u64,
        include_txs: bool,
    ) -> Result<RawBlock> {
        let provider = self.get_provider(target)?;
        let request = provider.get_block_by_number(BlockNumberOrTag::Number(number));
        let request = if include_txs {
            request.full()
        } else {
            request.hashes()
        };

        match timeout(self.block_timeout, request).await {
            Ok(Ok(Some(block))) => raw_block_from_rpc(&target.rpc_endpoint, number, &block),
            Ok(Ok(None)) => Err(CollectorError::BlockNotFound {
                endpoint: target.rpc_endpoint.clone(),
                number,
            }),
            Ok(Err(e)) => Err(self.handle_error(target, e)),
            Err(_) => Err(self.handle_timeout(target, self.block_timeout)),
        }
    }

    async fn get_logs(
        &self,
        target: &PollTarget,
        from_block: u64,
        to_block: u64,
        topic0: B256,
    ) -> Result<Vec<LogEntry>> {
        let provider = self.get_provider(target)?;
        let filter = Filter::new()
            .event_signature(topic0)
            .from_block(from_block)
            .to_block(to_block);

        match timeout(self.logs_timeout, provider.get_logs(&filter)).await {
            Ok(Ok(logs)) => logs
                .into_iter()
                .map(|log| log_entry_from_rpc(&target.rpc_endpoint, from_block, to_block, log))
                .collect(),
            Ok(Err(e)) => Err(self.handle_error(target, e)),
            Err(_) => Err(self.handle_timeout(target, self.logs_timeout)),
        }
    }
}

pub(crate) fn raw_block_from_rpc(endpoint: &str, requested: u64, block: &Block) -> Result<RawBlock> {
    let header = &block.header;
    if header.number != requested {
        return Err(CollectorError::rpc(
            endpoint,
            format!("requested block {requested}, node returned {}", header.number),
        ));
    }

    Ok(RawBlock {
        number: header.number,
        timestamp: header.timestamp,
        tx_count: block.transactions.len() as u64,
        size_bytes: header.size.map(|size| size.saturating_to::<u64>()),
        gas_used: header.gas_used,
        gas_limit: header.gas_limit,
    })
}

pub(crate) fn log_entry_from_rpc(
    endpoint: &str,
    from_block: u64,
    to_block: u64,
    log: Log,
) -> Result<LogEntry> {
    let block_number = log
        .block_number
        .ok_or_else(|| CollectorError::rpc(endpoint, "log without block number"))?;

    if block_number < from_block || block_number > to_block {
        return Err(CollectorError::rpc(
            endpoint,
            format!("log in block {block_number} outside requested range {from_block}-{to_block}"),
        ));
    }

    Ok(LogEntry {
        address: log.address(),
        block_number,
        topics: log.topics().to_vec(),
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
        removed: log.removed,
    })
}
