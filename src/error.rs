use thiserror::Error;

pub type Result<T> = std::result::Result<T, CollectorError>;

/// Failure taxonomy of the collector core.
///
/// `Rpc` and `BlockNotFound` come from the chain endpoint, `Store` from the
/// sample sink or checkpoint store, `InvalidBlock` from gas accounting that
/// cannot be turned into a sample.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("rpc error on {endpoint}: {message}")]
    Rpc { endpoint: String, message: String },

    #[error("block {number} not found on {endpoint}")]
    BlockNotFound { endpoint: String, number: u64 },

    #[error("store error during {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid block {number}: {reason}")]
    InvalidBlock { number: u64, reason: String },
}

impl CollectorError {
    pub fn rpc(endpoint: &str, message: impl ToString) -> Self {
        CollectorError::Rpc {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    pub fn store<E>(operation: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CollectorError::Store {
            operation,
            source: Box::new(source),
        }
    }

    /// Chain-side failures halt a batch; everything else is handled by the caller.
    pub fn is_chain_error(&self) -> bool {
        matches!(
            self,
            CollectorError::Rpc { .. } | CollectorError::BlockNotFound { .. }
        )
    }

    /// Short machine-friendly label used in structured events.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorError::Rpc { .. } => "rpc",
            CollectorError::BlockNotFound { .. } => "block_not_found",
            CollectorError::Store { .. } => "store",
            CollectorError::InvalidBlock { .. } => "invalid_block",
        }
    }
}
