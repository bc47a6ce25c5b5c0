use crate::models::{LogEntry, TransferKind};
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::B256;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// `keccak256("Transfer(address,address,uint256)")`, shared by ERC-20 and ERC-721.
pub const TRANSFER_TOPIC: B256 = Transfer::SIGNATURE_HASH;

/// ERC-20 indexes `from`/`to` (3 topics), ERC-721 also indexes `tokenId` (4 topics).
pub fn classify_transfer(log: &LogEntry) -> Option<TransferKind> {
    if log.removed || log.topics.first() != Some(&TRANSFER_TOPIC) {
        return None;
    }

    match log.topics.len() {
        3 => Some(TransferKind::Erc20),
        4 => Some(TransferKind::Erc721),
        _ => None,
    }
}
