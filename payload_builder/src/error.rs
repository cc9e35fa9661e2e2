use thiserror::Error;
use types::primitives::{ExecutionBlockHash, ExecutionBlockNumber, UnixSeconds};

#[derive(Debug, Error)]
pub enum Error {
    #[error("execution engine is syncing and cannot build on {parent_hash:?}")]
    EngineSyncing { parent_hash: ExecutionBlockHash },
    #[error("timestamp {timestamp} does not exceed parent timestamp {parent_timestamp}")]
    TimestampNotIncreasing {
        timestamp: UnixSeconds,
        parent_timestamp: UnixSeconds,
    },
    #[error("execution engine returned payload with unexpected {field} (expected: {expected}, actual: {actual})")]
    UnexpectedPayload {
        field: &'static str,
        expected: String,
        actual: String,
    },
    #[error("execution block {block_number} has no successor")]
    BlockNumberOverflow { block_number: ExecutionBlockNumber },
    #[error("execution engine returned payload with {count} withdrawals")]
    WithdrawalsNotEmpty { count: usize },
}
