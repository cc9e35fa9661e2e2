use thiserror::Error;
use types::primitives::{ExecutionAddress, ExecutionBlockNumber};

#[derive(Debug, Error)]
pub enum Error {
    #[error("proposal does not match local expectation: {field}")]
    PayloadMismatch { field: &'static str },
    #[error("execution payload message alone takes {size} bytes, more than the {max_tx_bytes} allowed")]
    SizeBudgetExceeded { size: u64, max_tx_bytes: u64 },
    #[error("consensus engine offered {count} mempool transactions")]
    UnexpectedTransactions { count: usize },
    #[error("proposal must contain exactly one transaction (found {count})")]
    InvalidTransactionCount { count: usize },
    #[error("proposal contains no execution payload")]
    MissingExecutionPayload,
    #[error("proposal contains {count} execution payloads")]
    MultipleExecutionPayloads { count: usize },
    #[error("execution head is not initialized")]
    MissingExecutionHead,
    #[error("execution head must advance (current: {current}, new: {new})")]
    NonMonotonicHead {
        current: ExecutionBlockNumber,
        new: ExecutionBlockNumber,
    },
    #[error("fee recipient {actual:?} is not acceptable (expected: {expected:?})")]
    FeeRecipientMismatch {
        expected: ExecutionAddress,
        actual: ExecutionAddress,
    },
    #[error("proposal carries {count} extra messages but none were expected")]
    UnexpectedExtraMessages { count: usize },
}
