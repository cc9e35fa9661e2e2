pub use ethereum_types::{Bloom, H160, H256, H64, U256};

pub type ExecutionAddress = H160;
pub type ExecutionBlockHash = H256;
pub type ExecutionBlockNumber = u64;
pub type Gas = u64;
pub type Gwei = u64;
pub type Height = u64;
pub type UnixSeconds = u64;
pub type ValidatorIndex = u64;
pub type Wei = U256;
pub type WithdrawalIndex = u64;

/// Opaque KZG commitment bytes as returned by the execution engine.
pub type BlobCommitment = Vec<u8>;

/// Raw RLP-encoded execution layer transaction.
pub type Transaction = Vec<u8>;

pub type VersionedHash = H256;

/// Consensus-layer validator address.
pub type ConsensusAddress = H160;
