//! Inputs and outputs of the per-height callbacks issued by the consensus engine.

use serde::{Deserialize, Serialize};

use crate::primitives::{ConsensusAddress, Height, UnixSeconds, H256};

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ExtendedVoteInfo {
    pub validator: ConsensusAddress,
    pub power: u64,
    pub vote_extension: Vec<u8>,
}

/// Votes of the previous height together with their extensions.
#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct ExtendedCommitInfo {
    pub round: u32,
    pub votes: Vec<ExtendedVoteInfo>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct PrepareProposalRequest {
    pub height: Height,
    pub time: UnixSeconds,
    pub max_tx_bytes: u64,
    /// Transactions offered by the mempool. This chain never accepts any.
    pub txs: Vec<Vec<u8>>,
    pub local_last_commit: ExtendedCommitInfo,
    pub proposer_address: ConsensusAddress,
    /// Application state hash committed at `height - 1`.
    pub last_app_hash: Option<H256>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct PrepareProposalResponse {
    pub txs: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ProcessProposalRequest {
    pub height: Height,
    pub time: UnixSeconds,
    pub txs: Vec<Vec<u8>>,
    pub proposer_address: ConsensusAddress,
    pub last_app_hash: Option<H256>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProposalStatus {
    Accept,
    Reject,
}

impl ProposalStatus {
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accept)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct FinalizeBlockRequest {
    pub height: Height,
    pub time: UnixSeconds,
    pub txs: Vec<Vec<u8>>,
    pub last_app_hash: Option<H256>,
}

/// Issued once the block at `height` is committed and the application state is persisted.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct PostFinalizeRequest {
    pub height: Height,
    /// Application state hash committed at `height`.
    pub app_hash: Option<H256>,
}

#[must_use]
pub fn beacon_root(app_hash: Option<H256>) -> H256 {
    app_hash.unwrap_or_default()
}
