use std::sync::Arc;

use anyhow::{ensure, Result};
use types::{
    consensus::ExtendedCommitInfo,
    messages::ExtraMessage,
    primitives::{ConsensusAddress, ExecutionAddress, Height},
};

use crate::error::Error;

pub trait FeeRecipientProvider: Send + Sync {
    /// Fee recipient of payloads proposed by this node.
    fn local_fee_recipient(&self) -> ExecutionAddress;

    fn verify_fee_recipient(
        &self,
        proposer: ConsensusAddress,
        fee_recipient: ExecutionAddress,
    ) -> Result<()>;
}

/// Turns vote extensions into messages that are proposed alongside the execution payload.
pub trait VoteExtensionProvider: Send + Sync {
    /// Messages to append to the proposal for `height`, most important first.
    fn prepare_votes(
        &self,
        height: Height,
        local_last_commit: &ExtendedCommitInfo,
    ) -> Result<Vec<ExtraMessage>>;

    fn verify_votes(&self, height: Height, messages: &[ExtraMessage]) -> Result<()>;
}

pub trait ProposerSchedule: Send + Sync {
    fn is_local_proposer(&self, height: Height) -> Result<bool>;
}

/// Collaborators queried by the [`Keeper`](crate::Keeper).
#[derive(Clone)]
pub struct Providers {
    pub fee_recipient: Arc<dyn FeeRecipientProvider>,
    pub vote_extensions: Arc<dyn VoteExtensionProvider>,
    pub proposer_schedule: Arc<dyn ProposerSchedule>,
}

/// Every proposer on the network pays fees to the same address.
#[derive(Clone, Copy, Debug)]
pub struct StaticFeeRecipient(pub ExecutionAddress);

impl FeeRecipientProvider for StaticFeeRecipient {
    fn local_fee_recipient(&self) -> ExecutionAddress {
        self.0
    }

    fn verify_fee_recipient(
        &self,
        _proposer: ConsensusAddress,
        fee_recipient: ExecutionAddress,
    ) -> Result<()> {
        ensure!(
            fee_recipient == self.0,
            Error::FeeRecipientMismatch {
                expected: self.0,
                actual: fee_recipient,
            },
        );

        Ok(())
    }
}

#[derive(Clone, Copy, Default, Debug)]
pub struct NoVoteExtensions;

impl VoteExtensionProvider for NoVoteExtensions {
    fn prepare_votes(
        &self,
        _height: Height,
        _local_last_commit: &ExtendedCommitInfo,
    ) -> Result<Vec<ExtraMessage>> {
        Ok(vec![])
    }

    fn verify_votes(&self, _height: Height, messages: &[ExtraMessage]) -> Result<()> {
        ensure!(
            messages.is_empty(),
            Error::UnexpectedExtraMessages {
                count: messages.len(),
            },
        );

        Ok(())
    }
}

/// Reports the same answer for every height.
#[derive(Clone, Copy, Debug)]
pub struct FixedProposer(pub bool);

impl ProposerSchedule for FixedProposer {
    fn is_local_proposer(&self, _height: Height) -> Result<bool> {
        Ok(self.0)
    }
}
