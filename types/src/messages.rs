//! Messages carried by the single transaction of a proposal.
//!
//! A proposal transaction holds exactly one [`ExecutionPayloadMessage`] followed by zero or more
//! [`ExtraMessage`]s derived from vote extensions. It is encoded with `bincode`.

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::{
    execution::{ExecutionPayload, PayloadWithBlobs, Withdrawal},
    primitives::{
        BlobCommitment, ConsensusAddress, ExecutionAddress, ExecutionBlockHash,
        ExecutionBlockNumber, Height, UnixSeconds, H256,
    },
};

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct ExecutionPayloadMessage {
    pub execution_payload: ExecutionPayload,
    pub blob_commitments: Vec<BlobCommitment>,
}

impl ExecutionPayloadMessage {
    #[must_use]
    pub const fn block_hash(&self) -> ExecutionBlockHash {
        self.execution_payload.block_hash
    }

    #[must_use]
    pub const fn block_number(&self) -> ExecutionBlockNumber {
        self.execution_payload.block_number
    }

    #[must_use]
    pub const fn timestamp(&self) -> UnixSeconds {
        self.execution_payload.timestamp
    }

    #[must_use]
    pub const fn fee_recipient(&self) -> ExecutionAddress {
        self.execution_payload.fee_recipient
    }

    #[must_use]
    pub const fn prev_randao(&self) -> H256 {
        self.execution_payload.prev_randao
    }

    #[must_use]
    pub fn withdrawals(&self) -> &[Withdrawal] {
        &self.execution_payload.withdrawals
    }
}

impl From<PayloadWithBlobs> for ExecutionPayloadMessage {
    fn from(payload: PayloadWithBlobs) -> Self {
        let PayloadWithBlobs {
            execution_payload,
            blob_commitments,
        } = payload;

        Self {
            execution_payload,
            blob_commitments,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Delegation {
    pub delegator: ExecutionAddress,
    pub validator: ConsensusAddress,
    pub amount: Coin,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Attestation {
    pub source_chain_id: u64,
    pub attested_height: Height,
    pub attestation_root: H256,
    pub validator: ConsensusAddress,
}

/// Consensus-level message derived from vote extensions and appended to a proposal.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub enum ExtraMessage {
    Delegate(Delegation),
    Attest(Attestation),
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub enum ProposalMessage {
    ExecutionPayload(ExecutionPayloadMessage),
    Extra(ExtraMessage),
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct ProposalTx {
    pub messages: Vec<ProposalMessage>,
}

impl ProposalTx {
    #[must_use]
    pub fn new(payload: ExecutionPayloadMessage, extra_messages: Vec<ExtraMessage>) -> Self {
        let messages = core::iter::once(ProposalMessage::ExecutionPayload(payload))
            .chain(extra_messages.into_iter().map(ProposalMessage::Extra))
            .collect();

        Self { messages }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).context("failed to encode proposal transaction")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).context("failed to decode proposal transaction")
    }

    pub fn encoded_len(&self) -> Result<u64> {
        bincode::serialized_size(self).context("failed to measure proposal transaction")
    }

    pub fn execution_payloads(&self) -> impl Iterator<Item = &ExecutionPayloadMessage> {
        self.messages.iter().filter_map(|message| match message {
            ProposalMessage::ExecutionPayload(payload) => Some(payload),
            ProposalMessage::Extra(_) => None,
        })
    }

    pub fn extra_messages(&self) -> impl Iterator<Item = &ExtraMessage> {
        self.messages.iter().filter_map(|message| match message {
            ProposalMessage::ExecutionPayload(_) => None,
            ProposalMessage::Extra(extra) => Some(extra),
        })
    }
}

impl ProposalMessage {
    /// Number of bytes this message adds to an encoded [`ProposalTx`].
    pub fn encoded_len(&self) -> Result<u64> {
        bincode::serialized_size(self).context("failed to measure proposal message")
    }
}

#[cfg(test)]
mod tests {
    use crate::primitives::H160;

    use super::*;

    fn delegation(amount: u128) -> ExtraMessage {
        ExtraMessage::Delegate(Delegation {
            delegator: H160::repeat_byte(1),
            validator: H160::repeat_byte(2),
            amount: Coin {
                denom: "stake".to_owned(),
                amount,
            },
        })
    }

    #[test]
    fn payload_message_comes_first() -> Result<()> {
        let payload = ExecutionPayloadMessage {
            blob_commitments: vec![vec![1; 48], vec![2; 48]],
            ..ExecutionPayloadMessage::default()
        };

        let tx = ProposalTx::new(payload.clone(), vec![delegation(100)]);
        let decoded = ProposalTx::decode(&tx.encode()?)?;

        assert_eq!(decoded, tx);
        assert_eq!(decoded.messages[0], ProposalMessage::ExecutionPayload(payload));
        assert_eq!(decoded.execution_payloads().count(), 1);
        assert_eq!(decoded.extra_messages().collect::<Vec<_>>(), [&delegation(100)]);

        Ok(())
    }

    #[test]
    fn encoded_len_matches_encoding() -> Result<()> {
        let tx = ProposalTx::new(ExecutionPayloadMessage::default(), vec![delegation(1)]);

        assert_eq!(tx.encoded_len()?, u64::try_from(tx.encode()?.len())?);

        Ok(())
    }

    #[test]
    fn message_lengths_add_up_to_transaction_length() -> Result<()> {
        let payload_only = ProposalTx::new(ExecutionPayloadMessage::default(), vec![]);
        let with_extras = ProposalTx::new(
            ExecutionPayloadMessage::default(),
            vec![delegation(1), delegation(u128::MAX)],
        );

        let extras_len = with_extras
            .messages
            .iter()
            .skip(1)
            .map(ProposalMessage::encoded_len)
            .sum::<Result<u64>>()?;

        assert_eq!(with_extras.encoded_len()?, payload_only.encoded_len()? + extras_len);

        Ok(())
    }

    #[test]
    fn garbage_does_not_decode() {
        ProposalTx::decode(&[0xff; 3]).expect_err("garbage should not decode");
    }
}
