use derive_more::Display;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::primitives::{
    BlobCommitment, Bloom, ExecutionAddress, ExecutionBlockHash, ExecutionBlockNumber, Gas, Gwei,
    Height, Transaction, UnixSeconds, ValidatorIndex, VersionedHash, Wei, WithdrawalIndex, H256,
    H64,
};

pub const VERSIONED_HASH_VERSION_KZG: &[u8] = &[1];

/// The last execution block accepted as canonical.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ExecutionHead {
    pub block_hash: ExecutionBlockHash,
    pub block_number: ExecutionBlockNumber,
    pub block_time: UnixSeconds,
    /// Consensus height at which this block was finalized.
    pub consensus_height: Height,
}

impl ExecutionHead {
    #[must_use]
    pub fn from_payload(payload: &ExecutionPayload, consensus_height: Height) -> Self {
        Self {
            block_hash: payload.block_hash,
            block_number: payload.block_number,
            block_time: payload.timestamp,
            consensus_height,
        }
    }
}

/// Input of a single fork choice update that asks the engine to build a payload.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BuildRequest {
    pub parent_hash: ExecutionBlockHash,
    pub timestamp: UnixSeconds,
    pub fee_recipient: ExecutionAddress,
    pub prev_randao: H256,
    pub withdrawals: Vec<Withdrawal>,
    pub parent_beacon_block_root: H256,
}

impl BuildRequest {
    /// The parent block hash doubles as `prevRandao`, tying payload contents to the parent.
    #[must_use]
    pub fn new(
        parent: &ExecutionHead,
        timestamp: UnixSeconds,
        fee_recipient: ExecutionAddress,
        parent_beacon_block_root: H256,
    ) -> Self {
        Self {
            parent_hash: parent.block_hash,
            timestamp,
            fee_recipient,
            prev_randao: parent.block_hash,
            withdrawals: vec![],
            parent_beacon_block_root,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Deserialize, Serialize)]
#[display("{_0:#x}")]
#[serde(transparent)]
pub struct PayloadId(pub H64);

/// A payload build started by a fork choice update.
///
/// The handle is meant to be retrieved once. Retrieval is idempotent at the engine, but callers
/// must not hand the same handle out twice.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PayloadHandle {
    pub payload_id: PayloadId,
    pub started_at: UnixSeconds,
    pub target_height: Height,
    pub request: BuildRequest,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Withdrawal {
    pub index: WithdrawalIndex,
    pub validator_index: ValidatorIndex,
    pub address: ExecutionAddress,
    pub amount: Gwei,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct ExecutionPayload {
    pub parent_hash: ExecutionBlockHash,
    pub fee_recipient: ExecutionAddress,
    pub state_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    pub prev_randao: H256,
    pub block_number: ExecutionBlockNumber,
    pub gas_limit: Gas,
    pub gas_used: Gas,
    pub timestamp: UnixSeconds,
    pub extra_data: Vec<u8>,
    pub base_fee_per_gas: Wei,
    pub block_hash: ExecutionBlockHash,
    pub transactions: Vec<Transaction>,
    pub withdrawals: Vec<Withdrawal>,
    pub blob_gas_used: Gas,
    pub excess_blob_gas: Gas,
}

/// A payload retrieved from the engine together with the commitments of the blobs it carries.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct PayloadWithBlobs {
    pub execution_payload: ExecutionPayload,
    pub blob_commitments: Vec<BlobCommitment>,
}

#[must_use]
pub fn kzg_commitment_to_versioned_hash(kzg_commitment: &[u8]) -> VersionedHash {
    let mut versioned_hash = H256(Sha256::digest(kzg_commitment).into());
    versioned_hash[..VERSIONED_HASH_VERSION_KZG.len()].copy_from_slice(VERSIONED_HASH_VERSION_KZG);
    versioned_hash
}

#[must_use]
pub fn versioned_hashes(blob_commitments: &[BlobCommitment]) -> Vec<VersionedHash> {
    blob_commitments
        .iter()
        .map(|commitment| kzg_commitment_to_versioned_hash(commitment))
        .collect()
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn versioned_hash_replaces_first_byte_of_digest() {
        let commitment = [0xc0; 48];
        let digest: [u8; 32] = Sha256::digest(commitment).into();
        let versioned_hash = kzg_commitment_to_versioned_hash(&commitment);

        assert_eq!(versioned_hash[0], 1);
        assert_eq!(versioned_hash[1..], digest[1..]);
    }

    #[test]
    fn versioned_hash_of_empty_input_matches_known_digest() {
        // SHA-256 of the empty string with the first byte replaced.
        assert_eq!(
            kzg_commitment_to_versioned_hash(&[]),
            H256(hex!(
                "01b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            )),
        );
    }

    #[test]
    fn versioned_hashes_preserve_commitment_order() {
        let commitments = vec![vec![2; 48], vec![1; 48]];
        let hashes = versioned_hashes(&commitments);

        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[0], kzg_commitment_to_versioned_hash(&commitments[0]));
        assert_eq!(hashes[1], kzg_commitment_to_versioned_hash(&commitments[1]));
    }

    #[test]
    fn build_request_uses_parent_hash_as_randao() {
        let parent = ExecutionHead {
            block_hash: H256::repeat_byte(7),
            block_number: 1,
            block_time: 10,
            consensus_height: 1,
        };

        let request = BuildRequest::new(&parent, 11, ExecutionAddress::repeat_byte(1), H256::zero());

        assert_eq!(request.parent_hash, parent.block_hash);
        assert_eq!(request.prev_randao, parent.block_hash);
        assert!(request.withdrawals.is_empty());
    }

    #[test]
    fn payload_id_is_displayed_as_full_hex() {
        let payload_id = PayloadId(H64::from_low_u64_be(0x2a));

        assert_eq!(payload_id.to_string(), "0x000000000000002a");
    }
}
