use std::collections::HashMap;

use anyhow::{bail, ensure, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tiny_keccak::{Hasher as _, Keccak};
use types::{
    execution::{versioned_hashes, ExecutionPayload, PayloadId},
    primitives::{
        BlobCommitment, ExecutionBlockHash, ExecutionBlockNumber, Gas, Transaction, UnixSeconds,
        VersionedHash, H256, H64, U256,
    },
};

use crate::{
    types::{
        BlobsBundleV1, BlockTag, EngineGetPayloadV3Response, ExecutionBlockHeader,
        ExecutionPayloadV3, ForkChoiceStateV1, ForkChoiceUpdatedResponse, PayloadAttributesV3,
        PayloadStatusV1, PayloadValidationStatus,
    },
    ExecutionEngine,
};

const GAS_LIMIT: Gas = 30_000_000;
const GAS_PER_BLOB: Gas = 1 << 17;
const BLOB_TX_TYPE: u8 = 3;

/// Deterministic in-memory execution client.
///
/// Block hashes are Keccak-256 digests of the payload fields and the parent beacon block root, so
/// any mutation of a payload or a different root makes `engine_newPayloadV3` report
/// `INVALID_BLOCK_HASH`. Injected blob commitments are represented by
/// synthetic blob transactions that carry their versioned hashes.
pub struct MockExecutionEngine {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    blocks: HashMap<ExecutionBlockHash, ExecutionPayload>,
    head: ExecutionBlockHash,
    payloads: HashMap<PayloadId, (ExecutionPayload, Vec<BlobCommitment>)>,
    blob_commitments: Vec<BlobCommitment>,
    queued_syncing_responses: usize,
    forced_new_payload_status: Option<PayloadValidationStatus>,
    calls: CallCounts,
}

/// Number of Engine API calls received, by method.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct CallCounts {
    pub forkchoice_updated: usize,
    pub forkchoice_updated_with_attributes: usize,
    pub new_payload: usize,
    pub get_payload: usize,
    pub header_by_tag: usize,
}

impl MockExecutionEngine {
    #[must_use]
    pub fn new(genesis_number: ExecutionBlockNumber, genesis_time: UnixSeconds) -> Self {
        let mut genesis = ExecutionPayload {
            block_number: genesis_number,
            timestamp: genesis_time,
            gas_limit: GAS_LIMIT,
            base_fee_per_gas: U256::from(7),
            ..ExecutionPayload::default()
        };

        genesis.block_hash = block_hash(&genesis, H256::zero());

        let head = genesis.block_hash;

        let state = MockState {
            blocks: HashMap::from([(head, genesis)]),
            head,
            ..MockState::default()
        };

        Self {
            state: Mutex::new(state),
        }
    }

    #[must_use]
    pub fn genesis_header(&self) -> ExecutionBlockHeader {
        let state = self.state.lock();
        header(&state.blocks[&state.head])
    }

    #[must_use]
    pub fn head(&self) -> ExecutionBlockHash {
        self.state.lock().head
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    #[must_use]
    pub fn contains_block(&self, block_hash: ExecutionBlockHash) -> bool {
        self.state.lock().blocks.contains_key(&block_hash)
    }

    /// Attach these commitments to every payload built from now on.
    pub fn set_blob_commitments(&self, blob_commitments: Vec<BlobCommitment>) {
        self.state.lock().blob_commitments = blob_commitments;
    }

    /// Answer the next `count` fork choice updates with `SYNCING`.
    pub fn queue_syncing_responses(&self, count: usize) {
        self.state.lock().queued_syncing_responses += count;
    }

    pub fn force_new_payload_status(&self, status: Option<PayloadValidationStatus>) {
        self.state.lock().forced_new_payload_status = status;
    }

    /// Forget all payloads that are being built, as execution clients do after a while.
    pub fn evict_payloads(&self) {
        self.state.lock().payloads.clear();
    }
}

#[async_trait]
impl ExecutionEngine for MockExecutionEngine {
    async fn forkchoice_updated(
        &self,
        fork_choice_state: ForkChoiceStateV1,
        payload_attributes: Option<PayloadAttributesV3>,
    ) -> Result<ForkChoiceUpdatedResponse> {
        let mut state = self.state.lock();

        state.calls.forkchoice_updated += 1;

        if payload_attributes.is_some() {
            state.calls.forkchoice_updated_with_attributes += 1;
        }

        let head_hash = fork_choice_state.head_block_hash;

        if state.queued_syncing_responses > 0 || !state.blocks.contains_key(&head_hash) {
            state.queued_syncing_responses = state.queued_syncing_responses.saturating_sub(1);

            return Ok(ForkChoiceUpdatedResponse {
                payload_status: PayloadStatusV1::new(PayloadValidationStatus::Syncing),
                payload_id: None,
            });
        }

        state.head = head_hash;

        let payload_id = match payload_attributes {
            Some(attributes) => Some(state.build(head_hash, attributes)?),
            None => None,
        };

        Ok(ForkChoiceUpdatedResponse {
            payload_status: PayloadStatusV1 {
                latest_valid_hash: Some(head_hash),
                ..PayloadStatusV1::new(PayloadValidationStatus::Valid)
            },
            payload_id,
        })
    }

    async fn new_payload(
        &self,
        payload: ExecutionPayloadV3,
        versioned_hashes: Vec<VersionedHash>,
        parent_beacon_block_root: H256,
    ) -> Result<PayloadStatusV1> {
        let mut state = self.state.lock();

        state.calls.new_payload += 1;

        if let Some(status) = state.forced_new_payload_status {
            return Ok(PayloadStatusV1::new(status));
        }

        let payload = ExecutionPayload::from(payload);

        if payload.block_hash != block_hash(&payload, parent_beacon_block_root) {
            return Ok(PayloadStatusV1::new(PayloadValidationStatus::InvalidBlockHash));
        }

        let Some(parent) = state.blocks.get(&payload.parent_hash) else {
            return Ok(PayloadStatusV1::new(PayloadValidationStatus::Syncing));
        };

        let validation_error = if parent.block_number.checked_add(1) != Some(payload.block_number) {
            Some("block number does not follow parent")
        } else if payload.timestamp <= parent.timestamp {
            Some("timestamp does not exceed parent timestamp")
        } else if blob_versioned_hashes(&payload) != versioned_hashes {
            Some("versioned hashes do not match blob transactions")
        } else {
            None
        };

        if let Some(validation_error) = validation_error {
            return Ok(PayloadStatusV1 {
                status: PayloadValidationStatus::Invalid,
                latest_valid_hash: Some(payload.parent_hash),
                validation_error: Some(validation_error.to_owned()),
            });
        }

        let block_hash = payload.block_hash;

        state.blocks.insert(block_hash, payload);

        Ok(PayloadStatusV1 {
            latest_valid_hash: Some(block_hash),
            ..PayloadStatusV1::new(PayloadValidationStatus::Valid)
        })
    }

    async fn get_payload(&self, payload_id: PayloadId) -> Result<EngineGetPayloadV3Response> {
        let mut state = self.state.lock();

        state.calls.get_payload += 1;

        let Some((payload, commitments)) = state.payloads.get(&payload_id).cloned() else {
            bail!(Error::UnknownPayload { payload_id });
        };

        let blob_count = commitments.len();

        Ok(EngineGetPayloadV3Response {
            execution_payload: payload.into(),
            block_value: U256::zero(),
            blobs_bundle: BlobsBundleV1 {
                commitments,
                proofs: vec![vec![0; 48]; blob_count],
                blobs: vec![vec![]; blob_count],
            },
            should_override_builder: false,
        })
    }

    async fn header_by_tag(&self, _tag: BlockTag) -> Result<ExecutionBlockHeader> {
        let mut state = self.state.lock();

        state.calls.header_by_tag += 1;

        // Blocks are final once they become the head.
        Ok(header(&state.blocks[&state.head]))
    }
}

impl MockState {
    fn build(
        &mut self,
        parent_hash: ExecutionBlockHash,
        attributes: PayloadAttributesV3,
    ) -> Result<PayloadId> {
        let parent = &self.blocks[&parent_hash];

        ensure!(
            attributes.timestamp > parent.timestamp,
            Error::InvalidPayloadAttributes,
        );

        let transactions = versioned_hashes(&self.blob_commitments)
            .into_iter()
            .map(|versioned_hash| {
                core::iter::once(BLOB_TX_TYPE)
                    .chain(versioned_hash.to_fixed_bytes())
                    .collect::<Transaction>()
            })
            .collect();

        let blob_count = Gas::try_from(self.blob_commitments.len())?;

        let mut payload = ExecutionPayload {
            parent_hash,
            fee_recipient: attributes.suggested_fee_recipient,
            state_root: keccak([parent.state_root.as_bytes(), parent_hash.as_bytes()]),
            prev_randao: attributes.prev_randao,
            block_number: parent
                .block_number
                .checked_add(1)
                .ok_or(Error::InvalidPayloadAttributes)?,
            gas_limit: GAS_LIMIT,
            timestamp: attributes.timestamp,
            base_fee_per_gas: parent.base_fee_per_gas,
            transactions,
            withdrawals: attributes.withdrawals.into_iter().map(Into::into).collect(),
            blob_gas_used: blob_count * GAS_PER_BLOB,
            ..ExecutionPayload::default()
        };

        payload.block_hash = block_hash(&payload, attributes.parent_beacon_block_root);

        let payload_id = PayloadId(H64::from_slice(
            &keccak([
                payload.block_hash.as_bytes(),
                attributes.parent_beacon_block_root.as_bytes(),
            ])[..8],
        ));

        self.payloads
            .insert(payload_id, (payload, self.blob_commitments.clone()));

        Ok(payload_id)
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("invalid payload attributes")]
    InvalidPayloadAttributes,
    #[error("unknown payload {payload_id}")]
    UnknownPayload { payload_id: PayloadId },
}

fn header(payload: &ExecutionPayload) -> ExecutionBlockHeader {
    ExecutionBlockHeader {
        hash: payload.block_hash,
        parent_hash: payload.parent_hash,
        number: payload.block_number,
        timestamp: payload.timestamp,
    }
}

fn block_hash(payload: &ExecutionPayload, parent_beacon_block_root: H256) -> ExecutionBlockHash {
    let mut hasher = Keccak::v256();

    hasher.update(parent_beacon_block_root.as_bytes());
    hasher.update(payload.parent_hash.as_bytes());
    hasher.update(payload.fee_recipient.as_bytes());
    hasher.update(payload.state_root.as_bytes());
    hasher.update(payload.prev_randao.as_bytes());
    hasher.update(&payload.block_number.to_be_bytes());
    hasher.update(&payload.timestamp.to_be_bytes());
    hasher.update(&payload.blob_gas_used.to_be_bytes());

    for transaction in &payload.transactions {
        hasher.update(&u64::try_from(transaction.len()).unwrap_or(u64::MAX).to_be_bytes());
        hasher.update(transaction);
    }

    for withdrawal in &payload.withdrawals {
        hasher.update(&withdrawal.index.to_be_bytes());
        hasher.update(withdrawal.address.as_bytes());
        hasher.update(&withdrawal.amount.to_be_bytes());
    }

    let mut output = H256::zero();
    hasher.finalize(output.as_bytes_mut());
    output
}

fn keccak<'bytes>(inputs: impl IntoIterator<Item = &'bytes [u8]>) -> H256 {
    let mut hasher = Keccak::v256();

    for input in inputs {
        hasher.update(input);
    }

    let mut output = H256::zero();
    hasher.finalize(output.as_bytes_mut());
    output
}

fn blob_versioned_hashes(payload: &ExecutionPayload) -> Vec<VersionedHash> {
    payload
        .transactions
        .iter()
        .filter_map(|transaction| match transaction.split_first() {
            Some((&BLOB_TX_TYPE, versioned_hash)) if versioned_hash.len() == 32 => {
                Some(H256::from_slice(versioned_hash))
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use types::primitives::H160;

    use super::*;

    fn attributes(timestamp: UnixSeconds, prev_randao: H256) -> PayloadAttributesV3 {
        PayloadAttributesV3 {
            timestamp,
            prev_randao,
            suggested_fee_recipient: H160::repeat_byte(0xfe),
            withdrawals: vec![],
            parent_beacon_block_root: H256::zero(),
        }
    }

    #[tokio::test]
    async fn built_payload_extends_head_and_is_accepted() -> Result<()> {
        let engine = MockExecutionEngine::new(1, 100);
        let genesis = engine.genesis_header();
        let state = ForkChoiceStateV1::single_slot_finality(genesis.hash);

        let response = engine
            .forkchoice_updated(state, Some(attributes(101, genesis.hash)))
            .await?;

        assert!(response.payload_status.status.is_valid());

        let payload_id = response.payload_id.expect("payload should be building");
        let payload = engine.get_payload(payload_id).await?.execution_payload;

        assert_eq!(payload.parent_hash, genesis.hash);
        assert_eq!(payload.block_number, 2);
        assert_eq!(payload.timestamp, 101);
        assert_eq!(payload.prev_randao, genesis.hash);

        let status = engine.new_payload(payload.clone(), vec![], H256::zero()).await?;

        assert!(status.status.is_valid());
        assert!(engine.contains_block(payload.block_hash));

        Ok(())
    }

    #[tokio::test]
    async fn mutated_payload_has_invalid_block_hash() -> Result<()> {
        let engine = MockExecutionEngine::new(1, 100);
        let genesis = engine.genesis_header();
        let state = ForkChoiceStateV1::single_slot_finality(genesis.hash);

        let payload_id = engine
            .forkchoice_updated(state, Some(attributes(101, genesis.hash)))
            .await?
            .payload_id
            .expect("payload should be building");

        let mut payload = engine.get_payload(payload_id).await?.execution_payload;
        payload.fee_recipient = H160::repeat_byte(0x01);

        let status = engine.new_payload(payload, vec![], H256::zero()).await?;

        assert_eq!(status.status, PayloadValidationStatus::InvalidBlockHash);

        Ok(())
    }

    #[tokio::test]
    async fn payload_submitted_with_other_beacon_root_has_invalid_block_hash() -> Result<()> {
        let engine = MockExecutionEngine::new(1, 100);
        let genesis = engine.genesis_header();
        let state = ForkChoiceStateV1::single_slot_finality(genesis.hash);
        let built_on = H256::repeat_byte(0xaa);

        let payload_id = engine
            .forkchoice_updated(
                state,
                Some(PayloadAttributesV3 {
                    parent_beacon_block_root: built_on,
                    ..attributes(101, genesis.hash)
                }),
            )
            .await?
            .payload_id
            .expect("payload should be building");

        let payload = engine.get_payload(payload_id).await?.execution_payload;

        let status = engine
            .new_payload(payload.clone(), vec![], H256::repeat_byte(0xbb))
            .await?;

        assert_eq!(status.status, PayloadValidationStatus::InvalidBlockHash);

        let status = engine.new_payload(payload, vec![], built_on).await?;

        assert!(status.status.is_valid());

        Ok(())
    }

    #[tokio::test]
    async fn blob_commitments_must_match_versioned_hashes() -> Result<()> {
        let engine = MockExecutionEngine::new(1, 100);
        let genesis = engine.genesis_header();
        let state = ForkChoiceStateV1::single_slot_finality(genesis.hash);
        let commitments = vec![vec![0xaa; 48], vec![0xbb; 48]];

        engine.set_blob_commitments(commitments.clone());

        let payload_id = engine
            .forkchoice_updated(state, Some(attributes(101, genesis.hash)))
            .await?
            .payload_id
            .expect("payload should be building");

        let response = engine.get_payload(payload_id).await?;

        assert_eq!(response.blobs_bundle.commitments, commitments);

        let reversed = versioned_hashes(&[commitments[1].clone(), commitments[0].clone()]);
        let status = engine
            .new_payload(response.execution_payload.clone(), reversed, H256::zero())
            .await?;

        assert_eq!(status.status, PayloadValidationStatus::Invalid);

        let status = engine
            .new_payload(
                response.execution_payload,
                versioned_hashes(&commitments),
                H256::zero(),
            )
            .await?;

        assert!(status.status.is_valid());

        Ok(())
    }

    #[tokio::test]
    async fn queued_syncing_responses_are_consumed_in_order() -> Result<()> {
        let engine = MockExecutionEngine::new(0, 0);
        let state = ForkChoiceStateV1::single_slot_finality(engine.head());

        engine.queue_syncing_responses(1);

        let first = engine.forkchoice_updated(state, None).await?;
        let second = engine.forkchoice_updated(state, None).await?;

        assert!(first.payload_status.status.is_syncing());
        assert!(second.payload_status.status.is_valid());
        assert_eq!(engine.calls().forkchoice_updated, 2);
        assert_eq!(engine.calls().forkchoice_updated_with_attributes, 0);

        Ok(())
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let engine = MockExecutionEngine::new(1, 100);
        let genesis = engine.genesis_header();
        let state = ForkChoiceStateV1::single_slot_finality(genesis.hash);

        engine
            .forkchoice_updated(state, Some(attributes(100, genesis.hash)))
            .await
            .expect_err("timestamp equal to parent timestamp should be rejected");
    }

    #[tokio::test]
    async fn evicted_payload_cannot_be_retrieved() -> Result<()> {
        let engine = MockExecutionEngine::new(1, 100);
        let genesis = engine.genesis_header();
        let state = ForkChoiceStateV1::single_slot_finality(genesis.hash);

        let payload_id = engine
            .forkchoice_updated(state, Some(attributes(101, genesis.hash)))
            .await?
            .payload_id
            .expect("payload should be building");

        engine.evict_payloads();

        engine
            .get_payload(payload_id)
            .await
            .expect_err("evicted payload should be unknown");

        Ok(())
    }
}
