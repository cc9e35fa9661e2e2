use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use types::{
    execution::PayloadId,
    primitives::{VersionedHash, H256},
};

use crate::types::{
    BlockTag, EngineGetPayloadV3Response, ExecutionBlockHeader, ExecutionPayloadV3,
    ForkChoiceStateV1, ForkChoiceUpdatedResponse, PayloadAttributesV3, PayloadStatusV1,
};

/// The Engine API methods used to drive an execution client.
///
/// Implementations return statuses exactly as reported by the execution client.
/// Interpreting them is left to [`EngineClient`](crate::EngineClient).
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// [`engine_forkchoiceUpdatedV3`](https://github.com/ethereum/execution-apis/blob/fe8e13c288c592ec154ce25c534e26cb7ce0530d/src/engine/cancun.md#engine_forkchoiceupdatedv3)
    async fn forkchoice_updated(
        &self,
        fork_choice_state: ForkChoiceStateV1,
        payload_attributes: Option<PayloadAttributesV3>,
    ) -> Result<ForkChoiceUpdatedResponse>;

    /// [`engine_newPayloadV3`](https://github.com/ethereum/execution-apis/blob/fe8e13c288c592ec154ce25c534e26cb7ce0530d/src/engine/cancun.md#engine_newpayloadv3)
    async fn new_payload(
        &self,
        payload: ExecutionPayloadV3,
        versioned_hashes: Vec<VersionedHash>,
        parent_beacon_block_root: H256,
    ) -> Result<PayloadStatusV1>;

    /// [`engine_getPayloadV3`](https://github.com/ethereum/execution-apis/blob/fe8e13c288c592ec154ce25c534e26cb7ce0530d/src/engine/cancun.md#engine_getpayloadv3)
    async fn get_payload(&self, payload_id: PayloadId) -> Result<EngineGetPayloadV3Response>;

    /// `eth_getBlockByNumber` with a block tag.
    async fn header_by_tag(&self, tag: BlockTag) -> Result<ExecutionBlockHeader>;
}

#[async_trait]
impl<E: ExecutionEngine + ?Sized> ExecutionEngine for Arc<E> {
    async fn forkchoice_updated(
        &self,
        fork_choice_state: ForkChoiceStateV1,
        payload_attributes: Option<PayloadAttributesV3>,
    ) -> Result<ForkChoiceUpdatedResponse> {
        self.as_ref()
            .forkchoice_updated(fork_choice_state, payload_attributes)
            .await
    }

    async fn new_payload(
        &self,
        payload: ExecutionPayloadV3,
        versioned_hashes: Vec<VersionedHash>,
        parent_beacon_block_root: H256,
    ) -> Result<PayloadStatusV1> {
        self.as_ref()
            .new_payload(payload, versioned_hashes, parent_beacon_block_root)
            .await
    }

    async fn get_payload(&self, payload_id: PayloadId) -> Result<EngineGetPayloadV3Response> {
        self.as_ref().get_payload(payload_id).await
    }

    async fn header_by_tag(&self, tag: BlockTag) -> Result<ExecutionBlockHeader> {
        self.as_ref().header_by_tag(tag).await
    }
}
