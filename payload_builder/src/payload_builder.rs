use core::fmt::Debug;
use std::sync::Arc;

use anyhow::{bail, ensure, Result};
use execution_engine::{EngineClient, EngineError, ExecutionEngine, ENGINE_FORKCHOICE_UPDATED_V3};
use logging::{debug_with_height, info_with_height};
use types::{
    execution::{BuildRequest, ExecutionHead, ExecutionPayload, PayloadHandle, PayloadId},
    messages::ExecutionPayloadMessage,
    primitives::{ExecutionAddress, ExecutionBlockNumber, Height, UnixSeconds, H256},
};

use crate::error::Error;

/// Turns an execution head into the payload proposed on top of it.
///
/// Payloads are built by a fork choice update with payload attributes followed by
/// `engine_getPayloadV3`. Every retrieved payload is checked against the request that started it.
pub struct PayloadBuilder<E> {
    engine_client: Arc<EngineClient<E>>,
}

impl<E: ExecutionEngine> PayloadBuilder<E> {
    #[must_use]
    pub const fn new(engine_client: Arc<EngineClient<E>>) -> Self {
        Self { engine_client }
    }

    #[must_use]
    pub const fn engine_client(&self) -> &Arc<EngineClient<E>> {
        &self.engine_client
    }

    pub async fn build(
        &self,
        parent: &ExecutionHead,
        timestamp: UnixSeconds,
        fee_recipient: ExecutionAddress,
        parent_beacon_block_root: H256,
    ) -> Result<ExecutionPayloadMessage> {
        let request = build_request(parent, timestamp, fee_recipient, parent_beacon_block_root)?;
        let payload_id = self.start(&request).await?;

        debug_with_height!(
            "building payload {payload_id} on block {:?} at timestamp {timestamp}",
            parent.block_hash,
        );

        self.finish(payload_id, &request, parent).await
    }

    /// Starts a build without waiting for the payload.
    ///
    /// The engine keeps assembling the payload in the background until it is retrieved with
    /// [`Self::retrieve`] or abandoned.
    pub async fn build_optimistic(
        &self,
        parent: &ExecutionHead,
        timestamp: UnixSeconds,
        fee_recipient: ExecutionAddress,
        parent_beacon_block_root: H256,
        target_height: Height,
    ) -> Result<PayloadHandle> {
        let request = build_request(parent, timestamp, fee_recipient, parent_beacon_block_root)?;
        let payload_id = self.start(&request).await?;

        info_with_height!(
            "started optimistic build {payload_id} for height {target_height} \
             on block {:?} at timestamp {timestamp}",
            parent.block_hash,
        );

        Ok(PayloadHandle {
            payload_id,
            started_at: timestamp,
            target_height,
            request,
        })
    }

    /// Retrieves a payload started by [`Self::build_optimistic`] on top of `parent`.
    pub async fn retrieve(
        &self,
        handle: &PayloadHandle,
        parent: &ExecutionHead,
    ) -> Result<ExecutionPayloadMessage> {
        self.finish(handle.payload_id, &handle.request, parent).await
    }

    async fn start(&self, request: &BuildRequest) -> Result<PayloadId> {
        let update = self
            .engine_client
            .update_fork_choice(request.parent_hash, Some(request))
            .await?;

        if update.status.is_syncing() {
            bail!(Error::EngineSyncing {
                parent_hash: request.parent_hash,
            });
        }

        let Some(payload_id) = update.payload_id else {
            bail!(EngineError::MissingPayloadId {
                method: ENGINE_FORKCHOICE_UPDATED_V3,
            });
        };

        Ok(payload_id)
    }

    async fn finish(
        &self,
        payload_id: PayloadId,
        request: &BuildRequest,
        parent: &ExecutionHead,
    ) -> Result<ExecutionPayloadMessage> {
        let payload = self.engine_client.retrieve_payload(payload_id).await?;

        validate_payload(&payload.execution_payload, request, parent)?;

        Ok(payload.into())
    }
}

fn build_request(
    parent: &ExecutionHead,
    timestamp: UnixSeconds,
    fee_recipient: ExecutionAddress,
    parent_beacon_block_root: H256,
) -> Result<BuildRequest> {
    ensure!(
        timestamp > parent.block_time,
        Error::TimestampNotIncreasing {
            timestamp,
            parent_timestamp: parent.block_time,
        },
    );

    next_block_number(parent)?;

    Ok(BuildRequest::new(
        parent,
        timestamp,
        fee_recipient,
        parent_beacon_block_root,
    ))
}

fn validate_payload(
    payload: &ExecutionPayload,
    request: &BuildRequest,
    parent: &ExecutionHead,
) -> Result<()> {
    expect_field("block number", next_block_number(parent)?, payload.block_number)?;
    expect_field("parent hash", request.parent_hash, payload.parent_hash)?;
    expect_field("timestamp", request.timestamp, payload.timestamp)?;
    expect_field("prev randao", request.prev_randao, payload.prev_randao)?;
    expect_field("fee recipient", request.fee_recipient, payload.fee_recipient)?;

    // This chain does not process withdrawals. Non-empty lists are never dropped silently.
    ensure!(
        payload.withdrawals.is_empty(),
        Error::WithdrawalsNotEmpty {
            count: payload.withdrawals.len(),
        },
    );

    Ok(())
}

fn next_block_number(parent: &ExecutionHead) -> Result<ExecutionBlockNumber> {
    parent.block_number.checked_add(1).ok_or_else(|| {
        Error::BlockNumberOverflow {
            block_number: parent.block_number,
        }
        .into()
    })
}

fn expect_field<T: PartialEq + Debug>(field: &'static str, expected: T, actual: T) -> Result<()> {
    ensure!(
        expected == actual,
        Error::UnexpectedPayload {
            field,
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        },
    );

    Ok(())
}
