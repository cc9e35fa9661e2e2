use core::{future::Future, time::Duration};
use std::sync::Arc;

use anyhow::{Context as _, Error as AnyhowError, Result};
use prometheus_metrics::Metrics;
use serde::Deserialize;
use serde_with::{As, DurationMilliSeconds};
use thiserror::Error;
use tracing::warn;
use types::{
    execution::{versioned_hashes, BuildRequest, ExecutionPayload, PayloadId, PayloadWithBlobs},
    primitives::{BlobCommitment, ExecutionBlockHash, H256},
};

use crate::{
    types::{
        BlockTag, ExecutionBlockHeader, ForkChoiceStateV1, PayloadAttributesV3,
        PayloadValidationStatus,
    },
    ExecutionEngine,
};

pub const ENGINE_FORKCHOICE_UPDATED_V3: &str = "engine_forkchoiceUpdatedV3";
pub const ENGINE_GET_PAYLOAD_V3: &str = "engine_getPayloadV3";
pub const ENGINE_NEW_PAYLOAD_V3: &str = "engine_newPayloadV3";
pub const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{method} failed: execution engine unavailable")]
    Unavailable { method: &'static str },
    #[error("{method} returned {status:?} (validation error: {validation_error:?})")]
    InvalidStatus {
        method: &'static str,
        status: PayloadValidationStatus,
        validation_error: Option<String>,
    },
    #[error("{method} returned VALID without a payload ID")]
    MissingPayloadId { method: &'static str },
}

/// Per-method deadlines for Engine API calls, configured in milliseconds.
///
/// The defaults follow the timeouts recommended by the Engine API specification.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineTimeouts {
    #[serde(with = "As::<DurationMilliSeconds>")]
    pub forkchoice_updated: Duration,
    #[serde(with = "As::<DurationMilliSeconds>")]
    pub new_payload: Duration,
    #[serde(with = "As::<DurationMilliSeconds>")]
    pub get_payload: Duration,
    #[serde(with = "As::<DurationMilliSeconds>")]
    pub header: Duration,
}

impl Default for EngineTimeouts {
    fn default() -> Self {
        Self {
            forkchoice_updated: Duration::from_secs(8),
            new_payload: Duration::from_secs(8),
            get_payload: Duration::from_secs(1),
            header: Duration::from_secs(4),
        }
    }
}

/// Status reported by the execution engine that the caller must act on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EngineStatus {
    Valid,
    Syncing,
}

impl EngineStatus {
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub const fn is_syncing(self) -> bool {
        matches!(self, Self::Syncing)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ForkChoiceUpdate {
    pub status: EngineStatus,
    pub payload_id: Option<PayloadId>,
}

/// Request/response view of an [`ExecutionEngine`].
///
/// `SYNCING` is passed through to the caller. Any other status that is not `VALID` fails the
/// call with [`EngineError::InvalidStatus`]. Transport failures and timeouts fail it with
/// [`EngineError::Unavailable`]. Nothing is retried here.
pub struct EngineClient<E> {
    engine: E,
    timeouts: EngineTimeouts,
    metrics: Option<Arc<Metrics>>,
}

impl<E: ExecutionEngine> EngineClient<E> {
    #[must_use]
    pub const fn new(engine: E, timeouts: EngineTimeouts, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            engine,
            timeouts,
            metrics,
        }
    }

    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Make `head` the head, safe and finalized block, optionally starting a payload build on it.
    pub async fn update_fork_choice(
        &self,
        head: ExecutionBlockHash,
        build_request: Option<&BuildRequest>,
    ) -> Result<ForkChoiceUpdate> {
        let method = ENGINE_FORKCHOICE_UPDATED_V3;
        let state = ForkChoiceStateV1::single_slot_finality(head);
        let attributes = build_request.map(payload_attributes);
        let wants_payload = attributes.is_some();

        let response = self
            .call(
                method,
                self.timeouts.forkchoice_updated,
                self.engine.forkchoice_updated(state, attributes),
            )
            .await?;

        let payload_status = response.payload_status;
        let status = self.interpret(method, payload_status.status, payload_status.validation_error)?;

        if status.is_valid() && wants_payload && response.payload_id.is_none() {
            self.record_error(method);
            return Err(EngineError::MissingPayloadId { method }.into());
        }

        Ok(ForkChoiceUpdate {
            status,
            payload_id: response.payload_id,
        })
    }

    pub async fn submit_payload(
        &self,
        payload: &ExecutionPayload,
        blob_commitments: &[BlobCommitment],
        parent_beacon_block_root: H256,
    ) -> Result<EngineStatus> {
        let method = ENGINE_NEW_PAYLOAD_V3;

        let status = self
            .call(
                method,
                self.timeouts.new_payload,
                self.engine.new_payload(
                    payload.clone().into(),
                    versioned_hashes(blob_commitments),
                    parent_beacon_block_root,
                ),
            )
            .await?;

        self.interpret(method, status.status, status.validation_error)
    }

    pub async fn retrieve_payload(&self, payload_id: PayloadId) -> Result<PayloadWithBlobs> {
        let method = ENGINE_GET_PAYLOAD_V3;

        let response = self
            .call(
                method,
                self.timeouts.get_payload,
                self.engine.get_payload(payload_id),
            )
            .await?;

        Ok(response.into())
    }

    pub async fn header_by_tag(&self, tag: BlockTag) -> Result<ExecutionBlockHeader> {
        self.call(
            ETH_GET_BLOCK_BY_NUMBER,
            self.timeouts.header,
            self.engine.header_by_tag(tag),
        )
        .await
    }

    async fn call<T>(
        &self,
        method: &'static str,
        timeout: Duration,
        future: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        let _timer = self.metrics.as_ref().and_then(|metrics| {
            prometheus_metrics::start_timer_vec(&metrics.engine_api_request_times, method)
        });

        let result = match tokio::time::timeout(timeout, future).await {
            Ok(result) => result,
            Err(elapsed) => Err(AnyhowError::new(elapsed)),
        };

        result
            .inspect_err(|_| self.record_error(method))
            .context(EngineError::Unavailable { method })
    }

    fn interpret(
        &self,
        method: &'static str,
        status: PayloadValidationStatus,
        validation_error: Option<String>,
    ) -> Result<EngineStatus> {
        match status {
            PayloadValidationStatus::Valid => Ok(EngineStatus::Valid),
            PayloadValidationStatus::Syncing => {
                warn!("{method} returned SYNCING");
                Ok(EngineStatus::Syncing)
            }
            PayloadValidationStatus::Invalid
            | PayloadValidationStatus::InvalidBlockHash
            | PayloadValidationStatus::Accepted => {
                self.record_error(method);

                Err(EngineError::InvalidStatus {
                    method,
                    status,
                    validation_error,
                }
                .into())
            }
        }
    }

    fn record_error(&self, method: &str) {
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.inc_engine_api_error(method);
        }
    }
}

fn payload_attributes(request: &BuildRequest) -> PayloadAttributesV3 {
    let BuildRequest {
        parent_hash: _,
        timestamp,
        fee_recipient,
        prev_randao,
        ref withdrawals,
        parent_beacon_block_root,
    } = *request;

    PayloadAttributesV3 {
        timestamp,
        prev_randao,
        suggested_fee_recipient: fee_recipient,
        withdrawals: withdrawals.iter().copied().map(Into::into).collect(),
        parent_beacon_block_root,
    }
}
