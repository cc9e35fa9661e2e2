use core::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use execution_engine::{
    BlockTag, EngineGetPayloadV3Response, ExecutionBlockHeader, ExecutionEngine,
    ExecutionPayloadV3, ForkChoiceStateV1, ForkChoiceUpdatedResponse, PayloadAttributesV3,
    PayloadStatusV1, ENGINE_FORKCHOICE_UPDATED_V3, ENGINE_GET_PAYLOAD_V3, ENGINE_NEW_PAYLOAD_V3,
    ETH_GET_BLOCK_BY_NUMBER,
};
use reqwest::{header::AUTHORIZATION, Client};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use types::{
    execution::PayloadId,
    primitives::{VersionedHash, H256},
};
use url::Url;

use crate::auth::{Auth, Options as AuthOptions};

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    /// Authenticated Engine API endpoint of the execution client.
    pub url: Url,
    #[serde(default)]
    pub auth: AuthOptions,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{method} failed with JSON-RPC error {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },
    #[error("execution client has no block tagged {tag}")]
    BlockNotFound { tag: &'static str },
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// [`ExecutionEngine`] backed by the JSON-RPC Engine API of an execution client.
pub struct EngineApi {
    client: Client,
    url: Url,
    auth: Auth,
    next_request_id: AtomicU64,
}

impl EngineApi {
    pub fn new(client: Client, options: Options) -> Result<Self> {
        let Options { url, auth } = options;

        Ok(Self::with_auth(client, url, Auth::new(auth)?))
    }

    #[must_use]
    pub const fn with_auth(client: Client, url: Url, auth: Auth) -> Self {
        Self {
            client,
            url,
            auth,
            next_request_id: AtomicU64::new(1),
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<T> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        debug!(method, request_id, "sending Engine API request");

        let body = json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(self.url.clone()).json(&body);

        if let Some(authorization) = self.auth.authorization()? {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = request
            .send()
            .await?
            .error_for_status()?
            .json::<JsonRpcResponse>()
            .await?;

        if let Some(JsonRpcError { code, message }) = response.error {
            bail!(Error::Rpc {
                method,
                code,
                message,
            });
        }

        serde_json::from_value(response.result)
            .with_context(|| format!("failed to decode result of {method}"))
    }
}

#[async_trait]
impl ExecutionEngine for EngineApi {
    async fn forkchoice_updated(
        &self,
        fork_choice_state: ForkChoiceStateV1,
        payload_attributes: Option<PayloadAttributesV3>,
    ) -> Result<ForkChoiceUpdatedResponse> {
        let params = vec![
            serde_json::to_value(fork_choice_state)?,
            serde_json::to_value(payload_attributes)?,
        ];

        self.execute(ENGINE_FORKCHOICE_UPDATED_V3, params).await
    }

    async fn new_payload(
        &self,
        payload: ExecutionPayloadV3,
        versioned_hashes: Vec<VersionedHash>,
        parent_beacon_block_root: H256,
    ) -> Result<PayloadStatusV1> {
        let params = vec![
            serde_json::to_value(payload)?,
            serde_json::to_value(versioned_hashes)?,
            serde_json::to_value(parent_beacon_block_root)?,
        ];

        self.execute(ENGINE_NEW_PAYLOAD_V3, params).await
    }

    async fn get_payload(&self, payload_id: PayloadId) -> Result<EngineGetPayloadV3Response> {
        let params = vec![serde_json::to_value(payload_id)?];

        self.execute(ENGINE_GET_PAYLOAD_V3, params).await
    }

    async fn header_by_tag(&self, tag: BlockTag) -> Result<ExecutionBlockHeader> {
        // The second parameter asks for transaction hashes instead of full transactions.
        let params = vec![serde_json::to_value(tag)?, Value::Bool(false)];

        self.execute::<Option<ExecutionBlockHeader>>(ETH_GET_BLOCK_BY_NUMBER, params)
            .await?
            .ok_or(Error::BlockNotFound { tag: tag.as_str() })
            .map_err(Into::into)
    }
}
