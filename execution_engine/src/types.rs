use serde::{Deserialize, Serialize};
use types::{
    execution::{ExecutionPayload, PayloadId, PayloadWithBlobs, Withdrawal},
    primitives::{
        BlobCommitment, Bloom, ExecutionAddress, ExecutionBlockHash, ExecutionBlockNumber, Gas,
        Gwei, Transaction, UnixSeconds, ValidatorIndex, Wei, WithdrawalIndex, H256,
    },
};

/// [`ExecutionPayloadV3`](https://github.com/ethereum/execution-apis/blob/fe8e13c288c592ec154ce25c534e26cb7ce0530d/src/engine/cancun.md#executionpayloadv3)
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayloadV3 {
    pub parent_hash: ExecutionBlockHash,
    pub fee_recipient: ExecutionAddress,
    pub state_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    pub prev_randao: H256,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub block_number: ExecutionBlockNumber,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub gas_limit: Gas,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub gas_used: Gas,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub timestamp: UnixSeconds,
    #[serde(with = "serde_utils::prefixed_hex_bytes")]
    pub extra_data: Vec<u8>,
    pub base_fee_per_gas: Wei,
    pub block_hash: ExecutionBlockHash,
    #[serde(with = "serde_utils::prefixed_hex_bytes_sequence")]
    pub transactions: Vec<Transaction>,
    pub withdrawals: Vec<WithdrawalV1>,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub blob_gas_used: Gas,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub excess_blob_gas: Gas,
}

impl From<ExecutionPayload> for ExecutionPayloadV3 {
    fn from(payload: ExecutionPayload) -> Self {
        let ExecutionPayload {
            parent_hash,
            fee_recipient,
            state_root,
            receipts_root,
            logs_bloom,
            prev_randao,
            block_number,
            gas_limit,
            gas_used,
            timestamp,
            extra_data,
            base_fee_per_gas,
            block_hash,
            transactions,
            withdrawals,
            blob_gas_used,
            excess_blob_gas,
        } = payload;

        let withdrawals = withdrawals.into_iter().map(Into::into).collect();

        Self {
            parent_hash,
            fee_recipient,
            state_root,
            receipts_root,
            logs_bloom,
            prev_randao,
            block_number,
            gas_limit,
            gas_used,
            timestamp,
            extra_data,
            base_fee_per_gas,
            block_hash,
            transactions,
            withdrawals,
            blob_gas_used,
            excess_blob_gas,
        }
    }
}

impl From<ExecutionPayloadV3> for ExecutionPayload {
    fn from(payload: ExecutionPayloadV3) -> Self {
        let ExecutionPayloadV3 {
            parent_hash,
            fee_recipient,
            state_root,
            receipts_root,
            logs_bloom,
            prev_randao,
            block_number,
            gas_limit,
            gas_used,
            timestamp,
            extra_data,
            base_fee_per_gas,
            block_hash,
            transactions,
            withdrawals,
            blob_gas_used,
            excess_blob_gas,
        } = payload;

        let withdrawals = withdrawals.into_iter().map(Into::into).collect();

        Self {
            parent_hash,
            fee_recipient,
            state_root,
            receipts_root,
            logs_bloom,
            prev_randao,
            block_number,
            gas_limit,
            gas_used,
            timestamp,
            extra_data,
            base_fee_per_gas,
            block_hash,
            transactions,
            withdrawals,
            blob_gas_used,
            excess_blob_gas,
        }
    }
}

/// [`WithdrawalV1`](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/shanghai.md#withdrawalv1)
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalV1 {
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub index: WithdrawalIndex,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub validator_index: ValidatorIndex,
    pub address: ExecutionAddress,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub amount: Gwei,
}

impl From<Withdrawal> for WithdrawalV1 {
    fn from(withdrawal: Withdrawal) -> Self {
        let Withdrawal {
            index,
            validator_index,
            address,
            amount,
        } = withdrawal;

        Self {
            index,
            validator_index,
            address,
            amount,
        }
    }
}

impl From<WithdrawalV1> for Withdrawal {
    fn from(withdrawal: WithdrawalV1) -> Self {
        let WithdrawalV1 {
            index,
            validator_index,
            address,
            amount,
        } = withdrawal;

        Self {
            index,
            validator_index,
            address,
            amount,
        }
    }
}

/// [`BlobsBundleV1`](https://github.com/ethereum/execution-apis/blob/fe8e13c288c592ec154ce25c534e26cb7ce0530d/src/engine/cancun.md#blobsbundlev1)
#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct BlobsBundleV1 {
    #[serde(with = "serde_utils::prefixed_hex_bytes_sequence")]
    pub commitments: Vec<BlobCommitment>,
    #[serde(with = "serde_utils::prefixed_hex_bytes_sequence")]
    pub proofs: Vec<Vec<u8>>,
    #[serde(with = "serde_utils::prefixed_hex_bytes_sequence")]
    pub blobs: Vec<Vec<u8>>,
}

/// [`engine_getPayloadV3` response](https://github.com/ethereum/execution-apis/blob/fe8e13c288c592ec154ce25c534e26cb7ce0530d/src/engine/cancun.md#response-2)
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineGetPayloadV3Response {
    pub execution_payload: ExecutionPayloadV3,
    pub block_value: Wei,
    // Execution clients may omit the bundle for payloads without blobs.
    #[serde(default)]
    pub blobs_bundle: BlobsBundleV1,
    #[serde(default)]
    pub should_override_builder: bool,
}

impl From<EngineGetPayloadV3Response> for PayloadWithBlobs {
    fn from(response: EngineGetPayloadV3Response) -> Self {
        let EngineGetPayloadV3Response {
            execution_payload,
            blobs_bundle,
            ..
        } = response;

        Self {
            execution_payload: execution_payload.into(),
            blob_commitments: blobs_bundle.commitments,
        }
    }
}

/// [`ForkChoiceStateV1`](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/paris.md#forkchoicestatev1)
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkChoiceStateV1 {
    pub head_block_hash: ExecutionBlockHash,
    pub safe_block_hash: ExecutionBlockHash,
    pub finalized_block_hash: ExecutionBlockHash,
}

impl ForkChoiceStateV1 {
    /// Blocks are final as soon as consensus commits them, so head, safe and finalized coincide.
    #[must_use]
    pub const fn single_slot_finality(block_hash: ExecutionBlockHash) -> Self {
        Self {
            head_block_hash: block_hash,
            safe_block_hash: block_hash,
            finalized_block_hash: block_hash,
        }
    }
}

/// [`PayloadAttributesV3`](https://github.com/ethereum/execution-apis/blob/fe8e13c288c592ec154ce25c534e26cb7ce0530d/src/engine/cancun.md#payloadattributesv3)
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadAttributesV3 {
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub timestamp: UnixSeconds,
    pub prev_randao: H256,
    pub suggested_fee_recipient: ExecutionAddress,
    pub withdrawals: Vec<WithdrawalV1>,
    pub parent_beacon_block_root: H256,
}

/// [`PayloadStatusV1`](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/paris.md#payloadstatusv1)
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStatusV1 {
    pub status: PayloadValidationStatus,
    pub latest_valid_hash: Option<ExecutionBlockHash>,
    pub validation_error: Option<String>,
}

impl PayloadStatusV1 {
    #[must_use]
    pub const fn new(status: PayloadValidationStatus) -> Self {
        Self {
            status,
            latest_valid_hash: None,
            validation_error: None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadValidationStatus {
    Valid,
    Invalid,
    Syncing,
    Accepted,
    InvalidBlockHash,
}

impl PayloadValidationStatus {
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub const fn is_invalid(self) -> bool {
        matches!(self, Self::Invalid | Self::InvalidBlockHash)
    }

    #[must_use]
    pub const fn is_syncing(self) -> bool {
        matches!(self, Self::Syncing)
    }
}

/// [`engine_forkchoiceUpdated` response](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/paris.md#response-1)
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkChoiceUpdatedResponse {
    pub payload_status: PayloadStatusV1,
    pub payload_id: Option<PayloadId>,
}

/// Default block parameter of `eth_getBlockByNumber`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTag {
    Latest,
    Safe,
    Finalized,
}

impl BlockTag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Safe => "safe",
            Self::Finalized => "finalized",
        }
    }
}

/// Subset of the block object returned by `eth_getBlockByNumber`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionBlockHeader {
    pub hash: ExecutionBlockHash,
    pub parent_hash: ExecutionBlockHash,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub number: ExecutionBlockNumber,
    #[serde(with = "serde_utils::prefixed_hex_quantity")]
    pub timestamp: UnixSeconds,
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;
    use types::primitives::{H160, H64, U256};

    use super::*;

    fn sample_payload_json() -> serde_json::Value {
        json!({
            "parentHash": "0x3b8fb240d288781d4aac94d3fd16809ee413bc99294a085798a589dae51ddd4a",
            "feeRecipient": "0xa94f5374fce5edbc8e2a8697c15331677e6ebf0b",
            "stateRoot": "0xca3149fa9e37db08d1cd49c9061db1002ef1cd58db2210f2115c8c989b2bdf45",
            "receiptsRoot": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "prevRandao": "0x3b8fb240d288781d4aac94d3fd16809ee413bc99294a085798a589dae51ddd4a",
            "blockNumber": "0x2",
            "gasLimit": "0x1c9c380",
            "gasUsed": "0x0",
            "timestamp": "0x6553f101",
            "extraData": "0x",
            "baseFeePerGas": "0x7",
            "blockHash": "0x6359b8381a370e2f54072a5784ddd78b6ed024991558c511d4452eb4f6ac898c",
            "transactions": ["0x03aa", "0x02bb"],
            "withdrawals": [],
            "blobGasUsed": "0x20000",
            "excessBlobGas": "0x0",
        })
    }

    #[test]
    fn get_payload_response_converts_to_native_payload() -> Result<()> {
        let json = json!({
            "executionPayload": sample_payload_json(),
            "blockValue": "0x10",
            "blobsBundle": {
                "commitments": ["0x01", "0x02"],
                "proofs": ["0x11", "0x12"],
                "blobs": ["0x21", "0x22"],
            },
            "shouldOverrideBuilder": false,
        });

        let response = serde_json::from_value::<EngineGetPayloadV3Response>(json)?;

        assert_eq!(response.block_value, U256::from(16));

        let payload = PayloadWithBlobs::from(response);

        assert_eq!(payload.execution_payload.block_number, 2);
        assert_eq!(payload.execution_payload.timestamp, 0x6553_f101);
        assert_eq!(payload.execution_payload.base_fee_per_gas, U256::from(7));
        assert_eq!(payload.execution_payload.transactions, [vec![0x03_u8, 0xaa], vec![0x02, 0xbb]]);
        assert_eq!(payload.blob_commitments, [vec![1_u8], vec![2]]);

        Ok(())
    }

    #[test]
    fn get_payload_response_without_blobs_bundle_has_no_commitments() -> Result<()> {
        let json = json!({
            "executionPayload": sample_payload_json(),
            "blockValue": "0x0",
        });

        let payload = PayloadWithBlobs::from(serde_json::from_value::<EngineGetPayloadV3Response>(
            json,
        )?);

        assert!(payload.blob_commitments.is_empty());

        Ok(())
    }

    #[test]
    fn native_payload_round_trips_through_wire_format() -> Result<()> {
        let wire = serde_json::from_value::<ExecutionPayloadV3>(sample_payload_json())?;
        let native = ExecutionPayload::from(wire.clone());

        assert_eq!(ExecutionPayloadV3::from(native), wire);
        assert_eq!(serde_json::to_value(&wire)?, sample_payload_json());

        Ok(())
    }

    #[test]
    fn payload_attributes_serialization() -> Result<()> {
        let attributes = PayloadAttributesV3 {
            timestamp: 0x6553_f101,
            prev_randao: H256::repeat_byte(0x11),
            suggested_fee_recipient: H160::repeat_byte(0x22),
            withdrawals: vec![],
            parent_beacon_block_root: H256::zero(),
        };

        assert_eq!(
            serde_json::to_value(attributes)?,
            json!({
                "timestamp": "0x6553f101",
                "prevRandao": format!("0x{}", "11".repeat(32)),
                "suggestedFeeRecipient": format!("0x{}", "22".repeat(20)),
                "withdrawals": [],
                "parentBeaconBlockRoot": format!("0x{}", "00".repeat(32)),
            }),
        );

        Ok(())
    }

    #[test]
    fn fork_choice_updated_response_deserialization() -> Result<()> {
        let json = json!({
            "payloadStatus": {
                "status": "VALID",
                "latestValidHash": null,
                "validationError": null,
            },
            "payloadId": "0x0000000000000007",
        });

        let response = serde_json::from_value::<ForkChoiceUpdatedResponse>(json)?;

        assert!(response.payload_status.status.is_valid());
        assert_eq!(response.payload_id, Some(PayloadId(H64::from_low_u64_be(7))));

        Ok(())
    }

    #[test]
    fn syncing_status_has_no_payload_id() -> Result<()> {
        let json = json!({
            "payloadStatus": {"status": "SYNCING", "latestValidHash": null, "validationError": null},
            "payloadId": null,
        });

        let response = serde_json::from_value::<ForkChoiceUpdatedResponse>(json)?;

        assert!(response.payload_status.status.is_syncing());
        assert_eq!(response.payload_id, None);

        Ok(())
    }
}
