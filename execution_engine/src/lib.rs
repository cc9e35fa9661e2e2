pub use crate::{
    client::{
        EngineClient, EngineError, EngineStatus, EngineTimeouts, ForkChoiceUpdate,
        ENGINE_FORKCHOICE_UPDATED_V3, ENGINE_GET_PAYLOAD_V3, ENGINE_NEW_PAYLOAD_V3,
        ETH_GET_BLOCK_BY_NUMBER,
    },
    execution_engine::ExecutionEngine,
    mock::{CallCounts, MockExecutionEngine},
    types::{
        BlobsBundleV1, BlockTag, EngineGetPayloadV3Response, ExecutionBlockHeader,
        ExecutionPayloadV3, ForkChoiceStateV1, ForkChoiceUpdatedResponse, PayloadAttributesV3,
        PayloadStatusV1, PayloadValidationStatus, WithdrawalV1,
    },
};

mod client;
mod execution_engine;
mod mock;
mod types;
