use std::sync::Arc;

use anyhow::{bail, ensure, Context as _, Error as AnyhowError, Result};
use clock::Clock;
use execution_engine::{BlockTag, EngineClient, EngineError, ExecutionEngine};
use logging::{debug_with_height, info_with_height, warn_with_height, CONSENSUS_LOG_CONTEXT};
use payload_builder::{OptimisticBuildCache, OptimisticBuildOutcome, PayloadBuilder};
use prometheus_metrics::Metrics;
use tokio::task::JoinHandle;
use types::{
    consensus::{
        beacon_root, FinalizeBlockRequest, PostFinalizeRequest, PrepareProposalRequest,
        PrepareProposalResponse, ProcessProposalRequest, ProposalStatus,
    },
    execution::ExecutionHead,
    messages::{ExecutionPayloadMessage, ExtraMessage, ProposalMessage, ProposalTx},
    primitives::{Height, H256},
};

use crate::{config::Config, error::Error, head_store::ExecutionHeadStore, providers::Providers};

/// Result of finalizing a block.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FinalizedBlock {
    pub head: ExecutionHead,
    /// Messages proposed alongside the payload, left for the rest of the node to apply.
    pub extra_messages: Vec<ExtraMessage>,
}

/// Answers the consensus callbacks of every height.
///
/// Callbacks for one node arrive sequentially. The only state shared with background work is
/// the optimistic build slot, which is guarded by [`OptimisticBuildCache`].
pub struct Keeper<E> {
    config: Config,
    payload_builder: PayloadBuilder<E>,
    optimistic_builds: OptimisticBuildCache,
    head_store: ExecutionHeadStore,
    providers: Providers,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
}

impl<E: ExecutionEngine> Keeper<E> {
    /// Wraps `engine` in an [`EngineClient`] bounded by `config.engine_timeouts`.
    #[must_use]
    pub fn new(
        config: Config,
        engine: E,
        head_store: ExecutionHeadStore,
        providers: Providers,
        clock: Arc<dyn Clock>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let engine_client = EngineClient::new(engine, config.engine_timeouts, metrics.clone());

        Self {
            config,
            payload_builder: PayloadBuilder::new(Arc::new(engine_client)),
            optimistic_builds: OptimisticBuildCache::new(),
            head_store,
            providers,
            clock,
            metrics,
        }
    }

    /// Loads the stored execution head or adopts the finalized block of the execution client.
    ///
    /// Optimistic builds started before are dropped.
    pub async fn initialize(&self, genesis_height: Height) -> Result<ExecutionHead> {
        if let Some(handle) = self.optimistic_builds.clear() {
            debug_with_height!(
                "dropping optimistic build {} for height {} on initialization",
                handle.payload_id,
                handle.target_height,
            );

            self.record_optimistic_build("stale");
        }

        if let Some(head) = self.head_store.load()? {
            info_with_height!(
                "resuming from execution block {} ({:?})",
                head.block_number,
                head.block_hash,
            );

            return Ok(head);
        }

        let header = self
            .engine_client()
            .header_by_tag(BlockTag::Finalized)
            .await?;

        let head = self.head_store.insert_genesis(ExecutionHead {
            block_hash: header.hash,
            block_number: header.number,
            block_time: header.timestamp,
            consensus_height: genesis_height,
        })?;

        info_with_height!(
            "initialized execution head at block {} ({:?})",
            head.block_number,
            head.block_hash,
        );

        self.record_head(&head);

        Ok(head)
    }

    pub fn execution_head(&self) -> Result<ExecutionHead> {
        self.head_store
            .load()?
            .ok_or_else(|| Error::MissingExecutionHead.into())
    }

    pub async fn prepare_proposal(
        &self,
        request: PrepareProposalRequest,
    ) -> Result<PrepareProposalResponse> {
        let _timer = self
            .metrics
            .as_ref()
            .map(|metrics| metrics.prepare_proposal_times.start_timer());

        CONSENSUS_LOG_CONTEXT.set_height(request.height);

        ensure!(
            request.txs.is_empty(),
            Error::UnexpectedTransactions {
                count: request.txs.len(),
            },
        );

        let head = self.execution_head()?;
        let parent_beacon_block_root = beacon_root(request.last_app_hash);

        let payload = match self
            .optimistic_payload(request.height, &head, parent_beacon_block_root)
            .await?
        {
            Some(payload) => payload,
            None => {
                self.payload_builder
                    .build(
                        &head,
                        request.time,
                        self.providers.fee_recipient.local_fee_recipient(),
                        parent_beacon_block_root,
                    )
                    .await?
            }
        };

        let extra_messages = self
            .providers
            .vote_extensions
            .prepare_votes(request.height, &request.local_last_commit)?;

        let proposal = self.assemble(payload, extra_messages, request.max_tx_bytes)?;

        Ok(PrepareProposalResponse {
            txs: vec![proposal.encode()?],
        })
    }

    pub async fn process_proposal(&self, request: ProcessProposalRequest) -> Result<ProposalStatus> {
        let _timer = self
            .metrics
            .as_ref()
            .map(|metrics| metrics.process_proposal_times.start_timer());

        CONSENSUS_LOG_CONTEXT.set_height(request.height);

        let head = self.execution_head()?;

        match self.verify_proposal(&request, &head).await {
            Ok(()) => Ok(ProposalStatus::Accept),
            Err(error) => {
                let reason = rejection_reason(&error);

                warn_with_height!("rejecting proposal ({reason}): {error:?}");

                if let Some(metrics) = self.metrics.as_ref() {
                    metrics.inc_proposal_rejected(reason);
                }

                Ok(ProposalStatus::Reject)
            }
        }
    }

    /// Imports the committed payload into the execution client and advances the execution head.
    ///
    /// Consensus has already committed the block, so an execution client that is still syncing
    /// does not stop finalization. A payload the execution client reports as invalid is fatal.
    pub async fn finalize_block(&self, request: FinalizeBlockRequest) -> Result<FinalizedBlock> {
        CONSENSUS_LOG_CONTEXT.set_height(request.height);

        let proposal = decode_single_transaction(&request.txs)?;
        let payload = single_execution_payload(&proposal)?;
        let engine_client = self.engine_client();

        let status = engine_client
            .submit_payload(
                &payload.execution_payload,
                &payload.blob_commitments,
                beacon_root(request.last_app_hash),
            )
            .await?;

        if status.is_syncing() {
            warn_with_height!(
                "execution engine is syncing; block {:?} accepted optimistically",
                payload.block_hash(),
            );
        }

        let update = engine_client
            .update_fork_choice(payload.block_hash(), None)
            .await?;

        if update.status.is_syncing() {
            warn_with_height!(
                "execution engine is syncing; fork choice moved to {:?} optimistically",
                payload.block_hash(),
            );
        }

        let head = ExecutionHead::from_payload(&payload.execution_payload, request.height);

        self.head_store.update(head)?;
        self.record_head(&head);

        info_with_height!(
            "execution head advanced to block {} ({:?})",
            head.block_number,
            head.block_hash,
        );

        Ok(FinalizedBlock {
            head,
            extra_messages: proposal.extra_messages().cloned().collect(),
        })
    }

    /// Starts building the payload for `height + 1` if this node proposes it.
    ///
    /// Failures are logged. The next proposal falls back to a synchronous build.
    pub async fn post_finalize(&self, request: PostFinalizeRequest) {
        CONSENSUS_LOG_CONTEXT.set_height(request.height);

        if let Some(handle) = self.optimistic_builds.discard_unreachable(request.height) {
            debug_with_height!(
                "discarding unused optimistic build {} for height {}",
                handle.payload_id,
                handle.target_height,
            );

            self.record_optimistic_build("stale");
        }

        if !self.config.build_optimistic {
            return;
        }

        let Some(next_height) = request.height.checked_add(1) else {
            warn_with_height!("height {} has no successor", request.height);
            return;
        };

        match self.providers.proposer_schedule.is_local_proposer(next_height) {
            Ok(true) => {}
            Ok(false) => return,
            Err(error) => {
                warn_with_height!("unable to determine proposer of height {next_height}: {error:?}");
                return;
            }
        }

        if let Err(error) = self
            .start_optimistic_build(next_height, request.app_hash)
            .await
        {
            warn_with_height!("failed to start optimistic build for height {next_height}: {error:?}");
        }
    }

    fn engine_client(&self) -> &EngineClient<E> {
        self.payload_builder.engine_client()
    }

    async fn start_optimistic_build(
        &self,
        target_height: Height,
        app_hash: Option<H256>,
    ) -> Result<()> {
        let head = self.execution_head()?;
        let timestamp = self.clock.now()?;

        let handle = self
            .payload_builder
            .build_optimistic(
                &head,
                timestamp,
                self.providers.fee_recipient.local_fee_recipient(),
                beacon_root(app_hash),
                target_height,
            )
            .await?;

        self.record_optimistic_build("started");

        if let Some(superseded) = self.optimistic_builds.store(handle) {
            info_with_height!(
                "abandoning optimistic build {} for height {}",
                superseded.payload_id,
                superseded.target_height,
            );

            self.record_optimistic_build("superseded");
        }

        Ok(())
    }

    /// Retrieves the payload of an optimistic build started for `height` on top of `head`.
    ///
    /// The build must also have been started with `parent_beacon_block_root`, which the execution
    /// client hashes into the block. Returns `None` when the proposal has to be built from scratch.
    async fn optimistic_payload(
        &self,
        height: Height,
        head: &ExecutionHead,
        parent_beacon_block_root: H256,
    ) -> Result<Option<ExecutionPayloadMessage>> {
        let now = self.clock.now()?;

        let handle = match self
            .optimistic_builds
            .try_consume(height, now, self.config.optimistic_build_ttl)
        {
            OptimisticBuildOutcome::Hit(handle) => handle,
            OptimisticBuildOutcome::Miss => {
                debug_with_height!("no optimistic build cached; building synchronously");
                self.record_optimistic_build("miss");
                return Ok(None);
            }
            OptimisticBuildOutcome::Stale {
                target_height,
                started_at,
            } => {
                info_with_height!(
                    "discarding stale optimistic build for height {target_height} \
                     started at {started_at}; building synchronously",
                );
                self.record_optimistic_build("stale");
                return Ok(None);
            }
        };

        if handle.request.parent_hash != head.block_hash
            || handle.request.timestamp <= head.block_time
        {
            info_with_height!(
                "optimistic build {} no longer extends execution head {:?}; building synchronously",
                handle.payload_id,
                head.block_hash,
            );
            self.record_optimistic_build("stale");
            return Ok(None);
        }

        if handle.request.parent_beacon_block_root != parent_beacon_block_root {
            info_with_height!(
                "optimistic build {} was started on parent beacon block root {:?} \
                 instead of {parent_beacon_block_root:?}; building synchronously",
                handle.payload_id,
                handle.request.parent_beacon_block_root,
            );
            self.record_optimistic_build("stale");
            return Ok(None);
        }

        match self.payload_builder.retrieve(&handle, head).await {
            Ok(payload) => {
                info_with_height!("reusing optimistic build {}", handle.payload_id);
                self.record_optimistic_build("hit");
                Ok(Some(payload))
            }
            Err(error) => {
                warn_with_height!(
                    "unable to retrieve optimistic build {}: {error:?}; building synchronously",
                    handle.payload_id,
                );
                self.record_optimistic_build("stale");
                Ok(None)
            }
        }
    }

    fn assemble(
        &self,
        payload: ExecutionPayloadMessage,
        extra_messages: Vec<ExtraMessage>,
        max_tx_bytes: u64,
    ) -> Result<ProposalTx> {
        let mut proposal = ProposalTx::new(payload, vec![]);
        let size = proposal.encoded_len()?;

        ensure!(
            size <= max_tx_bytes,
            Error::SizeBudgetExceeded { size, max_tx_bytes },
        );

        let candidates = extra_messages
            .into_iter()
            .map(ProposalMessage::Extra)
            .collect::<Vec<_>>();

        let sizes = candidates
            .iter()
            .map(ProposalMessage::encoded_len)
            .collect::<Result<Vec<_>>>()?;

        let (kept, dropped) = self.config.extra_message_truncation.apply(
            candidates,
            &sizes,
            max_tx_bytes - size,
        );

        if dropped > 0 {
            warn_with_height!(
                "dropped {dropped} extra messages to fit the proposal into {max_tx_bytes} bytes",
            );

            if let Some(metrics) = self.metrics.as_ref() {
                metrics.add_dropped_extra_messages(dropped);
            }
        }

        proposal.messages.extend(kept);

        Ok(proposal)
    }

    async fn verify_proposal(
        &self,
        request: &ProcessProposalRequest,
        head: &ExecutionHead,
    ) -> Result<()> {
        let proposal = decode_single_transaction(&request.txs)?;
        let payload = single_execution_payload(&proposal)?;

        expect_field("parent hash", head.block_hash == payload.execution_payload.parent_hash)?;
        expect_field(
            "block number",
            head.block_number.checked_add(1) == Some(payload.block_number()),
        )?;
        expect_field("prev randao", head.block_hash == payload.prev_randao())?;
        expect_field("timestamp", payload.timestamp() > head.block_time)?;
        expect_field("withdrawals", payload.withdrawals().is_empty())?;

        self.providers
            .fee_recipient
            .verify_fee_recipient(request.proposer_address, payload.fee_recipient())
            .context(Error::PayloadMismatch {
                field: "fee recipient",
            })?;

        let extra_messages = proposal.extra_messages().cloned().collect::<Vec<_>>();

        self.providers
            .vote_extensions
            .verify_votes(request.height, &extra_messages)
            .context(Error::PayloadMismatch {
                field: "extra messages",
            })?;

        let status = self
            .engine_client()
            .submit_payload(
                &payload.execution_payload,
                &payload.blob_commitments,
                beacon_root(request.last_app_hash),
            )
            .await?;

        // A payload the engine cannot fully validate yet is not good enough to vote for.
        expect_field("execution status", status.is_valid())
    }

    fn record_head(&self, head: &ExecutionHead) {
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.set_execution_head_number(head.block_number);
        }
    }

    fn record_optimistic_build(&self, outcome: &str) {
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.inc_optimistic_build(outcome);
        }
    }
}

impl<E: ExecutionEngine + 'static> Keeper<E> {
    /// Runs [`Self::post_finalize`] in the background so that it never delays consensus.
    pub fn spawn_post_finalize(self: &Arc<Self>, request: PostFinalizeRequest) -> JoinHandle<()> {
        let keeper = Arc::clone(self);

        tokio::spawn(async move { keeper.post_finalize(request).await })
    }
}

fn decode_single_transaction(txs: &[Vec<u8>]) -> Result<ProposalTx> {
    let [tx] = txs else {
        bail!(Error::InvalidTransactionCount { count: txs.len() });
    };

    ProposalTx::decode(tx)
}

fn single_execution_payload(proposal: &ProposalTx) -> Result<&ExecutionPayloadMessage> {
    let mut payloads = proposal.execution_payloads();

    let Some(payload) = payloads.next() else {
        bail!(Error::MissingExecutionPayload);
    };

    ensure!(
        payloads.next().is_none(),
        Error::MultipleExecutionPayloads {
            count: proposal.execution_payloads().count(),
        },
    );

    Ok(payload)
}

fn expect_field(field: &'static str, matches: bool) -> Result<()> {
    ensure!(matches, Error::PayloadMismatch { field });
    Ok(())
}

fn rejection_reason(error: &AnyhowError) -> &'static str {
    if let Some(error) = error.downcast_ref::<Error>() {
        return match error {
            Error::PayloadMismatch { field } => *field,
            Error::InvalidTransactionCount { .. } => "transaction count",
            Error::MissingExecutionPayload | Error::MultipleExecutionPayloads { .. } => {
                "execution payload count"
            }
            _ => "other",
        };
    }

    if error.downcast_ref::<EngineError>().is_some() {
        return "execution status";
    }

    "encoding"
}
