use anyhow::Result;
use prometheus::{
    histogram_opts, opts, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry,
};
use tracing::warn;

#[derive(Debug)]
pub struct Metrics {
    // Engine API
    pub engine_api_request_times: HistogramVec,
    engine_api_errors_count: IntCounterVec,

    // Optimistic builds
    optimistic_builds: IntCounterVec,

    // Consensus callbacks
    pub prepare_proposal_times: Histogram,
    pub process_proposal_times: Histogram,
    proposals_rejected: IntCounterVec,
    dropped_extra_messages: IntCounter,

    // Execution head
    execution_head_number: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            // Engine API
            engine_api_request_times: HistogramVec::new(
                histogram_opts!(
                    "ENGINE_API_REQUEST_TIMES",
                    "Engine API request times by method"
                ),
                &["method"],
            )?,

            engine_api_errors_count: IntCounterVec::new(
                opts!(
                    "ENGINE_API_ERRORS_COUNT",
                    "Number of failed Engine API requests by method"
                ),
                &["method"],
            )?,

            // Optimistic builds
            optimistic_builds: IntCounterVec::new(
                opts!(
                    "OPTIMISTIC_BUILDS",
                    "Number of optimistic payload builds by outcome"
                ),
                &["outcome"],
            )?,

            // Consensus callbacks
            prepare_proposal_times: Histogram::with_opts(histogram_opts!(
                "PREPARE_PROPOSAL_TIMES",
                "Time spent preparing proposals",
            ))?,

            process_proposal_times: Histogram::with_opts(histogram_opts!(
                "PROCESS_PROPOSAL_TIMES",
                "Time spent validating proposals",
            ))?,

            proposals_rejected: IntCounterVec::new(
                opts!(
                    "PROPOSALS_REJECTED",
                    "Number of rejected proposals by mismatching field"
                ),
                &["field"],
            )?,

            dropped_extra_messages: IntCounter::new(
                "DROPPED_EXTRA_MESSAGES",
                "Number of vote extension messages dropped to fit the proposal byte budget",
            )?,

            // Execution head
            execution_head_number: IntGauge::new(
                "EXECUTION_HEAD_NUMBER",
                "Block number of the latest finalized execution block",
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.engine_api_request_times.clone()))?;
        registry.register(Box::new(self.engine_api_errors_count.clone()))?;
        registry.register(Box::new(self.optimistic_builds.clone()))?;
        registry.register(Box::new(self.prepare_proposal_times.clone()))?;
        registry.register(Box::new(self.process_proposal_times.clone()))?;
        registry.register(Box::new(self.proposals_rejected.clone()))?;
        registry.register(Box::new(self.dropped_extra_messages.clone()))?;
        registry.register(Box::new(self.execution_head_number.clone()))?;

        Ok(())
    }

    // Engine API
    pub fn inc_engine_api_error(&self, method: &str) {
        match self
            .engine_api_errors_count
            .get_metric_with_label_values(&[method])
        {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to track Engine API error for {method}: {error:?}"),
        }
    }

    // Optimistic builds
    pub fn inc_optimistic_build(&self, outcome: &str) {
        match self.optimistic_builds.get_metric_with_label_values(&[outcome]) {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to track optimistic build {outcome}: {error:?}"),
        }
    }

    // Consensus callbacks
    pub fn inc_proposal_rejected(&self, field: &str) {
        match self.proposals_rejected.get_metric_with_label_values(&[field]) {
            Ok(counter) => counter.inc(),
            Err(error) => warn!("unable to track rejected proposal ({field}): {error:?}"),
        }
    }

    pub fn add_dropped_extra_messages(&self, count: usize) {
        self.dropped_extra_messages
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX))
    }

    // Execution head
    pub fn set_execution_head_number(&self, block_number: u64) {
        self.execution_head_number
            .set(i64::try_from(block_number).unwrap_or(i64::MAX))
    }
}
