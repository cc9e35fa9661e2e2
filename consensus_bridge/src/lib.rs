//! Couples a BFT consensus engine to an execution client.
//!
//! [`Keeper`] answers the per-height consensus callbacks: it proposes execution payloads,
//! validates payloads proposed by others, tracks the canonical [`ExecutionHead`] and starts
//! building the next payload as soon as a block is finalized.
//!
//! [`ExecutionHead`]: types::execution::ExecutionHead

pub use crate::{
    config::{Config, TruncationPolicy},
    error::Error,
    head_store::ExecutionHeadStore,
    keeper::{FinalizedBlock, Keeper},
    providers::{
        FeeRecipientProvider, FixedProposer, NoVoteExtensions, ProposerSchedule, Providers,
        StaticFeeRecipient, VoteExtensionProvider,
    },
};

mod config;
mod error;
mod head_store;
mod keeper;
mod providers;
