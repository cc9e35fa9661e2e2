pub use crate::{
    error::Error,
    optimistic_build_cache::{OptimisticBuildCache, OptimisticBuildOutcome},
    payload_builder::PayloadBuilder,
};

mod error;
mod optimistic_build_cache;
mod payload_builder;
