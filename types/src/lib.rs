pub mod consensus;
pub mod execution;
pub mod messages;
pub mod primitives;
