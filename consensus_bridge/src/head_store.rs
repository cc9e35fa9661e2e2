use anyhow::{ensure, Context as _, Result};
use database::Database;
use types::execution::ExecutionHead;

use crate::error::Error;

const EXECUTION_HEAD_KEY: &str = "execution_head";

/// Durable record of the last execution block finalized by consensus.
pub struct ExecutionHeadStore {
    database: Database,
}

impl ExecutionHeadStore {
    #[must_use]
    pub const fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn load(&self) -> Result<Option<ExecutionHead>> {
        self.database
            .get(EXECUTION_HEAD_KEY)?
            .map(|bytes| bincode::deserialize(&bytes))
            .transpose()
            .context("failed to decode stored execution head")
    }

    /// Stores `head` unless a head is already present. Returns the head in effect afterwards.
    pub fn insert_genesis(&self, head: ExecutionHead) -> Result<ExecutionHead> {
        if let Some(stored) = self.load()? {
            return Ok(stored);
        }

        self.store(&head)?;

        Ok(head)
    }

    pub fn update(&self, head: ExecutionHead) -> Result<()> {
        let current = self.load()?.ok_or(Error::MissingExecutionHead)?;

        ensure!(
            head.block_number > current.block_number,
            Error::NonMonotonicHead {
                current: current.block_number,
                new: head.block_number,
            },
        );

        self.store(&head)
    }

    fn store(&self, head: &ExecutionHead) -> Result<()> {
        let bytes = bincode::serialize(head)?;
        self.database.put(EXECUTION_HEAD_KEY, bytes)
    }
}
