use core::time::Duration;

use parking_lot::Mutex;
use types::{
    execution::PayloadHandle,
    primitives::{Height, UnixSeconds},
};

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum OptimisticBuildOutcome {
    Hit(PayloadHandle),
    Miss,
    /// The cached build targeted another height or is older than the TTL. It has been discarded.
    Stale {
        target_height: Height,
        started_at: UnixSeconds,
    },
}

/// Single slot holding the speculative build started after the last finalized block.
///
/// The lock guards only the handle. Engine calls are never made while holding it.
#[derive(Default, Debug)]
pub struct OptimisticBuildCache {
    slot: Mutex<Option<PayloadHandle>>,
}

impl OptimisticBuildCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle that was superseded, if any. Its build is abandoned.
    pub fn store(&self, handle: PayloadHandle) -> Option<PayloadHandle> {
        self.slot.lock().replace(handle)
    }

    /// Takes the cached handle if it was stored for `target_height` and is not older than `ttl`.
    ///
    /// The slot is empty afterwards regardless of the outcome.
    pub fn try_consume(
        &self,
        target_height: Height,
        now: UnixSeconds,
        ttl: Duration,
    ) -> OptimisticBuildOutcome {
        let Some(handle) = self.slot.lock().take() else {
            return OptimisticBuildOutcome::Miss;
        };

        let expired = now.saturating_sub(handle.started_at) > ttl.as_secs();

        if handle.target_height != target_height || expired {
            return OptimisticBuildOutcome::Stale {
                target_height: handle.target_height,
                started_at: handle.started_at,
            };
        }

        OptimisticBuildOutcome::Hit(handle)
    }

    /// Discards the cached handle if its target height is at or below `finalized_height`.
    pub fn discard_unreachable(&self, finalized_height: Height) -> Option<PayloadHandle> {
        let mut slot = self.slot.lock();

        if slot
            .as_ref()
            .is_some_and(|handle| handle.target_height <= finalized_height)
        {
            return slot.take();
        }

        None
    }

    pub fn clear(&self) -> Option<PayloadHandle> {
        self.slot.lock().take()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}
