//! Wall clock used to pick payload timestamps.
//!
//! Consensus callbacks carry their own block time. The clock is only consulted when a build is
//! started outside of a callback, which happens when an optimistic build is launched after a block
//! is finalized. Tests substitute [`FakeClock`] to make those timestamps deterministic.

use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use parking_lot::Mutex;
use thiserror::Error;
use types::primitives::UnixSeconds;

pub trait Clock: Send + Sync {
    fn now(&self) -> Result<UnixSeconds>;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("system clock is {by:?} behind the Unix epoch")]
    BeforeUnixEpoch { by: Duration },
}

#[derive(Clone, Copy, Default, Debug)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<UnixSeconds> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|error| Error::BeforeUnixEpoch {
                by: error.duration(),
            })?;

        Ok(since_epoch.as_secs())
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FakeClock {
    since_epoch: Mutex<Duration>,
}

impl FakeClock {
    #[must_use]
    pub const fn new(unix_seconds: UnixSeconds) -> Self {
        Self {
            since_epoch: Mutex::new(Duration::from_secs(unix_seconds)),
        }
    }

    pub fn set(&self, unix_seconds: UnixSeconds) {
        *self.since_epoch.lock() = Duration::from_secs(unix_seconds);
    }

    pub fn advance(&self, duration: Duration) {
        let mut since_epoch = self.since_epoch.lock();
        *since_epoch = since_epoch.saturating_add(duration);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Result<UnixSeconds> {
        Ok(self.since_epoch.lock().as_secs())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(0, Duration::ZERO => 0)]
    #[test_case(100, Duration::from_millis(999) => 100)]
    #[test_case(100, Duration::from_secs(12) => 112)]
    fn fake_clock_advances(start: UnixSeconds, step: Duration) -> UnixSeconds {
        let clock = FakeClock::new(start);
        clock.advance(step);
        clock.now().expect("fake clock always reads")
    }

    #[test]
    fn partial_seconds_accumulate() -> Result<()> {
        let clock = FakeClock::new(10);

        clock.advance(Duration::from_millis(600));
        clock.advance(Duration::from_millis(600));

        assert_eq!(clock.now()?, 11);

        Ok(())
    }

    #[test]
    fn fake_clock_can_be_set() -> Result<()> {
        let clock = FakeClock::new(1);

        clock.set(1_700_000_000);

        assert_eq!(clock.now()?, 1_700_000_000);

        Ok(())
    }

    #[test]
    fn system_clock_is_after_epoch() -> Result<()> {
        assert!(SystemClock.now()? > 1_600_000_000);
        Ok(())
    }
}
