use core::sync::atomic::{AtomicU64, Ordering};

use derive_more::Display;

pub static CONSENSUS_LOG_CONTEXT: ConsensusLogContext = ConsensusLogContext::new();

#[derive(Display, Debug)]
#[display("height: {height:?}")]
pub struct ConsensusLogContext {
    height: AtomicU64,
}

impl ConsensusLogContext {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            height: AtomicU64::new(0),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::Relaxed);
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }
}

impl Default for ConsensusLogContext {
    fn default() -> Self {
        Self::new()
    }
}

#[macro_export]
macro_rules! info_with_height {
    ($($arg:tt)*) => {
        ::tracing::info!("[{}] {}", $crate::CONSENSUS_LOG_CONTEXT, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! debug_with_height {
    ($($arg:tt)*) => {
        ::tracing::debug!("[{}] {}", $crate::CONSENSUS_LOG_CONTEXT, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! warn_with_height {
    ($($arg:tt)*) => {
        ::tracing::warn!("[{}] {}", $crate::CONSENSUS_LOG_CONTEXT, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! error_with_height {
    ($($arg:tt)*) => {
        ::tracing::error!("[{}] {}", $crate::CONSENSUS_LOG_CONTEXT, format_args!($($arg)*));
    };
}

#[macro_export]
macro_rules! trace_with_height {
    ($($arg:tt)*) => {
        ::tracing::trace!("[{}] {}", $crate::CONSENSUS_LOG_CONTEXT, format_args!($($arg)*));
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_displays_current_height() {
        let context = ConsensusLogContext::new();

        assert_eq!(context.to_string(), "height: 0");

        context.set_height(42);

        assert_eq!(context.height(), 42);
        assert_eq!(context.to_string(), "height: 42");
    }
}
