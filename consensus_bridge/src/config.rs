use core::time::Duration;
use std::path::Path;

use anyhow::{Context as _, Result};
use execution_engine::EngineTimeouts;
use serde::Deserialize;
use serde_with::{As, DurationSeconds};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Start building the next payload right after finalizing a block when this node proposes next.
    pub build_optimistic: bool,
    pub extra_message_truncation: TruncationPolicy,
    /// Optimistic builds older than this are not reused. Execution clients drop unretrieved
    /// payloads after a while.
    #[serde(with = "As::<DurationSeconds>")]
    pub optimistic_build_ttl: Duration,
    pub engine_timeouts: EngineTimeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build_optimistic: true,
            extra_message_truncation: TruncationPolicy::default(),
            optimistic_build_ttl: Duration::from_secs(12),
            engine_timeouts: EngineTimeouts::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs_err::read(path)?;

        serde_yaml::from_slice(bytes.as_slice())
            .with_context(|| format!("failed to parse configuration in {}", path.display()))
    }
}

/// Which extra messages give way first when a proposal exceeds its byte budget.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationPolicy {
    #[default]
    DropFromEnd,
    DropFromStart,
}

impl TruncationPolicy {
    /// Keeps the longest run of `messages` whose `sizes` fit into `budget`.
    ///
    /// Returns the kept messages in their original order and the number of messages dropped.
    pub fn apply<T>(self, mut messages: Vec<T>, sizes: &[u64], budget: u64) -> (Vec<T>, usize) {
        let mut remaining = budget;

        let mut fits = |size: u64| match remaining.checked_sub(size) {
            Some(rest) => {
                remaining = rest;
                true
            }
            None => false,
        };

        let total = messages.len();

        match self {
            Self::DropFromEnd => {
                let kept = sizes.iter().take_while(|&&size| fits(size)).count();
                messages.truncate(kept);
            }
            Self::DropFromStart => {
                let kept = sizes.iter().rev().take_while(|&&size| fits(size)).count();
                messages.drain(..total.saturating_sub(kept));
            }
        }

        let dropped = total - messages.len();

        (messages, dropped)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;
    use test_case::test_case;

    use super::*;

    #[test]
    fn empty_file_yields_defaults() -> Result<()> {
        let config = serde_yaml::from_str::<Config>("{}")?;

        assert_eq!(config, Config::default());
        assert!(config.build_optimistic);
        assert_eq!(config.optimistic_build_ttl, Duration::from_secs(12));
        assert_eq!(config.extra_message_truncation, TruncationPolicy::DropFromEnd);

        Ok(())
    }

    #[test]
    fn config_is_loaded_from_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;

        writeln!(
            file,
            "build_optimistic: false\n\
             extra_message_truncation: drop_from_start\n\
             optimistic_build_ttl: 30\n\
             engine_timeouts:\n  get_payload: 2500",
        )?;

        let config = Config::load(file.path())?;

        assert!(!config.build_optimistic);
        assert_eq!(config.extra_message_truncation, TruncationPolicy::DropFromStart);
        assert_eq!(config.optimistic_build_ttl, Duration::from_secs(30));
        assert_eq!(
            config.engine_timeouts.get_payload,
            Duration::from_millis(2500),
        );
        assert_eq!(
            config.engine_timeouts.new_payload,
            EngineTimeouts::default().new_payload,
        );

        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        serde_yaml::from_str::<Config>("build_optimistically: true")
            .expect_err("misspelled field should be rejected");
    }

    #[test_case(TruncationPolicy::DropFromEnd, 100 => (vec!['a', 'b', 'c'], 0); "everything fits")]
    #[test_case(TruncationPolicy::DropFromEnd, 25 => (vec!['a', 'b'], 1); "drop from end")]
    #[test_case(TruncationPolicy::DropFromStart, 25 => (vec!['b', 'c'], 1); "drop from start")]
    #[test_case(TruncationPolicy::DropFromEnd, 9 => (vec![], 3); "nothing fits")]
    #[test_case(TruncationPolicy::DropFromStart, 0 => (vec![], 3); "no budget")]
    fn truncation_keeps_longest_run_that_fits(
        policy: TruncationPolicy,
        budget: u64,
    ) -> (Vec<char>, usize) {
        policy.apply(vec!['a', 'b', 'c'], &[10, 10, 10], budget)
    }
}
