//! Engine policy bounds.
//!
//! The ratchet protocols themselves don't fix how much out-of-order
//! tolerance to buy with memory; these bounds are policy. The defaults suit
//! an interactive messaging host; batch importers may want wider windows.

/// Policy configuration shared by the pairwise and group engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum forward gap a single decrypt may bridge by deriving keys.
    ///
    /// A ciphertext whose index is further ahead of the chain than this is
    /// rejected with `SkippedKeyLimitExceeded` instead of burning CPU and
    /// memory on the derivation.
    pub max_skip: u32,

    /// Cap on retained skipped-message keys per pairwise session.
    ///
    /// Oldest entries are evicted first, trading out-of-order delivery
    /// tolerance for bounded memory.
    pub max_skipped_keys: usize,

    /// Replay/out-of-order window for inbound group sessions.
    ///
    /// Indices more than this far behind the chain head are pruned; a
    /// message referencing a pruned index fails with `KeyTooOld`.
    pub group_window: u32,

    /// Cap on the unconsumed one-time prekey pool.
    ///
    /// Generating beyond the cap evicts the oldest unconsumed prekeys.
    pub max_one_time_prekeys: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_skip: 1000,
            max_skipped_keys: 1024,
            group_window: 2000,
            max_one_time_prekeys: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let config = EngineConfig::default();
        assert!(config.max_skip > 0);
        assert!(config.max_skipped_keys > 0);
        assert!(config.group_window > 0);
        assert!(config.max_one_time_prekeys > 0);
    }
}
