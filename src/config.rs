//! Engine configuration.

use std::time::Duration;

/// Tuning knobs for the consensus engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the proposer driver wakes up to scan the pending queue.
    pub tick_interval: Duration,
    /// Ticks without progress before a stalled round is restarted at a
    /// higher proposal number.
    pub stall_ticks: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(200),
            stall_ticks: 5,
        }
    }
}
