//! Engine configuration options.

use chrono::Weekday;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of audit events retained in memory.
    pub max_events: usize,
    /// Echo every event to stdout.
    pub verbose: bool,
    /// How long a pending order must rest before it becomes fillable, so it
    /// cannot fill against the very price that triggered its placement.
    pub pending_grace_ms: i64,
    /// Weekly rollover charged at 3x to cover weekend carry.
    pub triple_swap_day: Weekday,
    /// Margin level (percent) at or below which a margin-call warning fires.
    pub margin_call_level: Decimal,
    /// Margin level (percent) at or below which stop-out starts closing the
    /// worst loser until the level recovers.
    pub stop_out_level: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            verbose: false,
            pending_grace_ms: 60_000,
            triple_swap_day: Weekday::Wed,
            margin_call_level: dec!(100),
            stop_out_level: dec!(50),
        }
    }
}
