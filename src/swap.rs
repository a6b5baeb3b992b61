// 5.0: overnight financing. one charge per calendar rollover while a position
// stays open, at 3x on the weekly triple-swap day to cover weekend carry.
// the daily job charges incrementally (engine/swap.rs); close settlement
// recounts the whole holding period with the same rules.

use crate::types::{InstrumentId, Money, PositionId, Timestamp, MILLIS_PER_DAY};
use chrono::Weekday;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const TRIPLE_MULTIPLIER: Decimal = dec!(3);

// multiplier for the rollover landing on `day`
pub fn day_multiplier(day: Weekday, triple_day: Weekday) -> Decimal {
    if day == triple_day {
        TRIPLE_MULTIPLIER
    } else {
        Decimal::ONE
    }
}

// 5.1: whole-night counting. a rollover is counted when the UTC day index
// advances; same-day open/close holds zero nights.
pub fn whole_nights(opened_at: Timestamp, until: Timestamp) -> i64 {
    (until.day_index() - opened_at.day_index()).max(0)
}

// sum of day multipliers across every rollover in the holding period. each
// crossed midnight contributes 1, or 3 when it lands on the triple day.
pub fn effective_nights(opened_at: Timestamp, until: Timestamp, triple_day: Weekday) -> Decimal {
    let mut total = Decimal::ZERO;
    for day in (opened_at.day_index() + 1)..=until.day_index() {
        let weekday = Timestamp::from_millis(day * MILLIS_PER_DAY).weekday();
        total += day_multiplier(weekday, triple_day);
    }
    total
}

// immutable log row appended for every nightly charge, keyed by position and
// settlement day. the guard against double-charging a settlement day reads
// the latest row for the position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapChargeRecord {
    pub position_id: PositionId,
    pub instrument: InstrumentId,
    pub settlement_day: i64,
    pub rate: Decimal,
    pub multiplier: Decimal,
    pub amount: Money,
    pub charged_at: Timestamp,
}
