// 3.2: charge profile resolution. commission, spread markup and swap rates come
// from a specificity-ranked override rule set layered over instrument defaults.
//
// resolution happens fresh for every open/close operation. profiles are never
// cached across calls because the rule set may change between them.

use crate::types::{InstrumentId, Lots, Money, Price, RuleId, Side, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ACCOUNT_TYPE: &str = "live";
pub const DEFAULT_TIER: &str = "standard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargeKind {
    Commission,
    SpreadMarkup,
    SwapLong,
    SwapShort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateUnit {
    // rate * lots
    PerLot,
    // rate% of notional (lots * contract size * price)
    Percent,
}

// one override row. None fields are wildcards that match anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRule {
    pub id: RuleId,
    pub kind: ChargeKind,
    pub instrument: Option<InstrumentId>,
    pub account_type: Option<String>,
    pub tier: Option<String>,
    pub rate: Decimal,
    pub unit: RateUnit,
    pub active: bool,
    pub valid_from: Option<Timestamp>,
    pub valid_to: Option<Timestamp>,
}

impl ChargeRule {
    fn matches(
        &self,
        kind: ChargeKind,
        instrument: InstrumentId,
        account_type: &str,
        tier: &str,
        now: Timestamp,
    ) -> bool {
        if self.kind != kind || !self.active {
            return false;
        }
        if let Some(from) = self.valid_from {
            if now < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to {
            if now > to {
                return false;
            }
        }
        self.instrument.map_or(true, |i| i == instrument)
            && self.account_type.as_deref().map_or(true, |t| t == account_type)
            && self.tier.as_deref().map_or(true, |t| t == tier)
    }

    // exact instrument match outweighs exact account type, which outweighs
    // exact tier. wildcards score nothing.
    fn specificity(&self) -> u8 {
        let mut score = 0;
        if self.instrument.is_some() {
            score += 4;
        }
        if self.account_type.is_some() {
            score += 2;
        }
        if self.tier.is_some() {
            score += 1;
        }
        score
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rate {
    pub rate: Decimal,
    pub unit: RateUnit,
}

// frozen snapshot of effective rates for one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeProfile {
    pub instrument: InstrumentId,
    pub account_type: String,
    pub tier: String,
    pub commission: Rate,
    pub spread_markup: Rate,
    pub swap_long: Rate,
    pub swap_short: Rate,
    pub contract_size: Decimal,
    pub pip_size: Decimal,
    pub margin_factor: Decimal,
    pub resolved_at: Timestamp,
}

impl ChargeProfile {
    pub fn swap_rate(&self, side: Side) -> Rate {
        match side {
            Side::Buy => self.swap_long,
            Side::Sell => self.swap_short,
        }
    }

    // opening commission for a position of `lots` at `price`
    pub fn commission_amount(&self, lots: Lots, price: Price) -> Money {
        charge_amount(self.commission, lots, price, self.contract_size)
    }

    // swap for one settlement night at the given day multiplier
    pub fn nightly_swap(&self, side: Side, lots: Lots, price: Price, multiplier: Decimal) -> Money {
        charge_amount(self.swap_rate(side), lots, price, self.contract_size).mul(multiplier)
    }
}

fn charge_amount(rate: Rate, lots: Lots, price: Price, contract_size: Decimal) -> Money {
    match rate.unit {
        RateUnit::PerLot => Money::new(rate.rate * lots.value()),
        RateUnit::Percent => {
            let notional = lots.value() * contract_size * price.value();
            Money::new(notional * rate.rate / dec!(100))
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChargeError {
    #[error("Instrument {0:?} not found")]
    InstrumentNotFound(InstrumentId),
}

// 3.3: the resolver. for each charge kind pick the matching override with the
// highest specificity, newest rule winning ties; fall back to the instrument
// default when nothing overrides. never errors on a missing override.
pub fn resolve_profile(
    instrument: &crate::instrument::Instrument,
    rules: &[ChargeRule],
    account_type: &str,
    tier: &str,
    now: Timestamp,
) -> ChargeProfile {
    let pick = |kind: ChargeKind, default: Rate| -> Rate {
        rules
            .iter()
            .filter(|r| r.matches(kind, instrument.id, account_type, tier, now))
            .max_by_key(|r| (r.specificity(), r.id.0))
            .map(|r| Rate {
                rate: r.rate,
                unit: r.unit,
            })
            .unwrap_or(default)
    };

    ChargeProfile {
        instrument: instrument.id,
        account_type: account_type.to_string(),
        tier: tier.to_string(),
        commission: pick(
            ChargeKind::Commission,
            Rate {
                rate: instrument.commission_rate,
                unit: instrument.commission_unit,
            },
        ),
        spread_markup: pick(
            ChargeKind::SpreadMarkup,
            Rate {
                rate: instrument.spread_markup,
                unit: RateUnit::PerLot,
            },
        ),
        swap_long: pick(
            ChargeKind::SwapLong,
            Rate {
                rate: instrument.swap_long_rate,
                unit: instrument.swap_unit,
            },
        ),
        swap_short: pick(
            ChargeKind::SwapShort,
            Rate {
                rate: instrument.swap_short_rate,
                unit: instrument.swap_unit,
            },
        ),
        contract_size: instrument.contract_size,
        pip_size: instrument.pip_size,
        margin_factor: instrument.margin_factor,
        resolved_at: now,
    }
}
