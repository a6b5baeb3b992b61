// 3.0: instrument definitions and latest market quotes.
// instrument defaults are the fallback layer of charge resolution (see charges.rs);
// quotes are written by the external price source and only read by the engine.

use crate::charges::RateUnit;
use crate::types::{InstrumentId, Price, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub symbol: String,
    pub name: String,
    pub contract_size: Decimal,
    pub pip_size: Decimal,
    // charge defaults, overridable per rule set
    pub commission_rate: Decimal,
    pub commission_unit: RateUnit,
    pub spread_markup: Decimal,
    // swap rates are charges: positive = the account pays, negative = it earns
    pub swap_long_rate: Decimal,
    pub swap_short_rate: Decimal,
    pub swap_unit: RateUnit,
    // 1 = plain notional/leverage margin, >1 scales the requirement up
    pub margin_factor: Decimal,
}

impl Instrument {
    // standard FX major with 100k contract size, used all over the tests
    pub fn eurusd() -> Self {
        Self {
            id: InstrumentId(1),
            symbol: "EURUSD".to_string(),
            name: "Euro vs US Dollar".to_string(),
            contract_size: dec!(100000),
            pip_size: dec!(0.0001),
            commission_rate: dec!(7),
            commission_unit: RateUnit::PerLot,
            spread_markup: dec!(0.00002),
            swap_long_rate: dec!(2.5),
            swap_short_rate: dec!(-0.8),
            swap_unit: RateUnit::PerLot,
            margin_factor: Decimal::ONE,
        }
    }

    pub fn xauusd() -> Self {
        Self {
            id: InstrumentId(2),
            symbol: "XAUUSD".to_string(),
            name: "Gold vs US Dollar".to_string(),
            contract_size: dec!(100),
            pip_size: dec!(0.01),
            commission_rate: dec!(10),
            commission_unit: RateUnit::PerLot,
            spread_markup: dec!(0.03),
            swap_long_rate: dec!(4.2),
            swap_short_rate: dec!(1.1),
            swap_unit: RateUnit::PerLot,
            margin_factor: Decimal::ONE,
        }
    }
}

// 3.1: latest bid/ask for one instrument. the engine never asks how it got here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketQuote {
    pub bid: Price,
    pub ask: Price,
    pub updated_at: Timestamp,
}

impl MarketQuote {
    pub fn new(bid: Price, ask: Price, updated_at: Timestamp) -> Self {
        debug_assert!(bid.value() <= ask.value(), "crossed quote");
        Self {
            bid,
            ask,
            updated_at,
        }
    }

    pub fn mid(&self) -> Price {
        Price::new_unchecked((self.bid.value() + self.ask.value()) / dec!(2))
    }

    // the side a position of `side` would open at
    pub fn open_price(&self, side: crate::types::Side) -> Price {
        match side {
            crate::types::Side::Buy => self.ask,
            crate::types::Side::Sell => self.bid,
        }
    }

    // the side a position of `side` would close at; also the price SL/TP and
    // valuation refresh run against
    pub fn close_price(&self, side: crate::types::Side) -> Price {
        match side {
            crate::types::Side::Buy => self.bid,
            crate::types::Side::Sell => self.ask,
        }
    }
}
