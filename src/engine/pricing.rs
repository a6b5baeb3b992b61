//! Quote updates and position valuation refresh.
//!
//! The price source writes quotes; the engine only ever reads the latest one.
//! Refreshing valuations never touches the Ledger.

use super::core::Engine;
use super::results::EngineError;
use crate::calc::round_money;
use crate::events::{EventPayload, QuoteUpdatedEvent};
use crate::instrument::MarketQuote;
use crate::types::{InstrumentId, Money, Price};

impl Engine {
    /// Record the latest bid/ask for an instrument and revalue every open
    /// position on it.
    pub fn update_quote(
        &mut self,
        instrument: InstrumentId,
        bid: Price,
        ask: Price,
    ) -> Result<(), EngineError> {
        if !self.instruments.contains_key(&instrument) {
            return Err(crate::charges::ChargeError::InstrumentNotFound(instrument).into());
        }

        let quote = MarketQuote::new(bid, ask, self.current_time);
        self.quotes.insert(instrument, quote);

        self.emit_event(EventPayload::QuoteUpdated(QuoteUpdatedEvent {
            instrument,
            bid,
            ask,
        }));

        self.refresh_instrument_positions(instrument);
        Ok(())
    }

    pub fn quote(&self, instrument: InstrumentId) -> Option<&MarketQuote> {
        self.quotes.get(&instrument)
    }

    /// The ~2s sweep: revalue every open position against the latest quotes.
    pub fn refresh_all_prices(&mut self) -> usize {
        let instruments: Vec<InstrumentId> = self.quotes.keys().copied().collect();
        let mut refreshed = 0;
        for instrument in instruments {
            refreshed += self.refresh_instrument_positions(instrument);
        }
        refreshed
    }

    fn refresh_instrument_positions(&mut self, instrument: InstrumentId) -> usize {
        let Some(quote) = self.quotes.get(&instrument).copied() else {
            return 0;
        };

        let mut refreshed = 0;
        for position in self.positions.values_mut() {
            if position.instrument != instrument || !position.is_open() {
                continue;
            }
            position.current_price = Some(quote.close_price(position.side));
            position.profit = Money::new(round_money(position.unrealized_pnl().value()));
            refreshed += 1;
        }
        refreshed
    }
}
