// 8.2: position lifecycle. open, price refresh, and the single close entry
// point every trigger path funnels through (manual, SL/TP, margin call,
// auto-square-off, force close).

use super::core::Engine;
use super::results::{CloseResult, EngineError};
use crate::calc::{self, round_money, round_swap};
use crate::events::{
    EventPayload, PositionClosedEvent, PositionOpenedEvent, PositionPendingEvent,
};
use crate::ledger::{Actor, BalanceChangeKind, ChangeRef};
use crate::notify::{NotificationKind, NotificationPayload};
use crate::position::{
    validate_stop_levels, CloseReason, OrderKind, Position, PositionStatus,
};
use crate::swap::effective_nights;
use crate::types::{AccountId, InstrumentId, Lots, Money, PositionId, Price, Side};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub account_id: AccountId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub lots: Decimal,
    /// Open at this price instead of the current quote.
    pub price: Option<Price>,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    /// Present = the position starts pending and fills via the evaluator.
    pub trigger_price: Option<Price>,
    pub order_kind: OrderKind,
}

impl OpenRequest {
    pub fn market(account_id: AccountId, instrument: InstrumentId, side: Side, lots: Decimal) -> Self {
        Self {
            account_id,
            instrument,
            side,
            lots,
            price: None,
            stop_loss: None,
            take_profit: None,
            trigger_price: None,
            order_kind: OrderKind::Market,
        }
    }

    pub fn with_stops(mut self, stop_loss: Option<Price>, take_profit: Option<Price>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    pub fn pending(mut self, kind: OrderKind, trigger: Price) -> Self {
        self.order_kind = kind;
        self.trigger_price = Some(trigger);
        self
    }
}

impl Engine {
    /// Open a position (or park it pending if it carries a trigger price).
    /// Commission is fixed and debited here; it is never recomputed.
    pub fn open_position(&mut self, request: OpenRequest) -> Result<PositionId, EngineError> {
        let lots =
            Lots::new(request.lots).ok_or(EngineError::InvalidLotSize(request.lots))?;

        {
            let account = self
                .accounts
                .get(&request.account_id)
                .ok_or(EngineError::AccountNotFound(request.account_id))?;
            if !account.is_active() {
                return Err(EngineError::AccountInactive(request.account_id));
            }
        }

        let pending = request.trigger_price.is_some();
        if pending && request.order_kind == OrderKind::Market {
            return Err(EngineError::TriggerRequiresPendingKind);
        }

        let profile = self.charge_profile(request.account_id, request.instrument)?;
        let quote = self.quotes.get(&request.instrument).copied();

        // pending positions anchor on their trigger; live ones on the
        // requested price or the current market
        let open_price = match (pending, request.price, quote) {
            (true, _, _) => request.trigger_price.expect("pending checked above"),
            (false, Some(price), _) => price,
            (false, None, Some(q)) => q.open_price(request.side),
            (false, None, None) => return Err(EngineError::NoQuote(request.instrument)),
        };

        if !validate_stop_levels(
            request.side,
            open_price,
            request.stop_loss,
            request.take_profit,
        ) {
            return Err(EngineError::MalformedStopLevels {
                side: request.side,
                reference: open_price,
            });
        }

        let commission = Money::new(round_money(
            profile.commission_amount(lots, open_price).value(),
        ));

        if !pending {
            let required = calc::required_margin(
                lots,
                open_price,
                profile.contract_size,
                self.accounts[&request.account_id].leverage,
                profile.margin_factor,
            );
            self.can_open_position(request.account_id, required)?;
        }

        let id = PositionId(self.next_position_id);
        self.next_position_id += 1;

        let position = Position {
            id,
            account_id: request.account_id,
            instrument: request.instrument,
            side: request.side,
            lots,
            open_price,
            current_price: quote.map(|q| q.close_price(request.side)),
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            trigger_price: request.trigger_price,
            order_kind: request.order_kind,
            commission,
            swap: Money::zero(),
            swap_nights: 0,
            profit: Money::zero(),
            contract_size: profile.contract_size,
            margin_factor: profile.margin_factor,
            status: if pending {
                PositionStatus::Pending
            } else {
                PositionStatus::Open
            },
            close_price: None,
            close_reason: None,
            net_result: None,
            created_at: self.current_time,
            opened_at: self.current_time,
            closed_at: None,
        };
        self.positions.insert(id, position);

        self.apply_balance(
            request.account_id,
            commission.negate(),
            BalanceChangeKind::Commission,
            ChangeRef::Position(id),
            Actor::System,
            "opening commission",
        )?;

        if pending {
            self.emit_event(EventPayload::PositionPending(PositionPendingEvent {
                position_id: id,
                account_id: request.account_id,
                instrument: request.instrument,
                side: request.side,
                trigger_price: request.trigger_price.expect("pending"),
            }));
        } else {
            self.emit_event(EventPayload::PositionOpened(PositionOpenedEvent {
                position_id: id,
                account_id: request.account_id,
                instrument: request.instrument,
                side: request.side,
                lots: lots.value(),
                open_price,
                commission,
            }));
        }

        self.refresh_account_metrics(request.account_id)?;
        Ok(id)
    }

    /// Close an open position. Idempotent only by status guard: the status is
    /// checked on entry and again immediately before the conditional flip to
    /// Closed, so no second closer can ever succeed. The ledger write happens
    /// first; if it fails the position is left untouched.
    pub fn close_position(
        &mut self,
        position_id: PositionId,
        price: Option<Price>,
        reason: CloseReason,
    ) -> Result<CloseResult, EngineError> {
        let snapshot = {
            let position = self
                .positions
                .get(&position_id)
                .ok_or(EngineError::PositionNotFound(position_id))?;
            match position.status {
                PositionStatus::Closed => {
                    return Err(EngineError::PositionAlreadyClosed(position_id))
                }
                PositionStatus::Pending => {
                    return Err(EngineError::PositionNotOpen(position_id))
                }
                PositionStatus::Open => {}
            }
            position.clone()
        };

        let close_price = match price {
            Some(p) => p,
            None => self
                .quotes
                .get(&snapshot.instrument)
                .map(|q| q.close_price(snapshot.side))
                .ok_or(EngineError::NoQuote(snapshot.instrument))?,
        };

        // fresh profile for final settlement; rates may have changed since open
        let profile = self.charge_profile(snapshot.account_id, snapshot.instrument)?;

        let gross = snapshot.unrealized_pnl_at(close_price);
        let nights = effective_nights(
            snapshot.opened_at,
            self.current_time,
            self.config.triple_swap_day,
        );
        let nightly = profile.nightly_swap(snapshot.side, snapshot.lots, close_price, Decimal::ONE);
        let swap_settled = Money::new(round_swap(nightly.value() * nights));

        let net = Money::new(round_money(
            calc::net_pnl(gross, snapshot.commission, swap_settled).value(),
        ));

        let kind = if net.is_negative() {
            BalanceChangeKind::TradeLoss
        } else {
            BalanceChangeKind::TradeProfit
        };

        // ledger first: a closed position without its balance change must be
        // impossible, so the status flips only after the entry is committed
        let ledger_entry = self.apply_balance(
            snapshot.account_id,
            net,
            kind,
            ChangeRef::Position(position_id),
            Actor::System,
            "close settlement",
        )?;

        {
            let position = self
                .positions
                .get_mut(&position_id)
                .ok_or(EngineError::PositionNotFound(position_id))?;
            // conditional write: update only if still open
            if position.status != PositionStatus::Open {
                return Err(EngineError::PositionAlreadyClosed(position_id));
            }
            position.status = PositionStatus::Closed;
            position.close_price = Some(close_price);
            position.close_reason = Some(reason);
            position.net_result = Some(net);
            position.profit = gross;
            position.current_price = Some(close_price);
            position.closed_at = Some(self.current_time);
        }

        self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
            position_id,
            account_id: snapshot.account_id,
            close_price,
            gross_pnl: gross,
            swap_settled,
            net_pnl: net,
            reason,
        }));

        self.refresh_account_metrics(snapshot.account_id)?;

        // best-effort from here on: neither attribution nor notification may
        // fail or roll back the close
        self.attribute_commission(&snapshot);

        let owner = self.accounts[&snapshot.account_id].owner;
        let kind = match reason {
            CloseReason::MarginCall => NotificationKind::MarginCall,
            CloseReason::AutoSquareOff => NotificationKind::AutoSquareOff,
            CloseReason::ForceClose => NotificationKind::ForceClose,
            _ => NotificationKind::PositionClosed,
        };
        self.send_notification(
            owner,
            kind,
            NotificationPayload {
                account_id: snapshot.account_id,
                position_id: Some(position_id),
                amount: Some(net),
                message: format!("position {} closed at {close_price}", position_id.0),
            },
        );

        Ok(CloseResult {
            position_id,
            close_price,
            gross_pnl: gross,
            swap_settled,
            net_pnl: net,
            reason,
            ledger_entry,
        })
    }
}
