// 4.0: position tracking. a position is pending (waiting on a trigger), open
// (accruing pnl and swap), or closed (frozen forever). the engine's close
// operation is the only writer of Closed status.

use crate::calc;
use crate::types::{AccountId, InstrumentId, Lots, Money, PositionId, Price, Side, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Pending,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
}

// one tagged variant for every way a position can close. the close entry
// point takes this instead of each caller reimplementing its own path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    Manual,
    StopLoss,
    TakeProfit,
    MarginCall,
    AutoSquareOff,
    ForceClose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub account_id: AccountId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub lots: Lots,
    pub open_price: Price,
    pub current_price: Option<Price>,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    // set while pending; cleared when the order fills
    pub trigger_price: Option<Price>,
    pub order_kind: OrderKind,
    // fixed at open, never recomputed
    pub commission: Money,
    // accrued by the daily swap job while open
    pub swap: Money,
    pub swap_nights: u32,
    // refreshed by the price sweep, frozen at close
    pub profit: Money,
    pub contract_size: Decimal,
    // margin requirement factor resolved at open (1 = plain leverage formula)
    pub margin_factor: Decimal,
    pub status: PositionStatus,
    pub close_price: Option<Price>,
    pub close_reason: Option<CloseReason>,
    pub net_result: Option<Money>,
    pub created_at: Timestamp,
    pub opened_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn is_pending(&self) -> bool {
        self.status == PositionStatus::Pending
    }

    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    pub fn unrealized_pnl(&self) -> Money {
        calc::unrealized_pnl(
            self.side,
            Some(self.open_price),
            self.current_price,
            self.lots,
            self.contract_size,
        )
    }

    pub fn unrealized_pnl_at(&self, price: Price) -> Money {
        calc::unrealized_pnl(
            self.side,
            Some(self.open_price),
            Some(price),
            self.lots,
            self.contract_size,
        )
    }

    // trade volume in lots, what IB commission attribution runs on
    pub fn volume(&self) -> Decimal {
        self.lots.value()
    }
}

// 4.1: the SL/TP predicate. stateless so the realtime refresh path and the
// periodic evaluator share one definition.
pub fn should_auto_close(position: &Position, current: Price) -> Option<CloseReason> {
    if !position.is_open() {
        return None;
    }

    if let Some(sl) = position.stop_loss {
        let hit = match position.side {
            Side::Buy => current <= sl,
            Side::Sell => current >= sl,
        };
        if hit {
            return Some(CloseReason::StopLoss);
        }
    }

    if let Some(tp) = position.take_profit {
        let hit = match position.side {
            Side::Buy => current >= tp,
            Side::Sell => current <= tp,
        };
        if hit {
            return Some(CloseReason::TakeProfit);
        }
    }

    None
}

// 4.2: pending-order fill predicate. buys fill against the ask, sells against
// the bid. limit wants a better-or-equal price than the trigger, stop wants
// the market to have reached it. returns the fill price on a match.
pub fn pending_fill_price(
    kind: OrderKind,
    side: Side,
    trigger: Price,
    bid: Price,
    ask: Price,
) -> Option<Price> {
    match (kind, side) {
        (OrderKind::Limit, Side::Buy) if ask <= trigger => Some(ask),
        (OrderKind::Limit, Side::Sell) if bid >= trigger => Some(bid),
        (OrderKind::Stop, Side::Buy) if ask >= trigger => Some(ask),
        (OrderKind::Stop, Side::Sell) if bid <= trigger => Some(bid),
        _ => None,
    }
}

// stop levels must sit on the losing/winning side of the open price for the
// position's direction; anything else is a malformed request
pub fn validate_stop_levels(
    side: Side,
    reference: Price,
    stop_loss: Option<Price>,
    take_profit: Option<Price>,
) -> bool {
    let sl_ok = stop_loss.map_or(true, |sl| match side {
        Side::Buy => sl < reference,
        Side::Sell => sl > reference,
    });
    let tp_ok = take_profit.map_or(true, |tp| match side {
        Side::Buy => tp > reference,
        Side::Sell => tp < reference,
    });
    sl_ok && tp_ok
}
