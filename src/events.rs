// 11.0: every state change produces an event. used for audit trails, state
// reconstruction, and test assertions. the EventPayload enum lists all event
// types. MarginEvent is the immutable risk-action record required for forced
// liquidations.

use crate::ledger::BalanceChangeKind;
use crate::position::CloseReason;
use crate::types::{
    AccountId, EntryId, InstrumentId, Money, PositionId, Price, RelationshipId, Side, Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // price events
    QuoteUpdated(QuoteUpdatedEvent),

    // position events
    PositionPending(PositionPendingEvent),
    PositionOpened(PositionOpenedEvent),
    OrderFilled(OrderFilledEvent),
    PositionClosed(PositionClosedEvent),

    // ledger events
    BalanceChanged(BalanceChangedEvent),
    SwapCharged(SwapChargedEvent),

    // risk events
    MarginAction(MarginEvent),

    // referral events
    CommissionAttributed(CommissionAttributedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteUpdatedEvent {
    pub instrument: InstrumentId,
    pub bid: Price,
    pub ask: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionPendingEvent {
    pub position_id: PositionId,
    pub account_id: AccountId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub trigger_price: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub position_id: PositionId,
    pub account_id: AccountId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub lots: Decimal,
    pub open_price: Price,
    pub commission: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFilledEvent {
    pub position_id: PositionId,
    pub account_id: AccountId,
    pub fill_price: Price,
    pub trigger_price: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub position_id: PositionId,
    pub account_id: AccountId,
    pub close_price: Price,
    pub gross_pnl: Money,
    pub swap_settled: Money,
    pub net_pnl: Money,
    pub reason: CloseReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceChangedEvent {
    pub entry_id: EntryId,
    pub account_id: AccountId,
    pub kind: BalanceChangeKind,
    pub amount: Money,
    pub new_balance: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapChargedEvent {
    pub position_id: PositionId,
    pub account_id: AccountId,
    pub amount: Money,
    pub multiplier: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionAttributedEvent {
    pub relationship_id: RelationshipId,
    pub position_id: PositionId,
    pub commission: Money,
}

// 11.1: immutable record of a forced risk action, with the account metrics
// captured at the time of the decision and every position it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginEventKind {
    MarginCall,
    StopOut,
    AutoSquareOff,
    ForceCloseAll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginEvent {
    pub kind: MarginEventKind,
    pub account_id: AccountId,
    pub balance: Money,
    pub equity: Money,
    pub margin_used: Money,
    pub margin_level: Decimal,
    pub positions_affected: Vec<PositionId>,
    pub total_pnl: Money,
    pub timestamp: Timestamp,
}
