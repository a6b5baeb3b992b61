// 8.0.2: result types and errors for engine operations.
//
// single-entity operations propagate these errors to the caller. sweeps never
// do: they catch per-entity failures and report aggregate counts instead, so
// one bad position cannot halt a batch.

use crate::charges::ChargeError;
use crate::ib::IbError;
use crate::ledger::LedgerError;
use crate::position::CloseReason;
use crate::types::{AccountId, EntryId, InstrumentId, Money, PositionId, Price};
use rust_decimal::Decimal;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("Account {0:?} is not active")]
    AccountInactive(AccountId),

    #[error("Position {0:?} not found")]
    PositionNotFound(PositionId),

    #[error("Position {0:?} is already closed")]
    PositionAlreadyClosed(PositionId),

    #[error("Position {0:?} is not open")]
    PositionNotOpen(PositionId),

    #[error("Position {0:?} is not pending")]
    PositionNotPending(PositionId),

    #[error("No quote available for instrument {0:?}")]
    NoQuote(InstrumentId),

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Money, available: Money },

    #[error("Invalid lot size: {0}")]
    InvalidLotSize(Decimal),

    #[error("Malformed stop levels for a {side} at {reference}")]
    MalformedStopLevels {
        side: crate::types::Side,
        reference: Price,
    },

    #[error("A trigger price requires a limit or stop order kind")]
    TriggerRequiresPendingKind,

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Charge error: {0}")]
    Charge(#[from] ChargeError),

    #[error("Referral error: {0}")]
    Ib(#[from] IbError),
}

#[derive(Debug, Clone)]
pub struct CloseResult {
    pub position_id: PositionId,
    pub close_price: Price,
    pub gross_pnl: Money,
    pub swap_settled: Money,
    pub net_pnl: Money,
    pub reason: CloseReason,
    pub ledger_entry: EntryId,
}

// aggregate outcome of one pending-order or SL/TP sweep
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub scanned: usize,
    pub triggered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SwapRunReport {
    pub settlement_day: i64,
    pub charged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_charged: Money,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarginSweepReport {
    pub accounts_checked: usize,
    pub margin_calls: usize,
    pub squared_off: usize,
    pub stopped_out: usize,
    pub positions_closed: usize,
    pub failed: usize,
}
