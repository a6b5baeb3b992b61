//! Trading accounts and derived metrics.
//!
//! An account's balance is realized cash and only the ledger may move it.
//! Equity, free margin and margin level are always recomputed from the open
//! positions; the `metrics` field is a convenience snapshot of the latest
//! computation, never an authority.

use crate::calc;
use crate::position::Position;
use crate::types::{AccountId, Leverage, Money, Timestamp, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingAccount {
    pub id: AccountId,
    pub owner: UserId,
    pub account_number: String,
    pub currency: String,
    pub leverage: Leverage,
    // mutated exclusively through the Ledger
    pub balance: Money,
    pub account_type: String,
    pub tier: String,
    pub status: AccountStatus,
    // equity <= balance * pct / 100 while margin is in use triggers auto-square-off
    pub auto_square_off_percent: Option<Decimal>,
    pub metrics: AccountMetrics,
    pub created_at: Timestamp,
}

impl TradingAccount {
    pub fn new(
        id: AccountId,
        owner: UserId,
        account_number: String,
        currency: String,
        leverage: Leverage,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            owner,
            account_number,
            currency,
            leverage,
            balance: Money::zero(),
            account_type: crate::charges::DEFAULT_ACCOUNT_TYPE.to_string(),
            tier: crate::charges::DEFAULT_TIER.to_string(),
            status: AccountStatus::Active,
            auto_square_off_percent: None,
            metrics: AccountMetrics::empty(timestamp),
            created_at: timestamp,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountMetrics {
    pub equity: Money,
    pub unrealized_pnl: Money,
    pub margin_used: Money,
    pub free_margin: Money,
    pub margin_level: Decimal,
    pub trading_power: Money,
    pub open_positions: usize,
    pub updated_at: Timestamp,
}

impl AccountMetrics {
    pub fn empty(timestamp: Timestamp) -> Self {
        Self {
            equity: Money::zero(),
            unrealized_pnl: Money::zero(),
            margin_used: Money::zero(),
            free_margin: Money::zero(),
            margin_level: Decimal::ZERO,
            trading_power: Money::zero(),
            open_positions: 0,
            updated_at: timestamp,
        }
    }
}

// 6.1: recompute everything derived from the account's open positions.
// margin used is taken at the open price so a moving market does not
// silently change the reserved amount.
pub fn compute_account_metrics<'a, I>(
    account: &TradingAccount,
    open_positions: I,
    timestamp: Timestamp,
) -> AccountMetrics
where
    I: IntoIterator<Item = &'a Position>,
{
    let mut unrealized = Money::zero();
    let mut margin_used = Money::zero();
    let mut count = 0usize;

    for position in open_positions {
        debug_assert!(position.is_open());
        unrealized = unrealized.add(position.unrealized_pnl());
        margin_used = margin_used.add(calc::required_margin(
            position.lots,
            position.open_price,
            position.contract_size,
            account.leverage,
            position.margin_factor,
        ));
        count += 1;
    }

    let equity = calc::equity(account.balance, unrealized);
    let free_margin = calc::free_margin(equity, margin_used);
    let margin_level = calc::margin_level(equity, margin_used);
    let trading_power = calc::trading_power(account.balance, account.leverage);

    AccountMetrics {
        equity,
        unrealized_pnl: unrealized,
        margin_used,
        free_margin,
        margin_level,
        trading_power,
        open_positions: count,
        updated_at: timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{OrderKind, PositionStatus};
    use crate::types::{InstrumentId, Lots, PositionId, Price, Side};
    use rust_decimal_macros::dec;

    fn test_account(balance: Decimal) -> TradingAccount {
        let mut account = TradingAccount::new(
            AccountId(1),
            UserId(1),
            "MT-100001".to_string(),
            "USD".to_string(),
            Leverage::new(dec!(100)).unwrap(),
            Timestamp::from_millis(0),
        );
        account.balance = Money::new(balance);
        account
    }

    fn open_position(profit_move: Decimal) -> Position {
        let open = dec!(1.1000);
        Position {
            id: PositionId(1),
            account_id: AccountId(1),
            instrument: InstrumentId(1),
            side: Side::Buy,
            lots: Lots::new_unchecked(dec!(1)),
            open_price: Price::new_unchecked(open),
            current_price: Some(Price::new_unchecked(open + profit_move)),
            stop_loss: None,
            take_profit: None,
            trigger_price: None,
            order_kind: OrderKind::Market,
            commission: Money::new(dec!(7)),
            swap: Money::zero(),
            swap_nights: 0,
            profit: Money::zero(),
            contract_size: dec!(100000),
            margin_factor: Decimal::ONE,
            status: PositionStatus::Open,
            close_price: None,
            close_reason: None,
            net_result: None,
            created_at: Timestamp::from_millis(0),
            opened_at: Timestamp::from_millis(0),
            closed_at: None,
        }
    }

    #[test]
    fn metrics_without_positions() {
        let account = test_account(dec!(10000));
        let metrics = compute_account_metrics(&account, [], Timestamp::from_millis(1));

        assert_eq!(metrics.equity.value(), dec!(10000));
        assert_eq!(metrics.margin_used, Money::zero());
        assert_eq!(metrics.free_margin.value(), dec!(10000));
        assert_eq!(metrics.margin_level, calc::MARGIN_LEVEL_SENTINEL);
        assert_eq!(metrics.trading_power.value(), dec!(1000000));
    }

    #[test]
    fn metrics_with_profitable_position() {
        let account = test_account(dec!(10000));
        let position = open_position(dec!(0.0010)); // +100

        let metrics =
            compute_account_metrics(&account, [&position], Timestamp::from_millis(1));

        assert_eq!(metrics.unrealized_pnl.value(), dec!(100.0000));
        assert_eq!(metrics.equity.value(), dec!(10100.0000));
        // 1 * 100000 * 1.1 / 100 = 1100
        assert_eq!(metrics.margin_used.value(), dec!(1100));
        assert_eq!(metrics.free_margin.value(), dec!(9000.0000));
        assert_eq!(metrics.open_positions, 1);
    }

    #[test]
    fn margin_level_percentage() {
        let account = test_account(dec!(1100));
        let position = open_position(dec!(0));

        let metrics =
            compute_account_metrics(&account, [&position], Timestamp::from_millis(1));

        // equity 1100 / margin 1100 * 100 = 100%
        assert_eq!(metrics.margin_level, dec!(100));
    }
}
