// 2.0: margin/equity calculator. pure functions only, no state, no I/O.
// pnl = sign * (current - open) * lots * contract_size. everything downstream
// (equity, free margin, margin level) builds on that.
//
// rounding: money is rounded to 2 places, swap accrual to 4, and only at the
// point of persistence. intermediate results stay unrounded so errors do not
// compound across a computation.

use crate::types::{Leverage, Lots, Money, Price, Side};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

// margin level reported when margin is in use is equity/margin*100. when no
// margin is used the level is this sentinel for a solvent account, 0 otherwise.
pub const MARGIN_LEVEL_SENTINEL: Decimal = dec!(9999);

pub const MONEY_DP: u32 = 2;
pub const SWAP_DP: u32 = 4;

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_swap(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SWAP_DP, RoundingStrategy::MidpointAwayFromZero)
}

// 2.1: paper gains/losses. zero when either price is missing.
pub fn unrealized_pnl(
    side: Side,
    open_price: Option<Price>,
    current_price: Option<Price>,
    lots: Lots,
    contract_size: Decimal,
) -> Money {
    let (Some(open), Some(current)) = (open_price, current_price) else {
        return Money::zero();
    };
    let raw = (current.value() - open.value()) * lots.value() * contract_size;
    Money::new(side.sign() * raw)
}

// 2.2: what actually lands on the balance at close.
pub fn net_pnl(gross: Money, commission: Money, swap: Money) -> Money {
    Money::new(gross.value() - commission.value() - swap.value())
}

// 2.3: capital reserved against one position's exposure.
pub fn required_margin(
    lots: Lots,
    price: Price,
    contract_size: Decimal,
    leverage: Leverage,
    margin_factor: Decimal,
) -> Money {
    let notional = lots.value() * contract_size * price.value();
    Money::new(notional / leverage.value() * margin_factor)
}

pub fn equity(balance: Money, total_unrealized: Money) -> Money {
    balance.add(total_unrealized)
}

// free margin never reported below zero
pub fn free_margin(equity: Money, margin_used: Money) -> Money {
    let free = equity.value() - margin_used.value();
    Money::new(free.max(Decimal::ZERO))
}

pub fn margin_level(equity: Money, margin_used: Money) -> Decimal {
    if margin_used.value() > Decimal::ZERO {
        equity.value() / margin_used.value() * dec!(100)
    } else if equity.value() > Decimal::ZERO {
        MARGIN_LEVEL_SENTINEL
    } else {
        Decimal::ZERO
    }
}

pub fn trading_power(balance: Money, leverage: Leverage) -> Money {
    balance.mul(leverage.value())
}
