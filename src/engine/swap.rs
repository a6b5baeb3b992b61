// 8.5: the daily swap accrual batch. charges overnight financing to every open
// position: rate picked by side, times lot size, times the day multiplier (3x
// on the weekly rollover day). each position is processed independently; one
// failure is logged and the batch always completes.
//
// a settlement day is never charged twice for the same position: the latest
// swap-charge row for the position is checked before charging.

use super::core::Engine;
use super::results::{EngineError, SwapRunReport};
use crate::calc::round_swap;
use crate::events::{EventPayload, SwapChargedEvent};
use crate::ledger::{Actor, BalanceChangeKind, ChangeRef};
use crate::swap::{day_multiplier, SwapChargeRecord};
use crate::types::{Money, PositionId};
use rust_decimal::prelude::ToPrimitive;
use tracing::{info, warn};

impl Engine {
    /// Run the end-of-day accrual for the current settlement day.
    pub fn run_swap_accrual(&mut self) -> SwapRunReport {
        let settlement_day = self.current_time.day_index();
        let multiplier = day_multiplier(self.current_time.weekday(), self.config.triple_swap_day);

        let open: Vec<PositionId> = self
            .positions
            .values()
            .filter(|p| p.is_open())
            .map(|p| p.id)
            .collect();

        let mut report = SwapRunReport {
            settlement_day,
            charged: 0,
            skipped: 0,
            failed: 0,
            total_charged: Money::zero(),
        };

        for position_id in open {
            let already_charged = self
                .swap_charges
                .iter()
                .rev()
                .find(|c| c.position_id == position_id)
                .map(|c| c.settlement_day == settlement_day)
                .unwrap_or(false);
            if already_charged {
                report.skipped += 1;
                continue;
            }

            match self.charge_position_swap(position_id, settlement_day, multiplier) {
                Ok(amount) => {
                    report.charged += 1;
                    report.total_charged = report.total_charged.add(amount);
                }
                Err(err) => {
                    warn!(position = position_id.0, %err, "swap charge failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            settlement_day,
            charged = report.charged,
            skipped = report.skipped,
            failed = report.failed,
            total = %report.total_charged,
            "swap accrual complete"
        );
        report
    }

    fn charge_position_swap(
        &mut self,
        position_id: PositionId,
        settlement_day: i64,
        multiplier: rust_decimal::Decimal,
    ) -> Result<Money, EngineError> {
        let (account_id, instrument, side, lots, price) = {
            let position = self
                .positions
                .get(&position_id)
                .ok_or(EngineError::PositionNotFound(position_id))?;
            if !position.is_open() {
                return Err(EngineError::PositionNotOpen(position_id));
            }
            (
                position.account_id,
                position.instrument,
                position.side,
                position.lots,
                position.current_price.unwrap_or(position.open_price),
            )
        };

        let profile = self.charge_profile(account_id, instrument)?;
        let rate = profile.swap_rate(side);
        let amount = Money::new(round_swap(
            profile.nightly_swap(side, lots, price, multiplier).value(),
        ));

        // accrue on the position at swap precision
        {
            let position = self
                .positions
                .get_mut(&position_id)
                .ok_or(EngineError::PositionNotFound(position_id))?;
            position.swap = Money::new(round_swap(position.swap.add(amount).value()));
            position.swap_nights += multiplier.to_u32().unwrap_or(1);
        }

        // debit the balance by the same amount (money precision at the ledger)
        self.apply_balance(
            account_id,
            amount.negate(),
            BalanceChangeKind::Swap,
            ChangeRef::Position(position_id),
            Actor::System,
            "overnight swap",
        )?;

        self.swap_charges.push(SwapChargeRecord {
            position_id,
            instrument,
            settlement_day,
            rate: rate.rate,
            multiplier,
            amount,
            charged_at: self.current_time,
        });

        self.emit_event(EventPayload::SwapCharged(SwapChargedEvent {
            position_id,
            account_id,
            amount,
            multiplier,
        }));

        Ok(amount)
    }
}
