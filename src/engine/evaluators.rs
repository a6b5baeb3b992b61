// 8.3: the periodic evaluators. two related sweeps: fill pending orders whose
// trigger condition is met, and auto-close open positions that hit SL/TP.
// per-position failure is always isolated: try, log, continue. a sweep never
// propagates a single position's error to its caller.

use super::core::Engine;
use super::results::{EngineError, SweepReport};
use crate::events::{EventPayload, OrderFilledEvent};
use crate::notify::{NotificationKind, NotificationPayload};
use crate::position::{pending_fill_price, should_auto_close, PositionStatus};
use crate::types::{Money, PositionId};
use tracing::warn;

impl Engine {
    /// Fill pending limit/stop orders against the current market. Orders
    /// younger than the grace period are left alone so they cannot fill
    /// against the very tick that placed them.
    pub fn sweep_pending_orders(&mut self) -> SweepReport {
        let now = self.current_time;
        let grace = self.config.pending_grace_ms;
        let due: Vec<PositionId> = self
            .positions
            .values()
            .filter(|p| p.is_pending() && p.created_at.elapsed_millis(&now) >= grace)
            .map(|p| p.id)
            .collect();

        let mut report = SweepReport {
            scanned: due.len(),
            ..SweepReport::default()
        };

        for id in due {
            match self.try_fill_pending(id) {
                Ok(true) => report.triggered += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(position = id.0, %err, "pending-order fill failed");
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn try_fill_pending(&mut self, position_id: PositionId) -> Result<bool, EngineError> {
        let (instrument, side, kind, trigger, account_id) = {
            let position = self
                .positions
                .get(&position_id)
                .ok_or(EngineError::PositionNotFound(position_id))?;
            if !position.is_pending() {
                return Err(EngineError::PositionNotPending(position_id));
            }
            let trigger = position
                .trigger_price
                .ok_or(EngineError::PositionNotPending(position_id))?;
            (
                position.instrument,
                position.side,
                position.order_kind,
                trigger,
                position.account_id,
            )
        };

        let quote = self
            .quotes
            .get(&instrument)
            .copied()
            .ok_or(EngineError::NoQuote(instrument))?;

        let Some(fill_price) = pending_fill_price(kind, side, trigger, quote.bid, quote.ask)
        else {
            return Ok(false);
        };

        {
            let position = self
                .positions
                .get_mut(&position_id)
                .ok_or(EngineError::PositionNotFound(position_id))?;
            // conditional write: only a still-pending row may fill
            if position.status != PositionStatus::Pending {
                return Err(EngineError::PositionNotPending(position_id));
            }
            position.status = PositionStatus::Open;
            position.open_price = fill_price;
            position.trigger_price = None;
            position.opened_at = self.current_time;
            position.current_price = Some(quote.close_price(side));
            position.profit = Money::zero();
        }

        self.emit_event(EventPayload::OrderFilled(OrderFilledEvent {
            position_id,
            account_id,
            fill_price,
            trigger_price: trigger,
        }));

        self.refresh_account_metrics(account_id)?;

        let owner = self.accounts[&account_id].owner;
        self.send_notification(
            owner,
            NotificationKind::OrderFilled,
            NotificationPayload {
                account_id,
                position_id: Some(position_id),
                amount: None,
                message: format!("order {} filled at {fill_price}", position_id.0),
            },
        );

        Ok(true)
    }

    /// Auto-close open positions whose stop-loss or take-profit is hit at the
    /// current market price.
    pub fn sweep_stop_take(&mut self) -> SweepReport {
        let candidates: Vec<PositionId> = self
            .positions
            .values()
            .filter(|p| p.is_open() && (p.stop_loss.is_some() || p.take_profit.is_some()))
            .map(|p| p.id)
            .collect();

        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };

        for id in candidates {
            match self.try_auto_close(id) {
                Ok(true) => report.triggered += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(position = id.0, %err, "SL/TP auto-close failed");
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn try_auto_close(&mut self, position_id: PositionId) -> Result<bool, EngineError> {
        let (reason, price) = {
            let position = self
                .positions
                .get(&position_id)
                .ok_or(EngineError::PositionNotFound(position_id))?;
            if !position.is_open() {
                // a concurrent closer got here first; nothing to do
                return Ok(false);
            }
            let quote = self
                .quotes
                .get(&position.instrument)
                .ok_or(EngineError::NoQuote(position.instrument))?;
            let price = quote.close_price(position.side);
            match should_auto_close(position, price) {
                Some(reason) => (reason, price),
                None => return Ok(false),
            }
        };

        self.close_position(position_id, Some(price), reason)?;
        Ok(true)
    }
}
