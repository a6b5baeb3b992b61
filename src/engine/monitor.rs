// 8.4: margin monitor. recomputes per-account risk metrics, gates new
// positions, and drives forced liquidation. three distinct forced paths share
// one pattern (close via the lifecycle manager, recompute, continue on
// per-position failure) but differ in trigger and selection order:
//   auto-square-off: equity <= balance * percent/100, closes oldest first
//   stop-out:        margin level <= stop-out level, closes worst loss first
//                    until the level recovers
//   force-close-all: admin-triggered, closes everything unconditionally
// an account with an auto-square-off percent configured is handled by that
// path alone; stop-out applies to the rest.

use super::core::Engine;
use super::results::{EngineError, MarginSweepReport};
use crate::account::{compute_account_metrics, AccountMetrics};
use crate::events::{EventPayload, MarginEvent, MarginEventKind};
use crate::notify::{NotificationKind, NotificationPayload};
use crate::position::CloseReason;
use crate::types::{AccountId, Money, PositionId};
use rust_decimal::Decimal;
use tracing::warn;

impl Engine {
    /// Recompute and persist the derived metrics snapshot for one account.
    pub fn refresh_account_metrics(
        &mut self,
        account_id: AccountId,
    ) -> Result<AccountMetrics, EngineError> {
        let account = self
            .accounts
            .get(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;

        let open: Vec<_> = self
            .positions
            .values()
            .filter(|p| p.account_id == account_id && p.is_open())
            .collect();

        let metrics = compute_account_metrics(account, open, self.current_time);

        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;
        account.metrics = metrics.clone();
        Ok(metrics)
    }

    /// Gate for new exposure: enough free margin to reserve `required`, and
    /// the post-open margin level may not drop below the margin-call level.
    pub fn can_open_position(
        &mut self,
        account_id: AccountId,
        required: Money,
    ) -> Result<(), EngineError> {
        let metrics = self.refresh_account_metrics(account_id)?;

        if metrics.free_margin < required {
            return Err(EngineError::InsufficientMargin {
                required,
                available: metrics.free_margin,
            });
        }

        let margin_after = metrics.margin_used.add(required);
        if margin_after.value() > Decimal::ZERO {
            let level_after = metrics.equity.value() / margin_after.value() * Decimal::from(100);
            if level_after < self.config.margin_call_level {
                return Err(EngineError::InsufficientMargin {
                    required,
                    available: metrics.free_margin,
                });
            }
        }

        Ok(())
    }

    /// The ~30s sweep: refresh every active account and trigger whatever risk
    /// action its state calls for. Per-account failure is caught and logged.
    pub fn sweep_margin_monitor(&mut self) -> MarginSweepReport {
        let account_ids: Vec<AccountId> = self
            .accounts
            .values()
            .filter(|a| a.is_active())
            .map(|a| a.id)
            .collect();

        let mut report = MarginSweepReport {
            accounts_checked: account_ids.len(),
            ..MarginSweepReport::default()
        };

        for account_id in account_ids {
            match self.check_margin_call(account_id) {
                Ok(Some((MarginEventKind::AutoSquareOff, closed))) => {
                    report.squared_off += 1;
                    report.positions_closed += closed;
                }
                Ok(Some((MarginEventKind::StopOut, closed))) => {
                    report.stopped_out += 1;
                    report.positions_closed += closed;
                }
                Ok(Some((MarginEventKind::MarginCall, _))) => report.margin_calls += 1,
                Ok(_) => {}
                Err(err) => {
                    warn!(account = account_id.0, %err, "margin check failed");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Evaluate one account's risk state and act on it. Returns the action
    /// taken, if any, with the number of positions it closed.
    pub fn check_margin_call(
        &mut self,
        account_id: AccountId,
    ) -> Result<Option<(MarginEventKind, usize)>, EngineError> {
        let metrics = self.refresh_account_metrics(account_id)?;
        if metrics.margin_used.is_zero() {
            return Ok(None);
        }

        let account = self
            .accounts
            .get(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;
        let balance = account.balance;
        let square_off_percent = account.auto_square_off_percent;
        let owner = account.owner;

        if let Some(percent) = square_off_percent {
            let threshold = balance.value() * percent / Decimal::from(100);
            if metrics.equity.value() <= threshold {
                let closed = self.auto_square_off(account_id)?;
                return Ok(Some((MarginEventKind::AutoSquareOff, closed)));
            }
        } else if metrics.margin_level <= self.config.stop_out_level {
            let closed = self.stop_out(account_id)?;
            return Ok(Some((MarginEventKind::StopOut, closed)));
        }

        if metrics.margin_level <= self.config.margin_call_level {
            self.record_margin_event(MarginEventKind::MarginCall, account_id, &metrics, vec![], Money::zero());
            self.send_notification(
                owner,
                NotificationKind::MarginCall,
                NotificationPayload {
                    account_id,
                    position_id: None,
                    amount: None,
                    message: format!("margin level at {}%", metrics.margin_level.round_dp(2)),
                },
            );
            return Ok(Some((MarginEventKind::MarginCall, 0)));
        }

        Ok(None)
    }

    /// Close every open position on the account, oldest first, recomputing
    /// metrics after each close. One MarginEvent summarizes the action.
    pub fn auto_square_off(&mut self, account_id: AccountId) -> Result<usize, EngineError> {
        let trigger_metrics = self.refresh_account_metrics(account_id)?;
        let closed = self.close_all_positions(account_id, CloseReason::AutoSquareOff);
        self.finish_forced_close(
            MarginEventKind::AutoSquareOff,
            account_id,
            trigger_metrics,
            closed,
        )
    }

    /// Admin-triggered: close everything unconditionally.
    pub fn force_close_all(&mut self, account_id: AccountId) -> Result<usize, EngineError> {
        let trigger_metrics = self.refresh_account_metrics(account_id)?;
        let closed = self.close_all_positions(account_id, CloseReason::ForceClose);
        self.finish_forced_close(
            MarginEventKind::ForceCloseAll,
            account_id,
            trigger_metrics,
            closed,
        )
    }

    /// Classic stop-out: repeatedly close the position with the worst
    /// unrealized loss until the margin level recovers above the stop-out
    /// level or nothing is left to close.
    pub fn stop_out(&mut self, account_id: AccountId) -> Result<usize, EngineError> {
        let trigger_metrics = self.refresh_account_metrics(account_id)?;
        let mut closed: Vec<(PositionId, Money)> = Vec::new();
        let mut skip: Vec<PositionId> = Vec::new();

        loop {
            let metrics = self.refresh_account_metrics(account_id)?;
            if metrics.margin_used.is_zero() || metrics.margin_level > self.config.stop_out_level {
                break;
            }

            let worst = self
                .positions
                .values()
                .filter(|p| {
                    p.account_id == account_id && p.is_open() && !skip.contains(&p.id)
                })
                .min_by_key(|p| p.unrealized_pnl())
                .map(|p| p.id);

            let Some(position_id) = worst else { break };

            match self.close_position(position_id, None, CloseReason::MarginCall) {
                Ok(result) => closed.push((position_id, result.net_pnl)),
                Err(err) => {
                    warn!(position = position_id.0, %err, "stop-out close failed");
                    skip.push(position_id);
                }
            }
        }

        self.finish_forced_close(MarginEventKind::StopOut, account_id, trigger_metrics, closed)
    }

    // shared tail of every forced path: one MarginEvent with the metrics at
    // trigger time and everything that got closed
    fn finish_forced_close(
        &mut self,
        kind: MarginEventKind,
        account_id: AccountId,
        trigger_metrics: AccountMetrics,
        closed: Vec<(PositionId, Money)>,
    ) -> Result<usize, EngineError> {
        let total_pnl: Money = closed.iter().map(|(_, pnl)| pnl).sum();
        let affected: Vec<PositionId> = closed.iter().map(|(id, _)| *id).collect();
        let count = affected.len();

        self.record_margin_event(kind, account_id, &trigger_metrics, affected, total_pnl);
        self.refresh_account_metrics(account_id)?;
        Ok(count)
    }

    fn close_all_positions(
        &mut self,
        account_id: AccountId,
        reason: CloseReason,
    ) -> Vec<(PositionId, Money)> {
        // oldest first: by open time, position id breaking ties
        let mut targets: Vec<(crate::types::Timestamp, PositionId)> = self
            .positions
            .values()
            .filter(|p| p.account_id == account_id && p.is_open())
            .map(|p| (p.opened_at, p.id))
            .collect();
        targets.sort();

        let mut closed = Vec::new();
        for (_, position_id) in targets {
            match self.close_position(position_id, None, reason) {
                Ok(result) => closed.push((position_id, result.net_pnl)),
                Err(err) => {
                    warn!(position = position_id.0, %err, "forced close failed");
                }
            }
        }
        closed
    }

    fn record_margin_event(
        &mut self,
        kind: MarginEventKind,
        account_id: AccountId,
        metrics: &AccountMetrics,
        positions_affected: Vec<PositionId>,
        total_pnl: Money,
    ) {
        let balance = self
            .accounts
            .get(&account_id)
            .map(|a| a.balance)
            .unwrap_or(Money::zero());

        let event = MarginEvent {
            kind,
            account_id,
            balance,
            equity: metrics.equity,
            margin_used: metrics.margin_used,
            margin_level: metrics.margin_level,
            positions_affected,
            total_pnl,
            timestamp: self.current_time,
        };

        self.margin_events.push(event.clone());
        self.emit_event(EventPayload::MarginAction(event));
    }
}
