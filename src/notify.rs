//! Notification collaborator contract.
//!
//! The engine fires notifications for closes, fills and risk actions through
//! an injected sink, never a process-wide global. Delivery is fire-and-forget:
//! a failing sink is logged and swallowed, it must never block or fail a close
//! or charge operation.

use crate::types::{AccountId, Money, PositionId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderFilled,
    PositionClosed,
    MarginCall,
    AutoSquareOff,
    ForceClose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub account_id: AccountId,
    pub position_id: Option<PositionId>,
    pub amount: Option<Money>,
    pub message: String,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

pub trait NotificationSink {
    fn notify(
        &mut self,
        user: UserId,
        kind: NotificationKind,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError>;
}

/// Discards everything. The default sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(
        &mut self,
        _user: UserId,
        _kind: NotificationKind,
        _payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Records every notification, for tests and the simulator.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub sent: Vec<(UserId, NotificationKind, NotificationPayload)>,
}

impl NotificationSink for CollectingSink {
    fn notify(
        &mut self,
        user: UserId,
        kind: NotificationKind,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        self.sent.push((user, kind, payload.clone()));
        Ok(())
    }
}

/// Always fails. Exercises the swallow-and-log path in tests.
#[derive(Debug, Default)]
pub struct FailingSink;

impl NotificationSink for FailingSink {
    fn notify(
        &mut self,
        _user: UserId,
        _kind: NotificationKind,
        _payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        Err(NotifyError("sink offline".to_string()))
    }
}
