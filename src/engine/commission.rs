//! IB commission attribution on position close.
//!
//! Best-effort and isolated: a failure here is logged and swallowed, it must
//! never fail or roll back the close that triggered it.

use super::core::Engine;
use crate::events::{CommissionAttributedEvent, EventPayload};
use crate::ib::{attributed_commission, IbCommissionRecord};
use crate::position::Position;
use tracing::warn;

impl Engine {
    // called from close_position with a snapshot of the just-closed position
    pub(super) fn attribute_commission(&mut self, position: &Position) {
        let Some(account) = self.accounts.get(&position.account_id) else {
            warn!(
                account = position.account_id.0,
                "commission attribution skipped: account missing"
            );
            return;
        };
        let owner = account.owner;

        let Some(relationship) = self
            .ib_relationships
            .iter_mut()
            .find(|r| r.is_active() && r.client_user == owner)
        else {
            // no active relationship: nothing to attribute, not an error
            return;
        };

        let volume = position.volume();
        let commission = attributed_commission(volume, relationship.commission_rate);

        relationship.total_commission = relationship.total_commission.add(commission);
        relationship.total_client_volume += volume;

        let relationship_id = relationship.id;
        let ib_user = relationship.ib_user;
        let rate = relationship.commission_rate;

        let id = self.next_commission_id;
        self.next_commission_id += 1;
        self.ib_commissions.push(IbCommissionRecord {
            id,
            relationship_id,
            ib_user,
            client_account: position.account_id,
            position_id: position.id,
            trade_volume: volume,
            commission_rate: rate,
            commission_amount: commission,
            created_at: self.current_time,
        });

        self.emit_event(EventPayload::CommissionAttributed(
            CommissionAttributedEvent {
                relationship_id,
                position_id: position.id,
                commission,
            },
        ));
    }
}
