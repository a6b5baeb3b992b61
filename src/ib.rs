// 10.0: introducing-broker relationships and commission attribution records.
// the attribution step itself runs inside the engine on position close
// (engine/commission.rs); this module holds the data model and the math.

use crate::calc::round_money;
use crate::types::{AccountId, Money, PositionId, RelationshipId, Timestamp, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IbRelationship {
    pub id: RelationshipId,
    pub ib_user: UserId,
    pub client_user: UserId,
    pub referral_code: String,
    // commission per lot of closed client volume
    pub commission_rate: Decimal,
    pub revenue_share_percent: Decimal,
    pub tier: String,
    pub status: RelationshipStatus,
    // cumulative totals, bumped on every attribution
    pub total_commission: Money,
    pub total_client_volume: Decimal,
    pub created_at: Timestamp,
}

impl IbRelationship {
    pub fn is_active(&self) -> bool {
        self.status == RelationshipStatus::Active
    }
}

// immutable record of one attributed commission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IbCommissionRecord {
    pub id: u64,
    pub relationship_id: RelationshipId,
    pub ib_user: UserId,
    pub client_account: AccountId,
    pub position_id: PositionId,
    pub trade_volume: Decimal,
    pub commission_rate: Decimal,
    pub commission_amount: Money,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IbError {
    #[error("Self-referral is not allowed for user {0:?}")]
    SelfReferral(UserId),

    #[error("An active relationship already exists between IB {ib:?} and client {client:?}")]
    DuplicateRelationship { ib: UserId, client: UserId },
}

// commission = round(volume * rate, 2)
pub fn attributed_commission(trade_volume: Decimal, commission_rate: Decimal) -> Money {
    Money::new(round_money(trade_volume * commission_rate))
}

pub fn validate_new_relationship(
    existing: &[IbRelationship],
    ib_user: UserId,
    client_user: UserId,
) -> Result<(), IbError> {
    if ib_user == client_user {
        return Err(IbError::SelfReferral(ib_user));
    }
    let duplicate = existing.iter().any(|r| {
        r.is_active() && r.ib_user == ib_user && r.client_user == client_user
    });
    if duplicate {
        return Err(IbError::DuplicateRelationship {
            ib: ib_user,
            client: client_user,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn relationship(id: u64, ib: u64, client: u64, status: RelationshipStatus) -> IbRelationship {
        IbRelationship {
            id: RelationshipId(id),
            ib_user: UserId(ib),
            client_user: UserId(client),
            referral_code: "REF001".to_string(),
            commission_rate: dec!(0.0070),
            revenue_share_percent: dec!(20),
            tier: "standard".to_string(),
            status,
            total_commission: Money::zero(),
            total_client_volume: Decimal::ZERO,
            created_at: Timestamp::from_millis(0),
        }
    }

    #[test]
    fn commission_rounds_to_money() {
        // 2.0 lots at 0.0070 -> round(0.014, 2) = 0.01
        assert_eq!(attributed_commission(dec!(2.0), dec!(0.0070)).value(), dec!(0.01));
        assert_eq!(attributed_commission(dec!(100), dec!(0.0070)).value(), dec!(0.70));
    }

    #[test]
    fn self_referral_rejected() {
        let result = validate_new_relationship(&[], UserId(5), UserId(5));
        assert!(matches!(result, Err(IbError::SelfReferral(_))));
    }

    #[test]
    fn duplicate_active_pair_rejected() {
        let existing = vec![relationship(1, 1, 2, RelationshipStatus::Active)];
        let result = validate_new_relationship(&existing, UserId(1), UserId(2));
        assert!(matches!(result, Err(IbError::DuplicateRelationship { .. })));
    }

    #[test]
    fn inactive_pair_can_be_recreated() {
        let existing = vec![relationship(1, 1, 2, RelationshipStatus::Inactive)];
        assert!(validate_new_relationship(&existing, UserId(1), UserId(2)).is_ok());
    }
}
