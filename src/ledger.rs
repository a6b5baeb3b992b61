// 7.0: the balance ledger. single gateway for mutating an account's balance.
// every mutation is one read-modify-write against the current stored balance
// paired with an immutable, append-only history entry. no other code path may
// assign account.balance.
//
// invariants: new_balance == previous_balance + amount on every entry, and the
// account balance always equals the newest entry's new_balance.

use crate::account::TradingAccount;
use crate::calc::round_money;
use crate::types::{AccountId, EntryId, Money, PositionId, RelationshipId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceChangeKind {
    Deposit,
    Withdrawal,
    Commission,
    TradeProfit,
    TradeLoss,
    Swap,
    IbCommission,
    ManualCredit,
    ManualDebit,
}

impl BalanceChangeKind {
    // kinds a user initiates against their own free cash; these are the only
    // ones rejected on insufficient funds. trade losses and swap may push a
    // balance negative, that is a margin problem, not a ledger one.
    fn requires_funds(&self) -> bool {
        matches!(
            self,
            BalanceChangeKind::Withdrawal | BalanceChangeKind::ManualDebit
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    Admin,
    User,
}

// what caused the entry, for audit reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeRef {
    None,
    Position(PositionId),
    Adjustment(u64),
    Relationship(RelationshipId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceHistoryEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub previous_balance: Money,
    pub new_balance: Money,
    pub amount: Money,
    pub kind: BalanceChangeKind,
    pub reference: ChangeRef,
    pub actor: Actor,
    pub note: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Money, available: Money },
}

#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<BalanceHistoryEntry>,
    next_id: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Apply a signed balance change to the account and append the paired
    /// history entry. The amount is rounded to money precision here, at the
    /// single point of persistence.
    pub fn apply(
        &mut self,
        account: &mut TradingAccount,
        amount: Money,
        kind: BalanceChangeKind,
        reference: ChangeRef,
        actor: Actor,
        note: impl Into<String>,
        timestamp: Timestamp,
    ) -> Result<&BalanceHistoryEntry, LedgerError> {
        let amount = Money::new(round_money(amount.value()));
        let previous = account.balance;

        if kind.requires_funds() && amount.is_negative() {
            let requested = amount.abs();
            if requested.value() > previous.value() {
                return Err(LedgerError::InsufficientFunds {
                    requested,
                    available: previous,
                });
            }
        }

        let new_balance = previous.add(amount);

        let entry = BalanceHistoryEntry {
            id: EntryId(self.next_id),
            account_id: account.id,
            previous_balance: previous,
            new_balance,
            amount,
            kind,
            reference,
            actor,
            note: note.into(),
            timestamp,
        };
        self.next_id += 1;

        account.balance = new_balance;
        self.entries.push(entry);
        Ok(self.entries.last().expect("entry just pushed"))
    }

    pub fn entries(&self) -> &[BalanceHistoryEntry] {
        &self.entries
    }

    pub fn entries_for(&self, account_id: AccountId) -> impl Iterator<Item = &BalanceHistoryEntry> {
        self.entries.iter().filter(move |e| e.account_id == account_id)
    }

    pub fn last_for(&self, account_id: AccountId) -> Option<&BalanceHistoryEntry> {
        self.entries.iter().rev().find(|e| e.account_id == account_id)
    }

    /// Integrity check: the account balance must equal the newest entry's
    /// new_balance (or be untouched if the account has no entries), and every
    /// entry must balance internally.
    pub fn verify(&self, account: &TradingAccount) -> bool {
        for entry in self.entries_for(account.id) {
            if entry.new_balance != entry.previous_balance.add(entry.amount) {
                return false;
            }
        }
        match self.last_for(account.id) {
            Some(last) => last.new_balance == account.balance,
            None => true,
        }
    }
}
