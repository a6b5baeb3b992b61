// 8.1 engine/core.rs: main engine. holds all accounts, positions, instruments,
// charge rules, quotes, the balance ledger and the audit log. the store is the
// single source of truth between scheduler ticks; sweeps re-read it on every
// pass instead of trusting any cached view.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::account::{AccountStatus, TradingAccount};
use crate::charges::{resolve_profile, ChargeProfile, ChargeRule};
use crate::events::{BalanceChangedEvent, Event, EventId, EventPayload, MarginEvent};
use crate::ib::{
    validate_new_relationship, IbCommissionRecord, IbRelationship, RelationshipStatus,
};
use crate::instrument::{Instrument, MarketQuote};
use crate::ledger::{
    Actor, BalanceChangeKind, BalanceHistoryEntry, ChangeRef, Ledger,
};
use crate::notify::{NotificationKind, NotificationPayload, NotificationSink, NullSink};
use crate::position::Position;
use crate::swap::SwapChargeRecord;
use crate::types::{
    AccountId, EntryId, InstrumentId, Leverage, Money, PositionId, RelationshipId, RuleId,
    Timestamp, UserId,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) accounts: HashMap<AccountId, TradingAccount>,
    // BTreeMap so sweeps iterate positions in creation order
    pub(super) positions: BTreeMap<PositionId, Position>,
    pub(super) instruments: HashMap<InstrumentId, Instrument>,
    pub(super) charge_rules: Vec<ChargeRule>,
    pub(super) quotes: HashMap<InstrumentId, MarketQuote>,
    pub(super) ledger: Ledger,
    pub(super) swap_charges: Vec<SwapChargeRecord>,
    pub(super) margin_events: Vec<MarginEvent>,
    pub(super) ib_relationships: Vec<IbRelationship>,
    pub(super) ib_commissions: Vec<IbCommissionRecord>,
    pub(super) sink: Box<dyn NotificationSink>,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) next_account_id: u64,
    pub(super) next_position_id: u64,
    pub(super) next_rule_id: u64,
    pub(super) next_relationship_id: u64,
    pub(super) next_commission_id: u64,
    pub(super) next_adjustment_id: u64,
    pub(super) current_time: Timestamp,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("accounts", &self.accounts.len())
            .field("positions", &self.positions.len())
            .field("instruments", &self.instruments.len())
            .field("current_time", &self.current_time)
            .finish()
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_sink(config, Box::new(NullSink))
    }

    pub fn with_sink(config: EngineConfig, sink: Box<dyn NotificationSink>) -> Self {
        Self {
            config,
            accounts: HashMap::new(),
            positions: BTreeMap::new(),
            instruments: HashMap::new(),
            charge_rules: Vec::new(),
            quotes: HashMap::new(),
            ledger: Ledger::new(),
            swap_charges: Vec::new(),
            margin_events: Vec::new(),
            ib_relationships: Vec::new(),
            ib_commissions: Vec::new(),
            sink,
            events: Vec::new(),
            next_event_id: 1,
            next_account_id: 1,
            next_position_id: 1,
            next_rule_id: 1,
            next_relationship_id: 1,
            next_commission_id: 1,
            next_adjustment_id: 1,
            current_time: Timestamp::from_millis(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = Timestamp::from_millis(self.current_time.as_millis() + millis);
    }

    // --- instruments and charge rules ---

    pub fn add_instrument(&mut self, instrument: Instrument) -> InstrumentId {
        let id = instrument.id;
        self.instruments.insert(id, instrument);
        id
    }

    pub fn get_instrument(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.get(&id)
    }

    pub fn add_charge_rule(&mut self, mut rule: ChargeRule) -> RuleId {
        rule.id = RuleId(self.next_rule_id);
        self.next_rule_id += 1;
        let id = rule.id;
        self.charge_rules.push(rule);
        id
    }

    /// Resolve the effective charge profile for one account on one instrument,
    /// fresh at the current time. Never cached.
    pub fn charge_profile(
        &self,
        account_id: AccountId,
        instrument_id: InstrumentId,
    ) -> Result<ChargeProfile, EngineError> {
        let account = self
            .accounts
            .get(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;
        let instrument = self
            .instruments
            .get(&instrument_id)
            .ok_or_else(|| crate::charges::ChargeError::InstrumentNotFound(instrument_id))?;

        Ok(resolve_profile(
            instrument,
            &self.charge_rules,
            &account.account_type,
            &account.tier,
            self.current_time,
        ))
    }

    // --- accounts ---

    pub fn create_account(
        &mut self,
        owner: UserId,
        currency: &str,
        leverage: Leverage,
    ) -> AccountId {
        let id = AccountId(self.next_account_id);
        self.next_account_id += 1;
        let number = format!("MT-{:06}", 100_000 + id.0);
        let account = TradingAccount::new(
            id,
            owner,
            number,
            currency.to_string(),
            leverage,
            self.current_time,
        );
        self.accounts.insert(id, account);
        id
    }

    pub fn get_account(&self, account_id: AccountId) -> Option<&TradingAccount> {
        self.accounts.get(&account_id)
    }

    pub(super) fn account_mut(
        &mut self,
        account_id: AccountId,
    ) -> Result<&mut TradingAccount, EngineError> {
        self.accounts
            .get_mut(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))
    }

    pub fn accounts_iter(&self) -> impl Iterator<Item = (&AccountId, &TradingAccount)> {
        self.accounts.iter()
    }

    pub fn set_account_status(
        &mut self,
        account_id: AccountId,
        status: AccountStatus,
    ) -> Result<(), EngineError> {
        self.account_mut(account_id)?.status = status;
        Ok(())
    }

    pub fn set_auto_square_off(
        &mut self,
        account_id: AccountId,
        percent: Option<Decimal>,
    ) -> Result<(), EngineError> {
        self.account_mut(account_id)?.auto_square_off_percent = percent;
        Ok(())
    }

    // --- positions ---

    pub fn get_position(&self, position_id: PositionId) -> Option<&Position> {
        self.positions.get(&position_id)
    }

    pub fn positions_iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_positions_for(&self, account_id: AccountId) -> Vec<&Position> {
        self.positions
            .values()
            .filter(|p| p.account_id == account_id && p.is_open())
            .collect()
    }

    // --- balance operations: every path funnels into apply_balance ---

    pub fn deposit(
        &mut self,
        account_id: AccountId,
        amount: Money,
    ) -> Result<EntryId, EngineError> {
        self.apply_balance(
            account_id,
            amount,
            BalanceChangeKind::Deposit,
            ChangeRef::None,
            Actor::User,
            "deposit",
        )
    }

    pub fn withdraw(
        &mut self,
        account_id: AccountId,
        amount: Money,
    ) -> Result<EntryId, EngineError> {
        self.apply_balance(
            account_id,
            amount.abs().negate(),
            BalanceChangeKind::Withdrawal,
            ChangeRef::None,
            Actor::User,
            "withdrawal",
        )
    }

    /// Admin-initiated manual credit or debit, with a reason note. Routed
    /// through the Ledger exactly like every other mutation.
    pub fn manual_adjustment(
        &mut self,
        account_id: AccountId,
        amount: Money,
        note: &str,
    ) -> Result<EntryId, EngineError> {
        let kind = if amount.is_negative() {
            BalanceChangeKind::ManualDebit
        } else {
            BalanceChangeKind::ManualCredit
        };
        let adjustment_id = self.next_adjustment_id;
        self.next_adjustment_id += 1;
        self.apply_balance(
            account_id,
            amount,
            kind,
            ChangeRef::Adjustment(adjustment_id),
            Actor::Admin,
            note,
        )
    }

    pub(super) fn apply_balance(
        &mut self,
        account_id: AccountId,
        amount: Money,
        kind: BalanceChangeKind,
        reference: ChangeRef,
        actor: Actor,
        note: &str,
    ) -> Result<EntryId, EngineError> {
        let now = self.current_time;
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;

        let entry =
            self.ledger
                .apply(account, amount, kind, reference, actor, note, now)?;
        let event = BalanceChangedEvent {
            entry_id: entry.id,
            account_id,
            kind,
            amount: entry.amount,
            new_balance: entry.new_balance,
        };
        let entry_id = entry.id;

        self.emit_event(EventPayload::BalanceChanged(event));
        Ok(entry_id)
    }

    pub fn history(&self) -> &[BalanceHistoryEntry] {
        self.ledger.entries()
    }

    pub fn history_for(&self, account_id: AccountId) -> Vec<&BalanceHistoryEntry> {
        self.ledger.entries_for(account_id).collect()
    }

    pub fn verify_ledger(&self, account_id: AccountId) -> bool {
        self.accounts
            .get(&account_id)
            .map(|account| self.ledger.verify(account))
            .unwrap_or(false)
    }

    // --- introducing brokers ---

    pub fn register_ib_relationship(
        &mut self,
        ib_user: UserId,
        client_user: UserId,
        referral_code: &str,
        commission_rate: Decimal,
        revenue_share_percent: Decimal,
        tier: &str,
    ) -> Result<RelationshipId, EngineError> {
        validate_new_relationship(&self.ib_relationships, ib_user, client_user)?;

        let id = RelationshipId(self.next_relationship_id);
        self.next_relationship_id += 1;
        self.ib_relationships.push(IbRelationship {
            id,
            ib_user,
            client_user,
            referral_code: referral_code.to_string(),
            commission_rate,
            revenue_share_percent,
            tier: tier.to_string(),
            status: RelationshipStatus::Active,
            total_commission: Money::zero(),
            total_client_volume: Decimal::ZERO,
            created_at: self.current_time,
        });
        Ok(id)
    }

    pub fn deactivate_ib_relationship(&mut self, id: RelationshipId) {
        if let Some(rel) = self.ib_relationships.iter_mut().find(|r| r.id == id) {
            rel.status = RelationshipStatus::Inactive;
        }
    }

    pub fn ib_relationships(&self) -> &[IbRelationship] {
        &self.ib_relationships
    }

    pub fn ib_commissions(&self) -> &[IbCommissionRecord] {
        &self.ib_commissions
    }

    // --- audit surfaces ---

    pub fn margin_events(&self) -> &[MarginEvent] {
        &self.margin_events
    }

    pub fn swap_charges(&self) -> &[SwapChargeRecord] {
        &self.swap_charges
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        if self.config.verbose {
            println!("[Event {}] {:?}", event.id.0, event.payload);
        }

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }

    // fire-and-forget: a failing sink is logged and swallowed, never bubbled
    pub(super) fn send_notification(
        &mut self,
        user: UserId,
        kind: NotificationKind,
        payload: NotificationPayload,
    ) {
        if let Err(err) = self.sink.notify(user, kind, &payload) {
            warn!(user = user.0, ?kind, %err, "notification dropped");
        }
    }
}
