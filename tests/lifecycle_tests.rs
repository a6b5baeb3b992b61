//! Position lifecycle scenario tests: open, price refresh, pending fills,
//! SL/TP sweeps, close settlement and commission attribution.

use margin_core::*;
use rust_decimal_macros::dec;

fn p(v: rust_decimal::Decimal) -> Price {
    Price::new_unchecked(v)
}

fn setup() -> (Engine, AccountId) {
    let mut engine = Engine::new(EngineConfig::default());
    engine.add_instrument(Instrument::eurusd());
    let account = engine.create_account(UserId(1), "USD", Leverage::new(dec!(100)).unwrap());
    engine.deposit(account, Money::new(dec!(10000))).unwrap();
    engine
        .update_quote(InstrumentId(1), p(dec!(1.1000)), p(dec!(1.1002)))
        .unwrap();
    (engine, account)
}

#[test]
fn unrealized_pnl_tracks_price_refresh() {
    // buy 1 lot, contract 100000, 1.1000 -> 1.1010 = +100.00
    let (mut engine, account) = setup();

    let mut request = OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1));
    request.price = Some(p(dec!(1.1000)));
    let position = engine.open_position(request).unwrap();

    engine
        .update_quote(InstrumentId(1), p(dec!(1.1010)), p(dec!(1.1012)))
        .unwrap();

    let pos = engine.get_position(position).unwrap();
    assert_eq!(pos.profit.value(), dec!(100.00));
    assert_eq!(pos.current_price, Some(p(dec!(1.1010))));
}

#[test]
fn price_refresh_never_touches_the_ledger() {
    let (mut engine, account) = setup();
    engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();

    let entries_before = engine.history_for(account).len();
    engine
        .update_quote(InstrumentId(1), p(dec!(1.1050)), p(dec!(1.1052)))
        .unwrap();
    engine.refresh_all_prices();

    assert_eq!(engine.history_for(account).len(), entries_before);
}

#[test]
fn pending_buy_limit_fills_at_market_price() {
    // trigger 1.0950, ask dips to 1.0945 -> fills at 1.0945
    let (mut engine, account) = setup();

    let request = OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1))
        .pending(OrderKind::Limit, p(dec!(1.0950)));
    let position = engine.open_position(request).unwrap();
    assert!(engine.get_position(position).unwrap().is_pending());

    engine.advance_time(61_000);
    engine
        .update_quote(InstrumentId(1), p(dec!(1.0943)), p(dec!(1.0945)))
        .unwrap();

    let report = engine.sweep_pending_orders();
    assert_eq!(report.triggered, 1);

    let pos = engine.get_position(position).unwrap();
    assert!(pos.is_open());
    assert_eq!(pos.open_price, p(dec!(1.0945)));
    assert!(pos.trigger_price.is_none());
}

#[test]
fn pending_order_respects_grace_period() {
    let (mut engine, account) = setup();

    let request = OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1))
        .pending(OrderKind::Limit, p(dec!(1.0950)));
    let position = engine.open_position(request).unwrap();

    // trigger condition is already met, but the order is too fresh
    engine
        .update_quote(InstrumentId(1), p(dec!(1.0943)), p(dec!(1.0945)))
        .unwrap();
    engine.advance_time(10_000);
    let report = engine.sweep_pending_orders();

    assert_eq!(report.scanned, 0);
    assert!(engine.get_position(position).unwrap().is_pending());
}

#[test]
fn stop_loss_closes_buy_on_bid_drop() {
    let (mut engine, account) = setup();

    let request = OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1))
        .with_stops(Some(p(dec!(1.0950))), None);
    let position = engine.open_position(request).unwrap();

    engine
        .update_quote(InstrumentId(1), p(dec!(1.0949)), p(dec!(1.0951)))
        .unwrap();
    let report = engine.sweep_stop_take();

    assert_eq!(report.triggered, 1);
    let pos = engine.get_position(position).unwrap();
    assert!(pos.is_closed());
    assert_eq!(pos.close_reason, Some(CloseReason::StopLoss));
    assert_eq!(pos.close_price, Some(p(dec!(1.0949))));
}

#[test]
fn take_profit_closes_sell_on_ask_drop() {
    let (mut engine, account) = setup();

    let request = OpenRequest::market(account, InstrumentId(1), Side::Sell, dec!(1))
        .with_stops(None, Some(p(dec!(1.0950))));
    let position = engine.open_position(request).unwrap();

    engine
        .update_quote(InstrumentId(1), p(dec!(1.0946)), p(dec!(1.0948)))
        .unwrap();
    let report = engine.sweep_stop_take();

    assert_eq!(report.triggered, 1);
    let pos = engine.get_position(position).unwrap();
    assert_eq!(pos.close_reason, Some(CloseReason::TakeProfit));
}

#[test]
fn close_settlement_counts_whole_nights() {
    let (mut engine, account) = setup();

    let position = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();

    // two midnights pass; neither rollover lands on the triple day (Wed):
    // the engine clock starts on a Thursday
    engine.advance_time(2 * MILLIS_PER_DAY);
    let result = engine
        .close_position(position, Some(p(dec!(1.1002))), CloseReason::Manual)
        .unwrap();

    // swap-long 2.5/lot * 2 nights
    assert_eq!(result.swap_settled.value(), dec!(5.0000));
    // gross 0, minus commission 7, minus swap 5
    assert_eq!(result.net_pnl.value(), dec!(-12.00));
}

#[test]
fn frozen_after_close() {
    let (mut engine, account) = setup();
    let position = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();
    engine
        .close_position(position, None, CloseReason::Manual)
        .unwrap();

    let frozen = engine.get_position(position).unwrap().clone();

    // later quotes must not move a closed position
    engine
        .update_quote(InstrumentId(1), p(dec!(1.2000)), p(dec!(1.2002)))
        .unwrap();
    engine.refresh_all_prices();

    let after = engine.get_position(position).unwrap();
    assert_eq!(after.profit, frozen.profit);
    assert_eq!(after.current_price, frozen.current_price);
    assert_eq!(after.close_price, frozen.close_price);
}

#[test]
fn margin_gate_rejects_oversized_open() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.add_instrument(Instrument::eurusd());
    let account = engine.create_account(UserId(1), "USD", Leverage::new(dec!(100)).unwrap());
    engine.deposit(account, Money::new(dec!(100))).unwrap();
    engine
        .update_quote(InstrumentId(1), p(dec!(1.1000)), p(dec!(1.1002)))
        .unwrap();

    // 1 lot needs ~1100 margin against 100 of equity
    let result =
        engine.open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)));
    assert!(matches!(result, Err(EngineError::InsufficientMargin { .. })));
    assert_eq!(engine.positions_iter().count(), 0);
}

#[test]
fn validation_errors_on_bad_requests() {
    let (mut engine, account) = setup();

    let zero_lots =
        engine.open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(0)));
    assert!(matches!(zero_lots, Err(EngineError::InvalidLotSize(_))));

    let request = OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1))
        .with_stops(Some(p(dec!(1.2000))), None); // SL above a buy's open
    assert!(matches!(
        engine.open_position(request),
        Err(EngineError::MalformedStopLevels { .. })
    ));

    let mut request = OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1));
    request.trigger_price = Some(p(dec!(1.0950)));
    assert!(matches!(
        engine.open_position(request),
        Err(EngineError::TriggerRequiresPendingKind)
    ));
}

#[test]
fn inactive_account_cannot_open() {
    let (mut engine, account) = setup();
    engine
        .set_account_status(account, AccountStatus::Inactive)
        .unwrap();

    let result =
        engine.open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)));
    assert!(matches!(result, Err(EngineError::AccountInactive(_))));
}

#[test]
fn margin_level_sentinel_values() {
    let (mut engine, account) = setup();

    // solvent with no margin used -> sentinel
    let metrics = engine.refresh_account_metrics(account).unwrap();
    assert_eq!(metrics.margin_level, MARGIN_LEVEL_SENTINEL);

    // drained to zero -> 0
    engine.withdraw(account, Money::new(dec!(10000))).unwrap();
    let metrics = engine.refresh_account_metrics(account).unwrap();
    assert_eq!(metrics.margin_level, rust_decimal::Decimal::ZERO);
}

#[test]
fn ib_commission_attributed_on_close() {
    // active relationship at 0.0070, close 2.0 lots
    let (mut engine, account) = setup();
    engine
        .register_ib_relationship(UserId(9), UserId(1), "REF009", dec!(0.0070), dec!(25), "standard")
        .unwrap();

    let position = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(2.0)))
        .unwrap();
    engine
        .close_position(position, None, CloseReason::Manual)
        .unwrap();

    let record = engine.ib_commissions().last().unwrap();
    assert_eq!(record.commission_amount.value(), dec!(0.01)); // round(2.0 * 0.0070, 2)
    assert_eq!(record.trade_volume, dec!(2.0));
    assert_eq!(record.position_id, position);

    let relationship = &engine.ib_relationships()[0];
    assert_eq!(relationship.total_client_volume, dec!(2.0));
    assert_eq!(relationship.total_commission.value(), dec!(0.01));
}

#[test]
fn no_commission_without_active_relationship() {
    let (mut engine, account) = setup();
    let id = engine
        .register_ib_relationship(UserId(9), UserId(1), "REF009", dec!(0.0070), dec!(25), "standard")
        .unwrap();
    engine.deactivate_ib_relationship(id);

    let position = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();
    engine
        .close_position(position, None, CloseReason::Manual)
        .unwrap();

    assert!(engine.ib_commissions().is_empty());
}

#[test]
fn failing_notification_sink_never_blocks_a_close() {
    let mut engine = Engine::with_sink(EngineConfig::default(), Box::new(FailingSink));
    engine.add_instrument(Instrument::eurusd());
    let account = engine.create_account(UserId(1), "USD", Leverage::new(dec!(100)).unwrap());
    engine.deposit(account, Money::new(dec!(10000))).unwrap();
    engine
        .update_quote(InstrumentId(1), p(dec!(1.1000)), p(dec!(1.1002)))
        .unwrap();

    let position = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();
    let result = engine.close_position(position, None, CloseReason::Manual);

    assert!(result.is_ok());
    assert!(engine.get_position(position).unwrap().is_closed());
}

#[test]
fn charge_overrides_shape_the_open_commission() {
    let (mut engine, account) = setup();
    engine.add_charge_rule(ChargeRule {
        id: RuleId(0), // assigned by the engine
        kind: ChargeKind::Commission,
        instrument: Some(InstrumentId(1)),
        account_type: Some("live".to_string()),
        tier: None,
        rate: dec!(4),
        unit: RateUnit::PerLot,
        active: true,
        valid_from: None,
        valid_to: None,
    });

    engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(2)))
        .unwrap();

    let last = engine.history_for(account).last().unwrap().amount;
    assert_eq!(last.value(), dec!(-8)); // 4/lot override instead of the default 7
}
