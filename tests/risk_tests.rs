//! Risk sweep tests: margin monitor actions, forced liquidation paths, swap
//! accrual rules and failure isolation inside sweeps.

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
fn auto_square_off_closes_everything_oldest_first() {
    // equity falls to balance * percent / 100 -> square off
    let (mut engine, account) = setup();
    engine.set_auto_square_off(account, Some(dec!(30))).unwrap();

    let first = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(3)))
        .unwrap();
    engine.advance_time(1_000);
    let second = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(2)))
        .unwrap();

    engine
        .update_quote(InstrumentId(1), p(dec!(1.0850)), p(dec!(1.0852)))
        .unwrap();
    let report = engine.sweep_margin_monitor();

    assert_eq!(report.squared_off, 1);
    assert_eq!(report.positions_closed, 2);
    assert!(engine.get_position(first).unwrap().is_closed());
    assert!(engine.get_position(second).unwrap().is_closed());
    assert_eq!(
        engine.get_position(first).unwrap().close_reason,
        Some(CloseReason::AutoSquareOff)
    );

    let event = engine.margin_events().last().unwrap();
    assert_eq!(event.kind, MarginEventKind::AutoSquareOff);
    // oldest first
    assert_eq!(event.positions_affected, vec![first, second]);
    assert!(engine.verify_ledger(account));
}

#[test]
fn stop_out_closes_worst_loss_until_recovery() {
    let (mut engine, account) = setup();
    // no auto-square-off percent: this account uses the stop-out path

    let big_loser = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(5)))
        .unwrap();
    let hedge = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Sell, dec!(1)))
        .unwrap();

    engine
        .update_quote(InstrumentId(1), p(dec!(1.0800)), p(dec!(1.0802)))
        .unwrap();
    let report = engine.sweep_margin_monitor();

    assert_eq!(report.stopped_out, 1);
    // only the worst loser had to go; the hedge recovered the margin level
    assert!(engine.get_position(big_loser).unwrap().is_closed());
    assert_eq!(
        engine.get_position(big_loser).unwrap().close_reason,
        Some(CloseReason::MarginCall)
    );
    assert!(engine.get_position(hedge).unwrap().is_open());

    let event = engine.margin_events().last().unwrap();
    assert_eq!(event.kind, MarginEventKind::StopOut);
    assert_eq!(event.positions_affected, vec![big_loser]);
}

#[test]
fn margin_call_warning_without_forced_closes() {
    let (mut engine, account) = setup();

    let position = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(8)))
        .unwrap();

    // level dips under 100% but stays far above stop-out
    engine
        .update_quote(InstrumentId(1), p(dec!(1.0985)), p(dec!(1.0987)))
        .unwrap();
    let report = engine.sweep_margin_monitor();

    assert_eq!(report.margin_calls, 1);
    assert_eq!(report.positions_closed, 0);
    assert!(engine.get_position(position).unwrap().is_open());
    assert_eq!(
        engine.margin_events().last().unwrap().kind,
        MarginEventKind::MarginCall
    );
}

#[test]
fn force_close_all_is_unconditional() {
    let (mut engine, account) = setup();

    let first = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();
    let second = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Sell, dec!(1)))
        .unwrap();

    // account is perfectly healthy; the admin closes it anyway
    let closed = engine.force_close_all(account).unwrap();

    assert_eq!(closed, 2);
    assert_eq!(
        engine.get_position(first).unwrap().close_reason,
        Some(CloseReason::ForceClose)
    );
    assert_eq!(
        engine.get_position(second).unwrap().close_reason,
        Some(CloseReason::ForceClose)
    );
    assert_eq!(
        engine.margin_events().last().unwrap().kind,
        MarginEventKind::ForceCloseAll
    );
}

#[test]
fn triple_swap_day_charges_three_nights() {
    let (mut engine, account) = setup();

    // epoch day 0 is a Thursday, so day 6 is the default triple day (Wed)
    engine.set_time(Timestamp::from_millis(6 * MILLIS_PER_DAY + 43_200_000));
    let position = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();

    let wednesday = engine.run_swap_accrual();
    assert_eq!(wednesday.charged, 1);

    engine.advance_time(MILLIS_PER_DAY);
    let thursday = engine.run_swap_accrual();
    assert_eq!(thursday.charged, 1);

    let charges = engine.swap_charges();
    let wed_charge = &charges[charges.len() - 2];
    let thu_charge = &charges[charges.len() - 1];

    assert_eq!(wed_charge.multiplier, dec!(3));
    assert_eq!(thu_charge.multiplier, dec!(1));
    // identical lot size and rate: triple day is exactly 3x
    assert_eq!(
        wed_charge.amount.value(),
        thu_charge.amount.value() * dec!(3)
    );

    let pos = engine.get_position(position).unwrap();
    assert_eq!(pos.swap_nights, 4);
    assert_eq!(pos.swap.value(), dec!(10.0000)); // 7.5 + 2.5
    assert!(engine.verify_ledger(account));
}

#[test]
fn swap_accrual_skips_an_already_charged_day() {
    let (mut engine, account) = setup();
    engine.advance_time(MILLIS_PER_DAY);
    engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();

    let first = engine.run_swap_accrual();
    assert_eq!(first.charged, 1);

    // an accidental second run on the same settlement day is a no-op
    let second = engine.run_swap_accrual();
    assert_eq!(second.charged, 0);
    assert_eq!(second.skipped, 1);

    let swap_entries = engine
        .history_for(account)
        .into_iter()
        .filter(|e| e.kind == BalanceChangeKind::Swap)
        .count();
    assert_eq!(swap_entries, 1);
}

#[test]
fn sell_side_swap_can_credit_the_account() {
    let (mut engine, account) = setup();
    engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Sell, dec!(1)))
        .unwrap();

    let balance_before = engine.get_account(account).unwrap().balance;
    engine.run_swap_accrual();
    let balance_after = engine.get_account(account).unwrap().balance;

    // eurusd swap-short is -0.8/lot: holding short earns
    assert_eq!(balance_after.value(), balance_before.value() + dec!(0.80));
}

#[test]
fn pending_sweep_isolates_per_position_failures() {
    let (mut engine, account) = setup();
    engine.add_instrument(Instrument::xauusd());

    let fillable = engine
        .open_position(
            OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1))
                .pending(OrderKind::Limit, p(dec!(1.0950))),
        )
        .unwrap();
    // gold has no quote: evaluating this order fails, but must not stop the sweep
    let unquoted = engine
        .open_position(
            OpenRequest::market(account, InstrumentId(2), Side::Buy, dec!(0.1))
                .pending(OrderKind::Limit, p(dec!(2300))),
        )
        .unwrap();

    engine.advance_time(61_000);
    engine
        .update_quote(InstrumentId(1), p(dec!(1.0943)), p(dec!(1.0945)))
        .unwrap();

    let report = engine.sweep_pending_orders();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.triggered, 1);
    assert_eq!(report.failed, 1);
    assert!(engine.get_position(fillable).unwrap().is_open());
    assert!(engine.get_position(unquoted).unwrap().is_pending());
}

#[test]
fn margin_monitor_ignores_inactive_accounts() {
    let (mut engine, account) = setup();
    engine.set_auto_square_off(account, Some(dec!(99))).unwrap();
    engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();
    engine
        .set_account_status(account, AccountStatus::Inactive)
        .unwrap();

    let report = engine.sweep_margin_monitor();
    assert_eq!(report.accounts_checked, 0);
}

#[test]
fn scheduled_daily_swap_runs_through_run_due() {
    let (mut engine, account) = setup();
    engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();

    let mut scheduler = Scheduler::standard(engine.time());
    engine.advance_time(MILLIS_PER_DAY);
    let runs = scheduler.run_due(&mut engine);

    let swap_run = runs
        .iter()
        .find(|r| r.kind == TaskKind::SwapAccrual)
        .expect("swap task due after a day");
    match &swap_run.outcome {
        TaskOutcome::Swap(report) => assert_eq!(report.charged, 1),
        other => panic!("unexpected outcome {other:?}"),
    }
}
