//! Margin engine simulation.
//!
//! Walks the full back-end lifecycle: opening and closing leveraged positions,
//! pending-order fills, stop-loss/take-profit sweeps, overnight swap accrual,
//! auto-square-off, IB commission attribution, and a scheduler-driven session.

use margin_core::*;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Margin Trading Core Engine Simulation");
    println!("Ledger-Gated Balances, Periodic Risk Sweeps, Full Lifecycle\n");

    scenario_1_open_close();
    scenario_2_pending_fill();
    scenario_3_stop_loss_take_profit();
    scenario_4_swap_week();
    scenario_5_auto_square_off();
    scenario_6_ib_commission();
    scenario_7_scheduled_session();

    println!("\nAll simulations completed successfully.");
}

fn setup_engine() -> (Engine, AccountId) {
    let mut engine = Engine::new(EngineConfig::default());
    engine.add_instrument(Instrument::eurusd());
    let account = engine.create_account(UserId(1), "USD", Leverage::new(dec!(100)).unwrap());
    engine.deposit(account, Money::new(dec!(10000))).unwrap();
    engine
        .update_quote(
            InstrumentId(1),
            Price::new_unchecked(dec!(1.1000)),
            Price::new_unchecked(dec!(1.1002)),
        )
        .unwrap();
    (engine, account)
}

/// Open, ride a price move, close manually.
fn scenario_1_open_close() {
    println!("Scenario 1: Open and Close\n");

    let (mut engine, account) = setup_engine();
    println!("  Deposited $10,000, quote 1.1000/1.1002");

    let position = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();

    let acc = engine.get_account(account).unwrap();
    println!("  Opened 1 lot buy, commission debited, balance: ${}", acc.balance);

    engine
        .update_quote(
            InstrumentId(1),
            Price::new_unchecked(dec!(1.1010)),
            Price::new_unchecked(dec!(1.1012)),
        )
        .unwrap();
    let pos = engine.get_position(position).unwrap();
    println!("  Price to 1.1010/1.1012, unrealized: ${}", pos.profit);

    let result = engine
        .close_position(position, None, CloseReason::Manual)
        .unwrap();
    println!(
        "  Closed at {}: gross ${}, net ${}",
        result.close_price, result.gross_pnl, result.net_pnl
    );

    let acc = engine.get_account(account).unwrap();
    println!("  Final balance: ${}, ledger entries: {}\n", acc.balance, engine.history().len());
}

/// A buy-limit parks pending, then fills when the ask dips to the trigger.
fn scenario_2_pending_fill() {
    println!("Scenario 2: Pending Order Fill\n");

    let (mut engine, account) = setup_engine();

    let request = OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(0.5))
        .pending(OrderKind::Limit, Price::new_unchecked(dec!(1.0950)));
    let position = engine.open_position(request).unwrap();
    println!("  Placed buy limit 0.5 lots @ 1.0950, status: pending");

    // market has not reached the trigger yet
    engine.advance_time(61_000);
    let report = engine.sweep_pending_orders();
    println!("  Sweep at 1.1000/1.1002: {} filled", report.triggered);

    engine
        .update_quote(
            InstrumentId(1),
            Price::new_unchecked(dec!(1.0943)),
            Price::new_unchecked(dec!(1.0945)),
        )
        .unwrap();
    let report = engine.sweep_pending_orders();
    let pos = engine.get_position(position).unwrap();
    println!(
        "  Sweep at 1.0943/1.0945: {} filled, open price {}, trigger cleared: {}\n",
        report.triggered,
        pos.open_price,
        pos.trigger_price.is_none()
    );
}

/// Stop-loss and take-profit close automatically via the sweep.
fn scenario_3_stop_loss_take_profit() {
    println!("Scenario 3: Stop Loss / Take Profit\n");

    let (mut engine, account) = setup_engine();

    let request = OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)).with_stops(
        Some(Price::new_unchecked(dec!(1.0950))),
        Some(Price::new_unchecked(dec!(1.1050))),
    );
    let position = engine.open_position(request).unwrap();
    println!("  Opened buy with SL 1.0950 / TP 1.1050");

    engine
        .update_quote(
            InstrumentId(1),
            Price::new_unchecked(dec!(1.1051)),
            Price::new_unchecked(dec!(1.1053)),
        )
        .unwrap();
    let report = engine.sweep_stop_take();
    let pos = engine.get_position(position).unwrap();
    println!(
        "  Bid rallies to 1.1051: {} auto-closed, reason {:?}, net ${}\n",
        report.triggered,
        pos.close_reason.unwrap(),
        pos.net_result.unwrap()
    );
}

/// A week of overnight swap including the 3x rollover day.
fn scenario_4_swap_week() {
    println!("Scenario 4: A Week of Swap\n");

    let (mut engine, account) = setup_engine();
    engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)))
        .unwrap();

    for day in 1..=7 {
        engine.advance_time(MILLIS_PER_DAY);
        let report = engine.run_swap_accrual();
        println!(
            "  Day {}: charged {} positions, total ${} ({})",
            day,
            report.charged,
            report.total_charged,
            engine.time().weekday()
        );
    }

    let acc = engine.get_account(account).unwrap();
    println!("  Balance after a week of financing: ${}\n", acc.balance);
}

/// Equity collapse trips the auto-square-off threshold.
fn scenario_5_auto_square_off() {
    println!("Scenario 5: Auto Square Off\n");

    let (mut engine, account) = setup_engine();
    engine.set_auto_square_off(account, Some(dec!(30))).unwrap();

    engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(5)))
        .unwrap();
    println!("  Opened 5 lots buy, square-off at 30% of balance");

    engine
        .update_quote(
            InstrumentId(1),
            Price::new_unchecked(dec!(1.0850)),
            Price::new_unchecked(dec!(1.0852)),
        )
        .unwrap();
    let report = engine.sweep_margin_monitor();
    println!(
        "  Price craters to 1.0850: {} accounts squared off, {} positions closed",
        report.squared_off, report.positions_closed
    );

    let event = engine.margin_events().last().unwrap();
    println!(
        "  MarginEvent: {:?}, equity at trigger ${}, total pnl ${}\n",
        event.kind, event.equity, event.total_pnl
    );
}

/// A referred client's close attributes commission to the IB.
fn scenario_6_ib_commission() {
    println!("Scenario 6: IB Commission Attribution\n");

    let (mut engine, account) = setup_engine();
    engine
        .register_ib_relationship(UserId(42), UserId(1), "REF042", dec!(0.0070), dec!(20), "standard")
        .unwrap();
    println!("  User 1 referred by IB 42 at 0.0070/lot");

    let position = engine
        .open_position(OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(2)))
        .unwrap();
    engine
        .close_position(position, None, CloseReason::Manual)
        .unwrap();

    let record = engine.ib_commissions().last().unwrap();
    let relationship = &engine.ib_relationships()[0];
    println!(
        "  Closed 2 lots: commission ${} attributed, IB lifetime volume {} lots\n",
        record.commission_amount, relationship.total_client_volume
    );
}

/// The scheduler drives all sweeps across a simulated session.
fn scenario_7_scheduled_session() {
    println!("Scenario 7: Scheduled Session\n");

    let (mut engine, account) = setup_engine();
    let mut scheduler = Scheduler::standard(engine.time());

    let request = OpenRequest::market(account, InstrumentId(1), Side::Buy, dec!(1)).with_stops(
        Some(Price::new_unchecked(dec!(1.0950))),
        None,
    );
    engine.open_position(request).unwrap();
    engine
        .open_position(
            OpenRequest::market(account, InstrumentId(1), Side::Sell, dec!(0.5))
                .pending(OrderKind::Limit, Price::new_unchecked(dec!(1.1030))),
        )
        .unwrap();

    println!("  One live buy with SL, one pending sell limit @ 1.1030");

    let drift = [
        dec!(1.1005), dec!(1.1012), dec!(1.1021), dec!(1.1031), dec!(1.1018),
        dec!(1.0990), dec!(1.0967), dec!(1.0949), dec!(1.0955), dec!(1.0962),
    ];

    let mut total_runs = 0;
    for bid in drift {
        engine.advance_time(15_000);
        engine
            .update_quote(
                InstrumentId(1),
                Price::new_unchecked(bid),
                Price::new_unchecked(bid + dec!(0.0002)),
            )
            .unwrap();
        total_runs += scheduler.run_due(&mut engine).len();
    }

    let open = engine.positions_iter().filter(|p| p.is_open()).count();
    let closed = engine.positions_iter().filter(|p| p.is_closed()).count();
    println!(
        "  {} task runs across the session: {} open, {} closed, {} events",
        total_runs,
        open,
        closed,
        engine.events().len()
    );
    println!(
        "  Ledger intact: {}\n",
        engine.verify_ledger(account)
    );
}
