// margin-core: margin trading back end engine.
// ledger-first architecture: every balance mutation routes through one gateway
// and pairs with an immutable history entry. all computation is deterministic
// with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, Side, Price, Money, Lots, Leverage
//   2.x  calc.rs: pure margin/equity math: pnl, required margin, margin level
//   3.x  instrument.rs: instrument defaults and latest bid/ask quotes
//   3.2x charges.rs: specificity-ranked charge rules, profile resolution
//   4.x  position.rs: position state machine, SL/TP and pending predicates
//   5.x  swap.rs: whole-night counting, triple-swap day, charge log rows
//   6.x  account.rs: trading accounts + derived metrics
//   7.x  ledger.rs: the balance gateway and append-only history
//   8.x  engine/: stateful engine: lifecycle, sweeps, monitor, swap, IB
//   9.x  scheduler.rs: independently-paced periodic tasks
//   10.x ib.rs: introducing-broker relationships and attribution math
//   11.x events.rs: audit events and MarginEvent records
//        notify.rs: injected notification sink contract

// core trading modules
pub mod account;
pub mod calc;
pub mod charges;
pub mod engine;
pub mod events;
pub mod instrument;
pub mod ledger;
pub mod position;
pub mod swap;
pub mod types;

// risk and integration modules
pub mod ib;
pub mod notify;
pub mod scheduler;

// re exports for convenience
pub use account::*;
pub use calc::*;
pub use charges::*;
pub use engine::*;
pub use events::*;
pub use ib::*;
pub use instrument::*;
pub use ledger::*;
pub use notify::*;
pub use position::*;
pub use scheduler::*;
pub use swap::*;
pub use types::*;
