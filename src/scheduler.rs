// 9.0: the scheduler. a set of independently-paced periodic tasks driven off
// the engine clock. the store is the single source of truth between ticks, so
// tasks may interleave freely; every mutation inside a task is a single
// read-modify-write and a late tick can never corrupt state.
//
// cadences are deliberately uneven: valuation refresh runs hot, SL/TP and
// pending fills a little slower, the margin monitor slower still, and swap
// accrual once per settlement day.

use crate::engine::{Engine, MarginSweepReport, SwapRunReport, SweepReport};
use crate::types::{Timestamp, MILLIS_PER_DAY};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    PriceRefresh,
    StopTakeCheck,
    PendingOrders,
    MarginMonitor,
    SwapAccrual,
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduledTask {
    pub kind: TaskKind,
    pub period_ms: i64,
    pub next_due: Timestamp,
}

#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Refreshed { positions: usize },
    Sweep(SweepReport),
    Margin(MarginSweepReport),
    Swap(SwapRunReport),
}

#[derive(Debug, Clone)]
pub struct TaskRun {
    pub kind: TaskKind,
    pub at: Timestamp,
    pub outcome: TaskOutcome,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    pub fn new(tasks: Vec<ScheduledTask>) -> Self {
        Self { tasks }
    }

    /// The standard cadence set: refresh 2s, SL/TP 5s, pending fills 10s,
    /// margin monitor 30s, swap accrual daily.
    pub fn standard(start: Timestamp) -> Self {
        let task = |kind, period_ms| ScheduledTask {
            kind,
            period_ms,
            next_due: Timestamp::from_millis(start.as_millis() + period_ms),
        };
        Self::new(vec![
            task(TaskKind::PriceRefresh, 2_000),
            task(TaskKind::StopTakeCheck, 5_000),
            task(TaskKind::PendingOrders, 10_000),
            task(TaskKind::MarginMonitor, 30_000),
            task(TaskKind::SwapAccrual, MILLIS_PER_DAY),
        ])
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    /// Run every task that has come due at the engine's current time. An
    /// overdue task runs once per tick, not once per missed period; the swap
    /// job's own settlement-day guard keeps a catch-up run from double
    /// charging.
    pub fn run_due(&mut self, engine: &mut Engine) -> Vec<TaskRun> {
        let now = engine.time();
        let mut runs = Vec::new();

        for task in &mut self.tasks {
            if task.next_due > now {
                continue;
            }
            while task.next_due <= now {
                task.next_due =
                    Timestamp::from_millis(task.next_due.as_millis() + task.period_ms);
            }

            let outcome = match task.kind {
                TaskKind::PriceRefresh => TaskOutcome::Refreshed {
                    positions: engine.refresh_all_prices(),
                },
                TaskKind::StopTakeCheck => TaskOutcome::Sweep(engine.sweep_stop_take()),
                TaskKind::PendingOrders => TaskOutcome::Sweep(engine.sweep_pending_orders()),
                TaskKind::MarginMonitor => TaskOutcome::Margin(engine.sweep_margin_monitor()),
                TaskKind::SwapAccrual => TaskOutcome::Swap(engine.run_swap_accrual()),
            };

            runs.push(TaskRun {
                kind: task.kind,
                at: now,
                outcome,
            });
        }

        runs
    }
}
