//! Action scheduling for rekon.
//!
//! Turns the difference between live orders and a desired order book into
//! an ordered list of create/cancel actions for one destination:
//! - `SimpleScheduler`: cancel mismatching buckets, weave creates between
//!   cancels so funds are freed before they are spent
//! - `LadderScheduler`: prioritized cancels of crossing and out-of-bounds
//!   orders, then per-rung rebalancing of an aggregated ladder
//!
//! # Architecture
//!
//! ```text
//! OpenOrders snapshot ─┐
//!                      ├─ Scheduler.schedule() ─→ Vec<Action> ─→ ActionExecutor.push()
//! desired OrderBook ───┘
//! ```
//!
//! Schedulers never mutate the open orders they read.

pub mod action;
pub mod error;
pub mod ladder;
pub mod simple;

pub use action::{sort_by_priority, Action, ActionKind, DestinationId, Target};
pub use error::{Result, SchedulerError};
pub use ladder::{
    crossing_priority, out_of_bounds_priority, rung_priority, LadderParams, LadderScheduler,
    CROSSING_PRIORITY_BASE, OUT_OF_BOUNDS_PRIORITY_BASE, RUNG_PRIORITY_BASE,
};
pub use simple::{weave, SimpleScheduler};
