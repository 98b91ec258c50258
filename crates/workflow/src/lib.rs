//! The runner: starts scheduled macros and goals without manual triggering.
//!
//! A periodic timer calls [`Runner::tick`], which enqueues every due item
//! through the execution engine. Operators can call `tick` directly; it runs
//! the same logic out of band. Includes a zero-dependency cron expression
//! parser supporting standard 5-field expressions:
//! `minute hour day-of-month month day-of-week`.

pub mod cron;
pub mod runner;

pub use cron::CronExpr;
pub use runner::{Runner, StartedItem, TickFailure, TickReport};
