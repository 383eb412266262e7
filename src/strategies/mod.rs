//! Execution strategies
//!
//! Both strategies take their [`OrderGateway`](crate::gateway::OrderGateway)
//! at construction and a cancellation token at run time.

pub mod grid;
pub mod twap;

pub use grid::{GridEngine, GridParams, GridPlan, GridReport};
pub use twap::{TwapAbort, TwapOutcome, TwapParams, TwapPlan, TwapReport, TwapScheduler};
