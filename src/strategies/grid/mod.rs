//! Grid Trading Strategy
//!
//! Keeps a ladder of resting limit orders across a fixed price range and
//! re-arms each level after it fills.
//!
//! ## How it works:
//! 1. `grid_count` prices from `lower_bound` to `upper_bound`, evenly spaced
//! 2. Levels below the reference price rest as BUY, the rest as SELL
//! 3. Every monitor interval, each resting order's status is queried
//! 4. A filled BUY is mirrored by a SELL one rung up; a filled SELL by a BUY
//!    one rung down, with the same quantity
//! 5. The loop runs until cancelled; open orders stay on the exchange unless
//!    the operator asks for them to be cancelled
//!
//! ## State machine per level:
//! ```text
//! PENDING -> RESTING -> FILLED -> REPLACED -> RESTING -> ...
//!                   \-> IDLE (cancelled externally, unknown, off the ladder)
//! ```

mod engine;
mod plan;

pub use engine::{GridEngine, GridReport};
pub use plan::{
    GridAction, GridLevel, GridParams, GridPlan, GridStats, LevelState, Observation,
};
