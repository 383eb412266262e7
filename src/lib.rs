//! Execution Strategies
//!
//! Algorithmic order execution for Binance USD-M futures: a TWAP scheduler
//! that slices a large order into timed market chunks, and a grid engine that
//! keeps a ladder of limit orders re-armed as they fill. Both talk to the
//! exchange through the [`gateway::OrderGateway`] trait.

pub mod config;
pub mod error;
pub mod gateway;
pub mod journal;
pub mod strategies;
pub mod types;
pub mod validation;

pub use config::Config;
pub use error::{ConfigurationError, GatewayError, ValidationError};
pub use types::*;
