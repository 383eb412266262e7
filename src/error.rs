//! Error taxonomy for the execution strategies
//!
//! - [`ConfigurationError`]: plan parameters that make a strategy undefined.
//!   Raised before any network activity.
//! - [`GatewayError`]: failures reported by an order gateway, classified by
//!   whether repeating the identical request can succeed.
//! - [`ValidationError`]: malformed operator input rejected by the CLI layer.

use thiserror::Error;

use crate::Money;

/// Strategy parameters that cannot produce a valid plan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("grid_count must be at least 2 to define a spacing, got {0}")]
    GridTooSmall(usize),

    #[error("lower_bound ({lower}) must be below upper_bound ({upper})")]
    InvertedBounds { lower: Money, upper: Money },

    #[error(
        "{grid_count} levels between {lower} and {upper} are closer than the price tick 1e-{precision}"
    )]
    SpacingBelowTick {
        lower: Money,
        upper: Money,
        grid_count: usize,
        precision: u32,
    },

    #[error("lower_bound ({lower}) rounds to zero at the price tick 1e-{precision}")]
    LowerBoundBelowTick { lower: Money, precision: u32 },

    #[error("chunk_count must be at least 1")]
    NoChunks,

    #[error(
        "total quantity {total} split into {chunks} chunks is below the quantity step 1e-{precision}; \
         use at most {max_chunks} chunks"
    )]
    ChunkBelowStep {
        total: Money,
        chunks: u32,
        precision: u32,
        /// Largest chunk count that keeps every chunk at or above one step
        max_chunks: u64,
    },
}

/// Failure reported by an [`OrderGateway`](crate::gateway::OrderGateway)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Timeouts, disconnects, rate limits. The same request may succeed later.
    #[error("transient gateway error: {0}")]
    Transient(String),

    /// The exchange refused the request; repeating it unchanged will not help.
    #[error("rejected by exchange: {0}")]
    Rejected(String),

    /// The exchange does not know the referenced order.
    #[error("order not found: {0}")]
    NotFound(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }

    /// Short label used in structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Transient(_) => "transient",
            GatewayError::Rejected(_) => "rejected",
            GatewayError::NotFound(_) => "not_found",
        }
    }
}

/// Operator input rejected before a strategy is constructed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(
        "invalid symbol '{0}': must be uppercase alphanumeric, at least 6 characters, \
         and end with USDT/BUSD/USD/BTC/ETH"
    )]
    Symbol(String),

    #[error("invalid side '{0}': must be BUY or SELL")]
    Side(String),

    #[error("invalid {field} '{value}': must be a positive number")]
    NotPositive { field: &'static str, value: String },

    #[error("invalid {field}: must be at least {min}, got {value}")]
    BelowMinimum {
        field: &'static str,
        min: u64,
        value: u64,
    },

    #[error("invalid bounds: upper_bound ({upper}) must be greater than lower_bound ({lower})")]
    Bounds { lower: Money, upper: Money },
}
