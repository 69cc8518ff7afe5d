//! Error taxonomy for the capital engine.
//!
//! Input validation failures fail fast and are never retried; service
//! failures are recovered from local caches where possible; constraint
//! violations are surfaced so orchestrating callers can fall back.

use thiserror::Error;

/// Errors that can occur across the capital engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller provided an invalid input (negative AUM, zero-lot lock, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An external data provider could not be reached and no cache exists.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Weight bounds cannot be satisfied for the requested allocation.
    #[error("weight constraint violation: {0}")]
    WeightConstraintViolation(String),

    /// No price could be obtained for an asset.
    #[error("price unavailable for {symbol}")]
    PriceUnavailable {
        /// Symbol the price lookup failed for.
        symbol: String,
    },

    /// Lock attempted outside the asset's trading windows.
    #[error("trading window closed for {symbol} at {local_time}")]
    LockWindowClosed {
        /// Symbol the lock targeted.
        symbol: String,
        /// Local wall-clock time of the attempt.
        local_time: String,
    },

    /// Execution engine rejected an order.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// IO error from a history store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Creates an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Creates a service-unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Creates a weight-constraint violation.
    pub fn weight_constraint(message: impl Into<String>) -> Self {
        Self::WeightConstraintViolation(message.into())
    }

    /// Creates a price-unavailable error.
    pub fn price_unavailable(symbol: impl Into<String>) -> Self {
        Self::PriceUnavailable {
            symbol: symbol.into(),
        }
    }

    /// Creates an order-rejected error.
    pub fn order_rejected(message: impl Into<String>) -> Self {
        Self::OrderRejected(message.into())
    }

    /// Returns true if a later retry of the same operation could succeed.
    ///
    /// Input validation and constraint violations are terminal; provider
    /// outages and missing prices are transient.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable(_) | Self::PriceUnavailable { .. } | Self::Io(_)
        )
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
