pub mod config;
pub mod error;
pub mod inputs;
pub mod signal;
pub mod types;
pub mod valuation;

#[cfg(feature = "monte_carlo")]
pub mod batch;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

pub use error::ValuationError;
pub use types::*;

/// Standard result type for all valuation operations
pub type ValuationResult<T> = Result<T, ValuationError>;
