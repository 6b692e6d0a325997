use thiserror::Error;

/// Errors surfaced by the store port.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional predicate did not hold and the write was rejected.
    ///
    /// Implementations must reserve this variant for predicate failures so
    /// callers can branch on it structurally; reporting one as `Backend`
    /// (or vice versa) breaks the engine's conflict classification.
    #[error("condition failed on table {table}")]
    ConditionFailed { table: String },

    /// Any other backend fault: I/O, throttling, driver errors, malformed
    /// requests.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True when the error is a rejected conditional predicate.
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, Self::ConditionFailed { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
