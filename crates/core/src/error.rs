//! Domain error model shared by every aggregate.

use core::fmt::Display;

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic business failure raised while handling a command.
///
/// Each variant maps to one HTTP status at the API edge; storage and
/// transport failures never appear here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input or a value outside policy (bad quantity, discount
    /// above the seller's limit).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The aggregate is in the wrong state for the command (closed session,
    /// transfer already shipped, reservation expired).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The stream does not exist or belongs to another account.
    #[error("not found")]
    NotFound,

    /// Duplicate creation or a competing state (session already open).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The acting user may not perform this change (e.g. removing an owner).
    #[error("unauthorized")]
    Unauthorized,

    /// A stock movement would take more than the branch has available.
    #[error("insufficient stock: {0}")]
    InsufficientStock(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient_stock(msg: impl Into<String>) -> Self {
        Self::InsufficientStock(msg.into())
    }

    /// Prefix the message with what it concerns (a SKU, a line number).
    /// Variants without a message are returned unchanged.
    pub fn in_context(self, context: impl Display) -> Self {
        match self {
            Self::Validation(msg) => Self::Validation(format!("{context}: {msg}")),
            Self::InvariantViolation(msg) => Self::InvariantViolation(format!("{context}: {msg}")),
            Self::InvalidId(msg) => Self::InvalidId(format!("{context}: {msg}")),
            Self::Conflict(msg) => Self::Conflict(format!("{context}: {msg}")),
            Self::InsufficientStock(msg) => Self::InsufficientStock(format!("{context}: {msg}")),
            other @ (Self::NotFound | Self::Unauthorized) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message_but_keeps_variant() {
        let err = DomainError::insufficient_stock("requested 3, available 1").in_context("COLA-330");
        assert_eq!(err, DomainError::InsufficientStock("COLA-330: requested 3, available 1".to_string()));
        assert_eq!(DomainError::NotFound.in_context("COLA-330"), DomainError::NotFound);
    }
}
