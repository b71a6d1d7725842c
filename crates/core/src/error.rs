//! Domain error model.

use thiserror::Error;

use crate::id::ItemKey;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// stock invariants). Storage failures belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (non-positive quantity, negative price, blank key).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The item has never been acquired.
    #[error("unknown item: {0}")]
    UnknownItem(ItemKey),

    /// A disposal asked for more units than are on hand.
    #[error("insufficient stock for {item}: requested {requested}, available {available}")]
    InsufficientStock {
        item: ItemKey,
        requested: u64,
        available: u64,
    },

    /// An adjustment would drive stock below zero and the ledger rejects underflow.
    #[error("adjustment underflow for {item}: delta {requested}, available {available}")]
    Underflow {
        item: ItemKey,
        requested: i64,
        available: u64,
    },
}

impl DomainError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unknown_item(item: &ItemKey) -> Self {
        Self::UnknownItem(item.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_item() {
        let item = ItemKey::new("widget").unwrap();
        let err = DomainError::InsufficientStock {
            item: item.clone(),
            requested: 5,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock for widget: requested 5, available 2"
        );
        assert_eq!(DomainError::unknown_item(&item).to_string(), "unknown item: widget");
    }
}
