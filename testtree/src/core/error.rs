//! Errors surfaced by the in-memory result tree.

use thiserror::Error;

/// Failures the tree reports to its callers.
///
/// None of these are fatal: a caller holding a stale id is expected to re-fetch
/// the current tree rather than retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node '{0}' not found")]
    NotFound(String),

    #[error("node '{0}' already exists")]
    DuplicateId(String),

    #[error("node '{0}' is not a suite")]
    NotASuite(String),

    #[error("invalid status precedence: {0}")]
    InvalidPrecedence(String),
}
