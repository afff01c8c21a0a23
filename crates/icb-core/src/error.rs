//! Error types for list mutation and batch reconciliation.

use thiserror::Error;

/// Errors raised by [`ChangeSource`](crate::source::ChangeSource) mutations.
///
/// A failed mutation never touches the collection and never emits a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    #[error("Invalid index: {index} (length: {length})")]
    IndexOutOfRange { index: usize, length: usize },

    #[error("Item not found in collection")]
    NotFound,
}

/// Contradictions detected in a batch before it is replayed against a mirror.
///
/// These are producer bugs. The mirror is left untouched when one is reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("Removal index {index} is outside the mirror (length at that step: {length})")]
    RemovalOutOfRange { index: usize, length: usize },

    #[error("Removal index {index} appears more than once in the batch")]
    DuplicateRemoval { index: usize },
}

pub type Result<T> = std::result::Result<T, ListError>;
