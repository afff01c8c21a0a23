//! Error types for the Sardonyx SDK.

use icb_core::{ApplyError, ListError, SourceId};
use thiserror::Error;

/// Error type for SDK operations.
#[derive(Error, Debug)]
pub enum SdkError {
    /// A mutation was rejected by the change source.
    #[error("List error: {0}")]
    List(#[from] ListError),

    /// A received batch contradicts the mirror it was applied to.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    /// A mirror saw a gap or a replay in the envelope sequence.
    #[error("Out of order batch for {list_id}: expected sequence {expected}, got {got}")]
    OutOfOrder {
        list_id: SourceId,
        expected: u64,
        got: u64,
    },

    /// The scoped mutex was closed while waiting for a permit.
    #[error("Scoped mutex closed")]
    Closed,
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
