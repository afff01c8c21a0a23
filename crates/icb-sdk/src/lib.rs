//! Sardonyx SDK - publishing and mirroring indexed change batches
//!
//! This SDK connects an authoritative [`icb_core::ChangeSource`] to any number
//! of [`MirrorReplica`]s through a [`BatchTransport`].
//!
//! # Quick Start
//!
//! ```rust
//! use icb_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = SyncConfig::default();
//! let host = Arc::new(LoopbackTransport::new("host", &config));
//! let viewer = LoopbackTransport::new("viewer", &config);
//! host.connect_to(&viewer);
//!
//! let source = ChangeSource::new(SourceId::new("playlist"), vec!["intro".to_string()]);
//! let mut mirror = MirrorReplica::new(source.id().clone(), source.snapshot());
//! let publisher = BatchPublisher::new(source, Arc::clone(&host), &config);
//!
//! publisher.append("outro".to_string()).await.unwrap();
//!
//! let mut inbox = viewer.subscribe().unwrap();
//! mirror.catch_up(&mut inbox, publisher.next_sequence()).await.unwrap();
//! assert_eq!(mirror.snapshot(), publisher.snapshot());
//! # });
//! ```
//!
//! # Architecture
//!
//! - [`mutex`] - Scoped acquisition over a counting permit pool
//! - [`transport`] - Envelopes, the transport trait and the loopback transport
//! - [`sync`] - Sync configuration and the batch publisher
//! - [`replica`] - Mirrors that replay envelopes in sequence
//! - [`error`] - Error types

pub mod error;
pub mod mutex;
pub mod replica;
pub mod sync;
pub mod transport;

// Re-exports for convenience
pub use error::{Result, SdkError};
pub use mutex::{ScopedGuard, ScopedMutex};
pub use replica::MirrorReplica;
pub use sync::{BatchPublisher, SyncConfig, SyncConfigBuilder};
pub use transport::{
    create_network, weave, BatchEnvelope, BatchTransport, LoopbackTransport, TransportError,
};

// Re-export commonly used types from icb-core
pub use icb_core::{
    Addressing, ApplyError, ChangeBatch, ChangeItem, ChangeSource, ListError, ListEvent, SourceId,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::SdkError;
    pub use crate::mutex::ScopedMutex;
    pub use crate::replica::MirrorReplica;
    pub use crate::sync::{BatchPublisher, SyncConfig};
    pub use crate::transport::{BatchTransport, LoopbackTransport};
    pub use icb_core::{Addressing, ChangeBatch, ChangeSource, ListEvent, SourceId};
}
