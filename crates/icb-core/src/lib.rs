//! # icb-core
//!
//! Indexed change batches for the Sardonyx mirror store.
//!
//! An authoritative [`ChangeSource`] owns an ordered collection and emits a
//! [`ChangeBatch`] after every successful mutation. Any number of mirrors
//! replay those batches with [`applier::apply`] and end up with exactly the
//! source's order, without the whole collection ever being copied.
//!
//! ## Example
//!
//! ```rust
//! use icb_core::{apply, Addressing, ChangeSource, ListEvent, SourceId};
//! use std::sync::{Arc, Mutex};
//!
//! let mut source = ChangeSource::new(SourceId::new("tracks"), vec!["intro", "verse"]);
//! let mirror = Arc::new(Mutex::new(source.snapshot()));
//!
//! let sink = Arc::clone(&mirror);
//! source.subscribe(move |event| {
//!     if let ListEvent::ItemsChanged(batch) = event {
//!         let mut mirror = sink.lock().unwrap();
//!         apply(&mut *mirror, batch.clone(), Addressing::Original).unwrap();
//!     }
//! });
//!
//! source.insert("chorus", 1).unwrap();
//! source.remove(&"intro").unwrap();
//!
//! assert_eq!(*mirror.lock().unwrap(), source.snapshot());
//! ```

pub mod applier;
pub mod change;
pub mod error;
pub mod source;

pub use applier::{apply, apply_mapped};
pub use change::{Addressing, ChangeBatch, ChangeItem};
pub use error::{ApplyError, ListError, Result};
pub use source::{ChangeSource, ListEvent, SourceId, SubscriptionId};
