//! Transport abstractions for shipping change batches between processes.
//!
//! A batch does not say which addressing convention produced it, so every
//! batch travels inside a [`BatchEnvelope`] that does.

use crate::error::{Result, SdkError};
use crate::mutex::ScopedMutex;
use crate::sync::SyncConfig;
use async_trait::async_trait;
use futures::future::join_all;
use icb_core::{Addressing, ChangeBatch, SourceId};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// A serialized batch plus everything a receiver needs to replay it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEnvelope {
    pub list_id: SourceId,
    /// Position of this batch in the source's emission order, from zero.
    pub sequence: u64,
    pub addressing: Addressing,
    /// JSON encoding of the `ChangeBatch`.
    pub payload: Vec<u8>,
}

impl BatchEnvelope {
    pub fn encode<T: Serialize>(
        list_id: SourceId,
        sequence: u64,
        addressing: Addressing,
        batch: &ChangeBatch<T>,
    ) -> Result<Self> {
        Ok(Self {
            list_id,
            sequence,
            addressing,
            payload: serde_json::to_vec(batch)?,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<ChangeBatch<T>> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Transport error type.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    #[error("Send failed: {0}")]
    SendFailed(String),
}

impl From<TransportError> for SdkError {
    fn from(err: TransportError) -> Self {
        SdkError::Transport(err.to_string())
    }
}

/// Abstract batch transport.
#[async_trait]
pub trait BatchTransport: Send + Sync + 'static {
    /// Deliver an envelope to every connected listener.
    ///
    /// Having no listeners is not an error; the envelope is simply dropped.
    async fn send(&self, envelope: BatchEnvelope) -> std::result::Result<(), TransportError>;

    /// Take the receiving end for envelopes sent to this endpoint.
    ///
    /// Only the first call gets the receiver.
    fn subscribe(&self) -> Option<mpsc::Receiver<BatchEnvelope>>;

    /// Number of endpoints this one delivers to.
    fn listener_count(&self) -> usize;
}

type Listener = (String, mpsc::Sender<BatchEnvelope>);

/// In-process transport that loops every envelope into the inboxes of the
/// endpoints it has been woven with.
///
/// Sends are serialized with an exclusive [`ScopedMutex`], so one envelope
/// reaches all listeners before the next one starts. Within a send, at most
/// `delivery_permits` listeners are written to at once.
pub struct LoopbackTransport {
    id: String,
    send_lock: ScopedMutex,
    delivery_slots: ScopedMutex,
    latency: Option<Duration>,
    inbox_tx: mpsc::Sender<BatchEnvelope>,
    inbox_rx: Mutex<Option<mpsc::Receiver<BatchEnvelope>>>,
    listeners: RwLock<Vec<Listener>>,
}

impl LoopbackTransport {
    pub fn new(id: impl Into<String>, config: &SyncConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let latency = (config.simulated_latency_ms > 0)
            .then(|| Duration::from_millis(config.simulated_latency_ms));

        Self {
            id: id.into(),
            send_lock: ScopedMutex::exclusive(),
            delivery_slots: ScopedMutex::new(config.delivery_permits),
            latency,
            inbox_tx: tx,
            inbox_rx: Mutex::new(Some(rx)),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deliver this endpoint's envelopes to `other` as well.
    pub fn connect_to(&self, other: &LoopbackTransport) {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|(id, _)| id == &other.id) {
            return;
        }
        listeners.push((other.id.clone(), other.inbox_tx.clone()));
    }

    /// Stop delivering to the endpoint with the given id.
    pub fn disconnect(&self, other_id: &str) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(id, _)| id != other_id);
        listeners.len() != before
    }
}

#[async_trait]
impl BatchTransport for LoopbackTransport {
    async fn send(&self, envelope: BatchEnvelope) -> std::result::Result<(), TransportError> {
        let _guard = self
            .send_lock
            .acquire()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let listeners: Vec<Listener> = self.listeners.read().clone();
        if listeners.is_empty() {
            trace!(from = %self.id, sequence = envelope.sequence, "no listeners, envelope dropped");
            return Ok(());
        }

        // Every listener has the envelope before the send lock is released.
        let latency = self.latency;
        let deliveries = listeners.into_iter().map(|(listener_id, tx)| {
            let envelope = envelope.clone();
            let slots = self.delivery_slots.clone();
            async move {
                let Ok(_slot) = slots.acquire().await else {
                    return (listener_id, false);
                };
                if let Some(latency) = latency {
                    tokio::time::sleep(latency).await;
                }
                let delivered = tx.send(envelope).await.is_ok();
                (listener_id, delivered)
            }
        });

        for (listener_id, delivered) in join_all(deliveries).await {
            if delivered {
                debug!(
                    from = %self.id,
                    to = %listener_id,
                    list = %envelope.list_id,
                    sequence = envelope.sequence,
                    "envelope delivered"
                );
            } else {
                warn!(from = %self.id, to = %listener_id, "listener inbox closed, envelope dropped");
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> Option<mpsc::Receiver<BatchEnvelope>> {
        self.inbox_rx.lock().take()
    }

    fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

/// Connect every endpoint to every other one.
pub fn weave(endpoints: &[&LoopbackTransport]) {
    for (i, from) in endpoints.iter().enumerate() {
        for (j, to) in endpoints.iter().enumerate() {
            if i != j {
                from.connect_to(to);
            }
        }
    }
}

/// Create `count` loopback endpoints named `node-0..`, all woven together.
pub fn create_network(count: usize, config: &SyncConfig) -> Vec<LoopbackTransport> {
    let endpoints: Vec<_> = (0..count)
        .map(|i| LoopbackTransport::new(format!("node-{}", i), config))
        .collect();

    let refs: Vec<&LoopbackTransport> = endpoints.iter().collect();
    weave(&refs);

    endpoints
}
