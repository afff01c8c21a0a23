//! Publishing a change source to remote mirrors.

use crate::error::Result;
use crate::mutex::ScopedMutex;
use crate::transport::{BatchEnvelope, BatchTransport};
use icb_core::{Addressing, ChangeBatch, ChangeSource, ListEvent, SourceId, SubscriptionId};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Configuration for publishing and delivery.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Capacity of each endpoint's inbox.
    pub channel_capacity: usize,
    /// Listener inboxes written to at once while one envelope is sent.
    pub delivery_permits: usize,
    /// Delay injected before each delivery (in milliseconds).
    pub simulated_latency_ms: u64,
    /// Addressing convention stamped on published envelopes.
    pub addressing: Addressing,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            delivery_permits: 1,
            simulated_latency_ms: 0,
            addressing: Addressing::Original,
        }
    }
}

/// Builder for sync configuration.
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn delivery_permits(mut self, permits: usize) -> Self {
        self.config.delivery_permits = permits;
        self
    }

    pub fn simulated_latency(mut self, ms: u64) -> Self {
        self.config.simulated_latency_ms = ms;
        self
    }

    pub fn addressing(mut self, addressing: Addressing) -> Self {
        self.config.addressing = addressing;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

type Observer<T> = Box<dyn FnMut(&ListEvent<T>) + Send>;

struct Observers<T> {
    list: Vec<(SubscriptionId, Observer<T>)>,
    next_id: u64,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            list: Vec::new(),
            next_id: 0,
        }
    }
}

/// Owns a [`ChangeSource`] and ships each emitted batch over a transport.
///
/// Mutations go through a [`ScopedMutex`] that is held from the mutation until
/// its envelope has been handed to the transport. Concurrent callers sharing a
/// publisher therefore produce envelopes in exactly the order the source
/// applied their mutations, and never interleave.
///
/// Observers registered here run after the source lock is released, in
/// registration order, so they may read the publisher. They must not call
/// `subscribe` or `unsubscribe` from inside the callback.
///
/// A transport failure is reported after the source has already changed; the
/// sequence number of the lost envelope is not reused.
pub struct BatchPublisher<T, Tr: BatchTransport> {
    source: Mutex<ChangeSource<T>>,
    pending: Arc<Mutex<Vec<ChangeBatch<T>>>>,
    events: Arc<Mutex<Vec<ListEvent<T>>>>,
    observers: Mutex<Observers<T>>,
    transport: Arc<Tr>,
    lock: ScopedMutex,
    sequence: AtomicU64,
    addressing: Addressing,
}

impl<T, Tr> BatchPublisher<T, Tr>
where
    T: Clone + Serialize + Send + 'static,
    Tr: BatchTransport,
{
    pub fn new(mut source: ChangeSource<T>, transport: Arc<Tr>, config: &SyncConfig) -> Self {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let batch_sink = Arc::clone(&pending);
        let event_sink = Arc::clone(&events);
        source.subscribe(move |event| {
            if let ListEvent::ItemsChanged(batch) = event {
                batch_sink.lock().push(batch.clone());
            }
            event_sink.lock().push(event.clone());
        });

        Self {
            source: Mutex::new(source),
            pending,
            events,
            observers: Mutex::new(Observers::default()),
            transport,
            lock: ScopedMutex::exclusive(),
            sequence: AtomicU64::new(0),
            addressing: config.addressing,
        }
    }

    pub fn list_id(&self) -> SourceId {
        self.source.lock().id().clone()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.source.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.source.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.lock().is_empty()
    }

    /// Sequence number the next envelope will carry.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn transport(&self) -> &Arc<Tr> {
        &self.transport
    }

    /// Snapshot and next sequence taken under the publish lock, for seeding a
    /// mirror that joins late.
    pub async fn checkpoint(&self) -> Result<(Vec<T>, u64)> {
        let _guard = self.lock.acquire().await?;
        Ok((self.snapshot(), self.next_sequence()))
    }

    /// Observe local events (selection, editing flag, add requests, changes).
    pub fn subscribe(&self, observer: impl FnMut(&ListEvent<T>) + Send + 'static) -> SubscriptionId {
        let mut observers = self.observers.lock();
        let id = SubscriptionId::new(observers.next_id);
        observers.next_id += 1;
        observers.list.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.list.len();
        observers.list.retain(|(sub, _)| *sub != id);
        observers.list.len() != before
    }

    pub async fn insert(&self, item: T, index: usize) -> Result<()> {
        self.mutate(|source| source.insert(item, index)).await
    }

    pub async fn append(&self, item: T) -> Result<()> {
        self.mutate(|source| source.append(item)).await
    }

    pub async fn remove_at(&self, index: usize) -> Result<T> {
        self.mutate(|source| source.remove_at(index)).await
    }

    pub fn set_editing_enabled(&self, value: bool) {
        self.source.lock().set_editing_enabled(value);
        self.dispatch();
    }

    pub fn notify_selected(&self, item: T) {
        self.source.lock().notify_selected(item);
        self.dispatch();
    }

    pub fn request_new_item(&self) {
        self.source.lock().request_new_item();
        self.dispatch();
    }

    /// Hand queued events to observers. The observer lock is taken before the
    /// queue is drained so concurrent callers cannot reorder events.
    fn dispatch(&self) {
        let mut observers = self.observers.lock();
        let events: Vec<ListEvent<T>> = self.events.lock().drain(..).collect();
        for event in &events {
            for (_, observer) in observers.list.iter_mut() {
                observer(event);
            }
        }
    }

    async fn mutate<R>(
        &self,
        op: impl FnOnce(&mut ChangeSource<T>) -> icb_core::Result<R>,
    ) -> Result<R> {
        let _guard = self.lock.acquire().await?;

        let (outcome, list_id, batches) = {
            let mut source = self.source.lock();
            let outcome = op(&mut source);
            let batches: Vec<ChangeBatch<T>> = self.pending.lock().drain(..).collect();
            (outcome, source.id().clone(), batches)
        };
        self.dispatch();
        let value = outcome?;

        for batch in &batches {
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
            let envelope = BatchEnvelope::encode(list_id.clone(), sequence, self.addressing, batch)?;
            self.transport.send(envelope).await?;
            debug!(list = %list_id, sequence, "batch published");
        }

        Ok(value)
    }
}

impl<T, Tr> BatchPublisher<T, Tr>
where
    T: Clone + PartialEq + Serialize + Send + 'static,
    Tr: BatchTransport,
{
    pub async fn remove(&self, item: &T) -> Result<T> {
        self.mutate(|source| source.remove(item)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;

    #[test]
    fn test_sync_config_builder() {
        let config = SyncConfigBuilder::new()
            .channel_capacity(16)
            .delivery_permits(2)
            .simulated_latency(5)
            .addressing(Addressing::Live)
            .build();

        assert_eq!(config.channel_capacity, 16);
        assert_eq!(config.delivery_permits, 2);
        assert_eq!(config.simulated_latency_ms, 5);
        assert_eq!(config.addressing, Addressing::Live);
    }

    #[tokio::test]
    async fn test_publisher_numbers_envelopes() {
        let config = SyncConfig::default();
        let host = Arc::new(LoopbackTransport::new("host", &config));
        let client = LoopbackTransport::new("client", &config);
        host.connect_to(&client);
        let mut inbox = client.subscribe().unwrap();

        let publisher = BatchPublisher::new(
            ChangeSource::new(SourceId::new("list"), vec!['a']),
            Arc::clone(&host),
            &config,
        );

        publisher.append('b').await.unwrap();
        publisher.remove_at(0).await.unwrap();

        let first = inbox.recv().await.unwrap();
        let second = inbox.recv().await.unwrap();
        assert_eq!((first.sequence, second.sequence), (0, 1));
        assert_eq!(first.decode::<char>().unwrap(), ChangeBatch::single_added('b', 1));
        assert_eq!(second.decode::<char>().unwrap(), ChangeBatch::single_removed('a', 0));
        assert_eq!(publisher.next_sequence(), 2);
    }

    #[tokio::test]
    async fn test_failed_mutation_publishes_nothing() {
        let config = SyncConfig::default();
        let host = Arc::new(LoopbackTransport::new("host", &config));
        let client = LoopbackTransport::new("client", &config);
        host.connect_to(&client);
        let mut inbox = client.subscribe().unwrap();

        let publisher = BatchPublisher::new(
            ChangeSource::new(SourceId::new("list"), vec![1u8]),
            host,
            &config,
        );

        assert!(publisher.insert(9, 5).await.is_err());
        assert!(publisher.remove(&7).await.is_err());
        assert_eq!(publisher.next_sequence(), 0);
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_local_notifications_are_not_published() {
        let config = SyncConfig::default();
        let host = Arc::new(LoopbackTransport::new("host", &config));
        let client = LoopbackTransport::new("client", &config);
        host.connect_to(&client);
        let mut inbox = client.subscribe().unwrap();

        let publisher = BatchPublisher::new(ChangeSource::<u8>::empty(), host, &config);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        publisher.subscribe(move |event| sink.lock().push(event.clone()));

        publisher.set_editing_enabled(true);
        publisher.notify_selected(3);
        publisher.request_new_item();

        assert_eq!(seen.lock().len(), 3);
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publisher_without_listeners_reports_success() {
        let config = SyncConfig::default();
        let host = Arc::new(LoopbackTransport::new("host", &config));
        let publisher = BatchPublisher::new(
            ChangeSource::new(SourceId::new("list"), vec![1u8]),
            host,
            &config,
        );

        publisher.append(2).await.unwrap();
        assert_eq!(publisher.remove_at(0).await.unwrap(), 1);

        assert_eq!(publisher.snapshot(), vec![2]);
        assert_eq!(publisher.next_sequence(), 2);
    }

    #[tokio::test]
    async fn test_observer_may_read_publisher() {
        let config = SyncConfig::default();
        let host = Arc::new(LoopbackTransport::new("host", &config));
        let publisher = Arc::new(BatchPublisher::new(
            ChangeSource::new(SourceId::new("list"), vec![1u8, 2]),
            host,
            &config,
        ));

        let lengths = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lengths);
        let reader = Arc::clone(&publisher);
        publisher.subscribe(move |event| match event {
            ListEvent::ItemSelected(_) | ListEvent::ItemsChanged(_) => {
                sink.lock().push(reader.len());
            }
            _ => {}
        });

        let selecting = Arc::clone(&publisher);
        let selected = tokio::task::spawn_blocking(move || selecting.notify_selected(1));
        tokio::time::timeout(std::time::Duration::from_secs(3), selected)
            .await
            .expect("observer blocked on the source lock")
            .unwrap();

        publisher.append(3).await.unwrap();

        assert_eq!(*lengths.lock(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_observers_run_in_registration_order() {
        let config = SyncConfig::default();
        let host = Arc::new(LoopbackTransport::new("host", &config));
        let publisher = BatchPublisher::new(ChangeSource::<u8>::empty(), host, &config);

        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);
        let id = publisher.subscribe(move |_| first.lock().push("first"));
        publisher.subscribe(move |_| second.lock().push("second"));

        publisher.request_new_item();
        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        publisher.request_new_item();

        assert_eq!(*order.lock(), vec!["first", "second", "second"]);
    }
}
