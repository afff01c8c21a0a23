//! The receiving side: a mirror that replays envelopes from one source.

use crate::error::{Result, SdkError};
use crate::transport::BatchEnvelope;
use icb_core::{apply, SourceId};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, trace};

type ChangeHook<T> = Box<dyn FnMut(&[T]) + Send>;

/// An independently owned copy of a source's collection, kept current by
/// replaying its envelopes in sequence.
///
/// Envelopes for other lists are ignored. A gap or replay in the sequence is
/// an error and leaves the mirror untouched.
pub struct MirrorReplica<T> {
    list_id: SourceId,
    items: Vec<T>,
    next_sequence: u64,
    on_change: Option<ChangeHook<T>>,
}

impl<T> MirrorReplica<T>
where
    T: Clone + DeserializeOwned,
{
    /// A mirror seeded with the source's contents before its first envelope.
    pub fn new(list_id: SourceId, seed: Vec<T>) -> Self {
        Self::starting_at(list_id, seed, 0)
    }

    /// A mirror seeded from a checkpoint taken just before envelope
    /// `next_sequence` was published.
    pub fn starting_at(list_id: SourceId, seed: Vec<T>, next_sequence: u64) -> Self {
        Self {
            list_id,
            items: seed,
            next_sequence,
            on_change: None,
        }
    }

    /// Call `hook` with the new contents after every non-empty batch.
    pub fn on_change(mut self, hook: impl FnMut(&[T]) + Send + 'static) -> Self {
        self.on_change = Some(Box::new(hook));
        self
    }

    pub fn list_id(&self) -> &SourceId {
        &self.list_id
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Replay one envelope. Returns `Ok(false)` if it belongs to another list.
    pub fn receive(&mut self, envelope: &BatchEnvelope) -> Result<bool> {
        if envelope.list_id != self.list_id {
            trace!(list = %envelope.list_id, mirror = %self.list_id, "envelope for another list ignored");
            return Ok(false);
        }
        if envelope.sequence != self.next_sequence {
            return Err(SdkError::OutOfOrder {
                list_id: self.list_id.clone(),
                expected: self.next_sequence,
                got: envelope.sequence,
            });
        }

        let batch = envelope.decode::<T>()?;
        let changed = !batch.is_empty();
        apply(&mut self.items, batch, envelope.addressing)?;
        self.next_sequence += 1;

        debug!(
            list = %self.list_id,
            sequence = envelope.sequence,
            len = self.items.len(),
            "batch replayed"
        );

        if changed {
            if let Some(hook) = self.on_change.as_mut() {
                hook(&self.items);
            }
        }
        Ok(true)
    }

    /// Replay envelopes until the inbox closes. Returns how many were applied.
    pub async fn run(&mut self, mut inbox: mpsc::Receiver<BatchEnvelope>) -> Result<u64> {
        let mut applied = 0;
        while let Some(envelope) = inbox.recv().await {
            if self.receive(&envelope)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Replay envelopes until the one numbered `sequence - 1` has been applied.
    ///
    /// Returns early with the current state if the inbox closes first.
    pub async fn catch_up(
        &mut self,
        inbox: &mut mpsc::Receiver<BatchEnvelope>,
        sequence: u64,
    ) -> Result<()> {
        while self.next_sequence < sequence {
            match inbox.recv().await {
                Some(envelope) => {
                    self.receive(&envelope)?;
                }
                None => break,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icb_core::{Addressing, ChangeBatch, ChangeItem};
    use std::sync::Arc;
    use parking_lot::Mutex;

    fn envelope(list: &str, sequence: u64, batch: &ChangeBatch<char>) -> BatchEnvelope {
        BatchEnvelope::encode(SourceId::new(list), sequence, Addressing::Original, batch).unwrap()
    }

    #[test]
    fn test_receive_in_sequence() {
        let mut mirror = MirrorReplica::new(SourceId::new("l"), vec!['a', 'b']);

        assert!(mirror.receive(&envelope("l", 0, &ChangeBatch::single_added('c', 2))).unwrap());
        assert!(mirror.receive(&envelope("l", 1, &ChangeBatch::single_removed('a', 0))).unwrap());

        assert_eq!(mirror.items(), &['b', 'c']);
        assert_eq!(mirror.next_sequence(), 2);
    }

    #[test]
    fn test_foreign_list_ignored() {
        let mut mirror = MirrorReplica::new(SourceId::new("l"), vec!['a']);

        let taken = mirror
            .receive(&envelope("other", 0, &ChangeBatch::single_added('z', 0)))
            .unwrap();

        assert!(!taken);
        assert_eq!(mirror.items(), &['a']);
        assert_eq!(mirror.next_sequence(), 0);
    }

    #[test]
    fn test_gap_rejected() {
        let mut mirror = MirrorReplica::new(SourceId::new("l"), vec!['a']);

        let err = mirror
            .receive(&envelope("l", 1, &ChangeBatch::single_added('z', 0)))
            .unwrap_err();

        assert!(matches!(err, SdkError::OutOfOrder { expected: 0, got: 1, .. }));
        assert_eq!(mirror.items(), &['a']);
    }

    #[test]
    fn test_contradictory_batch_rejected() {
        let mut mirror = MirrorReplica::new(SourceId::new("l"), vec!['a']);
        let bad = ChangeBatch::new(vec![], vec![ChangeItem::new('q', 4)]);

        let err = mirror.receive(&envelope("l", 0, &bad)).unwrap_err();

        assert!(matches!(err, SdkError::Apply(_)));
        assert_eq!(mirror.next_sequence(), 0);
    }

    #[test]
    fn test_empty_batch_does_not_fire_hook() {
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let mut mirror = MirrorReplica::new(SourceId::new("l"), vec!['a'])
            .on_change(move |_| *counter.lock() += 1);

        mirror.receive(&envelope("l", 0, &ChangeBatch::empty())).unwrap();
        assert_eq!(*fired.lock(), 0);
        assert_eq!(mirror.next_sequence(), 1);

        mirror.receive(&envelope("l", 1, &ChangeBatch::single_added('b', 1))).unwrap();
        assert_eq!(*fired.lock(), 1);
    }

    #[tokio::test]
    async fn test_run_until_closed() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(envelope("l", 0, &ChangeBatch::single_added('x', 0))).await.unwrap();
        tx.send(envelope("other", 0, &ChangeBatch::single_added('y', 0))).await.unwrap();
        tx.send(envelope("l", 1, &ChangeBatch::single_added('z', 1))).await.unwrap();
        drop(tx);

        let mut mirror = MirrorReplica::new(SourceId::new("l"), Vec::<char>::new());
        let applied = mirror.run(rx).await.unwrap();

        assert_eq!(applied, 2);
        assert_eq!(mirror.items(), &['x', 'z']);
    }
}
