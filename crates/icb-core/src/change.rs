//! Change carriers: a single indexed item and the batch that groups them.
//!
//! A [`ChangeBatch`] is not self-describing. The [`Addressing`] convention
//! used by the producer has to travel next to it, otherwise a receiver cannot
//! tell what the indices point at.

use serde::{Deserialize, Serialize};

/// One element together with the position it occupies.
///
/// What `index` refers to depends on the [`Addressing`] of the enclosing batch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeItem<T> {
    pub payload: T,
    pub index: usize,
}

impl<T> ChangeItem<T> {
    pub fn new(payload: T, index: usize) -> Self {
        Self { payload, index }
    }

    /// Convert the payload, keeping the index.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ChangeItem<U> {
        ChangeItem {
            payload: f(self.payload),
            index: self.index,
        }
    }
}

/// How the indices in a batch are to be read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Addressing {
    /// Removals are positions in the list as they are applied one by one, in
    /// the given order. Additions are positions after every removal ran.
    Live,
    /// Every index, added or removed, is a position in the untouched pre-batch
    /// list.
    #[default]
    Original,
}

impl std::fmt::Display for Addressing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Addressing::Live => write!(f, "live"),
            Addressing::Original => write!(f, "original"),
        }
    }
}

/// An atomic description of one transition of an ordered collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch<T> {
    pub added: Vec<ChangeItem<T>>,
    pub removed: Vec<ChangeItem<T>>,
}

impl<T> ChangeBatch<T> {
    pub fn new(added: Vec<ChangeItem<T>>, removed: Vec<ChangeItem<T>>) -> Self {
        Self { added, removed }
    }

    /// The no-op batch.
    pub fn empty() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// A batch holding a single addition.
    pub fn single_added(payload: T, index: usize) -> Self {
        Self {
            added: vec![ChangeItem::new(payload, index)],
            removed: Vec::new(),
        }
    }

    /// A batch holding a single removal.
    pub fn single_removed(payload: T, index: usize) -> Self {
        Self {
            added: Vec::new(),
            removed: vec![ChangeItem::new(payload, index)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Net change in length once the batch is applied.
    pub fn len_delta(&self) -> isize {
        self.added.len() as isize - self.removed.len() as isize
    }

    /// Convert every payload, keeping indices and ordering.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> ChangeBatch<U> {
        ChangeBatch {
            added: self.added.into_iter().map(|c| c.map(&mut f)).collect(),
            removed: self.removed.into_iter().map(|c| c.map(&mut f)).collect(),
        }
    }
}

impl<T> Default for ChangeBatch<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        let batch: ChangeBatch<i32> = ChangeBatch::default();
        assert!(batch.is_empty());
        assert_eq!(batch.len_delta(), 0);
    }

    #[test]
    fn test_len_delta() {
        let batch = ChangeBatch::new(
            vec![ChangeItem::new('x', 0), ChangeItem::new('y', 3)],
            vec![ChangeItem::new('a', 1)],
        );
        assert_eq!(batch.len_delta(), 1);
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_map_keeps_indices() {
        let batch = ChangeBatch::new(vec![ChangeItem::new(2, 5)], vec![ChangeItem::new(3, 1)]);
        let mapped = batch.map(|v| v.to_string());

        assert_eq!(mapped.added, vec![ChangeItem::new("2".to_string(), 5)]);
        assert_eq!(mapped.removed, vec![ChangeItem::new("3".to_string(), 1)]);
    }

    #[test]
    fn test_batch_serde() {
        let batch = ChangeBatch::single_added("item".to_string(), 4);
        let json = serde_json::to_string(&batch).unwrap();
        let back: ChangeBatch<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(batch, back);

        let addressing: Addressing = serde_json::from_str("\"Live\"").unwrap();
        assert_eq!(addressing, Addressing::Live);
    }
}
