//! The authoritative side: an owned ordered collection that reports every
//! mutation as a [`ChangeBatch`].
//!
//! Observers are called synchronously, in registration order, before the
//! mutating call returns. A slow observer therefore slows the writer down;
//! nothing is queued.

use crate::change::ChangeBatch;
use crate::error::{ListError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ulid::Ulid;

/// Identity of a change source, used to route batches to the right mirrors.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh, unique identifier.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notifications raised by a [`ChangeSource`].
#[derive(Clone, Debug, PartialEq)]
pub enum ListEvent<T> {
    /// The collection changed. Indices use original addressing.
    ItemsChanged(ChangeBatch<T>),
    /// The editing flag flipped to the carried value.
    EditingEnabledChanged(bool),
    /// An item was selected by the user. The collection is unchanged.
    ItemSelected(T),
    /// The user asked for a new item to be added.
    AddRequested,
}

/// Handle returned by [`ChangeSource::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wrap a raw id, for registries that hand out their own handles.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

type Observer<T> = Box<dyn FnMut(&ListEvent<T>) + Send>;

/// An owned ordered collection that emits a batch after each mutation.
pub struct ChangeSource<T> {
    id: SourceId,
    items: Vec<T>,
    editing_enabled: bool,
    observers: Vec<(SubscriptionId, Observer<T>)>,
    next_subscription: u64,
}

impl<T: Clone> ChangeSource<T> {
    /// Create a source seeded with `items`.
    pub fn new(id: SourceId, items: impl IntoIterator<Item = T>) -> Self {
        Self {
            id,
            items: items.into_iter().collect(),
            editing_enabled: false,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Create an empty source with a generated id.
    pub fn empty() -> Self {
        Self::new(SourceId::generate(), Vec::new())
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// An owned copy of the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }

    pub fn editing_enabled(&self) -> bool {
        self.editing_enabled
    }

    /// Register an observer. It sees every event raised after this call.
    pub fn subscribe(&mut self, observer: impl FnMut(&ListEvent<T>) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    /// Insert `item` at `index`, shifting later items right.
    pub fn insert(&mut self, item: T, index: usize) -> Result<()> {
        if index > self.items.len() {
            return Err(ListError::IndexOutOfRange {
                index,
                length: self.items.len(),
            });
        }

        self.items.insert(index, item.clone());
        debug!(source = %self.id, index, len = self.items.len(), "item inserted");
        self.emit(ListEvent::ItemsChanged(ChangeBatch::single_added(item, index)));
        Ok(())
    }

    /// Insert `item` at the end.
    pub fn append(&mut self, item: T) -> Result<()> {
        self.insert(item, self.items.len())
    }

    /// Remove and return the item at `index`, shifting later items left.
    pub fn remove_at(&mut self, index: usize) -> Result<T> {
        if index >= self.items.len() {
            return Err(ListError::IndexOutOfRange {
                index,
                length: self.items.len(),
            });
        }

        let item = self.items.remove(index);
        debug!(source = %self.id, index, len = self.items.len(), "item removed");
        self.emit(ListEvent::ItemsChanged(ChangeBatch::single_removed(
            item.clone(),
            index,
        )));
        Ok(item)
    }

    /// Flip the editing flag. Setting the current value again does nothing.
    pub fn set_editing_enabled(&mut self, value: bool) {
        if self.editing_enabled == value {
            return;
        }

        self.editing_enabled = value;
        self.emit(ListEvent::EditingEnabledChanged(value));
    }

    /// Signal that `item` was selected.
    pub fn notify_selected(&mut self, item: T) {
        self.emit(ListEvent::ItemSelected(item));
    }

    /// Ask whoever owns this list to add a new item.
    pub fn request_new_item(&mut self) {
        self.emit(ListEvent::AddRequested);
    }

    fn emit(&mut self, event: ListEvent<T>) {
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
    }
}

impl<T: Clone + PartialEq> ChangeSource<T> {
    /// Remove the first item equal to `item`.
    pub fn remove(&mut self, item: &T) -> Result<T> {
        let index = self
            .items
            .iter()
            .position(|candidate| candidate == item)
            .ok_or(ListError::NotFound)?;
        self.remove_at(index)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }
}

impl<T> std::ops::Index<usize> for ChangeSource<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ChangeSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSource")
            .field("id", &self.id)
            .field("items", &self.items)
            .field("editing_enabled", &self.editing_enabled)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorded(source: &mut ChangeSource<char>) -> Arc<Mutex<Vec<ListEvent<char>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        source.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[test]
    fn test_insert_emits_single_addition() {
        let mut source = ChangeSource::new(SourceId::new("list"), "abc".chars());
        let events = recorded(&mut source);

        source.insert('x', 1).unwrap();

        assert_eq!(source.snapshot(), vec!['a', 'x', 'b', 'c']);
        assert_eq!(
            *events.lock().unwrap(),
            vec![ListEvent::ItemsChanged(ChangeBatch::single_added('x', 1))]
        );
    }

    #[test]
    fn test_insert_out_of_range_is_silent() {
        let mut source = ChangeSource::new(SourceId::new("list"), "ab".chars());
        let events = recorded(&mut source);

        let err = source.insert('x', 3).unwrap_err();

        assert_eq!(err, ListError::IndexOutOfRange { index: 3, length: 2 });
        assert_eq!(source.len(), 2);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_append_places_at_end() {
        let mut source = ChangeSource::new(SourceId::new("list"), "ab".chars());
        let events = recorded(&mut source);

        source.append('c').unwrap();

        assert_eq!(source[2], 'c');
        assert_eq!(
            *events.lock().unwrap(),
            vec![ListEvent::ItemsChanged(ChangeBatch::single_added('c', 2))]
        );
    }

    #[test]
    fn test_remove_at_emits_removed_item() {
        let mut source = ChangeSource::new(SourceId::new("list"), "abc".chars());
        let events = recorded(&mut source);

        assert_eq!(source.remove_at(1), Ok('b'));
        assert_eq!(source.remove_at(2), Err(ListError::IndexOutOfRange { index: 2, length: 2 }));

        assert_eq!(source.snapshot(), vec!['a', 'c']);
        assert_eq!(
            *events.lock().unwrap(),
            vec![ListEvent::ItemsChanged(ChangeBatch::single_removed('b', 1))]
        );
    }

    #[test]
    fn test_remove_by_value_takes_first_match() {
        let mut source = ChangeSource::new(SourceId::new("list"), "abab".chars());
        let events = recorded(&mut source);

        source.remove(&'b').unwrap();

        assert_eq!(source.snapshot(), vec!['a', 'a', 'b']);
        assert_eq!(
            *events.lock().unwrap(),
            vec![ListEvent::ItemsChanged(ChangeBatch::single_removed('b', 1))]
        );
    }

    #[test]
    fn test_remove_missing_item() {
        let mut source = ChangeSource::new(SourceId::new("list"), "ab".chars());
        let events = recorded(&mut source);

        assert_eq!(source.remove(&'z'), Err(ListError::NotFound));
        assert_eq!(source.len(), 2);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_editing_flag_only_fires_on_change() {
        let mut source: ChangeSource<char> = ChangeSource::empty();
        let events = recorded(&mut source);

        source.set_editing_enabled(false);
        source.set_editing_enabled(true);
        source.set_editing_enabled(true);
        source.set_editing_enabled(false);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ListEvent::EditingEnabledChanged(true),
                ListEvent::EditingEnabledChanged(false),
            ]
        );
    }

    #[test]
    fn test_side_channel_notifications_do_not_mutate() {
        let mut source = ChangeSource::new(SourceId::new("list"), "ab".chars());
        let events = recorded(&mut source);

        source.notify_selected('a');
        source.request_new_item();

        assert_eq!(source.snapshot(), vec!['a', 'b']);
        assert_eq!(
            *events.lock().unwrap(),
            vec![ListEvent::ItemSelected('a'), ListEvent::AddRequested]
        );
    }

    #[test]
    fn test_observers_run_in_registration_order() {
        let mut source: ChangeSource<char> = ChangeSource::empty();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let order = Arc::clone(&order);
            source.subscribe(move |_| order.lock().unwrap().push(tag));
        }

        source.append('a').unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut source: ChangeSource<char> = ChangeSource::empty();
        let events = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&events);
        let id = source.subscribe(move |_| *sink.lock().unwrap() += 1);

        source.append('a').unwrap();
        assert!(source.unsubscribe(id));
        assert!(!source.unsubscribe(id));
        source.append('b').unwrap();

        assert_eq!(*events.lock().unwrap(), 1);
    }
}
