//! The subscriber registry shared by [`Resource`](crate::Resource) and
//! [`Derivation`](crate::Derivation).
//!
//! A publisher holds a current value and an insertion-ordered set of
//! subscribers. It fans out three kinds of events: updated, invalidated and
//! evicted. Every fan-out pass works from a snapshot of the subscriber set
//! taken at the start of the pass, and no callback is ever invoked while the
//! publisher's own lock is held, so subscribers are free to subscribe or
//! unsubscribe from inside a callback.

use crate::error::StoreError;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Receives the events broadcast by a [`Subscribable`].
///
/// Callbacks run synchronously on the thread performing the write,
/// invalidation or eviction, and must not block.
pub trait Subscriber<V>: Send + Sync {
  /// A new value was stored.
  fn on_update(&self, value: Arc<V>);

  /// The stored value may be stale. The value itself is unchanged.
  fn on_invalidate(&self) {}

  /// The publisher is going away. No further callback follows this one.
  fn on_evicted(&self) {}
}

/// A [`Subscriber`] assembled from three closures.
pub struct FnSubscriber<U, I, E> {
  on_update: U,
  on_invalidate: I,
  on_evicted: E,
}

impl<U, I, E> FnSubscriber<U, I, E> {
  pub fn new(on_update: U, on_invalidate: I, on_evicted: E) -> Self {
    Self {
      on_update,
      on_invalidate,
      on_evicted,
    }
  }
}

impl<V, U, I, E> Subscriber<V> for FnSubscriber<U, I, E>
where
  U: Fn(Arc<V>) + Send + Sync,
  I: Fn() + Send + Sync,
  E: Fn() + Send + Sync,
{
  fn on_update(&self, value: Arc<V>) {
    (self.on_update)(value)
  }

  fn on_invalidate(&self) {
    (self.on_invalidate)()
  }

  fn on_evicted(&self) {
    (self.on_evicted)()
  }
}

/// Builds a shareable subscriber from the three event callbacks.
pub fn subscriber<V, U, I, E>(on_update: U, on_invalidate: I, on_evicted: E) -> Arc<dyn Subscriber<V>>
where
  V: 'static,
  U: Fn(Arc<V>) + Send + Sync + 'static,
  I: Fn() + Send + Sync + 'static,
  E: Fn() + Send + Sync + 'static,
{
  Arc::new(FnSubscriber::new(on_update, on_invalidate, on_evicted))
}

/// Anything observers can attach to.
pub trait Subscribable<V> {
  /// Registers `subscriber` and returns the value at the moment of
  /// subscribing together with the handle that detaches it again.
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<V>>) -> Result<Subscription<V>, StoreError>;
}

struct PublisherState<V> {
  value: Option<Arc<V>>,
  subscribers: BTreeMap<u64, Arc<dyn Subscriber<V>>>,
  next_id: u64,
  closing: bool,
}

/// A value plus its subscriber registry.
pub(crate) struct Publisher<V> {
  state: Mutex<PublisherState<V>>,
}

impl<V> fmt::Debug for Publisher<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Publisher")
      .field("has_value", &state.value.is_some())
      .field("subscribers", &state.subscribers.len())
      .field("closing", &state.closing)
      .finish()
  }
}

impl<V> Publisher<V> {
  pub(crate) fn new(value: Option<Arc<V>>) -> Self {
    Self {
      state: Mutex::new(PublisherState {
        value,
        subscribers: BTreeMap::new(),
        next_id: 0,
        closing: false,
      }),
    }
  }

  #[inline]
  pub(crate) fn value(&self) -> Option<Arc<V>> {
    self.state.lock().value.clone()
  }

  pub(crate) fn subscriber_count(&self) -> usize {
    self.state.lock().subscribers.len()
  }

  /// True once `announce_eviction` has started.
  pub(crate) fn is_closing(&self) -> bool {
    self.state.lock().closing
  }

  /// Registers `subscriber`. Returns `None` once eviction has started.
  pub(crate) fn subscribe(self: &Arc<Self>, subscriber: Arc<dyn Subscriber<V>>) -> Option<Subscription<V>> {
    let mut state = self.state.lock();
    if state.closing {
      return None;
    }
    let id = state.next_id;
    state.next_id += 1;
    state.subscribers.insert(id, subscriber);

    Some(Subscription {
      id,
      initial_value: state.value.clone(),
      publisher: Arc::downgrade(self),
      released: AtomicBool::new(false),
    })
  }

  /// Removes a subscriber. Returns `false` if `id` was not registered,
  /// which is expected when teardown races an eviction.
  pub(crate) fn unsubscribe(&self, id: u64) -> bool {
    self.state.lock().subscribers.remove(&id).is_some()
  }

  /// Stores `value` and delivers it to every current subscriber.
  pub(crate) fn update_value(&self, value: Arc<V>) {
    let snapshot = {
      let mut state = self.state.lock();
      state.value = Some(value.clone());
      Self::snapshot(&state)
    };
    self.broadcast(snapshot, |subscriber| subscriber.on_update(value.clone()));
  }

  pub(crate) fn invalidate_value(&self) {
    let snapshot = Self::snapshot(&self.state.lock());
    self.broadcast(snapshot, |subscriber| subscriber.on_invalidate());
  }

  /// Tells every subscriber the publisher is gone, then drops them all.
  ///
  /// Each subscriber is detached right before its callback runs, so nothing
  /// can reach it afterwards.
  pub(crate) fn announce_eviction(&self) {
    let snapshot = {
      let mut state = self.state.lock();
      state.closing = true;
      Self::snapshot(&state)
    };

    for (id, subscriber) in snapshot {
      if self.unsubscribe(id) {
        subscriber.on_evicted();
      }
    }

    self.state.lock().subscribers.clear();
  }

  fn snapshot(state: &PublisherState<V>) -> Vec<(u64, Arc<dyn Subscriber<V>>)> {
    state
      .subscribers
      .iter()
      .map(|(id, subscriber)| (*id, subscriber.clone()))
      .collect()
  }

  fn broadcast<F>(&self, snapshot: Vec<(u64, Arc<dyn Subscriber<V>>)>, deliver: F)
  where
    F: Fn(&dyn Subscriber<V>),
  {
    for (id, subscriber) in snapshot {
      // Someone earlier in the pass may have unsubscribed this one.
      if !self.state.lock().subscribers.contains_key(&id) {
        continue;
      }
      deliver(subscriber.as_ref());
    }
  }
}

impl<V> Subscribable<V> for Arc<Publisher<V>> {
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<V>>) -> Result<Subscription<V>, StoreError> {
    Publisher::subscribe(self, subscriber).ok_or_else(|| StoreError::EvictionInProgress {
      key: String::from("<publisher>"),
    })
  }
}

/// A live registration on a [`Subscribable`].
///
/// Dropping the subscription detaches it. Detaching is idempotent and never
/// reaches a different publisher than the one that issued it, even if a new
/// resource has since been created under the same key.
pub struct Subscription<V> {
  id: u64,
  initial_value: Option<Arc<V>>,
  publisher: Weak<Publisher<V>>,
  released: AtomicBool,
}

impl<V> fmt::Debug for Subscription<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("id", &self.id)
      .field("has_initial_value", &self.initial_value.is_some())
      .field("active", &self.is_active())
      .finish()
  }
}

impl<V> Subscription<V> {
  /// The id issued by the publisher. Ids are never reused by that publisher.
  #[inline]
  pub fn id(&self) -> u64 {
    self.id
  }

  /// The value held by the publisher when this subscription was created.
  #[inline]
  pub fn initial_value(&self) -> Option<&Arc<V>> {
    self.initial_value.as_ref()
  }

  /// Whether the subscription is still registered with a live publisher.
  pub fn is_active(&self) -> bool {
    if self.released.load(Ordering::Acquire) {
      return false;
    }
    match self.publisher.upgrade() {
      Some(publisher) => publisher.state.lock().subscribers.contains_key(&self.id),
      None => false,
    }
  }

  /// Detaches from the publisher. Calling this more than once is a no-op.
  pub fn unsubscribe(&self) {
    if self.released.swap(true, Ordering::AcqRel) {
      return;
    }
    if let Some(publisher) = self.publisher.upgrade() {
      publisher.unsubscribe(self.id);
    }
  }
}

impl<V> Drop for Subscription<V> {
  fn drop(&mut self) {
    self.unsubscribe();
  }
}
