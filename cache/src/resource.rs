use crate::error::StoreError;
use crate::publisher::{Publisher, Subscribable, Subscriber, Subscription};
use crate::task::eviction::ArmedTimer;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// The publisher for a single key.
///
/// A resource holds the latest value stored under its key and every
/// subscription on it. Its value only changes through the owning
/// [`Store`](crate::Store); subscribers get read access and events.
pub struct Resource<K, V> {
  key: K,
  publisher: Arc<Publisher<V>>,
  eviction_timer: Mutex<Option<ArmedTimer>>,
}

impl<K: fmt::Debug, V> fmt::Debug for Resource<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Resource")
      .field("key", &self.key)
      .field("publisher", &self.publisher)
      .field("timer_armed", &self.eviction_timer.lock().is_some())
      .finish()
  }
}

impl<K, V> Resource<K, V> {
  pub(crate) fn new(key: K, value: Option<Arc<V>>) -> Self {
    Self {
      key,
      publisher: Arc::new(Publisher::new(value)),
      eviction_timer: Mutex::new(None),
    }
  }

  #[inline]
  pub fn key(&self) -> &K {
    &self.key
  }

  /// The current value, `None` if nothing has been written yet.
  #[inline]
  pub fn value(&self) -> Option<Arc<V>> {
    self.publisher.value()
  }

  pub fn subscriber_count(&self) -> usize {
    self.publisher.subscriber_count()
  }

  /// True while or after the resource announces its eviction.
  pub fn is_evicting(&self) -> bool {
    self.publisher.is_closing()
  }

  /// Removes a subscription by id. Unknown ids are ignored.
  pub fn unsubscribe(&self, id: u64) -> bool {
    self.publisher.unsubscribe(id)
  }

  /// Registers `subscriber`, or returns `None` if eviction has started.
  ///
  /// The check and the registration happen under the same lock, so a
  /// subscriber is either refused or included in the eviction announcement.
  pub(crate) fn attach(&self, subscriber: Arc<dyn Subscriber<V>>) -> Option<Subscription<V>> {
    self.publisher.subscribe(subscriber)
  }

  pub(crate) fn update_value(&self, value: Arc<V>) {
    self.publisher.update_value(value);
  }

  pub(crate) fn invalidate_value(&self) {
    self.publisher.invalidate_value();
  }

  pub(crate) fn announce_eviction(&self) {
    self.publisher.announce_eviction();
  }

  /// Installs a freshly armed timer, cancelling the previous one.
  pub(crate) fn replace_timer(&self, timer: ArmedTimer) {
    if let Some(previous) = self.eviction_timer.lock().replace(timer) {
      previous.cancel();
    }
  }

  pub(crate) fn cancel_timer(&self) {
    if let Some(timer) = self.eviction_timer.lock().take() {
      timer.cancel();
    }
  }

  /// Whether the currently armed timer is the one identified by `token`.
  pub(crate) fn timer_is(&self, token: u64) -> bool {
    self
      .eviction_timer
      .lock()
      .as_ref()
      .map_or(false, |timer| timer.token == token)
  }
}

impl<K: fmt::Debug, V> Subscribable<V> for Resource<K, V> {
  /// Attaches directly to this resource. Unlike [`Store::read`](crate::Store::read)
  /// this does not count as an access for idle eviction.
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<V>>) -> Result<Subscription<V>, StoreError> {
    self
      .attach(subscriber)
      .ok_or_else(|| StoreError::eviction_in_progress(&self.key))
  }
}
