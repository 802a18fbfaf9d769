use crate::builder::StoreBuilder;
use crate::error::StoreError;
use crate::metrics::MetricsSnapshot;
use crate::publisher::{Subscribable, Subscriber, Subscription};
use crate::resource::Resource;
use crate::shared::{Op, StoreShared};

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

/// A shared, key-addressed reactive cache.
///
/// Cloning the handle is cheap and every clone refers to the same store.
/// Writes, invalidations and evictions are broadcast to every subscription
/// on the affected key. Operations issued from inside a subscriber callback
/// are queued until the broadcast that triggered the callback completes.
pub struct Store<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<StoreShared<K, V, H>>,
}

impl<K, V, H> Clone for Store<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V, H> fmt::Debug for Store<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Store").field("shared", &self.shared).finish()
  }
}

impl<K, V> Store<K, V, ahash::RandomState> {
  /// Shorthand for [`StoreBuilder::new`].
  pub fn builder() -> StoreBuilder<K, V> {
    StoreBuilder::new()
  }
}

impl<K, V, H> Store<K, V, H> {
  /// The id given at build time.
  pub fn id(&self) -> &str {
    &self.shared.id
  }

  /// The configured idle eviction age, `None` if eviction is disabled.
  pub fn max_resource_age(&self) -> Option<Duration> {
    self.shared.scheduler.as_ref().map(|scheduler| scheduler.max_age())
  }

  /// The runtime timers and coordinators spawn onto, if one was found.
  pub fn runtime(&self) -> Option<&Handle> {
    self.shared.runtime.as_ref()
  }

  /// Number of resources currently held.
  pub fn len(&self) -> usize {
    self.shared.resources.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Whether two handles refer to the same store.
  pub fn ptr_eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.shared, &other.shared)
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot(self.len())
  }
}

impl<K, V, H> Store<K, V, H>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Subscribes to `key`, creating an empty resource if the key is unseen.
  ///
  /// The returned subscription carries the value at the moment of
  /// subscribing. Counts as an access for idle eviction.
  pub fn read(&self, key: &K, subscriber: Arc<dyn Subscriber<V>>) -> Result<Subscription<V>, StoreError> {
    self.shared.read(key, subscriber, false)
  }

  /// Like [`read`](Self::read), but fails with [`StoreError::NotFound`]
  /// instead of creating a missing resource.
  pub fn read_strict(
    &self,
    key: &K,
    subscriber: Arc<dyn Subscriber<V>>,
  ) -> Result<Subscription<V>, StoreError> {
    self.shared.read(key, subscriber, true)
  }

  /// The current value under `key`, without subscribing.
  ///
  /// This does not count as an access and never creates a resource.
  pub fn peek(&self, key: &K) -> Option<Arc<V>> {
    self.shared.resources.get(key).and_then(|resource| resource.value())
  }

  pub fn contains_key(&self, key: &K) -> bool {
    self.shared.resources.contains_key(key)
  }

  /// The resource currently held under `key`, for inspection.
  pub fn resource(&self, key: &K) -> Option<Arc<Resource<K, V>>> {
    self.shared.resources.get(key)
  }

  /// Explicitly creates a resource.
  ///
  /// Fails with [`StoreError::DuplicateKey`] if `key` already exists.
  pub fn create(&self, key: K, value: Option<V>) -> Result<(), StoreError> {
    self.shared.create(key, value.map(Arc::new))
  }

  /// Stores `value` under `key` and notifies every subscriber of the key.
  pub fn write(&self, key: K, value: V) {
    self.write_shared(key, Arc::new(value));
  }

  /// Like [`write`](Self::write) for a value that is already shared.
  pub fn write_shared(&self, key: K, value: Arc<V>) {
    self.shared.submit(Op::Write(key, value));
  }

  /// Signals every subscriber of `key` that its value may be stale.
  ///
  /// The stored value is untouched. A missing key is logged and ignored.
  pub fn invalidate(&self, key: &K) {
    self.shared.submit(Op::Invalidate(key.clone()));
  }

  /// Invalidates each key in `keys`.
  pub fn invalidate_many<'a, I>(&self, keys: I)
  where
    I: IntoIterator<Item = &'a K>,
    K: 'a,
  {
    for key in keys {
      self.invalidate(key);
    }
  }

  /// Announces eviction to every subscriber of `key`, then removes it.
  ///
  /// A later access under the same key starts from a fresh, empty resource.
  /// A missing key is logged and ignored.
  pub fn evict(&self, key: &K) {
    self.shared.submit(Op::Evict(key.clone()));
  }

  /// Evicts each key in `keys`.
  pub fn evict_many<'a, I>(&self, keys: I)
  where
    I: IntoIterator<Item = &'a K>,
    K: 'a,
  {
    for key in keys {
      self.evict(key);
    }
  }

  /// Computes a new value from the current one and writes it, then, if
  /// `invalidate` is set, invalidates the key so observers refetch.
  ///
  /// Observers receive the new value before the invalidation.
  pub fn mutate<F>(&self, key: K, update: F, invalidate: bool)
  where
    F: FnOnce(Option<Arc<V>>) -> V + Send + 'static,
  {
    self.shared.submit(Op::Mutate {
      key,
      update: Box::new(update),
      invalidate,
    });
  }

  /// A [`Subscribable`] view of one key, suitable as a derivation input.
  pub fn subscribable(&self, key: K) -> KeyedResource<K, V, H> {
    KeyedResource {
      store: self.clone(),
      key,
    }
  }
}

/// One key of a [`Store`], subscribable through [`Store::read`].
pub struct KeyedResource<K, V, H = ahash::RandomState> {
  store: Store<K, V, H>,
  key: K,
}

impl<K: fmt::Debug, V, H> fmt::Debug for KeyedResource<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("KeyedResource")
      .field("store", &self.store.id())
      .field("key", &self.key)
      .finish()
  }
}

impl<K, V, H> KeyedResource<K, V, H> {
  pub fn key(&self) -> &K {
    &self.key
  }
}

impl<K, V, H> Subscribable<V> for KeyedResource<K, V, H>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<V>>) -> Result<Subscription<V>, StoreError> {
    self.store.read(&self.key, subscriber)
  }
}
