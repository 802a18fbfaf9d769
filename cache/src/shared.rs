use crate::dispatch::Dispatcher;
use crate::error::StoreError;
use crate::metrics::Metrics;
use crate::publisher::{Subscriber, Subscription};
use crate::resource::Resource;
use crate::store::ResourceMap;
use crate::task::eviction::EvictionScheduler;

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

pub(crate) type MutateFn<V> = Box<dyn FnOnce(Option<Arc<V>>) -> V + Send>;

/// A store mutation, queued when issued from inside a broadcast.
pub(crate) enum Op<K, V> {
  Write(K, Arc<V>),
  Mutate {
    key: K,
    update: MutateFn<V>,
    invalidate: bool,
  },
  Invalidate(K),
  Evict(K),
  /// Fired by an idle timer armed with `token`.
  Expire { key: K, token: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EvictionCause {
  Manual,
  Idle,
}

/// The internal, shared core of a store.
pub(crate) struct StoreShared<K, V, H> {
  pub(crate) id: String,
  pub(crate) resources: ResourceMap<K, V, H>,
  pub(crate) dispatcher: Dispatcher<Op<K, V>>,
  pub(crate) scheduler: Option<EvictionScheduler>,
  pub(crate) runtime: Option<Handle>,
  pub(crate) metrics: Metrics,
}

impl<K, V, H> fmt::Debug for StoreShared<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StoreShared")
      .field("id", &self.id)
      .field("resources", &self.resources)
      .field("max_resource_age", &self.scheduler.as_ref().map(|s| s.max_age()))
      .finish_non_exhaustive()
  }
}

impl<K, V, H> Drop for StoreShared<K, V, H> {
  fn drop(&mut self) {
    // Timers only hold a weak reference; stop them so they don't linger.
    for resource in self.resources.drain() {
      resource.cancel_timer();
    }
  }
}

impl<K, V, H> StoreShared<K, V, H>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Runs `op` through the dispatcher.
  pub(crate) fn submit(self: &Arc<Self>, op: Op<K, V>) {
    if !self.dispatcher.run(op, |op| self.apply(op)) {
      Metrics::incr(&self.metrics.deferred_operations);
      trace!(store = %self.id, "operation deferred until the current broadcast completes");
    }
  }

  pub(crate) fn read(
    self: &Arc<Self>,
    key: &K,
    subscriber: Arc<dyn Subscriber<V>>,
    strict: bool,
  ) -> Result<Subscription<V>, StoreError> {
    self.dispatcher.hold(|| {
      let resource = if strict {
        self
          .resources
          .get(key)
          .ok_or_else(|| StoreError::not_found(&self.id, key))?
      } else {
        self.get_or_create(key)
      };

      let subscription = resource
        .attach(subscriber)
        .ok_or_else(|| StoreError::eviction_in_progress(key))?;
      Metrics::incr(&self.metrics.reads);
      self.touch(&resource);
      Ok(subscription)
    })
  }

  pub(crate) fn create(self: &Arc<Self>, key: K, value: Option<Arc<V>>) -> Result<(), StoreError> {
    self.dispatcher.hold(|| {
      let resource = self
        .resources
        .insert_new(key.clone(), value)
        .ok_or_else(|| StoreError::duplicate_key(&key))?;
      Metrics::incr(&self.metrics.resources_created);
      debug!(store = %self.id, key = ?key, "resource created");
      self.touch(&resource);
      Ok(())
    })
  }

  /// Returns the resource for `key`, creating an empty one if needed.
  pub(crate) fn get_or_create(&self, key: &K) -> Arc<Resource<K, V>> {
    let (resource, created) = self.resources.get_or_create(key, || None);
    if created {
      Metrics::incr(&self.metrics.resources_created);
      debug!(store = %self.id, key = ?key, "resource created");
    }
    resource
  }

  fn apply(self: &Arc<Self>, op: Op<K, V>) {
    match op {
      Op::Write(key, value) => self.apply_write(key, value),
      Op::Mutate {
        key,
        update,
        invalidate,
      } => {
        Metrics::incr(&self.metrics.mutations);
        let previous = self.resources.get(&key).and_then(|resource| resource.value());
        let next = Arc::new(update(previous));
        self.apply_write(key.clone(), next);
        if invalidate {
          self.apply_invalidate(&key);
        }
      }
      Op::Invalidate(key) => self.apply_invalidate(&key),
      Op::Evict(key) => match self.resources.get(&key) {
        Some(resource) => self.apply_evict(&key, resource, EvictionCause::Manual),
        None => {
          Metrics::incr(&self.metrics.missing_key_warnings);
          warn!(store = %self.id, key = ?key, "tried to evict non-existent resource");
        }
      },
      Op::Expire { key, token } => {
        // The timer may have been re-armed, or its resource evicted and
        // replaced, after it fired.
        if let Some(resource) = self.resources.get(&key) {
          if resource.timer_is(token) {
            self.apply_evict(&key, resource, EvictionCause::Idle);
          }
        }
      }
    }
  }

  fn apply_write(self: &Arc<Self>, key: K, value: Arc<V>) {
    let (resource, created) = self.resources.get_or_create(&key, || Some(value.clone()));
    if created {
      Metrics::incr(&self.metrics.resources_created);
      debug!(store = %self.id, key = ?key, "resource created by write");
    } else {
      trace!(
        store = %self.id,
        key = ?key,
        subscribers = resource.subscriber_count(),
        "broadcasting update"
      );
      resource.update_value(value);
    }
    Metrics::incr(&self.metrics.writes);
    self.touch(&resource);
  }

  fn apply_invalidate(&self, key: &K) {
    match self.resources.get(key) {
      Some(resource) => {
        trace!(
          store = %self.id,
          key = ?key,
          subscribers = resource.subscriber_count(),
          "broadcasting invalidation"
        );
        resource.invalidate_value();
        Metrics::incr(&self.metrics.invalidations);
      }
      None => {
        Metrics::incr(&self.metrics.missing_key_warnings);
        warn!(store = %self.id, key = ?key, "tried to invalidate non-existent resource");
      }
    }
  }

  fn apply_evict(&self, key: &K, resource: Arc<Resource<K, V>>, cause: EvictionCause) {
    resource.cancel_timer();
    // Subscribers hear about it before the key disappears from the map.
    resource.announce_eviction();
    self.resources.remove_if_same(key, &resource);

    match cause {
      EvictionCause::Manual => Metrics::incr(&self.metrics.evicted_manually),
      EvictionCause::Idle => Metrics::incr(&self.metrics.evicted_idle),
    }
    debug!(store = %self.id, key = ?key, cause = ?cause, "resource evicted");
  }

  /// Counts as an access for idle eviction: re-arms the resource's timer.
  fn touch(self: &Arc<Self>, resource: &Arc<Resource<K, V>>) {
    let Some(scheduler) = &self.scheduler else {
      return;
    };

    let store = Arc::downgrade(self);
    let key = resource.key().clone();
    let timer = scheduler.arm(move |token| {
      if let Some(store) = store.upgrade() {
        store.submit(Op::Expire { key, token });
      }
    });
    trace!(store = %self.id, key = ?resource.key(), token = timer.token, "eviction timer armed");
    resource.replace_timer(timer);
  }
}
