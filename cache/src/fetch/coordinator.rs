use crate::error::{BuildError, StoreError};
use crate::fetch::config::FetchConfig;
use crate::fetch::state::{FetchEvent, FetchState, InFlight};
use crate::handles::Store;
use crate::publisher::{Subscriber, Subscription};
use crate::runtime::{self, TaskHandle};

use std::fmt;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

/// The future a producer hands back for one attempt.
pub type ProduceFuture<V, E> = BoxFuture<'static, Result<V, E>>;

type ProduceFn<V, E> = Arc<dyn Fn(Option<Arc<V>>) -> ProduceFuture<V, E> + Send + Sync>;
type NextPageFn<V, E> = Arc<dyn Fn(&V) -> Option<ProduceFuture<V, E>> + Send + Sync>;
type ExtendFn<V> = Arc<dyn Fn(V, &V) -> V + Send + Sync>;

/// Incremental loading on top of the current value.
///
/// `next_page` looks at the data shown and returns the fetch for the next
/// page, or `None` when there is nothing more. `extend` folds a fetched page
/// into the data it was requested from.
pub struct Pager<V, E> {
  next_page: NextPageFn<V, E>,
  extend: ExtendFn<V>,
}

impl<V, E> Clone for Pager<V, E> {
  fn clone(&self) -> Self {
    Self {
      next_page: self.next_page.clone(),
      extend: self.extend.clone(),
    }
  }
}

impl<V, E> fmt::Debug for Pager<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pager").finish_non_exhaustive()
  }
}

impl<V: 'static, E: 'static> Pager<V, E> {
  pub fn new<N, Fut, X>(next_page: N, extend: X) -> Self
  where
    N: Fn(&V) -> Option<Fut> + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    X: Fn(V, &V) -> V + Send + Sync + 'static,
  {
    Self {
      next_page: Arc::new(move |current: &V| {
        next_page(current).map(|future| Box::pin(future) as ProduceFuture<V, E>)
      }),
      extend: Arc::new(extend),
    }
  }
}

struct ArmedAlert {
  epoch: u64,
  /// The flag this alert will mark as long.
  kind: InFlight,
  handle: TaskHandle,
}

/// Mutable bookkeeping, guarded by one lock.
///
/// Never held while calling into the store or into user code.
struct Control<V> {
  mounted: bool,
  skip: bool,
  generation: u64,
  /// The value handed to the producer on the next attempt.
  last_value: Option<Arc<V>>,
  subscription: Option<Subscription<V>>,
  alert: Option<ArmedAlert>,
  alert_epoch: u64,
}

impl<V> Control<V> {
  fn cancel_alert(&mut self) {
    if let Some(alert) = self.alert.take() {
      alert.handle.cancel();
    }
  }
}

struct CoordinatorShared<K, V, E, H> {
  key: K,
  store: Store<K, V, H>,
  produce: ProduceFn<V, E>,
  pager: Option<Pager<V, E>>,
  long_operation_alert: Option<Duration>,
  revalidate_on_focus: bool,
  runtime: Handle,
  control: Mutex<Control<V>>,
  state: watch::Sender<FetchState<V, E>>,
}

/// Routes resource events to a coordinator without keeping it alive.
struct Listener<K, V, E, H> {
  coordinator: Weak<CoordinatorShared<K, V, E, H>>,
}

/// Drives production of one key's value for one observer.
///
/// Starting the coordinator subscribes it to the key and kicks off the first
/// attempt. Successful results are written back to the store, which fans them
/// out to every other observer of the key. Failures stay local. Any result
/// that arrives after a newer attempt started, or after the coordinator
/// stopped, is dropped.
///
/// Dropping the coordinator stops it.
pub struct Coordinator<K, V, E, H = ahash::RandomState>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  shared: Arc<CoordinatorShared<K, V, E, H>>,
}

impl<K, V, E, H> fmt::Debug for Coordinator<K, V, E, H>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let control = self.shared.control.lock();
    f.debug_struct("Coordinator")
      .field("key", &self.shared.key)
      .field("store", &self.shared.store.id())
      .field("mounted", &control.mounted)
      .field("skip", &control.skip)
      .field("generation", &control.generation)
      .finish_non_exhaustive()
  }
}

impl<K, V, E, H> Coordinator<K, V, E, H>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Starts configuring a coordinator for `key` on `store`.
  ///
  /// `produce` receives the last value this coordinator knows about and
  /// returns the attempt's future.
  pub fn builder<F, Fut>(store: Store<K, V, H>, key: K, produce: F) -> CoordinatorBuilder<K, V, E, H>
  where
    F: Fn(Option<Arc<V>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    CoordinatorBuilder {
      store,
      key,
      produce: Arc::new(move |previous| Box::pin(produce(previous)) as ProduceFuture<V, E>),
      pager: None,
      config: FetchConfig::default(),
      runtime: None,
    }
  }

  pub fn key(&self) -> &K {
    &self.shared.key
  }

  /// A snapshot of the current state.
  pub fn state(&self) -> FetchState<V, E> {
    self.shared.state.borrow().clone()
  }

  /// A receiver that is notified on every state change.
  pub fn watch(&self) -> watch::Receiver<FetchState<V, E>> {
    self.shared.state.subscribe()
  }

  pub fn is_mounted(&self) -> bool {
    self.shared.control.lock().mounted
  }

  pub fn is_skipping(&self) -> bool {
    self.shared.control.lock().skip
  }

  /// The id of the most recent attempt or teardown boundary.
  pub fn generation(&self) -> u64 {
    self.shared.control.lock().generation
  }

  /// Subscribes to the key and starts the first attempt.
  ///
  /// Starting an already started coordinator does nothing.
  pub fn start(&self) -> Result<(), StoreError> {
    {
      let mut control = self.shared.control.lock();
      if control.mounted {
        return Ok(());
      }
      control.mounted = true;
      control.last_value = None;
    }

    if let Err(err) = self.shared.attach() {
      self.shared.control.lock().mounted = false;
      return Err(err);
    }
    debug!(key = ?self.shared.key, store = %self.shared.store.id(), "coordinator started");
    self.shared.begin();
    Ok(())
  }

  /// Unsubscribes, cancels the alert timer and orphans any attempt in flight.
  pub fn stop(&self) {
    self.shared.stop();
  }

  /// Starts a new attempt. Returns `false` if the coordinator is stopped or
  /// skipping.
  ///
  /// After an eviction this re-subscribes to the key first, starting over
  /// from an empty resource.
  pub fn refetch(&self) -> Result<bool, StoreError> {
    self.shared.refetch()
  }

  /// Fetches the next page through the configured [`Pager`].
  ///
  /// Only starts when data is shown, no load or update is in flight, and the
  /// pager reports another page. Returns whether a fetch started.
  pub fn fetch_more(&self) -> bool {
    self.shared.fetch_more()
  }

  /// Turns production suppression on or off.
  ///
  /// Turning it off on a started coordinator shows the cached value and
  /// starts an attempt. Turning it on does not affect an attempt already in
  /// flight.
  pub fn set_skip(&self, skip: bool) -> Result<bool, StoreError> {
    let resume = {
      let mut control = self.shared.control.lock();
      let was_skipping = control.skip;
      control.skip = skip;
      let resume = was_skipping && !skip && control.mounted;
      if resume {
        self.shared.remount_state(control.last_value.clone(), false);
      }
      resume
    };
    if resume {
      return self.shared.refetch();
    }
    Ok(false)
  }

  /// Feeds the host's visibility signal in. Becoming visible refetches when
  /// `revalidate_on_focus` is set. Returns whether an attempt started.
  pub fn focus_changed(&self, visible: bool) -> Result<bool, StoreError> {
    let revalidate = {
      let control = self.shared.control.lock();
      if !control.mounted {
        return Ok(false);
      }
      self
        .shared
        .state
        .send_modify(|state| state.apply(FetchEvent::FocusChanged(visible)));
      visible && self.shared.revalidate_on_focus
    };
    if revalidate {
      return self.shared.refetch();
    }
    Ok(false)
  }
}

impl<K, V, E, H> Drop for Coordinator<K, V, E, H>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  fn drop(&mut self) {
    self.shared.stop();
  }
}

impl<K, V, E, H> CoordinatorShared<K, V, E, H>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Subscribes to the key and resets the state from its current value.
  fn attach(self: &Arc<Self>) -> Result<(), StoreError> {
    let listener: Arc<dyn Subscriber<V>> = Arc::new(Listener {
      coordinator: Arc::downgrade(self),
    });
    let subscription = self.store.read(&self.key, listener)?;

    let replaced = {
      let mut control = self.control.lock();
      if !control.mounted {
        // Stopped while subscribing; `subscription` detaches on return.
        return Ok(());
      }
      // An update may already have arrived through the new subscription.
      if control.last_value.is_none() {
        control.last_value = subscription.initial_value().cloned();
      }
      self.remount_state(control.last_value.clone(), control.skip);
      control.subscription.replace(subscription)
    };
    drop(replaced);
    Ok(())
  }

  /// Resets the state to its just-mounted shape, keeping page visibility.
  fn remount_state(&self, initial: Option<Arc<V>>, skip: bool) {
    self.state.send_modify(|state| {
      let page_is_visible = state.page_is_visible;
      *state = FetchState::mounted(initial, skip);
      state.page_is_visible = page_is_visible;
    });
  }

  fn refetch(self: &Arc<Self>) -> Result<bool, StoreError> {
    let needs_attach = {
      let control = self.control.lock();
      if !control.mounted || control.skip {
        return Ok(false);
      }
      control.subscription.is_none()
    };
    if needs_attach {
      self.attach()?;
    }
    Ok(self.begin())
  }

  /// Starts a regular attempt.
  fn begin(self: &Arc<Self>) -> bool {
    let (generation, previous) = {
      let mut control = self.control.lock();
      if !control.mounted || control.skip {
        return false;
      }
      control.generation += 1;
      self
        .state
        .send_modify(|state| state.apply(FetchEvent::Began { more: false }));
      self.arm_alert(&mut control);
      (control.generation, control.last_value.clone())
    };

    debug!(key = ?self.key, generation, "production started");
    let future = (self.produce)(previous);
    self.spawn_attempt(generation, future);
    true
  }

  fn fetch_more(self: &Arc<Self>) -> bool {
    let Some(pager) = self.pager.clone() else {
      return false;
    };

    let current = {
      let control = self.control.lock();
      if !control.mounted || control.skip {
        return false;
      }
      let state = self.state.borrow();
      if state.is_loading || state.is_updating {
        return false;
      }
      let data = state.data.clone();
      match data {
        Some(data) => data,
        None => return false,
      }
    };

    let Some(page) = (pager.next_page)(&current) else {
      return false;
    };

    let generation = {
      let mut control = self.control.lock();
      if !control.mounted || control.skip {
        return false;
      }
      control.generation += 1;
      self
        .state
        .send_modify(|state| state.apply(FetchEvent::Began { more: true }));
      self.arm_alert(&mut control);
      control.generation
    };

    debug!(key = ?self.key, generation, "next page fetch started");
    let extend = pager.extend.clone();
    let future: ProduceFuture<V, E> =
      Box::pin(async move { page.await.map(|page| extend(page, &current)) });
    self.spawn_attempt(generation, future);
    true
  }

  fn spawn_attempt(self: &Arc<Self>, generation: u64, future: ProduceFuture<V, E>) {
    let coordinator = Arc::downgrade(self);
    // Fire and forget: a superseded attempt runs to completion and is
    // discarded on arrival.
    let _ = runtime::spawn(&self.runtime, async move {
      let result = future.await;
      if let Some(coordinator) = coordinator.upgrade() {
        coordinator.complete(generation, result);
      }
    });
  }

  fn complete(&self, generation: u64, result: Result<V, E>) {
    match result {
      Ok(value) => {
        let value = Arc::new(value);
        {
          let mut control = self.control.lock();
          if !control.mounted || control.generation != generation {
            debug!(key = ?self.key, generation, current = control.generation, "stale result discarded");
            return;
          }
          control.last_value = Some(value.clone());
          control.cancel_alert();
          self
            .state
            .send_modify(|state| state.apply(FetchEvent::Succeeded(value.clone())));
        }
        debug!(key = ?self.key, generation, "production succeeded");
        self.store.write_shared(self.key.clone(), value);
      }
      Err(error) => {
        let mut control = self.control.lock();
        if !control.mounted || control.generation != generation {
          debug!(key = ?self.key, generation, current = control.generation, "stale failure discarded");
          return;
        }
        control.cancel_alert();
        self
          .state
          .send_modify(|state| state.apply(FetchEvent::Failed(Arc::new(error))));
        debug!(key = ?self.key, generation, "production failed");
      }
    }
  }

  /// Arms the alert for whichever flag is now in flight.
  ///
  /// A pending alert for the same flag keeps counting from when that flag
  /// was raised. A pending alert for a different flag is restarted.
  fn arm_alert(self: &Arc<Self>, control: &mut Control<V>) {
    let Some(threshold) = self.long_operation_alert else {
      return;
    };
    let Some(kind) = self.state.borrow().in_flight() else {
      control.cancel_alert();
      return;
    };
    if control.alert.as_ref().map(|alert| alert.kind) == Some(kind) {
      return;
    }
    control.cancel_alert();

    control.alert_epoch += 1;
    let epoch = control.alert_epoch;
    let coordinator = Arc::downgrade(self);
    let handle = runtime::spawn_after(&self.runtime, threshold, move || {
      if let Some(coordinator) = coordinator.upgrade() {
        coordinator.on_long_operation(epoch);
      }
    });
    control.alert = Some(ArmedAlert { epoch, kind, handle });
  }

  fn on_long_operation(&self, epoch: u64) {
    let mut control = self.control.lock();
    if control.alert.as_ref().map(|alert| alert.epoch) != Some(epoch) {
      return;
    }
    control.alert = None;
    self
      .state
      .send_modify(|state| state.apply(FetchEvent::LongOperation));
  }

  fn on_update(&self, value: Arc<V>) {
    let mut control = self.control.lock();
    if !control.mounted {
      return;
    }
    control.last_value = Some(value.clone());
    control.cancel_alert();
    self
      .state
      .send_modify(|state| state.apply(FetchEvent::Updated(value)));
  }

  fn on_invalidate(self: &Arc<Self>) {
    if !self.control.lock().mounted {
      return;
    }
    debug!(key = ?self.key, "invalidated, refetching");
    if let Err(err) = self.refetch() {
      warn!(key = ?self.key, error = %err, "refetch after invalidation failed");
    }
  }

  fn on_evicted(&self) {
    let released = {
      let mut control = self.control.lock();
      if !control.mounted {
        return;
      }
      control.generation += 1;
      control.cancel_alert();
      control.last_value = None;
      self.state.send_modify(|state| state.apply(FetchEvent::Evicted));
      control.subscription.take()
    };
    drop(released);
    debug!(key = ?self.key, "evicted, coordinator reset");
  }

  fn stop(&self) {
    let released = {
      let mut control = self.control.lock();
      if !control.mounted {
        return;
      }
      control.mounted = false;
      control.generation += 1;
      control.cancel_alert();
      control.subscription.take()
    };
    drop(released);
    debug!(key = ?self.key, "coordinator stopped");
  }
}

impl<K, V, E, H> Subscriber<V> for Listener<K, V, E, H>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  fn on_update(&self, value: Arc<V>) {
    if let Some(coordinator) = self.coordinator.upgrade() {
      coordinator.on_update(value);
    }
  }

  fn on_invalidate(&self) {
    if let Some(coordinator) = self.coordinator.upgrade() {
      coordinator.on_invalidate();
    }
  }

  fn on_evicted(&self) {
    if let Some(coordinator) = self.coordinator.upgrade() {
      coordinator.on_evicted();
    }
  }
}

/// Configures and builds a [`Coordinator`].
pub struct CoordinatorBuilder<K, V, E, H = ahash::RandomState> {
  store: Store<K, V, H>,
  key: K,
  produce: ProduceFn<V, E>,
  pager: Option<Pager<V, E>>,
  config: FetchConfig,
  runtime: Option<Handle>,
}

impl<K: fmt::Debug, V, E, H> fmt::Debug for CoordinatorBuilder<K, V, E, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CoordinatorBuilder")
      .field("key", &self.key)
      .field("config", &self.config)
      .field("has_pager", &self.pager.is_some())
      .finish_non_exhaustive()
  }
}

impl<K, V, E, H> CoordinatorBuilder<K, V, E, H> {
  /// Replaces all settings with `config`.
  pub fn config(mut self, config: FetchConfig) -> Self {
    self.config = config;
    self
  }

  /// Raises the long-operation flags after `threshold` in flight.
  pub fn long_operation_alert(mut self, threshold: Duration) -> Self {
    self.config.long_operation_alert = Some(threshold);
    self
  }

  pub fn revalidate_on_focus(mut self, revalidate: bool) -> Self {
    self.config.revalidate_on_focus = revalidate;
    self
  }

  pub fn skip(mut self, skip: bool) -> Self {
    self.config.skip = skip;
    self
  }

  /// Enables [`Coordinator::fetch_more`].
  pub fn pager(mut self, pager: Pager<V, E>) -> Self {
    self.pager = Some(pager);
    self
  }

  /// Overrides the runtime attempts and alert timers are spawned on.
  ///
  /// Defaults to the store's runtime, then to the current one.
  pub fn runtime(mut self, runtime: Handle) -> Self {
    self.runtime = Some(runtime);
    self
  }
}

impl<K, V, E, H> CoordinatorBuilder<K, V, E, H>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  V: Send + Sync + 'static,
  E: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Builds a stopped coordinator. Call [`Coordinator::start`] to mount it.
  pub fn build(self) -> Result<Coordinator<K, V, E, H>, BuildError> {
    if self.config.long_operation_alert == Some(Duration::ZERO) {
      return Err(BuildError::ZeroAlertThreshold);
    }

    let runtime = self
      .runtime
      .or_else(|| self.store.runtime().cloned())
      .or_else(runtime::current_handle)
      .ok_or(BuildError::RuntimeRequired)?;

    let (state, _) = watch::channel(FetchState::pristine());
    let shared = Arc::new(CoordinatorShared {
      key: self.key,
      store: self.store,
      produce: self.produce,
      pager: self.pager,
      long_operation_alert: self.config.long_operation_alert,
      revalidate_on_focus: self.config.revalidate_on_focus,
      runtime,
      control: Mutex::new(Control {
        mounted: false,
        skip: self.config.skip,
        generation: 0,
        last_value: None,
        subscription: None,
        alert: None,
        alert_epoch: 0,
      }),
      state,
    });
    Ok(Coordinator { shared })
  }
}
