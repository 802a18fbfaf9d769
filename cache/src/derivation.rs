use crate::error::StoreError;
use crate::publisher::{Publisher, Subscribable, Subscriber, Subscription};

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

type ComputeFn<I, O> = Box<dyn Fn(&[Option<Arc<I>>]) -> O + Send + Sync>;

struct Slot<I> {
  value: Option<Arc<I>>,
  /// Set once an update has been delivered, so a late initial snapshot
  /// never overwrites it.
  updated: bool,
}

struct DerivationCore<I, O> {
  publisher: Arc<Publisher<O>>,
  slots: Mutex<Vec<Slot<I>>>,
  compute: ComputeFn<I, O>,
}

impl<I, O> DerivationCore<I, O> {
  /// Applies `change` to the inputs, recomputes, and publishes the result.
  fn recompute<F>(&self, change: F)
  where
    F: FnOnce(&mut [Slot<I>]),
  {
    let value = {
      let mut slots = self.slots.lock();
      change(&mut slots);
      Arc::new(self.compute_from(&slots))
    };
    trace!(subscribers = self.publisher.subscriber_count(), "derivation recomputed");
    self.publisher.update_value(value);
  }

  fn compute_from(&self, slots: &[Slot<I>]) -> O {
    let inputs: Vec<Option<Arc<I>>> = slots.iter().map(|slot| slot.value.clone()).collect();
    (self.compute)(&inputs)
  }
}

/// Feeds one upstream's events into its slot.
struct InputSlot<I, O> {
  index: usize,
  core: Weak<DerivationCore<I, O>>,
}

impl<I, O> Subscriber<I> for InputSlot<I, O>
where
  I: Send + Sync,
  O: Send + Sync,
{
  fn on_update(&self, value: Arc<I>) {
    if let Some(core) = self.core.upgrade() {
      let index = self.index;
      core.recompute(move |slots| {
        slots[index] = Slot {
          value: Some(value),
          updated: true,
        };
      });
    }
  }

  fn on_invalidate(&self) {
    if let Some(core) = self.core.upgrade() {
      core.publisher.invalidate_value();
    }
  }

  fn on_evicted(&self) {
    if let Some(core) = self.core.upgrade() {
      let index = self.index;
      core.recompute(move |slots| {
        slots[index] = Slot {
          value: None,
          updated: true,
        };
      });
    }
  }
}

/// A read-only value computed from several upstream subscribables.
///
/// The derivation subscribes to every source when built and re-runs its
/// compute function whenever any of them updates, publishing the result to
/// its own subscribers. Invalidations are forwarded as is.
///
/// An evicted source reads as `None` from then on. The derivation does not
/// re-subscribe, so a later write under the same key creates a new resource
/// it never hears about. Store-backed sources are evicted after sitting idle
/// for the store's `max_resource_age` (240 seconds by default). Build
/// derivations over quiet keys on a store with `no_eviction`, or rebuild the
/// derivation once a source is evicted.
///
/// Dropping the derivation releases its upstream subscriptions.
pub struct Derivation<I, O> {
  core: Arc<DerivationCore<I, O>>,
  upstream: Vec<Subscription<I>>,
}

impl<I, O> fmt::Debug for Derivation<I, O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Derivation")
      .field("inputs", &self.upstream.len())
      .field("publisher", &self.core.publisher)
      .finish()
  }
}

impl<I, O> Derivation<I, O>
where
  I: Send + Sync + 'static,
  O: Send + Sync + 'static,
{
  /// Subscribes to `sources` and computes the first value from their
  /// current values.
  ///
  /// `compute` receives one entry per source, in the order given. It is run
  /// while the derivation's inputs are locked and must not call back into
  /// this derivation.
  pub fn new<F>(sources: &[&dyn Subscribable<I>], compute: F) -> Result<Self, StoreError>
  where
    F: Fn(&[Option<Arc<I>>]) -> O + Send + Sync + 'static,
  {
    let slots = sources
      .iter()
      .map(|_| Slot {
        value: None,
        updated: false,
      })
      .collect();
    let core = Arc::new(DerivationCore {
      publisher: Arc::new(Publisher::new(None)),
      slots: Mutex::new(slots),
      compute: Box::new(compute),
    });

    let mut upstream = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
      let input: Arc<dyn Subscriber<I>> = Arc::new(InputSlot {
        index,
        core: Arc::downgrade(&core),
      });
      upstream.push(source.subscribe(input)?);
    }

    core.recompute(|slots| {
      for (slot, subscription) in slots.iter_mut().zip(&upstream) {
        if !slot.updated {
          slot.value = subscription.initial_value().cloned();
        }
      }
    });

    Ok(Self { core, upstream })
  }

  /// The most recently computed value. Always `Some` once built.
  pub fn value(&self) -> Option<Arc<O>> {
    self.core.publisher.value()
  }

  /// Number of upstream sources.
  pub fn input_count(&self) -> usize {
    self.upstream.len()
  }

  pub fn subscriber_count(&self) -> usize {
    self.core.publisher.subscriber_count()
  }
}

impl<I, O> Subscribable<O> for Derivation<I, O> {
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<O>>) -> Result<Subscription<O>, StoreError> {
    Subscribable::subscribe(&self.core.publisher, subscriber)
  }
}
