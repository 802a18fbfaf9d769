#![allow(dead_code)]

use std::sync::Arc;

use fibre_resource::{subscriber, FetchState, Store, Subscriber};
use parking_lot::Mutex;

/// One callback observed by a [`Recorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<V> {
  Update(V),
  Invalidate,
  Evicted,
}

/// Collects every event delivered to the subscribers it hands out.
#[derive(Clone)]
pub struct Recorder<V> {
  events: Arc<Mutex<Vec<Event<V>>>>,
}

impl<V: Clone + Send + Sync + 'static> Recorder<V> {
  pub fn new() -> Self {
    Self {
      events: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn subscriber(&self) -> Arc<dyn Subscriber<V>> {
    let on_update = {
      let events = self.events.clone();
      move |value: Arc<V>| events.lock().push(Event::Update((*value).clone()))
    };
    let on_invalidate = {
      let events = self.events.clone();
      move || events.lock().push(Event::Invalidate)
    };
    let on_evicted = {
      let events = self.events.clone();
      move || events.lock().push(Event::Evicted)
    };
    subscriber(on_update, on_invalidate, on_evicted)
  }

  pub fn events(&self) -> Vec<Event<V>> {
    self.events.lock().clone()
  }

  pub fn count(&self, event: &Event<V>) -> usize
  where
    V: PartialEq,
  {
    self.events.lock().iter().filter(|e| *e == event).count()
  }
}

/// A store with eviction disabled, usable inside or outside a runtime.
pub fn build_store<V: Send + Sync + 'static>() -> Store<&'static str, V> {
  Store::builder().id("test").no_eviction().build().unwrap()
}

pub fn data<V: Clone, E>(state: &FetchState<V, E>) -> Option<V> {
  state.data.as_deref().cloned()
}

pub fn error<V, E: Clone>(state: &FetchState<V, E>) -> Option<E> {
  state.error.as_deref().cloned()
}
