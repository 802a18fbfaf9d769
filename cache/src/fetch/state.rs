use std::fmt;
use std::sync::Arc;

/// Something that happened to a coordinator.
pub enum FetchEvent<V, E> {
  /// A production attempt started. `more` marks a next-page fetch.
  Began { more: bool },
  /// The in-flight attempt has been running longer than the alert threshold.
  LongOperation,
  /// This coordinator's own attempt produced a value.
  Succeeded(Arc<V>),
  /// Someone wrote a new value to the key.
  Updated(Arc<V>),
  /// This coordinator's own attempt failed.
  Failed(Arc<E>),
  /// The key's value may be stale. The coordinator restarts production.
  Invalidated,
  /// The key was evicted.
  Evicted,
  /// The host reported a visibility change.
  FocusChanged(bool),
}

impl<V, E> fmt::Debug for FetchEvent<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FetchEvent::Began { more } => f.debug_struct("Began").field("more", more).finish(),
      FetchEvent::LongOperation => f.write_str("LongOperation"),
      FetchEvent::Succeeded(_) => f.write_str("Succeeded(..)"),
      FetchEvent::Updated(_) => f.write_str("Updated(..)"),
      FetchEvent::Failed(_) => f.write_str("Failed(..)"),
      FetchEvent::Invalidated => f.write_str("Invalidated"),
      FetchEvent::Evicted => f.write_str("Evicted"),
      FetchEvent::FocusChanged(visible) => f.debug_tuple("FocusChanged").field(visible).finish(),
    }
  }
}

/// The kind of attempt currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InFlight {
  Load,
  Update,
  More,
}

/// What an observer sees of its key.
///
/// The flags are independent: the long variants are only ever set alongside
/// the flag they qualify.
pub struct FetchState<V, E> {
  /// Producing with nothing to show yet.
  pub is_loading: bool,
  /// Producing in the background while showing the cached value.
  pub is_updating: bool,
  pub is_long_load: bool,
  pub is_long_update: bool,
  /// Fetching the next page on top of the data shown.
  pub is_fetching_more: bool,
  pub is_long_fetching_more: bool,
  /// Last visibility reported by the host.
  pub page_is_visible: bool,
  pub data: Option<Arc<V>>,
  pub error: Option<Arc<E>>,
}

impl<V, E> Clone for FetchState<V, E> {
  fn clone(&self) -> Self {
    Self {
      is_loading: self.is_loading,
      is_updating: self.is_updating,
      is_long_load: self.is_long_load,
      is_long_update: self.is_long_update,
      is_fetching_more: self.is_fetching_more,
      is_long_fetching_more: self.is_long_fetching_more,
      page_is_visible: self.page_is_visible,
      data: self.data.clone(),
      error: self.error.clone(),
    }
  }
}

impl<V: fmt::Debug, E: fmt::Debug> fmt::Debug for FetchState<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FetchState")
      .field("is_loading", &self.is_loading)
      .field("is_updating", &self.is_updating)
      .field("is_long_load", &self.is_long_load)
      .field("is_long_update", &self.is_long_update)
      .field("is_fetching_more", &self.is_fetching_more)
      .field("is_long_fetching_more", &self.is_long_fetching_more)
      .field("page_is_visible", &self.page_is_visible)
      .field("data", &self.data)
      .field("error", &self.error)
      .finish()
  }
}

impl<V, E> Default for FetchState<V, E> {
  fn default() -> Self {
    Self::pristine()
  }
}

impl<V, E> FetchState<V, E> {
  /// Nothing known, nothing in flight.
  pub fn pristine() -> Self {
    Self {
      is_loading: false,
      is_updating: false,
      is_long_load: false,
      is_long_update: false,
      is_fetching_more: false,
      is_long_fetching_more: false,
      page_is_visible: true,
      data: None,
      error: None,
    }
  }

  /// The state right after mounting, before the first attempt resolves.
  ///
  /// A cached value shows immediately and production counts as an update;
  /// otherwise it counts as a load. A skipping observer shows nothing.
  pub fn mounted(initial: Option<Arc<V>>, skip: bool) -> Self {
    if skip {
      return Self::pristine();
    }
    Self {
      is_loading: initial.is_none(),
      is_updating: initial.is_some(),
      data: initial,
      ..Self::pristine()
    }
  }

  /// Whether any production attempt is in flight.
  #[inline]
  pub fn is_fetching(&self) -> bool {
    self.is_loading || self.is_updating || self.is_fetching_more
  }

  /// Which in-flight flag is raised, if any.
  pub(crate) fn in_flight(&self) -> Option<InFlight> {
    if self.is_loading {
      Some(InFlight::Load)
    } else if self.is_updating {
      Some(InFlight::Update)
    } else if self.is_fetching_more {
      Some(InFlight::More)
    } else {
      None
    }
  }

  fn settle(&mut self) {
    self.is_loading = false;
    self.is_updating = false;
    self.is_long_load = false;
    self.is_long_update = false;
    self.is_fetching_more = false;
    self.is_long_fetching_more = false;
  }

  /// The state transition function.
  pub fn reduce(mut self, event: FetchEvent<V, E>) -> Self {
    match event {
      FetchEvent::Began { more } => {
        self.is_fetching_more = more;
        self.is_updating = !more && self.data.is_some();
        self.is_loading = !more && self.data.is_none();
        // A long flag only outlives a new attempt if it qualifies the same kind.
        self.is_long_load &= self.is_loading;
        self.is_long_update &= self.is_updating;
        self.is_long_fetching_more &= self.is_fetching_more;
      }
      FetchEvent::LongOperation => {
        if self.is_loading {
          self.is_long_load = true;
        } else if self.is_updating {
          self.is_long_update = true;
        } else if self.is_fetching_more {
          self.is_long_fetching_more = true;
        }
      }
      FetchEvent::Succeeded(value) | FetchEvent::Updated(value) => {
        self.settle();
        self.error = None;
        self.data = Some(value);
      }
      FetchEvent::Failed(error) => {
        self.settle();
        self.error = Some(error);
        self.data = None;
      }
      FetchEvent::Invalidated => {}
      FetchEvent::Evicted => {
        self = Self {
          page_is_visible: self.page_is_visible,
          ..Self::pristine()
        };
      }
      FetchEvent::FocusChanged(visible) => {
        self.page_is_visible = visible;
      }
    }
    self
  }

  /// Applies `event` in place.
  pub fn apply(&mut self, event: FetchEvent<V, E>) {
    *self = std::mem::take(self).reduce(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  type State = FetchState<&'static str, &'static str>;

  #[test]
  fn began_without_data_is_a_load() {
    let state = State::pristine().reduce(FetchEvent::Began { more: false });
    assert!(state.is_loading);
    assert!(!state.is_updating);
  }

  #[test]
  fn began_with_data_is_an_update() {
    let state = State::mounted(Some(Arc::new("cached")), false).reduce(FetchEvent::Began { more: false });
    assert!(!state.is_loading);
    assert!(state.is_updating);
    assert_eq!(state.data.as_deref(), Some(&"cached"));
  }

  #[test]
  fn long_operation_marks_the_active_flag_only() {
    let loading = State::pristine()
      .reduce(FetchEvent::Began { more: false })
      .reduce(FetchEvent::LongOperation);
    assert!(loading.is_long_load);
    assert!(!loading.is_long_update);

    let updating = State::mounted(Some(Arc::new("x")), false).reduce(FetchEvent::LongOperation);
    assert!(updating.is_long_update);
    assert!(!updating.is_long_load);

    let more = State::mounted(Some(Arc::new("x")), false)
      .reduce(FetchEvent::Succeeded(Arc::new("y")))
      .reduce(FetchEvent::Began { more: true })
      .reduce(FetchEvent::LongOperation);
    assert!(more.is_fetching_more);
    assert!(more.is_long_fetching_more);

    let idle = State::pristine().reduce(FetchEvent::LongOperation);
    assert!(!idle.is_long_load && !idle.is_long_update && !idle.is_long_fetching_more);
  }

  #[test]
  fn regular_attempt_replaces_a_next_page_fetch() {
    let state = State::mounted(Some(Arc::new("x")), false)
      .reduce(FetchEvent::Succeeded(Arc::new("y")))
      .reduce(FetchEvent::Began { more: true })
      .reduce(FetchEvent::LongOperation)
      .reduce(FetchEvent::Began { more: false });

    assert!(state.is_updating);
    assert!(!state.is_fetching_more);
    assert!(!state.is_long_fetching_more);
    assert!(!state.is_long_update);
    assert_eq!(state.in_flight(), Some(InFlight::Update));
  }

  #[test]
  fn repeated_update_keeps_its_long_flag() {
    let state = State::mounted(Some(Arc::new("x")), false)
      .reduce(FetchEvent::LongOperation)
      .reduce(FetchEvent::Began { more: false });
    assert!(state.is_long_update);
  }

  #[test]
  fn success_settles_every_flag() {
    let state = State::pristine()
      .reduce(FetchEvent::Began { more: false })
      .reduce(FetchEvent::LongOperation)
      .reduce(FetchEvent::Failed(Arc::new("old error")))
      .reduce(FetchEvent::Began { more: false })
      .reduce(FetchEvent::Succeeded(Arc::new("fresh")));

    assert!(!state.is_fetching());
    assert!(!state.is_long_load);
    assert!(state.error.is_none());
    assert_eq!(state.data.as_deref(), Some(&"fresh"));
  }

  #[test]
  fn failure_drops_data() {
    let state = State::mounted(Some(Arc::new("cached")), false).reduce(FetchEvent::Failed(Arc::new("NOPE")));
    assert!(!state.is_fetching());
    assert!(state.data.is_none());
    assert_eq!(state.error.as_deref(), Some(&"NOPE"));
  }

  #[test]
  fn invalidation_leaves_state_alone() {
    let state = State::mounted(Some(Arc::new("cached")), false).reduce(FetchEvent::Invalidated);
    assert!(state.is_updating);
    assert_eq!(state.data.as_deref(), Some(&"cached"));
  }

  #[test]
  fn eviction_resets_but_keeps_visibility() {
    let state = State::mounted(Some(Arc::new("cached")), false)
      .reduce(FetchEvent::FocusChanged(false))
      .reduce(FetchEvent::Evicted);
    assert!(!state.is_fetching());
    assert!(state.data.is_none());
    assert!(state.error.is_none());
    assert!(!state.page_is_visible);
  }

  #[test]
  fn skipping_observer_starts_idle() {
    let state = State::mounted(Some(Arc::new("cached")), true);
    assert!(!state.is_fetching());
    assert!(state.data.is_none());
  }
}
