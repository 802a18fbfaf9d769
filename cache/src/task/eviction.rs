use crate::runtime::{self, TaskHandle};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;

/// An idle timer armed for one resource.
#[derive(Debug)]
pub(crate) struct ArmedTimer {
  pub(crate) token: u64,
  handle: TaskHandle,
}

impl ArmedTimer {
  pub(crate) fn cancel(self) {
    self.handle.cancel();
  }
}

/// Arms per-resource idle timers.
///
/// Each arm gets a store-unique token. The firing side only evicts when the
/// resource still carries the token it was armed with, which makes a timer
/// that lost a race with its own cancellation harmless.
#[derive(Debug)]
pub(crate) struct EvictionScheduler {
  max_age: Duration,
  runtime: Handle,
  next_token: AtomicU64,
}

impl EvictionScheduler {
  pub(crate) fn new(max_age: Duration, runtime: Handle) -> Self {
    Self {
      max_age,
      runtime,
      next_token: AtomicU64::new(1),
    }
  }

  #[inline]
  pub(crate) fn max_age(&self) -> Duration {
    self.max_age
  }

  /// Starts a timer that calls `on_fire(token)` after `max_age`.
  pub(crate) fn arm<F>(&self, on_fire: F) -> ArmedTimer
  where
    F: FnOnce(u64) + Send + 'static,
  {
    let token = self.next_token.fetch_add(1, Ordering::Relaxed);
    let handle = runtime::spawn_after(&self.runtime, self.max_age, move || on_fire(token));
    ArmedTimer { token, handle }
  }
}
