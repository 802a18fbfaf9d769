use parking_lot::ReentrantMutex;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

struct DispatchState<Op> {
  active: Cell<bool>,
  deferred: RefCell<VecDeque<Op>>,
}

/// Serializes store mutations and defers reentrant ones.
///
/// One thread at a time owns a dispatch pass; other threads wait on the
/// lock. An operation submitted by the owning thread while its pass is
/// running (i.e. from inside a subscriber callback) is queued and executed
/// after the current operation completes, in submission order, before the
/// outermost `run` returns.
pub(crate) struct Dispatcher<Op> {
  lock: ReentrantMutex<DispatchState<Op>>,
}

impl<Op> Dispatcher<Op> {
  pub(crate) fn new() -> Self {
    Self {
      lock: ReentrantMutex::new(DispatchState {
        active: Cell::new(false),
        deferred: RefCell::new(VecDeque::new()),
      }),
    }
  }

  /// Executes `op` now, or queues it if this thread is already mid-pass.
  ///
  /// Returns `false` if the operation was deferred.
  pub(crate) fn run<F>(&self, op: Op, exec: F) -> bool
  where
    F: Fn(Op),
  {
    let guard = self.lock.lock();
    if guard.active.get() {
      guard.deferred.borrow_mut().push_back(op);
      return false;
    }

    let _pass = ActivePass::begin(&*guard);
    let mut next = Some(op);
    while let Some(op) = next {
      exec(op);
      next = guard.deferred.borrow_mut().pop_front();
    }
    true
  }

  /// Runs `f` while holding the dispatch lock without starting a pass.
  ///
  /// Used by reads: they wait for other threads' passes to finish, but run
  /// immediately when issued from inside this thread's own pass.
  pub(crate) fn hold<R>(&self, f: impl FnOnce() -> R) -> R {
    let _guard = self.lock.lock();
    f()
  }

  /// Whether the calling thread is inside a dispatch pass.
  #[cfg(test)]
  pub(crate) fn in_pass(&self) -> bool {
    self.lock.lock().active.get()
  }
}

/// Marks a pass active and resets the state on exit, including unwinding
/// out of a panicking callback.
struct ActivePass<'a, Op> {
  state: &'a DispatchState<Op>,
}

impl<'a, Op> ActivePass<'a, Op> {
  fn begin(state: &'a DispatchState<Op>) -> Self {
    state.active.set(true);
    Self { state }
  }
}

impl<'a, Op> Drop for ActivePass<'a, Op> {
  fn drop(&mut self) {
    self.state.active.set(false);
    if std::thread::panicking() {
      self.state.deferred.borrow_mut().clear();
    }
  }
}
