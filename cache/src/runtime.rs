use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// Returns the handle of the Tokio runtime the caller is running on, if any.
pub(crate) fn current_handle() -> Option<Handle> {
  Handle::try_current().ok()
}

/// A spawned background task that can be cancelled.
///
/// Dropping the handle does not stop the task; call [`TaskHandle::cancel`].
#[derive(Debug)]
pub(crate) struct TaskHandle(AbortHandle);

impl TaskHandle {
  #[inline]
  pub(crate) fn cancel(&self) {
    self.0.abort();
  }
}

/// Spawns a future onto `runtime`.
pub(crate) fn spawn<F>(runtime: &Handle, future: F) -> TaskHandle
where
  F: Future<Output = ()> + Send + 'static,
{
  TaskHandle(runtime.spawn(future).abort_handle())
}

/// Runs `f` once `delay` has elapsed, unless cancelled first.
pub(crate) fn spawn_after<F>(runtime: &Handle, delay: Duration, f: F) -> TaskHandle
where
  F: FnOnce() + Send + 'static,
{
  spawn(runtime, async move {
    tokio::time::sleep(delay).await;
    f();
  })
}
