use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// Lock-free counters for a store. All updates are relaxed atomics.
#[derive(Debug)]
pub struct Metrics {
  // --- Access ---
  pub(crate) reads: CachePadded<AtomicU64>,
  pub(crate) writes: CachePadded<AtomicU64>,
  pub(crate) mutations: CachePadded<AtomicU64>,

  // --- Broadcasts ---
  pub(crate) invalidations: CachePadded<AtomicU64>,
  pub(crate) evicted_manually: CachePadded<AtomicU64>,
  pub(crate) evicted_idle: CachePadded<AtomicU64>,

  // --- Lifecycle ---
  pub(crate) resources_created: CachePadded<AtomicU64>,
  pub(crate) missing_key_warnings: CachePadded<AtomicU64>,
  pub(crate) deferred_operations: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      reads: CachePadded::new(AtomicU64::new(0)),
      writes: CachePadded::new(AtomicU64::new(0)),
      mutations: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      evicted_manually: CachePadded::new(AtomicU64::new(0)),
      evicted_idle: CachePadded::new(AtomicU64::new(0)),
      resources_created: CachePadded::new(AtomicU64::new(0)),
      missing_key_warnings: CachePadded::new(AtomicU64::new(0)),
      deferred_operations: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn snapshot(&self, live_resources: usize) -> MetricsSnapshot {
    MetricsSnapshot {
      reads: self.reads.load(Ordering::Relaxed),
      writes: self.writes.load(Ordering::Relaxed),
      mutations: self.mutations.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      evicted_manually: self.evicted_manually.load(Ordering::Relaxed),
      evicted_idle: self.evicted_idle.load(Ordering::Relaxed),
      resources_created: self.resources_created.load(Ordering::Relaxed),
      missing_key_warnings: self.missing_key_warnings.load(Ordering::Relaxed),
      deferred_operations: self.deferred_operations.load(Ordering::Relaxed),
      live_resources,
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time copy of a store's counters.
#[derive(Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
  /// Subscribing reads, including strict ones that succeeded.
  pub reads: u64,
  /// Writes, whether issued directly, by a coordinator, or by `mutate`.
  pub writes: u64,
  /// Calls to `mutate`.
  pub mutations: u64,
  /// Invalidation broadcasts actually sent (missing keys excluded).
  pub invalidations: u64,
  /// Resources removed through `evict`.
  pub evicted_manually: u64,
  /// Resources removed by the idle timer.
  pub evicted_idle: u64,
  /// Resources created, lazily or explicitly.
  pub resources_created: u64,
  /// `invalidate`/`evict` calls that named a key the store did not hold.
  pub missing_key_warnings: u64,
  /// Operations queued because they were issued from inside a callback.
  pub deferred_operations: u64,
  /// Resources currently held.
  pub live_resources: usize,
  /// Seconds since the store was built.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("reads", &self.reads)
      .field("writes", &self.writes)
      .field("mutations", &self.mutations)
      .field("invalidations", &self.invalidations)
      .field("evicted_manually", &self.evicted_manually)
      .field("evicted_idle", &self.evicted_idle)
      .field("resources_created", &self.resources_created)
      .field("missing_key_warnings", &self.missing_key_warnings)
      .field("deferred_operations", &self.deferred_operations)
      .field("live_resources", &self.live_resources)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
