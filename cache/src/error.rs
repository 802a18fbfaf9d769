use thiserror::Error;

/// Errors raised by structural store operations.
///
/// These are programmer errors and fail the calling operation immediately.
/// Missing keys on `invalidate`/`evict` are not errors; they are logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
  /// A resource was explicitly created under a key that already exists.
  #[error("resource with key already exists: {key}")]
  DuplicateKey { key: String },
  /// A strict read was issued for a key the store does not hold.
  #[error("{store}: attempted to access non-existent resource: {key}")]
  NotFound { store: String, key: String },
  /// A read tried to attach to a resource while it was announcing its own
  /// eviction.
  #[error("resource is being evicted: {key}")]
  EvictionInProgress { key: String },
}

impl StoreError {
  pub(crate) fn duplicate_key<K: std::fmt::Debug>(key: &K) -> Self {
    StoreError::DuplicateKey {
      key: format!("{:?}", key),
    }
  }

  pub(crate) fn not_found<K: std::fmt::Debug>(store: &str, key: &K) -> Self {
    StoreError::NotFound {
      store: store.to_string(),
      key: format!("{:?}", key),
    }
  }

  pub(crate) fn eviction_in_progress<K: std::fmt::Debug>(key: &K) -> Self {
    StoreError::EvictionInProgress {
      key: format!("{:?}", key),
    }
  }
}

/// Errors that can occur when building a store or a coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// Timers need a Tokio runtime. No handle was configured and the builder
  /// was not called from within a runtime context.
  #[error("idle eviction and alert timers require a tokio runtime handle")]
  RuntimeRequired,
  /// `max_resource_age` was set to zero. Use `no_eviction()` to disable.
  #[error("max resource age cannot be zero; use no_eviction() to disable eviction")]
  ZeroMaxAge,
  /// `long_operation_alert` was set to zero. Leave it unset to disable.
  #[error("long operation alert threshold cannot be zero")]
  ZeroAlertThreshold,
}
