use crate::dispatch::Dispatcher;
use crate::error::BuildError;
use crate::handles::Store;
use crate::metrics::Metrics;
use crate::runtime;
use crate::shared::StoreShared;
use crate::store::ResourceMap;
use crate::task::eviction::EvictionScheduler;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

/// How long a resource may sit without reads or writes before it is evicted.
pub const DEFAULT_MAX_RESOURCE_AGE: Duration = Duration::from_secs(240);

/// Declarative store settings.
///
/// With the `serde` feature this can be loaded from any serde format; every
/// field is optional in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StoreConfig {
  /// Identifies the store in log lines and error messages.
  pub id: String,
  /// Idle eviction age. `None` disables eviction entirely.
  pub max_resource_age: Option<Duration>,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      id: "store".to_string(),
      max_resource_age: Some(DEFAULT_MAX_RESOURCE_AGE),
    }
  }
}

/// A builder for [`Store`] instances.
pub struct StoreBuilder<K, V, H = ahash::RandomState> {
  config: StoreConfig,
  hasher: H,
  runtime: Option<Handle>,
  _key_marker: PhantomData<K>,
  _value_marker: PhantomData<V>,
}

impl<K, V, H> fmt::Debug for StoreBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StoreBuilder")
      .field("config", &self.config)
      .field("has_runtime", &self.runtime.is_some())
      .finish_non_exhaustive()
  }
}

// --- General Configuration Methods ---
impl<K, V, H> StoreBuilder<K, V, H> {
  /// Sets the id used in log lines and error messages.
  pub fn id(mut self, id: impl Into<String>) -> Self {
    self.config.id = id.into();
    self
  }

  /// Evicts resources that see no read or write for `duration`.
  pub fn max_resource_age(mut self, duration: Duration) -> Self {
    self.config.max_resource_age = Some(duration);
    self
  }

  /// Keeps resources until they are evicted explicitly.
  pub fn no_eviction(mut self) -> Self {
    self.config.max_resource_age = None;
    self
  }

  /// Replaces all settings with `config`.
  pub fn config(mut self, config: StoreConfig) -> Self {
    self.config = config;
    self
  }

  /// Sets the Tokio runtime that runs eviction timers and coordinator work.
  ///
  /// Defaults to the runtime `build` is called from.
  pub fn runtime(mut self, runtime: Handle) -> Self {
    self.runtime = Some(runtime);
    self
  }

  /// Sets the hasher for the key map.
  pub fn hasher<H2>(self, hasher: H2) -> StoreBuilder<K, V, H2> {
    StoreBuilder {
      config: self.config,
      hasher,
      runtime: self.runtime,
      _key_marker: PhantomData,
      _value_marker: PhantomData,
    }
  }
}

// --- Default Constructor ---
impl<K, V> StoreBuilder<K, V, ahash::RandomState> {
  /// Creates a builder with the default settings.
  pub fn new() -> Self {
    Self::with_hasher(ahash::RandomState::new())
  }

  /// Creates a builder preloaded with `config`.
  pub fn from_config(config: StoreConfig) -> Self {
    Self::new().config(config)
  }
}

impl<K, V, H> StoreBuilder<K, V, H> {
  /// Creates a builder with the default settings and a custom key hasher.
  pub fn with_hasher(hasher: H) -> Self {
    Self {
      config: StoreConfig::default(),
      hasher,
      runtime: None,
      _key_marker: PhantomData,
      _value_marker: PhantomData,
    }
  }
}

impl<K, V> Default for StoreBuilder<K, V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

// --- Build Methods ---
impl<K, V, H> StoreBuilder<K, V, H>
where
  K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Send + Sync + 'static,
{
  /// Builds the store.
  ///
  /// Fails with [`BuildError::RuntimeRequired`] if eviction is enabled and
  /// no runtime was given or found.
  pub fn build(self) -> Result<Store<K, V, H>, BuildError> {
    self.validate()?;

    let runtime = self.runtime.or_else(runtime::current_handle);
    let scheduler = match self.config.max_resource_age {
      Some(max_age) => {
        let handle = runtime.clone().ok_or(BuildError::RuntimeRequired)?;
        Some(EvictionScheduler::new(max_age, handle))
      }
      None => None,
    };

    let shared = Arc::new(StoreShared {
      id: self.config.id,
      resources: ResourceMap::new(self.hasher),
      dispatcher: Dispatcher::new(),
      scheduler,
      runtime,
      metrics: Metrics::new(),
    });
    Ok(Store { shared })
  }

  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.config.max_resource_age == Some(Duration::ZERO) {
      return Err(BuildError::ZeroMaxAge);
    }
    Ok(())
  }
}
