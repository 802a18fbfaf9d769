//! An in-process, key-addressed reactive cache.
//!
//! A [`Store`] keeps the latest known value for each key and lets any number
//! of observers subscribe to a key. A [`Coordinator`] drives asynchronous
//! production of a value for one observer, writes successes back into the
//! store, and keeps a [`FetchState`] that reacts to what every other
//! observer of the key does.
//!
//! # Features
//! - **Fan-out**: a write to a key reaches every subscription on that key.
//! - **Invalidation**: tells observers a value may be stale without
//!   touching it, so live coordinators refetch.
//! - **Idle eviction**: resources that see no reads or writes for a while
//!   are announced as evicted and dropped.
//! - **Race-safe fetching**: late results from superseded attempts are
//!   discarded, and slow attempts raise long-operation flags.
//! - **Derivations**: read-only values computed from several sources.
//! - **Configuration**: optional `serde` support for [`StoreConfig`] and
//!   [`FetchConfig`].

// Public modules that form the API
pub mod builder;
pub mod derivation;
pub mod error;
pub mod fetch;
pub mod handles;
pub mod metrics;
pub mod publisher;
pub mod resource;

// Internal, crate-only modules
mod dispatch;
mod runtime;
mod shared;
mod store;
mod task;

// Re-export the primary user-facing types for convenience
pub use builder::{StoreBuilder, StoreConfig, DEFAULT_MAX_RESOURCE_AGE};
pub use derivation::Derivation;
pub use error::{BuildError, StoreError};
pub use fetch::{
  Coordinator, CoordinatorBuilder, FetchConfig, FetchEvent, FetchState, Pager, ProduceFuture,
};
pub use handles::{KeyedResource, Store};
pub use metrics::MetricsSnapshot;
pub use publisher::{subscriber, FnSubscriber, Subscribable, Subscriber, Subscription};
pub use resource::Resource;
