//! Per-observer fetch coordination.
//!
//! A [`Coordinator`] drives asynchronous production of one key's value for
//! one observer and reconciles the results with the shared [`Store`](crate::Store).
//! Its observable state is a [`FetchState`], advanced by the pure
//! [`FetchState::reduce`] transition function.

mod config;
mod coordinator;
mod state;

pub use config::FetchConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder, Pager, ProduceFuture};
pub use state::{FetchEvent, FetchState};
