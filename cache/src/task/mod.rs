//! Background timers owned by the store, currently only the idle eviction
//! scheduler.

pub(crate) mod eviction;
