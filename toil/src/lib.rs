#![doc = include_str!("../README.md")]

pub mod core;

/// In-memory [`JobStore`](crate::core::store::JobStore) backend.
pub mod memory;

/// Default dispatch loop and handler registry.
pub mod dispatch {
    pub mod dispatcher;
    pub mod registry;
}

/// Shared test specifications for backend implementations.
///
/// These test functions ensure consistent behavior across all JobStore
/// implementations (memory, SQLite, etc.). Backend tests should call these
/// functions with their store instance.
#[doc(hidden)]
pub mod store_spec;

/// Re-exports to simplify importing this crate types.
pub mod prelude {
    pub use super::core::{
        handler::{HandlerError, JobHandler},
        job::{Job, JobId},
        queue::JobQueue,
        store::{JobStore, JobUpdate, StorageError},
        Bytes, CancellationToken, DateTime, Duration, Utc,
    };
    pub use super::dispatch::{
        dispatcher::{DispatchError, DispatchOutcome, Dispatcher},
        registry::HandlerRegistry,
    };
}
