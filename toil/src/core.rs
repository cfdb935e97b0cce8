//! Implementation agnostic types for implementing job stores and re-exports of 3rd party types/crates used in public interface.

/// An alias for `chrono::DateTime<chrono::Utc>`
pub type DateTime = chrono::DateTime<chrono::Utc>;
pub use bytes::Bytes;
pub use chrono::{Duration, Utc};
pub use tokio_util::sync::CancellationToken;

pub mod handler;
pub mod job;
pub mod queue;
pub mod store;
