#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod backoff;
pub mod dispatcher;
mod errors;
mod job_key;
mod runner;
pub mod scheduler;
pub mod schema;
pub mod store;
pub mod templates;
pub mod transport;
mod util;

/// Backoff policy for failed dispatch attempts.
pub use self::backoff::RetryPolicy;
/// Counts for one dispatch pass.
pub use self::dispatcher::DispatchSummary;
/// Error types for the store, transport and template seams.
pub use self::errors::{BuildError, StoreError, TransportError, UnknownVariant};
/// Natural-key derivation for scheduled casts.
pub use self::job_key::{job_key, stable_serialize};
/// The pipeline entry point.
pub use self::runner::{CycleSummary, Runner};
/// Scheduling primitives and configuration.
pub use self::scheduler::{EnsureOutcome, ScanReport, ScanSection, SchedulerConfig};
/// Create the `cast_jobs` table and its indexes.
pub use self::store::postgres::setup_database;
