//! Movie revenue warehouse
//!
//! Incrementally loads staged OMDb metadata and daily box-office revenue into
//! a star schema:
//! - Flatten nested metadata payloads into staging rows
//! - Generate the calendar dimension once
//! - Append novel dimension members with dense surrogate keys
//! - Split multi-valued attributes into bridge relations
//! - Insert deduplicated revenue facts
//!
//! Every load is append-only and safe to re-run on the same staging data.

pub mod bridge;
pub mod date_dim;
pub mod dimension;
pub mod error;
pub mod fact;
pub mod flatten;
pub mod journal;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod staging;
pub mod store;

pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineInput, RunPolicy, RunReport, Step, StepOutcome};
pub use store::Store;

use serde::Serialize;

/// Row counts produced by one load step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadCounts {
    /// New rows appended
    pub inserted: u64,
    /// Candidates already present, left untouched
    pub skipped: u64,
    /// Candidates dropped because a key did not resolve
    pub unresolved: u64,
}
