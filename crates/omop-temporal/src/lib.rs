//! Temporal-interval reconciliation and visit linkage for OMOP-CDM builds.
//!
//! Table builders assemble per-person date intervals from heterogeneous
//! source extracts, run [`remove_overlap`] to drop records fully contained in
//! another record, optionally coalesce the survivors into continuous periods
//! with [`group_dates`], and finally resolve the `visit_occurrence_id`
//! foreign key of every clinical event against the resulting visit table
//! with [`find_visit_occurrence_id`] (or its batching wrapper,
//! [`link_visits_in_batches`]).
//!
//! Everything operates on in-memory polars tables; reading sources, concept
//! mapping and schema formatting happen elsewhere.

pub mod error;
mod frame;
pub mod group;
pub mod link;
pub mod overlap;
pub mod sort;

pub use error::{Result, TemporalError};
pub use group::{IntervalColumns, group_dates};
pub use link::{
    DEFAULT_BATCH_SIZE, EventColumns, VISIT_COLUMNS, find_visit_occurrence_id,
    link_visits_in_batches,
};
pub use overlap::{CapPolicy, OverlapConfig, remove_overlap};
pub use sort::SortSpec;
