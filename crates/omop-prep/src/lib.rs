//! Interval preparation ahead of the temporal engine.
//!
//! Table-builds gather per-person date intervals from many source extracts.
//! Before the gathered stack can go through overlap removal and visit
//! linkage it needs a visit concept per row ([`assign_visit_concepts`]), a
//! tie-break rank over those concepts ([`apply_concept_precedence`]) and a
//! handful of shape fixes for files that do not encode a true interval
//! ([`collapse_end_date`], [`split_start_end`]), plus row dedupe and event
//! ids ([`drop_duplicate_rows`], [`assign_event_ids`]).

pub mod error;
mod frame;
pub mod precedence;
pub mod rules;
pub mod transform;
pub mod value;

pub use error::{PrepError, Result};
pub use precedence::apply_concept_precedence;
pub use rules::{ConceptRule, VISIT_CONCEPT_COLUMN, assign_visit_concepts};
pub use transform::{assign_event_ids, collapse_end_date, drop_duplicate_rows, split_start_end};
pub use value::{any_to_string, column_value_string};
