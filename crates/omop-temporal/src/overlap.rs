//! Removal of temporally contained interval records.
//!
//! Source extracts routinely record the same hospital stay several times:
//! once per ward transfer, once per administrative correction, once per
//! billing line. Stacking those files yields intervals fully contained in
//! another interval of the same person, which would otherwise become
//! duplicate visits. [`remove_overlap`] drops every contained row while
//! leaving partial overlaps untouched.
//!
//! The containment check only compares each row with the one directly above
//! it, which is sufficient exactly when the table is ordered by the canonical
//! prefix described in [`crate::sort`]. Removing a row can expose a new
//! containment pair (a row contained in the removed row may now sit under its
//! container), so the scan repeats until no row is flagged or the iteration
//! cap is hit.

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TemporalError};
use crate::frame::{MS_PER_DAY, datetime_ms_column, filter_rows, int_column};
use crate::sort::SortSpec;

/// What to do when the fixed-point loop hits its iteration cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapPolicy {
    /// Log a warning and return the table as reduced so far.
    WarnAndReturn,
    /// Return [`TemporalError::IterationCap`].
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlapConfig {
    /// Maximum number of removal passes.
    pub max_iterations: usize,
    pub on_cap: CapPolicy,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            on_cap: CapPolicy::WarnAndReturn,
        }
    }
}

/// Removes every interval fully contained in another surviving interval of
/// the same entity.
///
/// The table is sorted once by `sort`, then reduced to a fixed point: each
/// pass flags rows contained in the row above and drops them all, and the
/// loop ends when a pass flags nothing. Two rows that are both a single day
/// or shorter are never treated as containing one another, so genuinely
/// distinct same-day contacts survive.
///
/// Returns a new table; the input is never mutated.
///
/// # Errors
///
/// [`TemporalError::SortSpecMismatch`] or [`TemporalError::SortSpecTooShort`]
/// when `sort` is malformed (checked before any work), and
/// [`TemporalError::IterationCap`] when the cap is hit under
/// [`CapPolicy::Fail`].
pub fn remove_overlap(df: &DataFrame, sort: &SortSpec, config: &OverlapConfig) -> Result<DataFrame> {
    sort.validate()?;
    if !sort.has_canonical_prefix() {
        warn!(
            columns = ?sort.columns,
            "sort keys do not start with (person_id asc, start_date asc, end_date desc); \
             adjacent-row containment checks depend on that order"
        );
    }
    if df.height() < 2 {
        return Ok(df.clone());
    }

    let mut current = sort.apply(df)?;
    for iteration in 0..config.max_iterations {
        let contained = containment_mask(&current, sort)?;
        let flagged = contained.iter().filter(|&&hit| hit).count();
        if flagged == 0 {
            debug!(
                iterations = iteration,
                rows = current.height(),
                "overlap removal converged"
            );
            return Ok(current);
        }
        debug!(iteration = iteration + 1, removed = flagged, "removing contained rows");
        let keep: Vec<bool> = contained.iter().map(|hit| !hit).collect();
        current = filter_rows(&current, &keep)?;
    }

    match config.on_cap {
        CapPolicy::Fail => Err(TemporalError::IterationCap(config.max_iterations)),
        CapPolicy::WarnAndReturn => {
            warn!(
                max_iterations = config.max_iterations,
                "overlap removal hit the iteration cap; returning the partially reduced table"
            );
            Ok(current)
        }
    }
}

/// Flags every row contained in the row immediately above it.
///
/// A row is flagged when all of the following hold against the previous row:
/// same entity, `start >= prev.start`, `end <= prev.end`, and not both
/// durations at or under one day. Any null among the compared values leaves
/// the row unflagged.
fn containment_mask(df: &DataFrame, sort: &SortSpec) -> Result<Vec<bool>> {
    let (entity_col, start_col, end_col) = sort.role_columns();
    let entities = int_column(df, entity_col)?;
    let starts = datetime_ms_column(df, start_col)?;
    let ends = datetime_ms_column(df, end_col)?;

    let mut mask = vec![false; df.height()];
    for row in 1..df.height() {
        let (Some(entity), Some(prev_entity)) = (entities[row], entities[row - 1]) else {
            continue;
        };
        let (Some(start), Some(prev_start)) = (starts[row], starts[row - 1]) else {
            continue;
        };
        let (Some(end), Some(prev_end)) = (ends[row], ends[row - 1]) else {
            continue;
        };

        let contained = entity == prev_entity && start >= prev_start && end <= prev_end;
        let both_single_day = end - start <= MS_PER_DAY && prev_end - prev_start <= MS_PER_DAY;
        mask[row] = contained && !both_single_day;
    }
    Ok(mask)
}
