//! Coalescing of nearby interval records into continuous periods.
//!
//! Observation periods are built from visit-level intervals: a person seen
//! every few months has, for research purposes, been under continuous
//! observation the whole time. [`group_dates`] merges every run of
//! same-entity intervals whose gaps stay under a threshold into one period
//! and tags it with the most frequent category among the absorbed rows.

use std::collections::BTreeMap;

use polars::prelude::{
    DataFrame, DataType, NamedFrom, Series, SortMultipleOptions, TimeUnit,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::frame::{MS_PER_DAY, check_required_columns, datetime_ms_column, int_column};

/// Role assignment for the four columns the grouper works on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalColumns {
    pub entity: String,
    pub start: String,
    pub end: String,
    pub category: String,
}

impl IntervalColumns {
    pub fn new(
        entity: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            start: start.into(),
            end: end.into(),
            category: category.into(),
        }
    }

    fn as_slice(&self) -> [&str; 4] {
        [&self.entity, &self.start, &self.end, &self.category]
    }
}

impl Default for IntervalColumns {
    fn default() -> Self {
        Self::new("person_id", "start_date", "end_date", "type_concept")
    }
}

/// Merges runs of same-entity intervals separated by less than `n_days`.
///
/// Intervals are ordered by `(entity asc, start asc, end desc)` and scanned
/// once: a run ends at the entity's last interval or wherever the gap to the
/// next interval reaches `n_days` (a gap of exactly `n_days` is a break, not
/// a merge; negative gaps, i.e. overlaps, always merge). Each run becomes one
/// output row spanning the run's first start to its last end, with the
/// category mode over the run — ties resolved to the smallest value among the
/// most frequent, for reproducibility.
///
/// The output carries the four role columns only, as `Int64` ids/categories
/// and `Datetime(ms)` dates. An entity with a single interval is copied
/// through unchanged.
///
/// # Errors
///
/// [`crate::TemporalError::MissingColumns`] when a role column is absent.
pub fn group_dates(df: &DataFrame, columns: &IntervalColumns, n_days: i64) -> Result<DataFrame> {
    check_required_columns(df, "intervals", &columns.as_slice())?;

    let sorted = df.sort(
        vec![
            columns.entity.clone(),
            columns.start.clone(),
            columns.end.clone(),
        ],
        SortMultipleOptions::default()
            .with_order_descending_multi([false, false, true])
            .with_maintain_order(true)
            .with_nulls_last(true),
    )?;

    let entities = int_column(&sorted, &columns.entity)?;
    let starts = datetime_ms_column(&sorted, &columns.start)?;
    let ends = datetime_ms_column(&sorted, &columns.end)?;
    let categories = int_column(&sorted, &columns.category)?;

    let gap_ms = n_days * MS_PER_DAY;
    let rows = sorted.height();
    let mut out_entity = Vec::new();
    let mut out_start = Vec::new();
    let mut out_end = Vec::new();
    let mut out_category = Vec::new();

    let mut run_start = 0;
    for row in 0..rows {
        let last_of_entity = match (entities.get(row + 1).copied().flatten(), entities[row]) {
            (Some(next), Some(current)) => next != current,
            _ => true,
        };
        // A gap of exactly n_days already separates two periods. Unknown
        // dates cannot be bridged, so they break the run as well.
        let gap_break = !last_of_entity
            && match (ends[row], starts[row + 1]) {
                (Some(end), Some(next_start)) => next_start - end >= gap_ms,
                _ => true,
            };
        if last_of_entity || gap_break {
            out_entity.push(entities[run_start]);
            out_start.push(starts[run_start]);
            out_end.push(ends[row]);
            out_category.push(mode_value(&categories[run_start..=row]));
            run_start = row + 1;
        }
    }

    debug!(input_rows = rows, periods = out_entity.len(), "grouped interval runs");

    let datetime = DataType::Datetime(TimeUnit::Milliseconds, None);
    let grouped = DataFrame::new(vec![
        Series::new(columns.entity.as_str().into(), out_entity).into(),
        Series::new(columns.start.as_str().into(), out_start)
            .cast(&datetime)?
            .into(),
        Series::new(columns.end.as_str().into(), out_end)
            .cast(&datetime)?
            .into(),
        Series::new(columns.category.as_str().into(), out_category).into(),
    ])?;
    Ok(grouped)
}

/// Most frequent value in the slice, nulls ignored; ties resolve to the
/// smallest value among the most frequent.
fn mode_value(values: &[Option<i64>]) -> Option<i64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for value in values.iter().flatten() {
        *counts.entry(*value).or_insert(0) += 1;
    }
    let mut best: Option<(i64, usize)> = None;
    for (value, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_picks_most_frequent() {
        assert_eq!(mode_value(&[Some(1), Some(2), Some(2)]), Some(2));
    }

    #[test]
    fn mode_tie_breaks_to_smallest() {
        assert_eq!(mode_value(&[Some(2), Some(1)]), Some(1));
        assert_eq!(mode_value(&[Some(3), Some(3), Some(1), Some(1)]), Some(1));
    }

    #[test]
    fn mode_ignores_nulls() {
        assert_eq!(mode_value(&[None, Some(5), None]), Some(5));
        assert_eq!(mode_value(&[None, None]), None);
    }
}
