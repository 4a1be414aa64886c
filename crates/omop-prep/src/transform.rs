//! Assembly transforms applied to source extracts before reconciliation.
//!
//! Not every source file encodes a real interval. Some carry an end date
//! that means nothing ([`collapse_end_date`]), some carry a start and an end
//! that are two unrelated point events ([`split_start_end`]). Stacked files
//! also repeat rows ([`drop_duplicate_rows`]) and event tables need a unique
//! per-row id before visit linkage ([`assign_event_ids`]).

use std::collections::BTreeSet;

use polars::prelude::{DataFrame, DataType, NamedFrom, Series, TimeUnit};

use crate::error::Result;
use crate::frame::{datetime_ms_values, filter_rows, int_values, require_columns};
use crate::value::column_value_string;

/// Replaces the `end` column with a copy of `start`, turning every record
/// into a single-day event. For files whose end date carries no meaning.
pub fn collapse_end_date(df: &DataFrame, start: &str, end: &str) -> Result<DataFrame> {
    require_columns(df, &[start, end])?;
    let mut copy = df.column(start)?.clone();
    copy.rename(end.into());
    let mut out = df.clone();
    out.with_column(copy)?;
    Ok(out)
}

/// Splits each record's start and end dates into two independent single-day
/// events.
///
/// For files where the two dates mark separate occurrences (e.g. enrollment
/// and disenrollment) rather than one span. Null dates are skipped, the
/// category is taken from the file's first non-null category value (these
/// files carry a single record type), and duplicate `(entity, date)` pairs
/// collapse to one row.
pub fn split_start_end(
    df: &DataFrame,
    entity: &str,
    start: &str,
    end: &str,
    category: &str,
) -> Result<DataFrame> {
    require_columns(df, &[entity, start, end, category])?;
    let entities = int_values(df, entity)?;
    let starts = datetime_ms_values(df, start)?;
    let ends = datetime_ms_values(df, end)?;
    let categories = int_values(df, category)?;
    let file_category = categories.iter().flatten().next().copied();

    let mut seen = BTreeSet::new();
    let mut out_entity = Vec::new();
    let mut out_date = Vec::new();
    for row in 0..df.height() {
        for date in [starts[row], ends[row]].into_iter().flatten() {
            if seen.insert((entities[row], date)) {
                out_entity.push(entities[row]);
                out_date.push(date);
            }
        }
    }

    let datetime = DataType::Datetime(TimeUnit::Milliseconds, None);
    let dates = Series::new(start.into(), out_date).cast(&datetime)?;
    let mut end_dates = dates.clone();
    end_dates.rename(end.into());
    let categories = Series::new(
        category.into(),
        vec![file_category; out_entity.len()],
    );
    let split = DataFrame::new(vec![
        Series::new(entity.into(), out_entity).into(),
        dates.into(),
        end_dates.into(),
        categories.into(),
    ])?;
    Ok(split)
}

/// Removes exact duplicate rows, keeping each first occurrence.
///
/// Compares the string rendering of every cell, which is how stacked source
/// extracts repeat records (same values, possibly different chunks/files).
pub fn drop_duplicate_rows(df: &DataFrame) -> Result<DataFrame> {
    let names = df.get_column_names_owned();
    let mut seen = BTreeSet::new();
    let mut keep = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let mut composite = String::new();
        for (pos, name) in names.iter().enumerate() {
            if pos > 0 {
                composite.push('|');
            }
            composite.push_str(&column_value_string(df, name.as_str(), row));
        }
        keep.push(seen.insert(composite));
    }
    filter_rows(df, &keep)
}

/// Appends a dense 0-based `Int64` id column, unique per row.
///
/// Visit linkage requires such an id on its event table; it also serves as
/// the table's primary key after formatting.
pub fn assign_event_ids(df: &DataFrame, name: &str) -> Result<DataFrame> {
    let ids: Vec<i64> = (0..df.height() as i64).collect();
    let mut out = df.clone();
    out.with_column(Series::new(name.into(), ids))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS_PER_DAY: i64 = 86_400_000;

    fn day(n: i64) -> i64 {
        n * MS_PER_DAY
    }

    fn datetime_column(name: &str, days: Vec<Option<i64>>) -> Series {
        Series::new(
            name.into(),
            days.into_iter()
                .map(|d| d.map(day))
                .collect::<Vec<Option<i64>>>(),
        )
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .unwrap()
    }

    fn period_frame(rows: &[(i64, Option<i64>, Option<i64>, i64)]) -> DataFrame {
        DataFrame::new(vec![
            Series::new(
                "person_id".into(),
                rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            )
            .into(),
            datetime_column("start_date", rows.iter().map(|r| r.1).collect()).into(),
            datetime_column("end_date", rows.iter().map(|r| r.2).collect()).into(),
            Series::new(
                "type_concept".into(),
                rows.iter().map(|r| r.3).collect::<Vec<_>>(),
            )
            .into(),
        ])
        .unwrap()
    }

    fn ms_values(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
        df.column(name)
            .unwrap()
            .cast(&DataType::Int64)
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect()
    }

    #[test]
    fn collapse_end_date_copies_start() {
        let df = period_frame(&[(1, Some(0), Some(9), 32817)]);
        let out = collapse_end_date(&df, "start_date", "end_date").unwrap();
        assert_eq!(ms_values(&out, "end_date"), vec![Some(day(0))]);
        assert_eq!(ms_values(&out, "start_date"), vec![Some(day(0))]);
    }

    #[test]
    fn split_start_end_yields_two_point_events() {
        let df = period_frame(&[(1, Some(0), Some(31), 32817)]);
        let out = split_start_end(&df, "person_id", "start_date", "end_date", "type_concept")
            .unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(ms_values(&out, "start_date"), vec![Some(day(0)), Some(day(31))]);
        assert_eq!(ms_values(&out, "end_date"), vec![Some(day(0)), Some(day(31))]);
        let concepts: Vec<Option<i64>> = out
            .column("type_concept")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(concepts, vec![Some(32817), Some(32817)]);
    }

    #[test]
    fn split_start_end_drops_nulls_and_duplicates() {
        let df = period_frame(&[
            (1, Some(0), None, 32817),
            (1, Some(0), Some(0), 32817),
            (2, None, None, 32817),
        ]);
        let out = split_start_end(&df, "person_id", "start_date", "end_date", "type_concept")
            .unwrap();
        // person 1 contributes the single deduplicated day; person 2 nothing
        assert_eq!(out.height(), 1);
        assert_eq!(ms_values(&out, "start_date"), vec![Some(day(0))]);
    }

    #[test]
    fn duplicate_rows_collapse_to_first() {
        let df = period_frame(&[
            (1, Some(0), Some(1), 5),
            (1, Some(0), Some(1), 5),
            (1, Some(0), Some(2), 5),
        ]);
        let out = drop_duplicate_rows(&df).unwrap();
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn event_ids_are_dense() {
        let df = period_frame(&[(1, Some(0), Some(1), 5), (2, Some(3), Some(4), 5)]);
        let out = assign_event_ids(&df, "event_id").unwrap();
        let ids: Vec<Option<i64>> = out
            .column("event_id")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(ids, vec![Some(0), Some(1)]);
    }
}
