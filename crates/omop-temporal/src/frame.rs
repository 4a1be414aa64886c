//! Column extraction and filtering helpers shared by the engine modules.
//!
//! The engine works on two physical representations: entity ids, event ids
//! and categories as `Int64`, timestamps as `Datetime(ms)`. Inputs arriving
//! in other integer or temporal dtypes are cast on extraction.

use std::collections::BTreeSet;

use polars::prelude::{BooleanChunked, DataFrame, DataType, NewChunkedArray, TimeUnit};

use crate::error::{Result, TemporalError};

pub(crate) const MS_PER_DAY: i64 = 86_400_000;

/// Returns an error naming every required column absent from `df`.
pub(crate) fn check_required_columns(
    df: &DataFrame,
    table: &'static str,
    required: &[&str],
) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| df.column(name).is_err())
        .map(|name| (*name).to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TemporalError::MissingColumns {
            table,
            columns: missing,
        })
    }
}

/// Extracts a column as `Int64` values.
pub(crate) fn int_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

/// Extracts a temporal column as milliseconds since the epoch.
pub(crate) fn datetime_ms_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df
        .column(name)?
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
        .cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

/// Keeps the rows of `df` whose `keep` flag is set.
pub(crate) fn filter_rows(df: &DataFrame, keep: &[bool]) -> Result<DataFrame> {
    let mask = BooleanChunked::from_slice("keep".into(), keep);
    Ok(df.filter(&mask)?)
}

/// Restricts `df` to rows whose entity id is in `wanted`.
///
/// Rows with a null entity id are kept only when `keep_nulls` is set; they
/// can never match anything but must survive in exactly one batch so the
/// batched result keeps left-join totality.
pub(crate) fn filter_entities(
    df: &DataFrame,
    column: &str,
    wanted: &BTreeSet<i64>,
    keep_nulls: bool,
) -> Result<DataFrame> {
    let entities = int_column(df, column)?;
    let keep: Vec<bool> = entities
        .iter()
        .map(|entity| entity.map_or(keep_nulls, |id| wanted.contains(&id)))
        .collect();
    filter_rows(df, &keep)
}
