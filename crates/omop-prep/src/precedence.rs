//! Concept precedence ranking for overlap tie-breaks.
//!
//! When two gathered intervals cover the same stay, the table-build decides
//! which survives by listing visit concepts in order of clinical precedence
//! (e.g. inpatient before outpatient). [`apply_concept_precedence`] turns
//! that list into a dense rank column suitable as a 4th sort key for the
//! overlap reducer; validating the list up front means a new concept code in
//! the source data fails loudly instead of sorting arbitrarily.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::{DataFrame, NamedFrom, Series};

use crate::error::{PrepError, Result};
use crate::frame::{int_values, require_columns};

/// Appends `<column>_rank` holding each row's position in `order`.
///
/// Null concepts rank null. Every distinct non-null value of `column` must
/// appear in `order`.
///
/// # Errors
///
/// [`PrepError::MissingColumn`] when `column` is absent and
/// [`PrepError::UnknownConcepts`] naming every value not covered by `order`.
pub fn apply_concept_precedence(df: &DataFrame, column: &str, order: &[i64]) -> Result<DataFrame> {
    require_columns(df, &[column])?;
    let values = int_values(df, column)?;

    let known: BTreeSet<i64> = order.iter().copied().collect();
    let strays: Vec<i64> = values
        .iter()
        .flatten()
        .filter(|value| !known.contains(value))
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !strays.is_empty() {
        return Err(PrepError::UnknownConcepts {
            column: column.to_string(),
            values: strays,
        });
    }

    let ranks: BTreeMap<i64, i64> = order
        .iter()
        .enumerate()
        .map(|(rank, value)| (*value, rank as i64))
        .collect();
    let rank_values: Vec<Option<i64>> = values
        .iter()
        .map(|value| value.and_then(|v| ranks.get(&v).copied()))
        .collect();

    let mut out = df.clone();
    out.with_column(Series::new(format!("{column}_rank").into(), rank_values))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concepts(values: Vec<Option<i64>>) -> DataFrame {
        DataFrame::new(vec![
            Series::new("visit_concept_id".into(), values).into(),
        ])
        .unwrap()
    }

    #[test]
    fn ranks_follow_order() {
        let df = concepts(vec![Some(9202), Some(9201), Some(9202), None]);
        let out = apply_concept_precedence(&df, "visit_concept_id", &[9201, 9202, 0]).unwrap();
        let ranks: Vec<Option<i64>> = out
            .column("visit_concept_id_rank")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(ranks, vec![Some(1), Some(0), Some(1), None]);
    }

    #[test]
    fn stray_concepts_are_rejected() {
        let df = concepts(vec![Some(9201), Some(9999), Some(1234)]);
        let err = apply_concept_precedence(&df, "visit_concept_id", &[9201]).unwrap_err();
        match err {
            PrepError::UnknownConcepts { column, values } => {
                assert_eq!(column, "visit_concept_id");
                assert_eq!(values, vec![1234, 9999]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_column_is_reported() {
        let df = concepts(vec![Some(1)]);
        assert!(matches!(
            apply_concept_precedence(&df, "nope", &[1]),
            Err(PrepError::MissingColumn(_))
        ));
    }
}
