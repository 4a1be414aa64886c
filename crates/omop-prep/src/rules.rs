//! Rule-driven visit concept assignment.
//!
//! Each source file encodes its visit type differently: some files hold a
//! single kind of contact, some distinguish by stay duration, some carry an
//! explicit type field. A table-build configures one rule list per file and
//! [`assign_visit_concepts`] turns it into a `visit_concept_id` column.
//!
//! Assignment starts from 0 (no concept) and applies the rules in order.
//! [`ConceptRule::DurationCode`] and [`ConceptRule::FieldCode`] overwrite
//! whatever an earlier rule set on their matching rows;
//! [`ConceptRule::SingleCode`] only fills rows still at 0, so it doubles as
//! a fallback when listed last.

use polars::prelude::{DataFrame, NamedFrom, Series};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::frame::{MS_PER_DAY, datetime_ms_values, require_columns};
use crate::value::column_value_string;

/// Name of the column [`assign_visit_concepts`] appends.
pub const VISIT_CONCEPT_COLUMN: &str = "visit_concept_id";

/// One visit-concept codification step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConceptRule {
    /// Assign `code` to every row not yet coded.
    SingleCode { code: i64 },
    /// Assign `code` where the stay duration in whole days lies in
    /// `[min_days, max_days]`, both inclusive.
    DurationCode {
        code: i64,
        min_days: i64,
        max_days: i64,
    },
    /// Assign `code` where `column` equals `value` (string comparison of the
    /// rendered cell).
    FieldCode {
        code: i64,
        column: String,
        value: String,
    },
}

/// Appends a `visit_concept_id` column derived from `rules`.
///
/// `start` and `end` name the interval columns used by duration rules.
/// Returns a new table; rows no rule matched keep concept 0.
///
/// # Errors
///
/// [`crate::PrepError::MissingColumn`] when `start`, `end` or a
/// [`ConceptRule::FieldCode`] column is absent.
pub fn assign_visit_concepts(
    df: &DataFrame,
    start: &str,
    end: &str,
    rules: &[ConceptRule],
) -> Result<DataFrame> {
    require_columns(df, &[start, end])?;
    for rule in rules {
        if let ConceptRule::FieldCode { column, .. } = rule {
            require_columns(df, &[column])?;
        }
    }

    let starts = datetime_ms_values(df, start)?;
    let ends = datetime_ms_values(df, end)?;
    let mut concepts = vec![0i64; df.height()];

    for rule in rules {
        match rule {
            ConceptRule::SingleCode { code } => {
                for concept in &mut concepts {
                    if *concept == 0 {
                        *concept = *code;
                    }
                }
            }
            ConceptRule::DurationCode {
                code,
                min_days,
                max_days,
            } => {
                for (row, concept) in concepts.iter_mut().enumerate() {
                    let (Some(start_ms), Some(end_ms)) = (starts[row], ends[row]) else {
                        continue;
                    };
                    let days = (end_ms - start_ms) / MS_PER_DAY;
                    if days >= *min_days && days <= *max_days {
                        *concept = *code;
                    }
                }
            }
            ConceptRule::FieldCode {
                code,
                column,
                value,
            } => {
                for (row, concept) in concepts.iter_mut().enumerate() {
                    if column_value_string(df, column, row) == *value {
                        *concept = *code;
                    }
                }
            }
        }
        debug!(?rule, "applied visit concept rule");
    }

    let mut out = df.clone();
    out.with_column(Series::new(VISIT_CONCEPT_COLUMN.into(), concepts))?;
    Ok(out)
}
