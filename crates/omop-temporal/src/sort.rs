//! Sort specifications for interval tables.
//!
//! Containment checks in [`crate::overlap`] compare each row against the row
//! immediately above it, so they only work when the table is ordered with all
//! of an entity's intervals together, earlier starts first and longer
//! intervals first among equal starts. That is the canonical prefix
//! (`person_id` asc, `start_date` asc, `end_date` desc); any further columns
//! act as tie-breakers between otherwise identical intervals.

use polars::prelude::{DataFrame, PolarsResult, SortMultipleOptions};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TemporalError};

/// Columns to order an interval table by, with a descending flag per column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub columns: Vec<String>,
    pub descending: Vec<bool>,
}

impl SortSpec {
    pub fn new(
        columns: impl IntoIterator<Item = impl Into<String>>,
        descending: impl IntoIterator<Item = bool>,
    ) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            descending: descending.into_iter().collect(),
        }
    }

    /// The canonical prefix with no extra tie-break columns.
    pub fn canonical() -> Self {
        Self::new(["person_id", "start_date", "end_date"], [false, false, true])
    }

    /// Entity, start and end column names, in that order.
    ///
    /// Only valid after [`SortSpec::validate`] has passed.
    pub(crate) fn role_columns(&self) -> (&str, &str, &str) {
        (&self.columns[0], &self.columns[1], &self.columns[2])
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.columns.len() != self.descending.len() {
            return Err(TemporalError::SortSpecMismatch {
                columns: self.columns.len(),
                orders: self.descending.len(),
            });
        }
        if self.columns.len() < 3 {
            return Err(TemporalError::SortSpecTooShort(self.columns.len()));
        }
        Ok(())
    }

    /// Whether the first three keys are `person_id` asc, `start_date` asc,
    /// `end_date` desc.
    pub(crate) fn has_canonical_prefix(&self) -> bool {
        let canonical = Self::canonical();
        self.columns.len() >= 3
            && self.descending.len() >= 3
            && self.columns[..3] == canonical.columns[..]
            && self.descending[..3] == canonical.descending[..]
    }

    /// Stable sort with nulls placed last, as the containment scan expects.
    pub(crate) fn apply(&self, df: &DataFrame) -> PolarsResult<DataFrame> {
        df.sort(
            self.columns.clone(),
            SortMultipleOptions::default()
                .with_order_descending_multi(self.descending.clone())
                .with_maintain_order(true)
                .with_nulls_last(true),
        )
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::canonical()
    }
}
