//! Cell-level conversions for row scans over mixed-dtype tables.

use polars::prelude::{AnyValue, DataFrame};

/// Renders an `AnyValue` as a plain string; nulls become the empty string.
pub fn any_to_string(value: &AnyValue) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => (*s).to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Boolean(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// String rendering of one cell; empty when the column or row is absent.
pub fn column_value_string(df: &DataFrame, name: &str, idx: usize) -> String {
    match df.column(name) {
        Ok(column) => any_to_string(&column.get(idx).unwrap_or(AnyValue::Null)),
        Err(_) => String::new(),
    }
}
