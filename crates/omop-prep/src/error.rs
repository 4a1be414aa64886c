use polars::prelude::PolarsError;

#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    #[error("column '{0}' not found in table")]
    MissingColumn(String),

    #[error("concept value(s) {values:?} in '{column}' are not in the precedence order")]
    UnknownConcepts { column: String, values: Vec<i64> },

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

pub type Result<T> = std::result::Result<T, PrepError>;
