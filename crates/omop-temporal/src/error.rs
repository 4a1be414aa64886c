use polars::prelude::PolarsError;

#[derive(Debug, thiserror::Error)]
pub enum TemporalError {
    #[error("sort specification mismatch: {columns} column(s) but {orders} ordering flag(s)")]
    SortSpecMismatch { columns: usize, orders: usize },

    #[error("sort specification needs at least 3 columns (entity, start, end); got {0}")]
    SortSpecTooShort(usize),

    #[error("missing required column(s) in {table}: {}", columns.join(", "))]
    MissingColumns {
        table: &'static str,
        columns: Vec<String>,
    },

    #[error(
        "no event matched any visit interval; check that person_id values align between the two tables"
    )]
    NoVisitMatches,

    #[error("overlap removal did not converge within {0} iteration(s)")]
    IterationCap(usize),

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

pub type Result<T> = std::result::Result<T, TemporalError>;
