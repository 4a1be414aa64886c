//! Visit linkage: attaching a `visit_occurrence_id` to clinical events.
//!
//! Condition, measurement, drug and procedure rows each carry a person and a
//! timestamp; the VISIT_OCCURRENCE table carries the authoritative,
//! already-deduplicated visit intervals. [`find_visit_occurrence_id`] joins
//! the two so every event that falls inside exactly one of its person's
//! visits picks up that visit's id, start and end, and every other event
//! keeps its row with nulls.
//!
//! The join expands event x visit pairs per person before filtering on
//! containment, so memory grows with the per-person product.
//! [`link_visits_in_batches`] bounds that by partitioning the person universe
//! into fixed-size batches; its output is identical to the unbatched call.

use std::collections::BTreeSet;

use polars::prelude::{
    DataFrame, DataType, IntoLazy, JoinArgs, JoinType, SortMultipleOptions, TimeUnit, col,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TemporalError};
use crate::frame::{check_required_columns, datetime_ms_column, filter_entities, filter_rows, int_column};

/// Column names the visit table must carry. The exact names are required so
/// a caller cannot hand in some other interval table by accident.
pub const VISIT_COLUMNS: [&str; 4] = [
    "person_id",
    "visit_start_datetime",
    "visit_end_datetime",
    "visit_occurrence_id",
];

/// Number of distinct entities processed per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Role assignment for the event-side columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventColumns {
    pub entity: String,
    /// Timestamp that must fall inside a visit interval.
    pub timestamp: String,
    /// Identifier unique per event row across the whole input.
    pub event_id: String,
}

impl EventColumns {
    pub fn new(
        entity: impl Into<String>,
        timestamp: impl Into<String>,
        event_id: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            timestamp: timestamp.into(),
            event_id: event_id.into(),
        }
    }
}

impl Default for EventColumns {
    fn default() -> Self {
        Self::new("person_id", "start_date", "event_id")
    }
}

/// Attaches `visit_occurrence_id`, `visit_start_datetime` and
/// `visit_end_datetime` to every event row.
///
/// An event matches a visit when the entities are equal and the event
/// timestamp lies inside the visit interval, both bounds inclusive. Visit
/// rows sharing an exact `(person, start, end)` triple are dropped entirely
/// beforehand: such groups cannot be disambiguated, so none of them may
/// match. When a timestamp falls inside several surviving visits, the
/// earliest-starting one wins. Every input event survives to the output
/// (nulls where nothing matched), sorted by `(entity, timestamp, event_id)`.
///
/// # Errors
///
/// [`TemporalError::MissingColumns`] when either table lacks its required
/// columns, and [`TemporalError::NoVisitMatches`] when not a single event
/// found a visit for its entity — that pattern means the two tables do not
/// share a key space, not that the data is sparse.
pub fn find_visit_occurrence_id(
    events: &DataFrame,
    columns: &EventColumns,
    visits: &DataFrame,
) -> Result<DataFrame> {
    let (linked, matches) = link_visits(events, columns, visits)?;
    if matches == 0 {
        return Err(TemporalError::NoVisitMatches);
    }
    Ok(linked)
}

/// [`find_visit_occurrence_id`] over fixed-size entity batches.
///
/// Both tables are restricted to one batch of entities at a time and the
/// per-batch results concatenated. Entity membership fully determines batch
/// membership, so the output equals the unbatched computation row for row;
/// the zero-match error is likewise evaluated over the whole input, not per
/// batch.
pub fn link_visits_in_batches(
    events: &DataFrame,
    columns: &EventColumns,
    visits: &DataFrame,
    batch_size: usize,
) -> Result<DataFrame> {
    let event_required = [
        columns.entity.as_str(),
        columns.timestamp.as_str(),
        columns.event_id.as_str(),
    ];
    check_required_columns(events, "events", &event_required)?;
    check_required_columns(visits, "visits", &VISIT_COLUMNS)?;

    let entities: Vec<i64> = int_column(events, &columns.entity)?
        .into_iter()
        .flatten()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let batch_size = batch_size.max(1);
    let mut total_matches = 0;
    let mut parts = Vec::new();
    for (index, chunk) in entities.chunks(batch_size).enumerate() {
        let wanted: BTreeSet<i64> = chunk.iter().copied().collect();
        // Null-entity events ride along with the first batch; they match
        // nothing but their rows must appear exactly once in the output.
        let event_batch = filter_entities(events, &columns.entity, &wanted, index == 0)?;
        let visit_batch = filter_entities(visits, "person_id", &wanted, false)?;
        let (linked, matches) = link_visits(&event_batch, columns, &visit_batch)?;
        debug!(batch = index, entities = chunk.len(), matches, "linked visit batch");
        total_matches += matches;
        parts.push(linked);
    }

    if total_matches == 0 {
        return Err(TemporalError::NoVisitMatches);
    }
    let mut parts = parts.into_iter();
    let mut out = parts.next().ok_or(TemporalError::NoVisitMatches)?;
    for part in parts {
        out.vstack_mut(&part)?;
    }
    Ok(out)
}

/// The join itself, returning the linked table and how many event x visit
/// entity pairs survived the entity join. The zero-match error is left to
/// the callers so batching can evaluate it globally.
fn link_visits(
    events: &DataFrame,
    columns: &EventColumns,
    visits: &DataFrame,
) -> Result<(DataFrame, usize)> {
    let event_required = [
        columns.entity.as_str(),
        columns.timestamp.as_str(),
        columns.event_id.as_str(),
    ];
    check_required_columns(events, "events", &event_required)?;
    check_required_columns(visits, "visits", &VISIT_COLUMNS)?;

    let events = cast_to_datetime_ms(events, &[&columns.timestamp])?;
    let visits = cast_to_datetime_ms(
        &visits.select(VISIT_COLUMNS)?,
        &["visit_start_datetime", "visit_end_datetime"],
    )?;

    // Visits sharing an exact (person, start, end) triple cannot be told
    // apart, so the whole group is removed from the candidate set.
    let visits = drop_ambiguous_visits(&visits)?;

    let events = events.sort(
        vec![columns.entity.clone(), columns.timestamp.clone()],
        SortMultipleOptions::default()
            .with_maintain_order(true)
            .with_nulls_last(true),
    )?;
    let visits = visits.sort(
        vec![
            "person_id".to_string(),
            "visit_start_datetime".to_string(),
            "visit_end_datetime".to_string(),
        ],
        SortMultipleOptions::default()
            .with_maintain_order(true)
            .with_nulls_last(true),
    )?;

    // Entity-keyed expansion join; containment is filtered afterwards.
    let merged = events
        .clone()
        .lazy()
        .join(
            visits.lazy(),
            [col(columns.entity.as_str())],
            [col("person_id")],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    let matches = merged.height() - merged.column("visit_occurrence_id")?.null_count();

    let candidates = merged
        .lazy()
        .filter(
            col(columns.timestamp.as_str())
                .gt_eq(col("visit_start_datetime"))
                .and(col(columns.timestamp.as_str()).lt_eq(col("visit_end_datetime"))),
        )
        .select([
            col(columns.entity.as_str()),
            col(columns.event_id.as_str()),
            col("visit_occurrence_id"),
            col("visit_start_datetime"),
            col("visit_end_datetime"),
        ])
        .collect()?;

    // Events landing in two visits that share a day would duplicate on the
    // event id. Earliest-starting visit wins; made deterministic by sorting
    // before the keep-first pass.
    let candidates = candidates.sort(
        vec![
            columns.entity.clone(),
            columns.event_id.clone(),
            "visit_start_datetime".to_string(),
        ],
        SortMultipleOptions::default()
            .with_maintain_order(true)
            .with_nulls_last(true),
    )?;
    let candidates = keep_first_per_event(&candidates, columns)?;

    let linked = events
        .clone()
        .lazy()
        .join(
            candidates.lazy(),
            [col(columns.entity.as_str()), col(columns.event_id.as_str())],
            [col(columns.entity.as_str()), col(columns.event_id.as_str())],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    let linked = linked.sort(
        vec![
            columns.entity.clone(),
            columns.timestamp.clone(),
            columns.event_id.clone(),
        ],
        SortMultipleOptions::default()
            .with_maintain_order(true)
            .with_nulls_last(true),
    )?;

    Ok((linked, matches))
}

fn cast_to_datetime_ms(df: &DataFrame, names: &[&str]) -> Result<DataFrame> {
    let mut out = df.clone();
    for name in names {
        let casted = out
            .column(name)?
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
        out.with_column(casted)?;
    }
    Ok(out)
}

/// Removes every visit whose `(person, start, end)` triple occurs more than
/// once — the whole group, not just the extra copies.
fn drop_ambiguous_visits(visits: &DataFrame) -> Result<DataFrame> {
    let entities = int_column(visits, "person_id")?;
    let starts = datetime_ms_column(visits, "visit_start_datetime")?;
    let ends = datetime_ms_column(visits, "visit_end_datetime")?;

    let mut counts = std::collections::BTreeMap::new();
    for row in 0..visits.height() {
        *counts
            .entry((entities[row], starts[row], ends[row]))
            .or_insert(0usize) += 1;
    }
    let keep: Vec<bool> = (0..visits.height())
        .map(|row| counts[&(entities[row], starts[row], ends[row])] == 1)
        .collect();
    filter_rows(visits, &keep)
}

/// Keeps the first candidate row per `(entity, event_id)` pair; the input is
/// already sorted with the earliest-starting visit first.
fn keep_first_per_event(candidates: &DataFrame, columns: &EventColumns) -> Result<DataFrame> {
    let entities = int_column(candidates, &columns.entity)?;
    let event_ids = int_column(candidates, &columns.event_id)?;

    let mut seen = BTreeSet::new();
    let keep: Vec<bool> = (0..candidates.height())
        .map(|row| seen.insert((entities[row], event_ids[row])))
        .collect();
    filter_rows(candidates, &keep)
}
