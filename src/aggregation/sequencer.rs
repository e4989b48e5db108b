//! Result sequencing
//!
//! Converts the rows of one aggregation into indexed [`MeasurementValue`]s.
//! Rows are indexed in the order the store returned them and the output is
//! sorted by that index, so callers see a stable order whatever the store did.

use super::query::COUNT_FIELD;
use super::store::{AggregationRow, TIME_FIELD};
use crate::types::MeasurementValue;

/// Turns aggregation rows into ordered, indexed measurement values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultSequencer {
    limit: Option<usize>,
}

impl ResultSequencer {
    /// Sequencer that keeps every row
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequencer that keeps at most `limit` values
    ///
    /// Guards against stores that ignore the query limit.
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }

    /// Sequence `rows`
    ///
    /// A row without a count yields `0`, a row without a label yields `""`.
    pub fn sequence(&self, rows: Vec<AggregationRow>) -> Vec<MeasurementValue> {
        let mut values: Vec<MeasurementValue> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                MeasurementValue::bucket(
                    row.get_f64(COUNT_FIELD, 0.0),
                    row.get_string(TIME_FIELD, ""),
                    index,
                )
            })
            .collect();

        values.sort_by_key(|v| v.index);

        if let Some(limit) = self.limit {
            values.truncate(limit);
        }
        values
    }
}
