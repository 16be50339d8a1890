use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::domain::{ColumnId, Record};

/// Lower bound applied when a range filter has no `start`.
pub const UNBOUNDED_PAST: DateTime<Utc> = DateTime::UNIX_EPOCH;

/// Upper bound applied when a range filter has no `end`. Any
/// sufficiently-far-future instant satisfies the contract; `MAX_UTC` is the
/// obvious named constant.
pub const UNBOUNDED_FUTURE: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

/// Inclusive timestamp window over a temporal column. A missing bound is
/// open on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        DateRange { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start.unwrap_or(UNBOUNDED_PAST)
            && instant <= self.end.unwrap_or(UNBOUNDED_FUTURE)
    }
}

/// Parse a stringified cell into a timestamp: RFC 3339 first, then a bare
/// `YYYY-MM-DD` date (midnight UTC), then integer epoch milliseconds.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = value.parse::<NaiveDate>() {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|millis| DateTime::from_timestamp_millis(millis))
}

/// Active column filters plus the global search term.
///
/// Matching is AND across columns, OR within one column's value set. The
/// search term is a case-insensitive substring probe over every stringified
/// field value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    value_filters: BTreeMap<ColumnId, BTreeSet<String>>,
    range_filters: BTreeMap<ColumnId, DateRange>,
    search_term: String,
}

impl FilterState {
    pub fn new() -> Self {
        FilterState::default()
    }

    pub fn value_filters(&self) -> &BTreeMap<ColumnId, BTreeSet<String>> {
        &self.value_filters
    }

    pub fn range_filters(&self) -> &BTreeMap<ColumnId, DateRange> {
        &self.range_filters
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn is_empty(&self) -> bool {
        self.value_filters.is_empty() && self.range_filters.is_empty() && self.search_term.is_empty()
    }

    /// Insert `value` into the column's value set. Idempotent.
    pub fn add_value(&mut self, column: impl Into<ColumnId>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        trace!(column = %column, value = %value, "add value filter");
        self.value_filters.entry(column).or_default().insert(value);
    }

    /// Remove `value` from the column's value set; the key disappears with
    /// its last value.
    pub fn remove_value(&mut self, column: &ColumnId, value: &str) {
        if let Some(values) = self.value_filters.get_mut(column) {
            values.remove(value);
            if values.is_empty() {
                self.value_filters.remove(column);
            }
        }
    }

    /// Replace the column's range filter wholesale. An empty range removes
    /// the key.
    pub fn set_range(&mut self, column: impl Into<ColumnId>, range: DateRange) {
        let column = column.into();
        if range.is_empty() {
            self.range_filters.remove(&column);
        } else {
            self.range_filters.insert(column, range);
        }
    }

    /// Replace the search term verbatim. No trimming: trailing spaces are
    /// user intent mid-typing.
    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    pub fn clear_all(&mut self) {
        self.value_filters.clear();
        self.range_filters.clear();
        self.search_term.clear();
    }

    pub fn matches(&self, record: &Record) -> bool {
        for (column, values) in &self.value_filters {
            match record.field(column) {
                Some(cell) if values.contains(cell) => {}
                _ => return false,
            }
        }

        for (column, range) in &self.range_filters {
            let Some(instant) = record.field(column).and_then(parse_timestamp) else {
                return false;
            };
            if !range.contains(instant) {
                return false;
            }
        }

        if self.search_term.is_empty() {
            return true;
        }
        let needle = self.search_term.to_lowercase();
        record
            .fields
            .values()
            .any(|cell| cell.to_lowercase().contains(&needle))
    }
}
