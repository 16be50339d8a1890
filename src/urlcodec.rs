//! Bidirectional mapping between engine state and a URL query string.
//!
//! Pure functions, no I/O. Encoding is canonical (stable parameter order),
//! which lets the pagination layer reuse it as a query-identity hash.
//! Decoding is total: a malformed field falls back to its default and the
//! rest of the query is still honored.
//!
//! Wire format: `page`, `search` and `sort` are reserved keys; every other
//! key names a filtered column. `sort` is a JSON array of signed 1-based
//! column positions (`-3` = column index 2 descending). A column parameter
//! holding a JSON object with `start`/`end` is a date-range filter; anything
//! else is a comma-joined value set whose values are percent-escaped so
//! embedded commas survive the trip.

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::filter::{DateRange, FilterState};
use crate::sort::{SortEntry, SortState};

/// Escapes applied to individual value-set entries before comma-joining.
/// `%` keeps the escaping reversible, `,` protects the join separator and
/// `{` keeps genuine values from masquerading as range-filter JSON.
const VALUE_ESCAPE: &AsciiSet = &CONTROLS.add(b'%').add(b',').add(b'{');

const PAGE_KEY: &str = "page";
const SEARCH_KEY: &str = "search";
const SORT_KEY: &str = "sort";

/// Everything a query string can carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedQuery {
    pub filters: FilterState,
    pub sort: SortState,
    pub page: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct RangeWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end: Option<DateTime<Utc>>,
}

/// Serialize the full state, page included.
pub fn encode(filters: &FilterState, sort: &SortState, page: usize) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.append_pair(PAGE_KEY, &page.to_string());
    append_state(&mut serializer, filters, sort);
    serializer.finish()
}

/// Canonical page-less encoding, used as the query-identity hash by the
/// pagination controller.
pub fn filters_hash(filters: &FilterState, sort: &SortState) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    append_state(&mut serializer, filters, sort);
    serializer.finish()
}

fn append_state(
    serializer: &mut form_urlencoded::Serializer<'_, String>,
    filters: &FilterState,
    sort: &SortState,
) {
    if !filters.search_term().is_empty() {
        serializer.append_pair(SEARCH_KEY, filters.search_term());
    }
    if !sort.is_empty() {
        let signed: Vec<i64> = sort.entries().iter().map(signed_position).collect();
        serializer.append_pair(
            SORT_KEY,
            &serde_json::to_string(&signed).unwrap_or_default(),
        );
    }
    for (column, values) in filters.value_filters() {
        let joined = values
            .iter()
            .map(|value| utf8_percent_encode(value, VALUE_ESCAPE).to_string())
            .collect::<Vec<_>>()
            .join(",");
        serializer.append_pair(column.as_str(), &joined);
    }
    for (column, range) in filters.range_filters() {
        let wire = RangeWire {
            start: range.start,
            end: range.end,
        };
        serializer.append_pair(
            column.as_str(),
            &serde_json::to_string(&wire).unwrap_or_default(),
        );
    }
}

/// Parse a query string back into state. Never fails; unknown or malformed
/// parameters degrade to their defaults field by field.
pub fn decode(query: &str) -> DecodedQuery {
    let mut decoded = DecodedQuery {
        page: 1,
        ..DecodedQuery::default()
    };

    let raw = query.strip_prefix('?').unwrap_or(query);
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        match key.as_ref() {
            PAGE_KEY => {
                decoded.page = value.parse().ok().filter(|page| *page >= 1).unwrap_or(1);
            }
            SEARCH_KEY => {
                decoded.filters.set_search_term(value.as_ref());
            }
            SORT_KEY => {
                decoded.sort = decode_sort(&value);
            }
            column => decode_column(&mut decoded.filters, column, &value),
        }
    }
    decoded
}

fn signed_position(entry: &SortEntry) -> i64 {
    let position = entry.column_index as i64 + 1;
    if entry.descending { -position } else { position }
}

fn decode_sort(value: &str) -> SortState {
    let Ok(signed) = serde_json::from_str::<Vec<i64>>(value) else {
        trace!(value, "dropping unparseable sort parameter");
        return SortState::default();
    };
    SortState::new(
        signed
            .into_iter()
            .filter(|position| *position != 0)
            .map(|position| SortEntry {
                column_index: position.unsigned_abs() as usize - 1,
                descending: position < 0,
            })
            .collect(),
    )
}

fn decode_column(filters: &mut FilterState, column: &str, value: &str) {
    if value.starts_with('{') {
        // Range filters arrive as JSON objects; escaped value sets can never
        // start with a literal brace.
        match serde_json::from_str::<RangeWire>(value) {
            Ok(wire) => {
                filters.set_range(column, DateRange::new(wire.start, wire.end));
            }
            Err(_) => trace!(column, value, "dropping unparseable range parameter"),
        }
        return;
    }
    for escaped in value.split(',') {
        let unescaped = percent_decode_str(escaped).decode_utf8_lossy();
        filters.add_value(column, unescaped.into_owned());
    }
}
