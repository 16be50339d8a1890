use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::domain::{FetchError, GridError, Record};
use crate::filter::FilterState;
use crate::schema::Schema;
use crate::sort::SortState;
use crate::urlcodec;

/// Identity of one query the controller has dispatched: the canonical
/// page-less encoding of the filter/sort state plus the page number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub filters_hash: String,
    pub page: usize,
}

/// One dispatched remote fetch. The sequence number orders dispatches so
/// late responses from superseded fetches can be recognized and dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub seq: u64,
    pub key: QueryKey,
    pub page: usize,
    pub page_size: usize,
    pub filters: FilterState,
    pub sort: SortState,
}

/// What a DataSource answers with. `total_items` is the post-filter count
/// across all pages.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub rows: Vec<Record>,
    pub total_items: usize,
}

/// Result of applying a state change to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The change was satisfied from the locally cached dataset.
    Local,
    /// The change repeats the newest dispatched query; nothing to do.
    Deduplicated,
    /// The host must perform this fetch and feed the result back through
    /// [`PaginationController::resolve`].
    Fetch(FetchRequest),
}

#[derive(Debug, Clone)]
enum Dataset {
    /// Rows live on a server; the controller only caches the current page.
    Remote,
    /// The full universe is client-side; every change is local-servable.
    Local(Vec<Record>),
}

/// Owns the current page, page size and row cache, decides local-vs-remote
/// per change, deduplicates redundant dispatches and rejects stale
/// responses.
#[derive(Debug, Clone)]
pub struct PaginationController {
    dataset: Dataset,
    rows: Vec<Record>,
    current_page: usize,
    page_size: usize,
    total_items: usize,
    last_applied: Option<QueryKey>,
    next_seq: u64,
    newest_seq: u64,
    loading: bool,
    error: Option<FetchError>,
}

impl PaginationController {
    /// Controller over a server-paginated dataset.
    pub fn remote(page_size: usize) -> Result<Self, GridError> {
        if page_size == 0 {
            return Err(GridError::InvalidPageSize(page_size));
        }
        Ok(PaginationController {
            dataset: Dataset::Remote,
            rows: Vec::new(),
            current_page: 1,
            page_size,
            total_items: 0,
            last_applied: None,
            next_seq: 0,
            newest_seq: 0,
            loading: false,
            error: None,
        })
    }

    /// Controller over a fully client-side dataset; never fetches.
    pub fn local(records: Vec<Record>, page_size: usize) -> Result<Self, GridError> {
        if page_size == 0 {
            return Err(GridError::InvalidPageSize(page_size));
        }
        Ok(PaginationController {
            total_items: records.len(),
            dataset: Dataset::Local(records),
            rows: Vec::new(),
            current_page: 1,
            page_size,
            last_applied: None,
            next_seq: 0,
            newest_seq: 0,
            loading: false,
            error: None,
        })
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn total_pages(&self) -> usize {
        self.total_items.div_ceil(self.page_size)
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    pub fn is_local(&self) -> bool {
        matches!(self.dataset, Dataset::Local(_))
    }

    /// Apply a filter/sort/page change. Local datasets recompute in place;
    /// remote datasets dispatch a fetch unless the newest dispatched query
    /// already matches. `last_applied` updates at dispatch time so a
    /// redundant re-invocation while the fetch is in flight still
    /// deduplicates.
    pub fn apply_change(
        &mut self,
        filters: &FilterState,
        sort: &SortState,
        page: usize,
        schema: &Schema,
    ) -> Result<Outcome, GridError> {
        if page == 0 {
            return Err(GridError::InvalidPage(page));
        }

        match &self.dataset {
            Dataset::Local(records) => {
                let mut matched: Vec<Record> = records
                    .par_iter()
                    .filter(|record| filters.matches(record))
                    .cloned()
                    .collect();
                let order = sort.order(&matched, schema);
                matched = order.into_iter().map(|i| matched[i].clone()).collect();

                self.total_items = matched.len();
                self.current_page = page.min(self.total_pages().max(1));
                let begin = (self.current_page - 1) * self.page_size;
                let end = (begin + self.page_size).min(matched.len());
                self.rows = if begin < matched.len() {
                    matched[begin..end].to_vec()
                } else {
                    Vec::new()
                };
                trace!(
                    page = self.current_page,
                    total = self.total_items,
                    "served change locally"
                );
                Ok(Outcome::Local)
            }
            Dataset::Remote => {
                let key = QueryKey {
                    filters_hash: urlcodec::filters_hash(filters, sort),
                    page,
                };
                if self.last_applied.as_ref() == Some(&key) {
                    trace!(page, "deduplicated repeat dispatch");
                    return Ok(Outcome::Deduplicated);
                }

                self.next_seq += 1;
                let request = FetchRequest {
                    seq: self.next_seq,
                    key: key.clone(),
                    page,
                    page_size: self.page_size,
                    filters: filters.clone(),
                    sort: sort.clone(),
                };
                self.newest_seq = request.seq;
                self.last_applied = Some(key);
                self.loading = true;
                debug!(seq = request.seq, page, "dispatching fetch");
                Ok(Outcome::Fetch(request))
            }
        }
    }

    /// Feed a fetch result back. Responses for superseded dispatches are
    /// discarded; failures keep the already-rendered rows and totals
    /// (stale-while-error).
    pub fn resolve(&mut self, request: &FetchRequest, result: Result<FetchResponse, FetchError>) {
        if request.seq != self.newest_seq {
            debug!(
                seq = request.seq,
                newest = self.newest_seq,
                "discarding stale fetch response"
            );
            return;
        }
        if self.last_applied.as_ref() != Some(&request.key) {
            debug!(seq = request.seq, "discarding response for retired key");
            return;
        }

        self.loading = false;
        match result {
            Ok(response) => {
                self.rows = response.rows;
                self.total_items = response.total_items;
                self.current_page = request.page;
                self.error = None;
            }
            Err(err) => {
                warn!(%err, "fetch failed, keeping previous rows");
                self.error = Some(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnKind, ColumnSpec};

    fn schema() -> Schema {
        Schema::new(vec![
            ColumnSpec::new("name", "Name", ColumnKind::Text),
            ColumnSpec::new("status", "Status", ColumnKind::Text),
        ])
    }

    fn row(n: usize, status: &str) -> Record {
        Record::new(n.to_string())
            .with_field("name", format!("lead-{n:03}"))
            .with_field("status", status)
    }

    fn rows(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| row(i, if i % 2 == 0 { "open" } else { "won" }))
            .collect()
    }

    fn fetch(pager: &mut PaginationController, page: usize) -> FetchRequest {
        match pager
            .apply_change(&FilterState::new(), &SortState::default(), page, &schema())
            .expect("valid page")
        {
            Outcome::Fetch(request) => request,
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    fn response(n: usize) -> FetchResponse {
        FetchResponse {
            rows: rows(n),
            total_items: n,
        }
    }

    #[test]
    fn zero_page_and_zero_size_are_rejected() {
        assert!(matches!(
            PaginationController::remote(0),
            Err(GridError::InvalidPageSize(0))
        ));
        let mut pager = PaginationController::remote(10).expect("pager");
        assert!(matches!(
            pager.apply_change(&FilterState::new(), &SortState::default(), 0, &schema()),
            Err(GridError::InvalidPage(0))
        ));
    }

    #[test]
    fn repeat_dispatch_is_deduplicated_while_in_flight() {
        let mut pager = PaginationController::remote(10).expect("pager");
        let _request = fetch(&mut pager, 1);
        // Same query again before the first resolves, e.g. a redundant
        // effect re-run.
        let outcome = pager
            .apply_change(&FilterState::new(), &SortState::default(), 1, &schema())
            .expect("valid page");
        assert_eq!(outcome, Outcome::Deduplicated);
    }

    #[test]
    fn stale_response_is_discarded() {
        let mut pager = PaginationController::remote(10).expect("pager");
        let request_a = fetch(&mut pager, 1);
        let request_b = fetch(&mut pager, 2);

        pager.resolve(&request_b, Ok(response(5)));
        assert_eq!(pager.rows().len(), 5);
        assert_eq!(pager.current_page(), 2);

        // A resolves late; its data must not overwrite B's.
        pager.resolve(&request_a, Ok(response(9)));
        assert_eq!(pager.rows().len(), 5);
        assert_eq!(pager.current_page(), 2);
    }

    #[test]
    fn failed_fetch_keeps_previous_rows_and_totals() {
        let mut pager = PaginationController::remote(10).expect("pager");
        let request = fetch(&mut pager, 1);
        pager.resolve(&request, Ok(response(10)));
        assert_eq!(pager.total_items(), 10);

        let request = fetch(&mut pager, 2);
        pager.resolve(
            &request,
            Err(FetchError::Network("connection reset".into())),
        );
        assert_eq!(pager.rows().len(), 10);
        assert_eq!(pager.total_items(), 10);
        assert_eq!(pager.current_page(), 1);
        assert!(!pager.loading());
        assert!(matches!(pager.error(), Some(FetchError::Network(_))));
    }

    #[test]
    fn successful_fetch_clears_a_previous_error() {
        let mut pager = PaginationController::remote(10).expect("pager");
        let request = fetch(&mut pager, 1);
        pager.resolve(&request, Err(FetchError::Network("boom".into())));
        assert!(pager.error().is_some());

        let request = fetch(&mut pager, 2);
        pager.resolve(&request, Ok(response(3)));
        assert!(pager.error().is_none());
        assert_eq!(pager.current_page(), 2);
    }

    #[test]
    fn local_dataset_serves_filter_changes_without_fetching() {
        let mut pager = PaginationController::local(rows(30), 10).expect("pager");
        let mut filters = FilterState::new();
        filters.add_value("status", "open");

        let outcome = pager
            .apply_change(&filters, &SortState::default(), 1, &schema())
            .expect("valid page");
        assert_eq!(outcome, Outcome::Local);
        assert_eq!(pager.total_items(), 15);
        assert_eq!(pager.rows().len(), 10);
        assert!(pager.rows().iter().all(|r| r.field(&"status".into()) == Some("open")));
    }

    #[test]
    fn local_dataset_clamps_out_of_range_pages() {
        let mut pager = PaginationController::local(rows(30), 10).expect("pager");
        pager
            .apply_change(&FilterState::new(), &SortState::default(), 99, &schema())
            .expect("valid page");
        assert_eq!(pager.current_page(), 3);
        assert_eq!(pager.rows().len(), 10);
    }

    #[test]
    fn local_dataset_applies_sort_before_slicing() {
        let mut pager = PaginationController::local(rows(30), 10).expect("pager");
        let sort = SortState::default().toggle(0).toggle(0); // name descending
        pager
            .apply_change(&FilterState::new(), &sort, 1, &schema())
            .expect("valid page");
        assert_eq!(pager.rows()[0].field(&"name".into()), Some("lead-029"));
    }

    #[test]
    fn total_pages_rounds_up() {
        let mut pager = PaginationController::remote(10).expect("pager");
        let request = fetch(&mut pager, 1);
        pager.resolve(&request, Ok(response(5)));
        assert_eq!(pager.total_pages(), 1);

        let request = fetch(&mut pager, 2);
        pager.resolve(
            &request,
            Ok(FetchResponse {
                rows: rows(10),
                total_items: 31,
            }),
        );
        assert_eq!(pager.total_pages(), 4);
    }
}
