use std::time::Instant;

use tracing::{debug, trace};

use crate::debounce::DebounceGate;
use crate::domain::{ColumnId, EngineConfig, FetchError, GridError, Record, RowId};
use crate::filter::{DateRange, FilterState};
use crate::pagination::{FetchRequest, FetchResponse, Outcome, PaginationController};
use crate::schema::Schema;
use crate::selection::SelectionTracker;
use crate::sort::SortState;
use crate::urlcodec;

/// Everything a host can ask the table instance to do.
#[derive(Debug, Clone)]
pub enum Message {
    AddFilterValue { column: ColumnId, value: String },
    RemoveFilterValue { column: ColumnId, value: String },
    SetRange { column: ColumnId, range: DateRange },
    /// Applied after the search debounce window elapses, not immediately.
    SetSearch(String),
    ClearFilters,
    ToggleSort(usize),
    ClearSort(usize),
    SetPage(usize),
    ToggleRow(RowId),
    ToggleSelectAll,
    /// The host finished (or failed) a fetch the engine asked for.
    FetchResolved {
        request: FetchRequest,
        result: Result<FetchResponse, FetchError>,
    },
}

/// Side effects the host must carry out. The engine itself performs no I/O:
/// it never navigates, never talks to the network.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Push this canonical query string into browser history (debounced).
    PushUrl(String),
    /// Run the fetch and feed the result back via `Message::FetchResolved`.
    Fetch(FetchRequest),
    /// The effective selection changed; payload is the unselected row ids.
    /// Identical consecutive payloads are suppressed.
    SelectionChanged(Vec<RowId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DebounceKey {
    UrlWrite,
    SearchApply,
}

#[derive(Debug, Clone)]
enum Deferred {
    Url(String),
    Search(String),
}

/// The table instance: single owner of filter, sort, selection and
/// pagination state, driven by [`Message`]s, answering with [`Effect`]s.
///
/// In-memory state is the source of truth; the URL is a debounced
/// reflection, decoded exactly once at mount. Hosts call
/// [`tick`](Self::tick) with the current instant to let debounced work
/// fire.
#[derive(Debug)]
pub struct TableEngine {
    schema: Schema,
    config: EngineConfig,
    filters: FilterState,
    sort: SortState,
    selection: SelectionTracker,
    pager: PaginationController,
    gate: DebounceGate<DebounceKey, Deferred>,
    last_selection_payload: Option<String>,
}

impl TableEngine {
    /// Mount over a server-paginated dataset. Decodes `initial_query` (the
    /// URL at navigation time) and dispatches the first fetch.
    pub fn mount(
        schema: Schema,
        config: EngineConfig,
        initial_query: &str,
    ) -> Result<(Self, Vec<Effect>), GridError> {
        let pager = PaginationController::remote(config.page_size)?;
        Self::mounted(schema, config, pager, initial_query)
    }

    /// Mount over a fully client-side dataset; changes never fetch.
    pub fn mount_local(
        schema: Schema,
        config: EngineConfig,
        records: Vec<Record>,
        initial_query: &str,
    ) -> Result<(Self, Vec<Effect>), GridError> {
        let pager = PaginationController::local(records, config.page_size)?;
        Self::mounted(schema, config, pager, initial_query)
    }

    fn mounted(
        schema: Schema,
        config: EngineConfig,
        pager: PaginationController,
        initial_query: &str,
    ) -> Result<(Self, Vec<Effect>), GridError> {
        let decoded = urlcodec::decode(initial_query);
        debug!(page = decoded.page, "mounting table instance");

        let mut engine = TableEngine {
            schema,
            config,
            filters: decoded.filters,
            sort: decoded.sort,
            selection: SelectionTracker::new(),
            pager,
            gate: DebounceGate::new(),
            last_selection_payload: None,
        };

        let mut effects = Vec::new();
        // Rehydration only: the URL already says what the state says, so no
        // write-back is scheduled. That breaks the decode -> encode ->
        // decode loop by construction.
        match engine
            .pager
            .apply_change(&engine.filters, &engine.sort, decoded.page, &engine.schema)?
        {
            Outcome::Fetch(request) => effects.push(Effect::Fetch(request)),
            Outcome::Local | Outcome::Deduplicated => {}
        }
        Ok((engine, effects))
    }

    pub fn update(&mut self, message: Message, now: Instant) -> Result<Vec<Effect>, GridError> {
        let mut effects = Vec::new();
        match message {
            Message::AddFilterValue { column, value } => {
                self.filters.add_value(column, value);
                self.query_changed(true, 1, now, &mut effects)?;
            }
            Message::RemoveFilterValue { column, value } => {
                self.filters.remove_value(&column, &value);
                self.query_changed(true, 1, now, &mut effects)?;
            }
            Message::SetRange { column, range } => {
                self.filters.set_range(column, range);
                self.query_changed(true, 1, now, &mut effects)?;
            }
            Message::SetSearch(term) => {
                trace!(term = %term, "search term pending debounce");
                self.gate.schedule(
                    DebounceKey::SearchApply,
                    Deferred::Search(term),
                    self.config.search_debounce,
                    now,
                );
            }
            Message::ClearFilters => {
                self.filters.clear_all();
                self.gate.cancel(&DebounceKey::SearchApply);
                self.query_changed(true, 1, now, &mut effects)?;
            }
            Message::ToggleSort(column_index) => {
                self.sort = self.sort.toggle(column_index);
                let page = self.pager.current_page();
                self.query_changed(false, page, now, &mut effects)?;
            }
            Message::ClearSort(column_index) => {
                self.sort = self.sort.clear(column_index);
                let page = self.pager.current_page();
                self.query_changed(false, page, now, &mut effects)?;
            }
            Message::SetPage(page) => {
                self.query_changed(false, page, now, &mut effects)?;
            }
            Message::ToggleRow(id) => {
                self.selection.toggle_row(id);
                self.emit_selection(&mut effects);
            }
            Message::ToggleSelectAll => {
                self.selection.toggle_select_all();
                self.emit_selection(&mut effects);
            }
            Message::FetchResolved { request, result } => {
                self.pager.resolve(&request, result);
                // New rows can change which loaded ids count as unselected.
                self.emit_selection(&mut effects);
            }
        }
        Ok(effects)
    }

    /// Fire debounced work whose deadline has elapsed: pending URL writes
    /// and pending search applications.
    pub fn tick(&mut self, now: Instant) -> Result<Vec<Effect>, GridError> {
        let mut effects = Vec::new();
        for (_key, deferred) in self.gate.fire_due(now) {
            match deferred {
                Deferred::Url(url) => effects.push(Effect::PushUrl(url)),
                Deferred::Search(term) => {
                    self.filters.set_search_term(term);
                    self.query_changed(true, 1, now, &mut effects)?;
                }
            }
        }
        Ok(effects)
    }

    /// Unmount: cancel every pending debounce so nothing fires afterwards.
    pub fn teardown(&mut self) {
        self.gate.cancel_all();
    }

    fn query_changed(
        &mut self,
        universe_changed: bool,
        page: usize,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) -> Result<(), GridError> {
        match self
            .pager
            .apply_change(&self.filters, &self.sort, page, &self.schema)?
        {
            Outcome::Fetch(request) => effects.push(Effect::Fetch(request)),
            Outcome::Local | Outcome::Deduplicated => {}
        }

        if universe_changed {
            self.selection.on_universe_changed();
            self.emit_selection(effects);
        }

        let url_page = if self.pager.is_local() {
            self.pager.current_page()
        } else {
            page
        };
        self.gate.schedule(
            DebounceKey::UrlWrite,
            Deferred::Url(urlcodec::encode(&self.filters, &self.sort, url_page)),
            self.config.url_debounce,
            now,
        );
        Ok(())
    }

    fn emit_selection(&mut self, effects: &mut Vec<Effect>) {
        let loaded: Vec<RowId> = self.pager.rows().iter().map(|r| r.id.clone()).collect();
        let payload = self.selection.unselected_ids(&loaded);
        let encoded = serde_json::to_string(&payload).unwrap_or_default();
        if self.last_selection_payload.as_deref() == Some(encoded.as_str()) {
            trace!("suppressing identical selection payload");
            return;
        }
        self.last_selection_payload = Some(encoded);
        effects.push(Effect::SelectionChanged(payload));
    }

    // ------------------------- observable state ------------------------- //

    pub fn rows(&self) -> &[Record] {
        self.pager.rows()
    }

    pub fn loading(&self) -> bool {
        self.pager.loading()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.pager.error()
    }

    pub fn page(&self) -> usize {
        self.pager.current_page()
    }

    pub fn total_items(&self) -> usize {
        self.pager.total_items()
    }

    pub fn total_pages(&self) -> usize {
        self.pager.total_pages()
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn sort(&self) -> &SortState {
        &self.sort
    }

    pub fn selection(&self) -> &SelectionTracker {
        &self.selection
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The canonical query string for the current in-memory state.
    pub fn current_url(&self) -> String {
        urlcodec::encode(&self.filters, &self.sort, self.pager.current_page())
    }
}
