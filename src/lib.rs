//! Headless state engine for server-defined data tables.
//!
//! The crate keeps filter, sort, pagination and row-selection state for a
//! table whose column schema is only known at runtime. It renders nothing:
//! hosts feed [`engine::Message`]s in, receive [`engine::Effect`]s out
//! (URL writes, fetch requests, selection callbacks) and read the observable
//! state back through getters. Transport, painting and navigation stay on
//! the host side behind the narrow traits in [`source`].

pub mod debounce;
pub mod domain;
pub mod engine;
pub mod filter;
pub mod pagination;
pub mod schema;
pub mod selection;
pub mod sort;
pub mod source;
pub mod urlcodec;

pub use domain::{ColumnId, EngineConfig, FetchError, GridError, Record, RowId};
pub use engine::{Effect, Message, TableEngine};
pub use filter::{DateRange, FilterState};
pub use pagination::{FetchRequest, FetchResponse, Outcome, PaginationController, QueryKey};
pub use schema::{ColumnDescriptor, ColumnKind, ColumnSpec, Schema};
pub use selection::{SelectionMode, SelectionTracker};
pub use sort::{SortEntry, SortState};
pub use source::{DataSource, FilterOptionsSource, MemoryDataSource, looks_temporal};
