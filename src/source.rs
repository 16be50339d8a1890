//! The boundary the engine fetches through, plus an in-memory
//! implementation backed by polars file loading.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::{ColumnId, FetchError, GridError, Record, RowId};
use crate::filter::parse_timestamp;
use crate::pagination::{FetchRequest, FetchResponse};
use crate::schema::{ColumnKind, ColumnSpec, Schema};

/// Answers the fetches the engine dispatches. Implementations are free to
/// hit a server; the engine only sees the response fed back to it.
pub trait DataSource {
    fn fetch_page(&self, request: &FetchRequest, schema: &Schema) -> Result<FetchResponse, FetchError>;
}

/// Supplies the distinct values a filter dropdown offers for one column,
/// narrowed by what the user has typed into the dropdown so far.
pub trait FilterOptionsSource {
    fn load_options(&self, column: &ColumnId, matching: &str) -> Result<Vec<String>, FetchError>;
}

#[derive(Debug)]
enum FileType {
    Csv,
    Parquet,
    Arrow,
}

const ID_COLUMN: &str = "id";

/// Holds an entire dataset in memory as stringified records and serves
/// pages from it. Files load through polars' lazy scanners.
#[derive(Debug, Clone)]
pub struct MemoryDataSource {
    schema: Schema,
    records: Vec<Record>,
}

impl MemoryDataSource {
    pub fn new(schema: Schema, records: Vec<Record>) -> Self {
        MemoryDataSource { schema, records }
    }

    /// Load a CSV, parquet or arrow file. Every cell is held as a string;
    /// temporal columns keep their kind so range filters apply to them.
    pub fn from_path(path: PathBuf) -> Result<Self, GridError> {
        let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => GridError::LoadingFailed(format!("{}: not found", path.display())),
            _ => GridError::Io(e),
        })?;
        if !metadata.is_file() {
            return Err(GridError::LoadingFailed(format!(
                "{}: not a regular file",
                path.display()
            )));
        }

        let frame = match Self::detect_file_type(&path)? {
            FileType::Csv => Self::load_csv(&path)?,
            FileType::Parquet => Self::load_parquet(&path)?,
            FileType::Arrow => Self::load_arrow(&path)?,
        };
        let df = frame.collect()?;
        info!(rows = df.height(), path = %path.display(), "loaded dataset");

        let mut columns = Vec::with_capacity(df.width());
        for name in df.get_column_names() {
            let kind = match df.column(name.as_str())?.dtype() {
                DataType::Date | DataType::Datetime(_, _) => ColumnKind::Date,
                _ => ColumnKind::Text,
            };
            columns.push(ColumnSpec::new(name.as_str(), name.as_str(), kind));
        }
        let schema = Schema::new(columns);

        // Stringify each column in its own rayon task, then zip the
        // columns back into row-shaped records.
        let stringified: Result<Vec<Vec<String>>, PolarsError> = df
            .get_column_names()
            .par_iter()
            .map(|name| Self::stringify_column(&df, name.as_str()))
            .collect();
        let stringified = stringified?;
        for column in stringified.iter().zip(schema.columns()) {
            debug!(column = %column.1.id, cells = column.0.len(), "stringified column");
        }

        let id_index = schema.index_of(&ColumnId::from(ID_COLUMN));
        let records = (0..df.height())
            .map(|row| {
                let id = match id_index {
                    Some(column) => RowId(stringified[column][row].clone()),
                    None => RowId(row.to_string()),
                };
                let mut record = Record::new(id);
                for (spec, cells) in schema.columns().iter().zip(&stringified) {
                    record = record.with_field(spec.id.clone(), cells[row].clone());
                }
                record
            })
            .collect();

        Ok(MemoryDataSource { schema, records })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    fn detect_file_type(path: &Path) -> Result<FileType, GridError> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("CSV") => Ok(FileType::Csv),
            Some("PARQUET") | Some("PQ") => Ok(FileType::Parquet),
            Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::Arrow),
            other => Err(GridError::UnknownFileType(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    fn load_csv(path: &PathBuf) -> Result<LazyFrame, PolarsError> {
        LazyCsvReader::new(PlPath::Local(path.as_path().into()))
            .with_has_header(true)
            .finish()
    }

    fn load_parquet(path: &PathBuf) -> Result<LazyFrame, PolarsError> {
        LazyFrame::scan_parquet(
            PlPath::Local(path.as_path().into()),
            ScanArgsParquet::default(),
        )
    }

    fn load_arrow(path: &PathBuf) -> Result<LazyFrame, PolarsError> {
        LazyFrame::scan_ipc(
            PlPath::Local(path.as_path().into()),
            polars::io::ipc::IpcScanOptions,
            UnifiedScanArgs::default(),
        )
    }

    fn stringify_column(df: &DataFrame, name: &str) -> Result<Vec<String>, PolarsError> {
        let col = df.column(name)?.cast(&DataType::String)?;
        let series = col.str()?;
        Ok(series
            .into_iter()
            .map(|value| value.unwrap_or_default().to_string())
            .collect())
    }
}

impl DataSource for MemoryDataSource {
    /// Filter, sort and slice in the source, exactly as a paginating
    /// server endpoint would. `total_items` counts the whole filtered set.
    fn fetch_page(&self, request: &FetchRequest, schema: &Schema) -> Result<FetchResponse, FetchError> {
        let owned: Vec<Record> = self
            .records
            .par_iter()
            .filter(|record| request.filters.matches(record))
            .cloned()
            .collect();
        let order = request.sort.order(&owned, schema);

        let total_items = owned.len();
        let start = (request.page - 1).saturating_mul(request.page_size);
        let rows = order
            .into_iter()
            .skip(start)
            .take(request.page_size)
            .map(|idx| owned[idx].clone())
            .collect();
        Ok(FetchResponse { rows, total_items })
    }
}

impl FilterOptionsSource for MemoryDataSource {
    /// Distinct values for the column, case-insensitive narrowed, sorted.
    /// Timestamp columns are served raw; hosts bucket them client-side.
    fn load_options(&self, column: &ColumnId, matching: &str) -> Result<Vec<String>, FetchError> {
        let needle = matching.to_lowercase();
        let distinct: BTreeSet<String> = self
            .records
            .iter()
            .filter_map(|record| record.field(column))
            .filter(|value| !value.is_empty())
            .filter(|value| needle.is_empty() || value.to_lowercase().contains(&needle))
            .map(|value| value.to_string())
            .collect();
        Ok(distinct.into_iter().collect())
    }
}

/// True when every row of a date column parses as a timestamp, which is
/// how plain-text columns get promoted to range-filterable after loading
/// from formats that carry no dtypes.
pub fn looks_temporal(records: &[Record], column: &ColumnId) -> bool {
    let mut saw_value = false;
    for record in records {
        match record.field(column) {
            Some(value) if !value.is_empty() => {
                saw_value = true;
                if parse_timestamp(value).is_none() {
                    return false;
                }
            }
            _ => {}
        }
    }
    saw_value
}
