//! Paginated, filterable viewer for tabular data files.
//!
//! Loads a CSV/parquet/arrow file, applies the query string given on the
//! command line exactly as a dashboard would on navigation, serves the
//! resulting page and prints the canonical URL for the final state.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use tracing::subscriber::set_global_default;
use tracing::{debug, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};

use gridstate::{
    ColumnId, ColumnKind, ColumnSpec, DataSource, Effect, EngineConfig, FilterOptionsSource,
    GridError, MemoryDataSource, Message, Schema, TableEngine, looks_temporal,
};

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Tabular data file (csv, parquet, arrow). `~` and env vars expand.
    file: String,
    /// Initial query string, e.g. "page=2&status=open&sort=%5B1%5D"
    #[clap(long, default_value = "")]
    query: String,
    /// Rows per page
    #[clap(long, default_value_t = 25)]
    page_size: usize,
    /// Print the distinct filter options for one column and exit
    #[clap(long)]
    options: Option<String>,
    /// Select every row across all pages and report the count
    #[clap(long)]
    select_all: bool,
}

fn main() -> ExitCode {
    start_logging();
    match run(Args::parse()) {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn start_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    let subscriber = Registry::default()
        .with(ErrorLayer::default())
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter));
    if set_global_default(subscriber).is_err() {
        eprintln!("Warning: logging already initialized");
    }
}

fn run(args: Args) -> Result<(), GridError> {
    let path = shellexpand::full(&args.file)
        .map_err(|e| GridError::LoadingFailed(e.to_string()))?
        .into_owned();
    let source = MemoryDataSource::from_path(PathBuf::from(path))?;
    let schema = promote_temporal_columns(&source);
    info!(columns = schema.len(), rows = source.records().len(), "dataset ready");

    if let Some(column) = args.options {
        let options = source
            .load_options(&ColumnId::from(column.as_str()), "")
            .map_err(|e| GridError::LoadingFailed(e.to_string()))?;
        for option in options {
            println!("{option}");
        }
        return Ok(());
    }

    let config = EngineConfig::default().page_size(args.page_size);
    let (mut engine, effects) = TableEngine::mount(schema.clone(), config, &args.query)?;
    let mut now = Instant::now();
    drive(&mut engine, &source, &schema, effects)?;

    if args.select_all {
        let effects = engine.update(Message::ToggleSelectAll, now)?;
        drive(&mut engine, &source, &schema, effects)?;
        println!(
            "Selected {} of {} rows",
            engine.selection().selected_count(engine.total_items()),
            engine.total_items()
        );
    }

    print_page(&engine);

    // Let the debounced URL write fire so the canonical form is shown.
    now += Duration::from_secs(1);
    for effect in engine.tick(now)? {
        if let Effect::PushUrl(url) = effect {
            println!("URL: ?{url}");
        }
    }
    if let Some(error) = engine.error() {
        eprintln!("Fetch failed: {error}");
    }
    engine.teardown();
    Ok(())
}

/// Columns loaded from dtype-less formats arrive as text; promote the ones
/// whose every value parses as a timestamp so range filters work on them.
fn promote_temporal_columns(source: &MemoryDataSource) -> Schema {
    let columns = source
        .schema()
        .columns()
        .iter()
        .map(|spec| {
            if spec.kind == ColumnKind::Text && looks_temporal(source.records(), &spec.id) {
                debug!(column = %spec.id, "promoting column to date");
                ColumnSpec::new(spec.id.clone(), spec.label.clone(), ColumnKind::Date)
            } else {
                spec.clone()
            }
        })
        .collect();
    Schema::new(columns)
}

/// Run fetch effects against the source until the engine settles. The
/// source answers synchronously here; a real host would do this async.
fn drive(
    engine: &mut TableEngine,
    source: &MemoryDataSource,
    schema: &Schema,
    effects: Vec<Effect>,
) -> Result<(), GridError> {
    let mut pending = effects;
    while let Some(request) = pending.iter().find_map(|effect| match effect {
        Effect::Fetch(request) => Some(request.clone()),
        _ => None,
    }) {
        let result = source.fetch_page(&request, schema);
        pending = engine.update(Message::FetchResolved { request, result }, Instant::now())?;
    }
    Ok(())
}

fn print_page(engine: &TableEngine) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            engine
                .schema()
                .columns()
                .iter()
                .map(|spec| spec.label.clone()),
        );
    for record in engine.rows() {
        table.add_row(
            engine
                .schema()
                .columns()
                .iter()
                .map(|spec| record.field(&spec.id).unwrap_or_default().to_string()),
        );
    }
    println!("{table}");
    println!(
        "Page {}/{} ({} rows total)",
        engine.page(),
        engine.total_pages(),
        engine.total_items()
    );
}
