//! End-to-end flow: mount from a URL, serve fetches from an in-memory
//! source, mutate filters/sort/selection, and confirm the URL written back
//! decodes to the same state.

use std::time::{Duration, Instant};

use gridstate::{
    ColumnKind, ColumnSpec, DataSource, Effect, EngineConfig, FetchRequest, MemoryDataSource,
    Message, Record, RowId, Schema, TableEngine, urlcodec,
};

fn schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::new("name", "Name", ColumnKind::Text),
        ColumnSpec::new("stage", "Stage", ColumnKind::Text),
        ColumnSpec::new("createdAt", "Created", ColumnKind::Date),
    ])
}

fn dataset() -> MemoryDataSource {
    let records = (0..60)
        .map(|i| {
            Record::new(format!("lead-{i:03}"))
                .with_field("name", format!("Account {:02}", 59 - i))
                .with_field(
                    "stage",
                    match i % 3 {
                        0 => "prospect",
                        1 => "demo",
                        _ => "closed",
                    },
                )
                .with_field("createdAt", format!("2024-{:02}-15", (i % 12) + 1))
        })
        .collect();
    MemoryDataSource::new(schema(), records)
}

fn fetch_requests(effects: &[Effect]) -> Vec<FetchRequest> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Fetch(request) => Some(request.clone()),
            _ => None,
        })
        .collect()
}

/// Answer every outstanding fetch synchronously until the engine settles.
fn settle(engine: &mut TableEngine, source: &MemoryDataSource, effects: Vec<Effect>, now: Instant) {
    let mut pending = fetch_requests(&effects);
    while let Some(request) = pending.pop() {
        let result = source.fetch_page(&request, engine.schema());
        let next = engine
            .update(Message::FetchResolved { request, result }, now)
            .expect("resolve");
        pending.extend(fetch_requests(&next));
    }
}

#[test]
fn mount_filter_page_and_url_write_back() {
    let source = dataset();
    let t0 = Instant::now();
    let (mut engine, effects) = TableEngine::mount(
        schema(),
        EngineConfig::default().page_size(10),
        "stage=demo&page=2",
    )
    .expect("mount");
    settle(&mut engine, &source, effects, t0);

    // 20 demo rows, page 2 of 2.
    assert_eq!(engine.total_items(), 20);
    assert_eq!(engine.page(), 2);
    assert_eq!(engine.rows().len(), 10);
    assert!(
        engine
            .rows()
            .iter()
            .all(|r| r.field(&"stage".into()) == Some("demo"))
    );

    // Sorting by name keeps the filter and the page.
    let effects = engine.update(Message::ToggleSort(0), t0).expect("sort");
    settle(&mut engine, &source, effects, t0);
    let names: Vec<&str> = engine
        .rows()
        .iter()
        .filter_map(|r| r.field(&"name".into()))
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert_eq!(engine.page(), 2);

    // The debounced URL write decodes back to the state that produced it.
    let url = engine
        .tick(t0 + Duration::from_secs(1))
        .expect("tick")
        .into_iter()
        .find_map(|effect| match effect {
            Effect::PushUrl(url) => Some(url),
            _ => None,
        })
        .expect("url write");
    let decoded = urlcodec::decode(&url);
    assert_eq!(decoded.page, 2);
    assert_eq!(decoded.filters, *engine.filters());
    assert_eq!(decoded.sort, *engine.sort());
}

#[test]
fn out_of_order_responses_leave_the_newest_state_on_screen() {
    let source = dataset();
    let t0 = Instant::now();
    let (mut engine, effects) =
        TableEngine::mount(schema(), EngineConfig::default().page_size(10), "").expect("mount");
    settle(&mut engine, &source, effects, t0);

    // Dispatch two pages without resolving either.
    let first = fetch_requests(&engine.update(Message::SetPage(2), t0).expect("page 2"));
    let second = fetch_requests(&engine.update(Message::SetPage(3), t0).expect("page 3"));
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);

    // Newest response lands first, the superseded one afterwards.
    for request in second.into_iter().chain(first) {
        let result = source.fetch_page(&request, engine.schema());
        engine
            .update(Message::FetchResolved { request, result }, t0)
            .expect("resolve");
    }
    assert_eq!(engine.page(), 3);
    assert!(!engine.loading());
}

#[test]
fn select_all_survives_paging_and_inverts_per_row() {
    let source = dataset();
    let t0 = Instant::now();
    let (mut engine, effects) =
        TableEngine::mount(schema(), EngineConfig::default().page_size(10), "").expect("mount");
    settle(&mut engine, &source, effects, t0);

    engine
        .update(Message::ToggleSelectAll, t0)
        .expect("select all");
    let effects = engine.update(Message::SetPage(4), t0).expect("page");
    settle(&mut engine, &source, effects, t0);
    assert_eq!(engine.selection().selected_count(engine.total_items()), 60);

    // Deselecting one row on the new page carves it out of "all".
    let carved = engine.rows()[0].id.clone();
    let effects = engine
        .update(Message::ToggleRow(carved.clone()), t0)
        .expect("toggle");
    assert_eq!(engine.selection().selected_count(engine.total_items()), 59);
    let unselected = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::SelectionChanged(ids) => Some(ids.clone()),
            _ => None,
        })
        .expect("selection payload");
    assert_eq!(unselected, vec![carved]);
}

#[test]
fn search_applies_after_the_debounce_and_resets_paging() {
    let source = dataset();
    let t0 = Instant::now();
    let (mut engine, effects) = TableEngine::mount(
        schema(),
        EngineConfig::default().page_size(10),
        "page=5",
    )
    .expect("mount");
    settle(&mut engine, &source, effects, t0);
    assert_eq!(engine.page(), 5);

    engine
        .update(Message::SetSearch("account 0".into()), t0)
        .expect("search");
    let effects = engine
        .tick(t0 + Duration::from_millis(400))
        .expect("tick");
    settle(&mut engine, &source, effects, t0 + Duration::from_millis(400));

    assert_eq!(engine.page(), 1);
    assert_eq!(engine.total_items(), 10);
    assert!(
        engine
            .rows()
            .iter()
            .all(|r| r.field(&"name".into()).is_some_and(|n| n.starts_with("Account 0")))
    );
}

#[test]
fn selection_ids_follow_the_loaded_rows() {
    let source = dataset();
    let t0 = Instant::now();
    let (mut engine, effects) =
        TableEngine::mount(schema(), EngineConfig::default().page_size(10), "").expect("mount");
    settle(&mut engine, &source, effects, t0);

    let ids: Vec<RowId> = engine.rows().iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids[0], RowId("lead-000".into()));
    engine
        .update(Message::ToggleRow(ids[0].clone()), t0)
        .expect("toggle");
    assert!(engine.selection().is_selected(&ids[0]));
    assert!(!engine.selection().is_selected(&ids[1]));
}
