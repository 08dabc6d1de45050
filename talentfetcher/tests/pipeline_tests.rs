use gstorage::config::{LoaderConfig, StoragePaths};
use gstorage::models::RunReport;
use gstorage::pipeline::{CancelFlag, RunState};
use gstorage::store::memory::MemoryGraphStore;
use gstorage::GStorage;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use talentfetcher::episodes::DeriveOptions;
use talentfetcher::models::TalentColumns;
use talentfetcher::{CsvCursor, SourceParams, TalentMapper};
use tempfile::TempDir;

const HEADERS: [&str; 6] = [
    "talent_id",
    "full_name",
    "city",
    "country",
    "skills",
    "employment_history",
];

fn write_csv(path: &Path, rows: &[[&str; 6]]) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(HEADERS).unwrap();
    for row in rows {
        writer.write_record(row).unwrap();
    }
    writer.flush().unwrap();
}

fn sample_rows(n: usize) -> Vec<[String; 6]> {
    (0..n)
        .map(|i| {
            [
                format!("p-{}", i),
                format!("Person {}", i),
                if i % 2 == 0 { "berlin" } else { "hamburg" }.to_string(),
                "DE".to_string(),
                r#"["rust"]"#.to_string(),
                format!(
                    r#"[{{"company":"acme","status":"employed","start_date":"2020-01-0{}"}}]"#,
                    (i % 9) + 1
                ),
            ]
        })
        .collect()
}

fn write_sample(path: &Path, rows: &[[String; 6]]) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(HEADERS).unwrap();
    for row in rows {
        writer.write_record(row.iter()).unwrap();
    }
    writer.flush().unwrap();
}

fn test_config() -> LoaderConfig {
    LoaderConfig {
        chunk_size: 4,
        batch_size: 5,
        checkpoint_interval: 10,
        workers: 2,
        queue_depth: 4,
        max_retries: 2,
        retry_base_ms: 1,
        ..LoaderConfig::default()
    }
}

fn derive_options(config: &LoaderConfig) -> DeriveOptions {
    DeriveOptions {
        idle_gap_days: config.idle_gap_days,
        infer_initial: config.infer_initial,
        default_start: config.default_start,
    }
}

async fn run_pipeline(
    base: &Path,
    store: &MemoryGraphStore,
    csv_path: &Path,
    config: LoaderConfig,
) -> (RunReport, RunState) {
    let storage = GStorage::open_with_store(StoragePaths::new(base), Arc::new(store.clone()))
        .expect("open storage");
    let cursor = CsvCursor::open(csv_path, config.chunk_size, &SourceParams::default())
        .expect("open source");
    let mapper = TalentMapper::new(TalentColumns::default(), derive_options(&config));
    let mut pipeline = storage.pipeline(config, Box::new(cursor), Arc::new(mapper));
    let report = pipeline
        .run("talent.csv", CancelFlag::new())
        .await
        .expect("run should succeed");
    (report, pipeline.state())
}

#[tokio::test]
async fn basic_load_shares_reference_entities() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("talent.csv");
    write_csv(
        &csv_path,
        &[
            ["p-0", "A", "berlin", "DE", "", ""],
            ["p-1", "B", "berlin", "DE", "", ""],
            ["p-2", "C", "", "", "", ""],
        ],
    );

    let store = MemoryGraphStore::new();
    let (report, state) =
        run_pipeline(dir.path().join("base").as_path(), &store, &csv_path, test_config()).await;

    assert_eq!(state, RunState::Done);
    assert_eq!(report.stats.rows_processed, 3);
    assert_eq!(store.node_count_for_label("Person"), 3);
    assert_eq!(store.node_count_for_label("City"), 1);
    assert_eq!(store.rel_count(), 2);
    assert_eq!(report.stats.refs_deduped, 1);
}

#[tokio::test]
async fn corrupt_chunk_is_isolated() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("talent.csv");
    // Two chunks of two rows; the second chunk has a malformed record.
    let mut file = std::fs::File::create(&csv_path).unwrap();
    write!(
        file,
        "talent_id,city\n\
         p-0,berlin\n\
         p-1,hamburg\n\
         p-2,munich,EXTRA\n\
         p-3,cologne\n"
    )
    .unwrap();

    let store = MemoryGraphStore::new();
    let mut config = test_config();
    config.chunk_size = 2;
    let (report, state) = run_pipeline(dir.path().join("base").as_path(), &store, &csv_path, config).await;

    assert_eq!(state, RunState::Done);
    assert_eq!(report.stats.chunks_skipped, 1);
    assert_eq!(report.stats.rows_processed, 2);
    assert_eq!(store.node_count_for_label("Person"), 2);
    // The skipped chunk's rows are still accounted for on resume.
    assert_eq!(report.final_offset, 4);
}

#[tokio::test]
async fn crash_and_resume_matches_clean_run() {
    let dir = TempDir::new().unwrap();
    let rows = sample_rows(100);

    let prefix_path = dir.path().join("prefix.csv");
    write_sample(&prefix_path, &rows[..50]);
    let full_path = dir.path().join("full.csv");
    write_sample(&full_path, &rows);

    // Interrupted run: confirms the first 50 rows, then "crashes" (ends).
    let resumed_store = MemoryGraphStore::new();
    let base = dir.path().join("resumed");
    let (report, _) = run_pipeline(&base, &resumed_store, &prefix_path, test_config()).await;
    assert_eq!(report.final_offset, 50);

    // Resume over the full source from the saved checkpoint.
    let (report, _) = run_pipeline(&base, &resumed_store, &full_path, test_config()).await;
    assert_eq!(report.final_offset, 100);
    assert_eq!(report.stats.rows_processed, 100);

    // A clean single run over the same source.
    let clean_store = MemoryGraphStore::new();
    let (clean_report, _) = run_pipeline(
        dir.path().join("clean").as_path(),
        &clean_store,
        &full_path,
        test_config(),
    )
    .await;

    assert_eq!(clean_report.stats.rows_processed, 100);
    assert_eq!(resumed_store.node_count(), clean_store.node_count());
    assert_eq!(resumed_store.rel_count(), clean_store.rel_count());
    assert_eq!(
        resumed_store.node_count_for_label("Person"),
        clean_store.node_count_for_label("Person")
    );
}

#[tokio::test]
async fn rerunning_a_finished_load_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("talent.csv");
    write_sample(&csv_path, &sample_rows(20));

    let store = MemoryGraphStore::new();
    let mut config = test_config();
    config.clear_checkpoint_on_done = true;
    run_pipeline(dir.path().join("base").as_path(), &store, &csv_path, config.clone()).await;
    let nodes = store.node_count();
    let rels = store.rel_count();

    run_pipeline(dir.path().join("base").as_path(), &store, &csv_path, config).await;
    assert_eq!(store.node_count(), nodes);
    assert_eq!(store.rel_count(), rels);
}

#[tokio::test]
async fn employment_states_flow_into_the_graph() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("talent.csv");
    write_csv(
        &csv_path,
        &[[
            "p-0",
            "A",
            "berlin",
            "DE",
            r#"["rust","sql"]"#,
            r#"[{"company":"acme","status":"employed","start_date":"2017-01-01","end_date":"2018-01-01"},
                {"company":"globex","status":"contract","start_date":"2019-06-01"}]"#,
        ]],
    );

    let store = MemoryGraphStore::new();
    let (_, state) =
        run_pipeline(dir.path().join("base").as_path(), &store, &csv_path, test_config()).await;
    assert_eq!(state, RunState::Done);

    // Two episodes with a 17-month gap: employed, idle, contracting.
    let states = store.nodes_for_label("EmploymentState");
    assert_eq!(states.len(), 3);
    let current: Vec<_> = states
        .iter()
        .filter(|(_, props)| props.get("is_current") == Some(&true.into()))
        .collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].1.get("state"), Some(&"CONTRACTING".into()));

    assert_eq!(store.node_count_for_label("Company"), 2);
    assert_eq!(store.node_count_for_label("Skill"), 2);

    // The person's status comes from the episode data.
    let person = store.node_props("Person", "p-0").unwrap();
    assert_eq!(person.get("current_status"), Some(&"CONTRACTING".into()));
    assert_eq!(person.get("status_source"), Some(&"episodes".into()));
}
