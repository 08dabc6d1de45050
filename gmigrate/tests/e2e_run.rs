use gmigrate::{execute_run, BackendKind, RunArgs};
use gstorage::catalog::Catalog;
use gstorage::checkpoint::CheckpointManager;
use gstorage::config::StoragePaths;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_talent_csv(path: &Path, n: usize) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer
        .write_record(["talent_id", "full_name", "city", "skills", "employment_history"])
        .unwrap();
    for i in 0..n {
        writer
            .write_record([
                format!("p-{}", i),
                format!("Person {}", i),
                "berlin".to_string(),
                r#"["rust"]"#.to_string(),
                r#"[{"company":"acme","status":"employed","start_date":"2020-01-01"}]"#.to_string(),
            ])
            .unwrap();
    }
    writer.flush().unwrap();
}

fn run_args(source: PathBuf, base: PathBuf) -> RunArgs {
    RunArgs {
        source,
        base_path: base,
        config: None,
        backend: BackendKind::Sqlite,
        workers: Some(2),
        fail_fast: false,
        fresh: false,
    }
}

#[tokio::test]
async fn full_run_records_catalog_and_checkpoint() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("talent.csv");
    write_talent_csv(&source, 25);
    let base = dir.path().join("target");

    let report = execute_run(run_args(source.clone(), base.clone()))
        .await
        .expect("run should succeed");
    assert_eq!(report.stats.rows_processed, 25);
    assert_eq!(report.stats.rows_skipped, 0);
    assert_eq!(report.final_offset, 25);
    assert!(!report.cancelled);

    let paths = StoragePaths::new(&base);
    assert!(paths.graph_path.exists());

    let checkpoint = CheckpointManager::new(&paths.checkpoint_path)
        .load()
        .unwrap()
        .expect("checkpoint saved");
    assert_eq!(checkpoint.offset, 25);

    let catalog = Catalog::new(&paths.catalog_path).unwrap();
    let run = catalog.latest_run_log().unwrap().expect("run recorded");
    assert_eq!(run.status, "DONE");
    let stats: serde_json::Value = serde_json::from_str(&run.stats).unwrap();
    assert_eq!(stats["rows_processed"], 25);
}

#[tokio::test]
async fn second_run_resumes_from_checkpoint() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("talent.csv");
    write_talent_csv(&source, 10);
    let base = dir.path().join("target");

    execute_run(run_args(source.clone(), base.clone()))
        .await
        .unwrap();

    // Nothing new to do: the checkpoint says all 10 rows are confirmed.
    let report = execute_run(run_args(source.clone(), base.clone()))
        .await
        .unwrap();
    assert_eq!(report.final_offset, 10);
    assert_eq!(report.stats.entities_written, 0);

    // A fresh run reprocesses everything; upserts keep it harmless.
    let mut args = run_args(source, base);
    args.fresh = true;
    let report = execute_run(args).await.unwrap();
    assert_eq!(report.stats.rows_processed, 10);
    assert!(report.stats.entities_written > 0);
}
