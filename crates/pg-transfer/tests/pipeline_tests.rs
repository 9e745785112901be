//! End-to-end pipeline tests against in-memory databases.

mod common;

use std::sync::Arc;

use common::{article, blog_registry, blog_source, user, FakeDestination, FakeSource, MemoryDb};
use pg_transfer::{
    Config, MigrateError, Orchestrator, RunOptions, RunStatus, TableDescriptor, TableRegistry,
};
use tokio_util::sync::CancellationToken;

fn config(page_size: usize, row_workers: usize) -> Config {
    let mut config = Config::default();
    config.migration.page_size = page_size;
    config.migration.row_workers = row_workers;
    config
}

fn orchestrator(
    source: FakeSource,
    destination: Arc<FakeDestination>,
    config: Config,
) -> Orchestrator {
    Orchestrator::with_connections(config, blog_registry(), Arc::new(source), destination)
}

#[tokio::test]
async fn test_blog_scenario_migrates_and_validates() {
    let source = blog_source();
    let target = MemoryDb::new();
    let destination = Arc::new(FakeDestination::new(target.clone()).with_foreign_key(
        "articles", "authorId", "users",
    ));

    let report = orchestrator(FakeSource::new(source), destination, config(2, 1))
        .run(RunOptions::default(), CancellationToken::new())
        .await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.exit_code(), 0);
    assert!(report.abort.is_none());

    let migration = report.migration.as_ref().unwrap();
    let names: Vec<&str> = migration.iter().map(|m| m.table_name.as_str()).collect();
    assert_eq!(names, vec!["users", "articles"]);
    assert_eq!((migration[0].rows_read, migration[0].rows_written), (2, 2));
    assert_eq!((migration[1].rows_read, migration[1].rows_written), (3, 3));

    let validation = report.validation.as_ref().unwrap();
    assert!(validation.iter().all(|v| v.matches));
    assert_eq!(validation[1].source_count, Some(3));
    assert_eq!(validation[1].destination_count, Some(3));

    assert_eq!(target.count("users"), 2);
    assert_eq!(target.count("articles"), 3);
}

#[tokio::test]
async fn test_second_run_writes_nothing_new() {
    let source = blog_source();
    let target = MemoryDb::new();
    let destination = Arc::new(FakeDestination::new(target.clone()));

    let first = orchestrator(FakeSource::new(source.clone()), destination.clone(), config(2, 1))
        .run(RunOptions::default(), CancellationToken::new())
        .await;
    assert_eq!(first.exit_code(), 0);

    let second = orchestrator(FakeSource::new(source), destination, config(2, 1))
        .run(RunOptions::default(), CancellationToken::new())
        .await;

    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.exit_code(), 0);

    let migration = second.migration.as_ref().unwrap();
    assert_eq!(migration[0].rows_written, 0);
    assert_eq!(migration[0].already_present, 2);
    assert_eq!(migration[1].rows_written, 0);
    assert_eq!(migration[1].already_present, 3);
    assert!(migration.iter().all(|m| m.errors.is_empty()));

    // Destination is unchanged
    assert_eq!(target.count("users"), 2);
    assert_eq!(target.count("articles"), 3);
}

#[tokio::test]
async fn test_rerun_after_partial_copy_fills_the_gap() {
    let source = blog_source();
    let target = MemoryDb::new();
    target.insert("users", user(1, "ana@example.com"));
    target.insert("articles", article("a2", 2, "Wallet safety"));

    let destination = Arc::new(FakeDestination::new(target.clone()));
    let report = orchestrator(FakeSource::new(source), destination, config(1000, 1))
        .run(RunOptions::default(), CancellationToken::new())
        .await;

    assert_eq!(report.exit_code(), 0);
    let migration = report.migration.as_ref().unwrap();
    assert_eq!((migration[0].rows_written, migration[0].already_present), (1, 1));
    assert_eq!((migration[1].rows_written, migration[1].already_present), (2, 1));
    assert_eq!(target.count("articles"), 3);
}

#[tokio::test]
async fn test_rejected_row_is_contained() {
    let source = blog_source();
    // Orphaned article: author 99 does not exist
    source.insert("articles", article("a4", 99, "Ghost post"));

    let target = MemoryDb::new();
    let destination = Arc::new(FakeDestination::new(target.clone()).with_foreign_key(
        "articles", "authorId", "users",
    ));

    let report = orchestrator(FakeSource::new(source), destination, config(2, 1))
        .run(RunOptions::default(), CancellationToken::new())
        .await;

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.exit_code(), 1);

    let errors: Vec<_> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].table_name, "articles");
    assert_eq!(errors[0].row_identifier, "id=a4");
    assert!(errors[0].message.contains("foreign key"));

    let articles = &report.migration.as_ref().unwrap()[1];
    assert_eq!(articles.rows_read, 4);
    assert_eq!(articles.rows_written, 3);
    assert_eq!(
        articles.rows_read,
        articles.rows_written + articles.already_present + articles.errors.len() as u64
    );

    // Validation still runs and sees the missing row
    let validation = report.validation.as_ref().unwrap();
    assert!(!validation[1].matches);
    assert_eq!(target.count("articles"), 3);
}

#[tokio::test]
async fn test_extra_destination_row_makes_run_partial() {
    let target = MemoryDb::new();
    target.insert("users", user(3, "carla@example.com"));

    let report = orchestrator(
        FakeSource::new(blog_source()),
        Arc::new(FakeDestination::new(target.clone())),
        config(2, 1),
    )
    .run(RunOptions::default(), CancellationToken::new())
    .await;

    // Every row went in, but the counts disagree
    assert!(report.errors().next().is_none());
    let users = &report.validation.as_ref().unwrap()[0];
    assert!(!users.matches);
    assert_eq!((users.source_count, users.destination_count), (Some(2), Some(3)));

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.exit_code(), 1);
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["status"], "partial");
}

#[tokio::test]
async fn test_standalone_validation_reports_mismatch() {
    let target = MemoryDb::new();
    target.insert("users", user(1, "ana@example.com"));
    target.insert("users", user(2, "bruno@example.com"));

    let report = orchestrator(
        FakeSource::new(blog_source()),
        Arc::new(FakeDestination::new(target)),
        config(2, 1),
    )
    .validate(CancellationToken::new())
    .await;

    assert!(report.migration.is_none());
    let validation = report.validation.as_ref().unwrap();
    assert!(validation[0].matches);
    assert_eq!(validation[1].destination_count, Some(0));
    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_severed_destination_aborts_with_completed_tables_only() {
    let source = blog_source();
    let mut destination = FakeDestination::new(MemoryDb::new());
    destination.severed_table = Some("articles".into());

    let report = orchestrator(FakeSource::new(source), Arc::new(destination), config(2, 1))
        .run(RunOptions::default(), CancellationToken::new())
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code(), 2);

    let migration = report.migration.as_ref().unwrap();
    assert_eq!(migration.len(), 1);
    assert_eq!(migration[0].table_name, "users");

    let abort = report.abort.as_ref().unwrap();
    assert_eq!(abort.table_name.as_deref(), Some("articles"));
    assert!(abort.message.contains("connection closed"));

    // No validation after an abort
    assert!(report.validation.is_none());
}

#[tokio::test]
async fn test_extraction_failure_aborts_run() {
    let mut source = FakeSource::new(blog_source());
    source.fail_table = Some("articles".into());
    let target = MemoryDb::new();
    let destination = Arc::new(FakeDestination::new(target.clone()));

    let report = orchestrator(source, destination, config(2, 1))
        .run(RunOptions::default(), CancellationToken::new())
        .await;

    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.migration.as_ref().unwrap().len(), 1);
    let abort = report.abort.as_ref().unwrap();
    assert_eq!(abort.table_name.as_deref(), Some("articles"));
    assert!(abort.message.contains("Extraction failed for table articles"));

    // Rows of the first page were loaded before the failure surfaced
    assert_eq!(target.count("articles"), 2);
}

#[tokio::test]
async fn test_cancelled_before_start_still_reports() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orchestrator(
        FakeSource::new(blog_source()),
        Arc::new(FakeDestination::new(MemoryDb::new())),
        config(2, 1),
    )
    .run(RunOptions::default(), cancel)
    .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code(), 2);
    assert!(report.migration.as_ref().unwrap().is_empty());
    let abort = report.abort.as_ref().unwrap();
    assert_eq!(abort.table_name, None);
    assert_eq!(abort.message, MigrateError::Cancelled.to_string());
}

#[tokio::test]
async fn test_cancelled_between_rows() {
    let cancel = CancellationToken::new();
    let target = MemoryDb::new();
    let mut destination = FakeDestination::new(target.clone());
    destination.cancel_on = Some(("articles".into(), cancel.clone()));

    let report = orchestrator(FakeSource::new(blog_source()), Arc::new(destination), config(2, 1))
        .run(RunOptions::default(), cancel)
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    let migration = report.migration.as_ref().unwrap();
    assert_eq!(migration.len(), 1);
    assert_eq!(migration[0].table_name, "users");

    let abort = report.abort.as_ref().unwrap();
    assert_eq!(abort.table_name.as_deref(), Some("articles"));
    assert!(abort.message.contains("cancelled"));

    // The row in flight finished; no further row was started
    assert_eq!(target.count("articles"), 1);
}

#[tokio::test]
async fn test_concurrent_row_workers_keep_counts() {
    let source = MemoryDb::new();
    for id in 1..=50 {
        source.insert("users", user(id, &format!("user{}@example.com", id)));
    }
    for id in 1..=120 {
        source.insert("articles", article(&format!("a{:03}", id), id % 50 + 1, "post"));
    }

    let target = MemoryDb::new();
    let destination = Arc::new(FakeDestination::new(target.clone()).with_foreign_key(
        "articles", "authorId", "users",
    ));

    let report = orchestrator(FakeSource::new(source), destination, config(7, 4))
        .run(RunOptions::default(), CancellationToken::new())
        .await;

    assert_eq!(report.exit_code(), 0);
    let migration = report.migration.as_ref().unwrap();
    assert_eq!(migration[0].rows_written, 50);
    assert_eq!(migration[1].rows_written, 120);
    assert_eq!(target.count("articles"), 120);
}

#[tokio::test]
async fn test_empty_table_is_migrated_as_zero() {
    let source = MemoryDb::new();
    source.insert("users", user(1, "ana@example.com"));

    let report = orchestrator(
        FakeSource::new(source),
        Arc::new(FakeDestination::new(MemoryDb::new())),
        config(2, 1),
    )
    .run(RunOptions::default(), CancellationToken::new())
    .await;

    assert_eq!(report.exit_code(), 0);
    let articles = &report.migration.as_ref().unwrap()[1];
    assert_eq!(articles.rows_read, 0);
    assert_eq!(articles.rows_written, 0);
}

#[tokio::test]
async fn test_skip_validation() {
    let report = orchestrator(
        FakeSource::new(blog_source()),
        Arc::new(FakeDestination::new(MemoryDb::new())),
        config(2, 1),
    )
    .run(
        RunOptions {
            skip_validation: true,
        },
        CancellationToken::new(),
    )
    .await;

    assert_eq!(report.exit_code(), 0);
    assert!(report.validation.is_none());
}

#[tokio::test]
async fn test_sequences_synced_after_success() {
    let destination = Arc::new(FakeDestination::new(MemoryDb::new()));
    let report = orchestrator(FakeSource::new(blog_source()), destination.clone(), config(2, 1))
        .run(RunOptions::default(), CancellationToken::new())
        .await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        *destination.sequence_calls.lock().unwrap(),
        vec!["users".to_string(), "articles".to_string()]
    );
}

#[tokio::test]
async fn test_sequence_failure_only_warns() {
    let mut destination = FakeDestination::new(MemoryDb::new());
    destination.sequence_error = true;

    let report = orchestrator(FakeSource::new(blog_source()), Arc::new(destination), config(2, 1))
        .run(RunOptions::default(), CancellationToken::new())
        .await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_sequences_not_synced_when_disabled() {
    let destination = Arc::new(FakeDestination::new(MemoryDb::new()));
    let mut cfg = config(2, 1);
    cfg.migration.sync_sequences = false;

    orchestrator(FakeSource::new(blog_source()), destination.clone(), cfg)
        .run(RunOptions::default(), CancellationToken::new())
        .await;

    assert!(destination.sequence_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_dry_run_plan_counts_source_rows() {
    let target = MemoryDb::new();
    let plan = orchestrator(
        FakeSource::new(blog_source()),
        Arc::new(FakeDestination::new(target.clone())),
        config(2, 1),
    )
    .plan()
    .await
    .unwrap();

    assert_eq!(plan.tables[0].source_rows, Some(2));
    assert_eq!(plan.tables[1].source_rows, Some(3));
    assert_eq!(plan.total_rows(), 5);
    assert_eq!(target.count("users"), 0);
}

#[test]
fn test_misordered_registry_is_refused() {
    let result = TableRegistry::new(vec![
        TableDescriptor::new("articles", 0, "Article").with_parents(["users"]),
        TableDescriptor::new("users", 1, "User"),
    ]);
    assert!(matches!(result, Err(MigrateError::Registry(_))));
    assert_eq!(result.unwrap_err().exit_code(), 2);
}
