//! In-memory source and destination used by the pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pg_transfer::{
    Batch, LoadOutcome, MigrateError, ReadOptions, Result, Row, SourceReader, SqlValue,
    TableDescriptor, TableRegistry, TargetWriter,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Tables keyed by descriptor name, rows in primary-key order.
#[derive(Default)]
pub struct MemoryDb {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemoryDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, table: &str, row: Row) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> i64 {
        self.rows(table).len() as i64
    }
}

pub fn user(id: i32, email: &str) -> Row {
    Row::from_pairs(vec![
        ("id", SqlValue::I32(id)),
        ("email", SqlValue::Text(email.to_string())),
    ])
}

pub fn article(id: &str, author_id: i32, title: &str) -> Row {
    Row::from_pairs(vec![
        ("id", SqlValue::Text(id.to_string())),
        ("authorId", SqlValue::I32(author_id)),
        ("title", SqlValue::Text(title.to_string())),
    ])
}

/// users(0) <- articles(1)
pub fn blog_registry() -> TableRegistry {
    TableRegistry::new(vec![
        TableDescriptor::new("users", 0, "User"),
        TableDescriptor::new("articles", 1, "Article").with_parents(["users"]),
    ])
    .unwrap()
}

/// Two users and three articles, the second user writing two of them.
pub fn blog_source() -> Arc<MemoryDb> {
    let db = MemoryDb::new();
    db.insert("users", user(1, "ana@example.com"));
    db.insert("users", user(2, "bruno@example.com"));
    db.insert("articles", article("a1", 1, "Bitcoin basics"));
    db.insert("articles", article("a2", 2, "Wallet safety"));
    db.insert("articles", article("a3", 2, "Reading charts"));
    db
}

/// Source side of the fake.
pub struct FakeSource {
    db: Arc<MemoryDb>,
    /// Table whose extraction fails after the first page.
    pub fail_table: Option<String>,
}

impl FakeSource {
    pub fn new(db: Arc<MemoryDb>) -> Self {
        Self {
            db,
            fail_table: None,
        }
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    fn read_table(
        &self,
        table: &TableDescriptor,
        opts: ReadOptions,
    ) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(2);
        let rows = self.db.rows(&table.name);
        let fail = self.fail_table.as_deref() == Some(table.name.as_str());
        let name = table.name.clone();

        tokio::spawn(async move {
            let pages: Vec<Vec<Row>> = rows.chunks(opts.page_size).map(<[Row]>::to_vec).collect();
            if pages.is_empty() {
                let _ = tx.send(Ok(Batch::empty_final())).await;
                return;
            }

            let last = pages.len() - 1;
            for (idx, page) in pages.into_iter().enumerate() {
                if fail && idx == 1.min(last) {
                    let _ = tx
                        .send(Err(MigrateError::extraction(&name, "connection reset by peer")))
                        .await;
                    return;
                }
                let mut batch = Batch::new(page);
                if idx == last {
                    batch = batch.mark_final();
                }
                if tx.send(Ok(batch)).await.is_err() {
                    return;
                }
            }
        });

        rx
    }

    async fn row_count(&self, table: &TableDescriptor) -> Result<i64> {
        Ok(self.db.count(&table.name))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

/// Destination side of the fake: primary-key uniqueness plus optional foreign keys.
pub struct FakeDestination {
    db: Arc<MemoryDb>,
    /// (child table, column, parent table); the parent key column is `id`.
    foreign_keys: Vec<(String, String, String)>,
    /// Table whose inserts fail as if the connection was cut.
    pub severed_table: Option<String>,
    /// Cancelled on the first insert into this table.
    pub cancel_on: Option<(String, CancellationToken)>,
    /// Make sequence sync fail.
    pub sequence_error: bool,
    pub sequence_calls: Mutex<Vec<String>>,
}

impl FakeDestination {
    pub fn new(db: Arc<MemoryDb>) -> Self {
        Self {
            db,
            foreign_keys: Vec::new(),
            severed_table: None,
            cancel_on: None,
            sequence_error: false,
            sequence_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_foreign_key(mut self, child: &str, column: &str, parent: &str) -> Self {
        self.foreign_keys
            .push((child.to_string(), column.to_string(), parent.to_string()));
        self
    }
}

#[async_trait]
impl TargetWriter for FakeDestination {
    async fn insert_row(&self, table: &TableDescriptor, row: &Row) -> Result<LoadOutcome> {
        if let Some((ref name, ref token)) = self.cancel_on {
            if *name == table.name {
                token.cancel();
            }
        }
        if self.severed_table.as_deref() == Some(table.name.as_str()) {
            return Err(MigrateError::connection(
                "connection closed",
                format!("writing to {}", table.full_name()),
            ));
        }

        let key = row.key_values(&table.primary_key);
        let existing = self.db.rows(&table.name);
        if existing.iter().any(|r| r.key_values(&table.primary_key) == key) {
            return Ok(LoadOutcome::AlreadyExists);
        }

        for (child, column, parent) in &self.foreign_keys {
            if *child != table.name {
                continue;
            }
            let Some(value) = row.get(column) else {
                continue;
            };
            let parent_rows = self.db.rows(parent);
            if !parent_rows.iter().any(|p| p.get("id") == Some(value)) {
                return Ok(LoadOutcome::Rejected(format!(
                    "insert or update on table \"{}\" violates foreign key constraint (SQLSTATE 23503)",
                    table.relation
                )));
            }
        }

        self.db.insert(&table.name, row.clone());
        Ok(LoadOutcome::Written)
    }

    async fn row_count(&self, table: &TableDescriptor) -> Result<i64> {
        Ok(self.db.count(&table.name))
    }

    async fn sync_sequence(&self, table: &TableDescriptor) -> Result<bool> {
        self.sequence_calls.lock().unwrap().push(table.name.clone());
        if self.sequence_error {
            return Err(MigrateError::Config("permission denied for sequence".into()));
        }
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}
