//! Export of an embedded redb database.
//!
//! Every `&str -> &[u8]` table is written as JSON lines, one
//! [`ExportRecord`] per entry, tables in name order and keys in table order.
//! The whole export runs inside one read transaction, so concurrent writers
//! never leak into a snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableHandle};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;

use snapkeep_core::{Sink, SnapError, SnapResult, Snapshottee};

/// Lines buffered between the export thread and the sink.
const CHANNEL_DEPTH: usize = 256;

macro_rules! map_err {
    ($what:literal) => {
        |e| SnapError::Frontend(format!(concat!("redb ", $what, ": {}"), e))
    };
}

/// One exported table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub table: String,
    pub key: String,
    pub value: Vec<u8>,
}

/// Snapshots a shared redb [`Database`].
#[derive(Clone)]
pub struct RedbSnapshottee {
    db: Arc<Database>,
}

impl RedbSnapshottee {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

/// Walk every table in one read transaction, sending serialized lines.
///
/// Stops quietly if the receiving side hangs up.
fn export(db: &Database, tx: &mpsc::Sender<SnapResult<Vec<u8>>>) -> SnapResult<usize> {
    let txn = db.begin_read().map_err(map_err!("transaction"))?;

    let mut names: Vec<String> = txn
        .list_tables()
        .map_err(map_err!("list tables"))?
        .map(|handle| handle.name().to_string())
        .collect();
    names.sort_unstable();

    let mut exported = 0;
    for name in names {
        let definition: TableDefinition<&str, &[u8]> = TableDefinition::new(&name);
        let table = txn.open_table(definition).map_err(map_err!("open table"))?;
        for entry in table.iter().map_err(map_err!("read"))? {
            let (key, value) = entry.map_err(map_err!("read"))?;
            let record = ExportRecord {
                table: name.clone(),
                key: key.value().to_string(),
                value: value.value().to_vec(),
            };
            let mut line = serde_json::to_vec(&record)
                .map_err(|e| SnapError::Frontend(format!("encode record: {e}")))?;
            line.push(b'\n');
            if tx.blocking_send(Ok(line)).is_err() {
                return Ok(exported);
            }
            exported += 1;
        }
    }
    Ok(exported)
}

#[async_trait]
impl Snapshottee for RedbSnapshottee {
    async fn copy(&self, sink: &mut Sink<'_>) -> SnapResult<()> {
        let (tx, mut rx) = mpsc::channel(CHANNEL_DEPTH);
        let db = Arc::clone(&self.db);
        let exporter = tokio::task::spawn_blocking(move || match export(&db, &tx) {
            Ok(records) => debug!(records, "redb export complete"),
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
            }
        });

        while let Some(line) = rx.recv().await {
            sink.write_all(&line?).await?;
        }
        sink.flush().await?;

        exporter
            .await
            .map_err(|e| SnapError::Frontend(format!("export task failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
    const ORDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");
    const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

    fn memory_db() -> Arc<Database> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .unwrap();
        Arc::new(db)
    }

    fn seed(db: &Database) {
        let txn = db.begin_write().unwrap();
        {
            let mut users = txn.open_table(USERS).unwrap();
            users.insert("bob", b"{\"age\":41}".as_slice()).unwrap();
            users.insert("alice", b"{\"age\":30}".as_slice()).unwrap();
            let mut orders = txn.open_table(ORDERS).unwrap();
            orders.insert("o-1", b"\x00\x01".as_slice()).unwrap();
        }
        txn.commit().unwrap();
    }

    fn parse(out: &[u8]) -> Vec<ExportRecord> {
        out.split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_slice(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn exports_tables_as_json_lines() {
        let db = memory_db();
        seed(&db);

        let mut out: Vec<u8> = Vec::new();
        RedbSnapshottee::new(Arc::clone(&db))
            .copy(&mut out)
            .await
            .unwrap();

        let records = parse(&out);
        let summary: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.table.as_str(), r.key.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![("orders", "o-1"), ("users", "alice"), ("users", "bob")]
        );
        assert_eq!(records[0].value, vec![0, 1]);
    }

    #[tokio::test]
    async fn empty_database_exports_nothing() {
        let mut out: Vec<u8> = Vec::new();
        RedbSnapshottee::new(memory_db())
            .copy(&mut out)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn table_with_other_types_fails_the_export() {
        let db = memory_db();
        seed(&db);
        let txn = db.begin_write().unwrap();
        txn.open_table(COUNTERS).unwrap().insert("hits", 3u64).unwrap();
        txn.commit().unwrap();

        let mut out: Vec<u8> = Vec::new();
        let err = RedbSnapshottee::new(db).copy(&mut out).await.unwrap_err();
        assert!(matches!(err, SnapError::Frontend(_)));
    }
}
