//! In-memory table store.
//!
//! All instances created by one [`StoreFactory`](super::StoreFactory) share
//! the same tables, the way separate connections share one database. Keys
//! are ordered, so scans are real range reads.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{Options, Row, Status, StorageAdapter};
use crate::error::Result;

type Tables = HashMap<String, BTreeMap<String, Row>>;

/// Table data shared by every `MemoryStore` handle of one run.
#[derive(Debug, Default)]
pub struct SharedTables {
    tables: RwLock<Tables>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    shared: Arc<SharedTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shared(shared: Arc<SharedTables>) -> Self {
        Self { shared }
    }
}

fn project(row: &Row, fields: Option<&[String]>) -> Row {
    match fields {
        None => row.clone(),
        Some(names) => names
            .iter()
            .filter_map(|name| row.get(name).map(|v| (name.clone(), v.clone())))
            .collect(),
    }
}

#[async_trait]
impl StorageAdapter for MemoryStore {
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    async fn read(
        &mut self,
        table: &str,
        key: &str,
        fields: Option<&[String]>,
        _options: &Options,
        result: &mut Row,
    ) -> Status {
        let tables = match self.shared.tables.read() {
            Ok(guard) => guard,
            Err(_) => return Status::UnexpectedState,
        };
        match tables.get(table).and_then(|t| t.get(key)) {
            Some(row) => {
                *result = project(row, fields);
                Status::Ok
            }
            None => Status::NotFound,
        }
    }

    async fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&[String]>,
        result: &mut Vec<Row>,
    ) -> Status {
        let tables = match self.shared.tables.read() {
            Ok(guard) => guard,
            Err(_) => return Status::UnexpectedState,
        };
        let Some(table) = tables.get(table) else {
            return Status::NotFound;
        };
        result.extend(
            table
                .range(start_key.to_string()..)
                .take(record_count)
                .map(|(_, row)| project(row, fields)),
        );
        Status::Ok
    }

    async fn update(&mut self, table: &str, key: &str, values: Row) -> Status {
        let mut tables = match self.shared.tables.write() {
            Ok(guard) => guard,
            Err(_) => return Status::UnexpectedState,
        };
        match tables.get_mut(table).and_then(|t| t.get_mut(key)) {
            Some(row) => {
                row.extend(values);
                Status::Ok
            }
            None => Status::NotFound,
        }
    }

    async fn insert(&mut self, table: &str, key: &str, values: Row, _options: &Options) -> Status {
        let mut tables = match self.shared.tables.write() {
            Ok(guard) => guard,
            Err(_) => return Status::UnexpectedState,
        };
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), values);
        Status::Ok
    }

    async fn delete(&mut self, table: &str, key: &str) -> Status {
        let mut tables = match self.shared.tables.write() {
            Ok(guard) => guard,
            Err(_) => return Status::UnexpectedState,
        };
        match tables.get_mut(table).and_then(|t| t.remove(key)) {
            Some(_) => Status::Ok,
            None => Status::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &[u8])]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect()
    }

    #[tokio::test]
    async fn insert_read_roundtrip() {
        let mut store = MemoryStore::new();
        let options = Options::new();
        let values = row(&[("field0", b"abc"), ("field1", b"def")]);
        assert!(store.insert("t", "key1", values, &options).await.is_ok());

        let mut result = Row::new();
        let status = store.read("t", "key1", None, &options, &mut result).await;
        assert!(status.is_ok());
        assert_eq!(result.len(), 2);

        let fields = vec!["field1".to_string()];
        let mut result = Row::new();
        store
            .read("t", "key1", Some(&fields), &options, &mut result)
            .await;
        assert_eq!(result.len(), 1);
        assert_eq!(result["field1"], b"def");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let mut store = MemoryStore::new();
        let options = Options::new();
        let mut result = Row::new();
        assert_eq!(
            store.read("t", "nope", None, &options, &mut result).await,
            Status::NotFound
        );
        assert_eq!(
            store.update("t", "nope", Row::new()).await,
            Status::NotFound
        );
        assert_eq!(store.delete("t", "nope").await, Status::NotFound);
    }

    #[tokio::test]
    async fn scan_walks_key_order() {
        let mut store = MemoryStore::new();
        let options = Options::new();
        for key in ["key02", "key01", "key04", "key03"] {
            store
                .insert("t", key, row(&[("f", b"x")]), &options)
                .await;
        }
        let mut result = Vec::new();
        let status = store.scan("t", "key02", 2, None, &mut result).await;
        assert!(status.is_ok());
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn handles_share_tables() {
        let shared = Arc::new(SharedTables::default());
        let mut writer = MemoryStore::with_shared(Arc::clone(&shared));
        let mut reader = MemoryStore::with_shared(shared);
        let options = Options::new();
        writer.insert("t", "k", row(&[("f", b"v")]), &options).await;

        let mut result = Row::new();
        assert!(reader.read("t", "k", None, &options, &mut result).await.is_ok());
    }
}
