//! An adapter that acknowledges everything instantly.
//!
//! Useful for measuring the harness itself: with zero backend latency the
//! achieved rate reflects only the throttle and measurement overhead.

use async_trait::async_trait;

use super::{Options, Row, Status, StorageAdapter};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct NoopStore;

impl NoopStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageAdapter for NoopStore {
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    async fn read(
        &mut self,
        _table: &str,
        _key: &str,
        _fields: Option<&[String]>,
        _options: &Options,
        _result: &mut Row,
    ) -> Status {
        Status::Ok
    }

    async fn scan(
        &mut self,
        _table: &str,
        _start_key: &str,
        _record_count: usize,
        _fields: Option<&[String]>,
        _result: &mut Vec<Row>,
    ) -> Status {
        Status::Ok
    }

    async fn update(&mut self, _table: &str, _key: &str, _values: Row) -> Status {
        Status::Ok
    }

    async fn insert(&mut self, _table: &str, _key: &str, _values: Row, _options: &Options) -> Status {
        Status::Ok
    }

    async fn delete(&mut self, _table: &str, _key: &str) -> Status {
        Status::Ok
    }
}
