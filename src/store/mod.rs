//! The storage-adapter contract and the built-in adapters.
//!
//! An adapter is the only thing that knows how to talk to a concrete
//! backend. Every worker owns its own instance; connection pooling, if
//! any, is the adapter's business. Adapters are selected by name from a
//! compile-time registry.

pub mod memory;
pub mod noop;
pub mod wrapper;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{Error, Result};

/// A record: field name to opaque bytes.
pub type Row = HashMap<String, Vec<u8>>;

/// Untyped adapter hints (`profile`, `tracing`, ...).
pub type Options = HashMap<String, serde_json::Value>;

/// Outcome of a single adapter operation.
///
/// Extensible by design; anything that is not [`Status::Ok`] is counted
/// into the per-operation return-code table and the `-FAILED` latency
/// metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Status {
    Ok,
    Error,
    NotFound,
    NotImplemented,
    UnexpectedState,
    BadRequest,
    ServiceUnavailable,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
            Status::NotFound => "NOT_FOUND",
            Status::NotImplemented => "NOT_IMPLEMENTED",
            Status::UnexpectedState => "UNEXPECTED_STATE",
            Status::BadRequest => "BAD_REQUEST",
            Status::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

/// A backend-side trace record surfaced after the run.
///
/// Events are owned by the trace and refer to their parent by id only.
#[derive(Debug, Clone)]
pub struct TraceInfo {
    pub id: u64,
    pub events: HashMap<String, TraceEvent>,
}

#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Id of the owning [`TraceInfo`].
    pub trace_id: u64,
    pub source: Option<std::net::SocketAddr>,
    pub thread: String,
    pub timestamp_ms: u64,
    pub duration_us: u64,
}

/// Contract every storage backend implements.
///
/// `init`/`cleanup` failures are fatal; the data-path operations report
/// through [`Status`] and must not panic.
#[async_trait]
pub trait StorageAdapter: Send {
    async fn init(&mut self) -> Result<()>;

    async fn cleanup(&mut self) -> Result<()>;

    async fn read(
        &mut self,
        table: &str,
        key: &str,
        fields: Option<&[String]>,
        options: &Options,
        result: &mut Row,
    ) -> Status;

    async fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&[String]>,
        result: &mut Vec<Row>,
    ) -> Status;

    async fn update(&mut self, table: &str, key: &str, values: Row) -> Status;

    async fn insert(&mut self, table: &str, key: &str, values: Row, options: &Options) -> Status;

    async fn delete(&mut self, table: &str, key: &str) -> Status;

    /// Drain any trace records the backend collected. May be expensive;
    /// called once, after the run and before cleanup.
    fn traces(&mut self) -> Vec<TraceInfo> {
        Vec::new()
    }
}

/// Compile-time adapter registry.
///
/// One factory per run; adapters whose backend lives in-process (the
/// memory store) share state through it, the way separate connections
/// share one database.
#[derive(Debug, Default, Clone)]
pub struct StoreFactory {
    memory: std::sync::Arc<memory::SharedTables>,
}

impl StoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, name: &str, _config: &Config) -> Result<Box<dyn StorageAdapter>> {
        match name {
            "noop" => Ok(Box::new(noop::NoopStore::new())),
            "memory" => Ok(Box::new(memory::MemoryStore::with_shared(
                std::sync::Arc::clone(&self.memory),
            ))),
            other => Err(Error::UnknownStore(other.to_string())),
        }
    }
}
