use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All the ways a benchmark run can fail.
///
/// Configuration problems surface before any worker starts; the remaining
/// variants are fatal runtime conditions. Per-operation adapter failures are
/// *not* errors — they flow through [`crate::store::Status`] and end up in
/// the return-code tables instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required property `{0}`")]
    MissingProperty(&'static str),

    #[error("invalid value `{value}` for property `{key}`: {reason}")]
    InvalidProperty {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown distribution `{0}`")]
    UnknownDistribution(String),

    #[error("unknown storage adapter `{0}`")]
    UnknownStore(String),

    #[error("unknown workload `{0}`")]
    UnknownWorkload(String),

    #[error("unknown measurement type `{0}`")]
    UnknownMeasurementType(String),

    #[error("empty generator range: lo {lo} > hi {hi}")]
    EmptyRange { lo: i64, hi: i64 },

    #[error("zipfian distribution over zero items")]
    ZeroItems,

    #[error("operation mix has no positive weights")]
    NoPositiveWeights,

    #[error("insertstart {insert_start} + insertcount {insert_count} exceeds recordcount {record_count}")]
    InsertRangeExceedsRecords {
        insert_start: u64,
        insert_count: u64,
        record_count: u64,
    },

    #[error("too many unacknowledged insert ids: window slot for id {0} still occupied")]
    AckWindowOverflow(u64),

    #[error("measurement `{0}` already exists with a different type")]
    MeasureTypeMismatch(String),

    #[error("storage adapter init failed: {0}")]
    StoreInit(String),

    #[error("storage adapter cleanup failed: {0}")]
    StoreCleanup(String),

    #[error("histogram error: {0}")]
    Histogram(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<hdrhistogram::CreationError> for Error {
    fn from(err: hdrhistogram::CreationError) -> Self {
        Error::Histogram(err.to_string())
    }
}

impl From<hdrhistogram::RecordError> for Error {
    fn from(err: hdrhistogram::RecordError) -> Self {
        Error::Histogram(err.to_string())
    }
}
