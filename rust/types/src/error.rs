//! The catalog's own domain error, distinct from transport-level errors.
//! Every DAO, version-file-engine, GC, and coordinator operation returns
//! this type so callers can dispatch on `kind()` without caring which
//! concrete subsystem raised it.

use catalog_error::{CatalogError as CatalogErrorTrait, ErrorCodes};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogErrorKind {
    NotFound,
    AlreadyExists,
    SoftDeleted,
    WasNotSoftDeleted,
    VersionStale,
    VersionInvalid,
    EntryStale,
    LogPositionStale,
    OffsetAheadOfSource,
    TooManyForks,
    ConcurrentDelete,
    NotReady,
    RunNonceStale,
    InvalidMetadataUpdate,
    UnknownMetadataType,
    Internal,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("collection is soft-deleted: {0}")]
    SoftDeleted(String),
    #[error("hard-delete requires a soft-deleted collection: {0}")]
    WasNotSoftDeleted(String),
    #[error("version is stale: expected {expected}, got {got}")]
    VersionStale { expected: i64, got: i64 },
    #[error("version is ahead of current: expected {expected}, got {got}")]
    VersionInvalid { expected: i64, got: i64 },
    #[error("compare-and-swap lost a race on {0}, retry")]
    EntryStale(String),
    #[error("fork source log position {requested} is behind its current {current}")]
    LogPositionStale { requested: i64, current: i64 },
    #[error("fork compaction offset {requested} is ahead of source log position {source}")]
    OffsetAheadOfSource { requested: i64, source: i64 },
    #[error("lineage dependency count exceeds the cap of {cap}")]
    TooManyForks { cap: usize },
    #[error("collection {0} vanished between insert and re-read")]
    ConcurrentDelete(String),
    #[error("attached function {0} exists but has not been accepted by the heap scheduler")]
    NotReady(String),
    #[error("attached function {0} run_nonce no longer matches: the run already advanced or was never scheduled")]
    RunNonceStale(String),
    #[error("reset_metadata=true is incompatible with a non-null metadata payload")]
    InvalidMetadataUpdate,
    #[error("metadata value outside the allowed {{string, int64, float64, bool}} set")]
    UnknownMetadataType,
    #[error("internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    pub fn kind(&self) -> CatalogErrorKind {
        match self {
            CatalogError::NotFound(_) => CatalogErrorKind::NotFound,
            CatalogError::AlreadyExists(_) => CatalogErrorKind::AlreadyExists,
            CatalogError::SoftDeleted(_) => CatalogErrorKind::SoftDeleted,
            CatalogError::WasNotSoftDeleted(_) => CatalogErrorKind::WasNotSoftDeleted,
            CatalogError::VersionStale { .. } => CatalogErrorKind::VersionStale,
            CatalogError::VersionInvalid { .. } => CatalogErrorKind::VersionInvalid,
            CatalogError::EntryStale(_) => CatalogErrorKind::EntryStale,
            CatalogError::LogPositionStale { .. } => CatalogErrorKind::LogPositionStale,
            CatalogError::OffsetAheadOfSource { .. } => CatalogErrorKind::OffsetAheadOfSource,
            CatalogError::TooManyForks { .. } => CatalogErrorKind::TooManyForks,
            CatalogError::ConcurrentDelete(_) => CatalogErrorKind::ConcurrentDelete,
            CatalogError::NotReady(_) => CatalogErrorKind::NotReady,
            CatalogError::RunNonceStale(_) => CatalogErrorKind::RunNonceStale,
            CatalogError::InvalidMetadataUpdate => CatalogErrorKind::InvalidMetadataUpdate,
            CatalogError::UnknownMetadataType => CatalogErrorKind::UnknownMetadataType,
            CatalogError::Internal(_) => CatalogErrorKind::Internal,
        }
    }

    /// True for the two kinds a caller is expected to retry internally
    /// rather than surface, per the propagation policy.
    pub fn is_internal_retry_signal(&self) -> bool {
        matches!(
            self.kind(),
            CatalogErrorKind::VersionStale | CatalogErrorKind::EntryStale
        )
    }
}

impl CatalogErrorTrait for CatalogError {
    fn code(&self) -> ErrorCodes {
        match self.kind() {
            CatalogErrorKind::NotFound => ErrorCodes::NotFound,
            CatalogErrorKind::AlreadyExists => ErrorCodes::AlreadyExists,
            CatalogErrorKind::SoftDeleted => ErrorCodes::FailedPrecondition,
            CatalogErrorKind::WasNotSoftDeleted => ErrorCodes::FailedPrecondition,
            CatalogErrorKind::VersionStale => ErrorCodes::Aborted,
            CatalogErrorKind::VersionInvalid => ErrorCodes::Internal,
            CatalogErrorKind::EntryStale => ErrorCodes::Aborted,
            CatalogErrorKind::LogPositionStale => ErrorCodes::FailedPrecondition,
            CatalogErrorKind::OffsetAheadOfSource => ErrorCodes::InvalidArgument,
            CatalogErrorKind::TooManyForks => ErrorCodes::ResourceExhausted,
            CatalogErrorKind::ConcurrentDelete => ErrorCodes::Aborted,
            CatalogErrorKind::NotReady => ErrorCodes::FailedPrecondition,
            CatalogErrorKind::RunNonceStale => ErrorCodes::FailedPrecondition,
            CatalogErrorKind::InvalidMetadataUpdate => ErrorCodes::InvalidArgument,
            CatalogErrorKind::UnknownMetadataType => ErrorCodes::InvalidArgument,
            CatalogErrorKind::Internal => ErrorCodes::Internal,
        }
    }

    fn should_trace_error(&self) -> bool {
        !self.is_internal_retry_signal()
    }
}

impl From<uuid::Error> for CatalogError {
    fn from(err: uuid::Error) -> Self {
        CatalogError::Internal(format!("invalid uuid: {err}"))
    }
}
