//! Unified error model for the core. Every public operation returns a
//! `MeshResult<T>`; there are no panics or exceptions across the API boundary.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::handle::Handle;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MeshError {
    #[error("index out of range")]
    IndexOutOfRange,
    #[error("entity type out of range")]
    TypeOutOfRange,
    #[error("memory allocation failed")]
    MemoryAllocationFailed,
    #[error("entity not found")]
    EntityNotFound,
    #[error("multiple entities found, using first match {0:?}")]
    MultipleEntitiesFound(Handle),
    #[error("tag not found")]
    TagNotFound,
    #[error("already allocated with a different description")]
    AlreadyAllocated,
    #[error("file does not exist")]
    FileDoesNotExist,
    #[error("file write error")]
    FileWriteError,
    #[error("not implemented")]
    NotImplemented,
    #[error("unsupported operation")]
    UnsupportedOperation,
    #[error("tag has variable-length data")]
    VariableDataLength,
    #[error("invalid size")]
    InvalidSize,
    #[error("failure: {0}")]
    Failure(String),
}

pub type MeshResult<T> = Result<T, MeshError>;

impl MeshError {
    /// `ErrorCode` name, as named in the specification's exit-code table.
    pub fn code_str(&self) -> &'static str {
        match self {
            MeshError::IndexOutOfRange => "INDEX_OUT_OF_RANGE",
            MeshError::TypeOutOfRange => "TYPE_OUT_OF_RANGE",
            MeshError::MemoryAllocationFailed => "MEMORY_ALLOCATION_FAILED",
            MeshError::EntityNotFound => "ENTITY_NOT_FOUND",
            MeshError::MultipleEntitiesFound(_) => "MULTIPLE_ENTITIES_FOUND",
            MeshError::TagNotFound => "TAG_NOT_FOUND",
            MeshError::AlreadyAllocated => "ALREADY_ALLOCATED",
            MeshError::FileDoesNotExist => "FILE_DOES_NOT_EXIST",
            MeshError::FileWriteError => "FILE_WRITE_ERROR",
            MeshError::NotImplemented => "NOT_IMPLEMENTED",
            MeshError::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            MeshError::VariableDataLength => "VARIABLE_DATA_LENGTH",
            MeshError::InvalidSize => "INVALID_SIZE",
            MeshError::Failure(_) => "FAILURE",
        }
    }

    /// True for lookup-miss style errors a caller may legitimately create-on-miss for.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self,
            MeshError::EntityNotFound | MeshError::TagNotFound | MeshError::FileDoesNotExist
        )
    }
}

/// Rank-local "last error string", mirroring the single shared diagnostic slot
/// that the `Interface` facade exposes to callers per the error-handling design.
#[derive(Default)]
pub struct LastError {
    message: Mutex<Option<String>>,
    rank_tagged_to_stderr: AtomicBool,
}

impl LastError {
    pub fn new() -> Self {
        Self { message: Mutex::new(None), rank_tagged_to_stderr: AtomicBool::new(false) }
    }

    pub fn set(&self, err: &MeshError) {
        *self.message.lock() = Some(format!("{}: {}", err.code_str(), err));
    }

    pub fn get(&self) -> Option<String> {
        self.message.lock().clone()
    }

    pub fn clear(&self) {
        *self.message.lock() = None;
    }

    /// Used by parallel resolution/ghost exchange to additionally print a
    /// rank-tagged diagnostic to standard error, per the error handling design.
    pub fn report_parallel_failure(&self, rank: i32, err: &MeshError) {
        self.set(err);
        self.rank_tagged_to_stderr.store(true, Ordering::Relaxed);
        tracing::error!(target: "meshcore::parallel", rank, error = %err, "parallel phase failed");
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn code_str_mapping() {
        assert_eq!(MeshError::EntityNotFound.code_str(), "ENTITY_NOT_FOUND");
        assert_eq!(MeshError::TagNotFound.code_str(), "TAG_NOT_FOUND");
        assert_eq!(MeshError::InvalidSize.code_str(), "INVALID_SIZE");
    }

    #[test]
    fn lookup_miss_classification() {
        assert!(MeshError::EntityNotFound.is_lookup_miss());
        assert!(!MeshError::MemoryAllocationFailed.is_lookup_miss());
    }

    #[test]
    fn last_error_round_trips() {
        let last = LastError::new();
        assert!(last.get().is_none());
        last.set(&MeshError::TagNotFound);
        assert_eq!(last.get().unwrap(), "TAG_NOT_FOUND: tag not found");
        last.clear();
        assert!(last.get().is_none());
    }
}
