//! Core error taxonomy: a `thiserror` enum with `#[from]` conversions
//! for the lower layers it wraps, plus constructor helpers for the
//! variants that are built from a message.

use thiserror::Error;

pub type OutletResult<T = ()> = Result<T, OutletError>;

#[derive(Debug, Error)]
pub enum OutletError {
    // --- Validation ---
    #[error("batch {batch_uid} conflict: {reason}")]
    BatchConflict { batch_uid: u64, reason: String },

    #[error("invalid batch {batch_uid}: {reason}")]
    InvalidBatch { batch_uid: u64, reason: String },

    #[error("missing ancestor for {path}: {reason}")]
    MissingAncestor { path: String, reason: String },

    // --- Cache-consistency ---
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("id mapping conflict for {kind} {key}: {reason}")]
    IdMappingConflict {
        kind: &'static str,
        key: String,
        reason: String,
    },

    #[error("cache is inconsistent: {0}")]
    CacheInconsistency(String),

    // --- Backend-operational ---
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error ({backend}): {message}")]
    BackendIo { backend: &'static str, message: String },

    #[error("content checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    // --- Persistence ---
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("serialization error: {0}")]
    Serialization(String),

    // --- OpGraph / OpManager structural errors ---
    #[error("graph invariant violated: {0}")]
    GraphInvariant(String),

    #[error("op not ready: {0}")]
    OpNotReady(String),

    #[error("{0}")]
    Other(String),
}

impl OutletError {
    pub fn cache_inconsistency<T: std::fmt::Display>(msg: T) -> Self {
        Self::CacheInconsistency(msg.to_string())
    }

    pub fn graph_invariant<T: std::fmt::Display>(msg: T) -> Self {
        Self::GraphInvariant(msg.to_string())
    }

    pub fn backend_io<T: std::fmt::Display>(backend: &'static str, msg: T) -> Self {
        Self::BackendIo {
            backend,
            message: msg.to_string(),
        }
    }

    /// True for transient, worth-a-bounded-retry cases (socket timeouts,
    /// transport errors) as distinct from fail-immediately cases (HTTP
    /// 403/404, checksum mismatch).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendIo { .. })
    }
}

impl From<serde_json::Error> for OutletError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for OutletError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for OutletError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
