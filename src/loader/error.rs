//! Error taxonomy for the loading subsystem.
//!
//! Every variant is recovered close to where it occurs: a failed unit is
//! skipped, a failed collection is skipped, and a load pass never fails
//! outward.

use thiserror::Error;

/// Errors raised by the source store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("storage backend not configured")]
    NotConfigured,
}

/// Per-unit errors inside a load pass.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A remote source could not be listed or read.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Fetched content failed to compile as a script unit.
    #[error("compile failed: {0}")]
    Compile(String),

    /// The unit compiled but its `register()` call failed or returned
    /// something that is not a list of agent declarations.
    #[error("registration failed: {0}")]
    Registration(String),

    /// A declared agent could not be constructed (bad entry point).
    #[error("instantiation failed: {0}")]
    Instantiation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
