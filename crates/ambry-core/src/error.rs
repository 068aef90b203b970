// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the ambry daemon.

use thiserror::Error;

/// The primary error type used across all ambry subsystems.
///
/// Subsystem boundaries translate low-level errors (rusqlite, io, subprocess)
/// into exactly one of these kinds before they cross a crate boundary.
#[derive(Debug, Error)]
pub enum AmbryError {
    /// Bad input from a caller (empty slug, zero tasks, malformed body).
    #[error("validation error: {0}")]
    Validation(String),

    /// A lifecycle transition was requested from a phase that does not allow it.
    #[error("state error: {0}")]
    State(String),

    /// Unknown slug, proposal, session, or baseline.
    #[error("not found: {0}")]
    NotFound(String),

    /// The embedded store could not be opened or migrated, or a query failed.
    #[error("storage unavailable: {source}")]
    StorageUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A git invocation failed; carries the subprocess stderr.
    #[error("vcs error: {0}")]
    Vcs(String),

    /// An optional external dependency (code-search binary) is missing or broken.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A subprocess or fan-out exceeded its deadline and was cancelled.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Uniqueness or locking violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AmbryError {
    /// Convenience constructor for storage errors from any boxed source.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AmbryError::StorageUnavailable {
            source: Box::new(source),
        }
    }

    /// Map this error onto the process exit-code contract.
    ///
    /// 0 is reserved for success; 1 means user-correctable (dirty worktree,
    /// missing slug, bad input), 2 means a precondition failed (transition
    /// not allowed), 64 means internal failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AmbryError::Validation(_)
            | AmbryError::NotFound(_)
            | AmbryError::Vcs(_)
            | AmbryError::BackendUnavailable(_) => 1,
            AmbryError::State(_) | AmbryError::Conflict(_) => 2,
            AmbryError::StorageUnavailable { .. }
            | AmbryError::Timeout { .. }
            | AmbryError::Internal(_) => 64,
        }
    }
}

impl From<std::io::Error> for AmbryError {
    fn from(e: std::io::Error) -> Self {
        AmbryError::Internal(format!("io error: {e}"))
    }
}

impl From<serde_json::Error> for AmbryError {
    fn from(e: serde_json::Error) -> Self {
        AmbryError::Validation(format!("invalid json: {e}"))
    }
}
