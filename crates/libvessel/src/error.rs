use std::path::PathBuf;

use crate::container::state::MetadataError;
use crate::container::Status;
use crate::hooks::HookError;
use crate::sandbox::SandboxError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced by the lifecycle verbs.
///
/// Precondition failures (`InvalidId`, `InvalidSpec`, `AlreadyExists`,
/// `BadState`) are raised before any side effect. Everything that can fail
/// once a sandbox exists goes through the destruction path first, so a
/// returned error never leaks a sandbox process.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("invalid container id {id:?}: {reason}")]
    InvalidId { id: String, reason: &'static str },
    #[error("invalid spec: {0}")]
    InvalidSpec(String),
    #[error("container {id:?} already exists at {path:?}")]
    AlreadyExists { id: String, path: PathBuf },
    #[error("container {id:?} does not exist")]
    NotFound { id: String },
    #[error("metadata for container {id:?} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("cannot {verb} container in state {status}")]
    BadState { verb: &'static str, status: Status },
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("{phase} hook failed")]
    Hook {
        phase: &'static str,
        #[source]
        source: HookError,
    },
    #[error("failed to persist metadata for container {id:?}")]
    Persist {
        id: String,
        #[source]
        source: MetadataError,
    },
    #[error("failed to write pid file {path:?}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read container root directory {path:?}")]
    ListRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
