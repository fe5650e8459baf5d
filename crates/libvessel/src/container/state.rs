//! Container status and the durable metadata store.
//!
//! Each container owns one directory under the configured root, named by its
//! id, holding a single JSON record (`meta.json`). Existence of that file is
//! the authoritative proof that the container exists; `remove` deleting the
//! directory is what destruction means. The store itself takes no locks:
//! the lifecycle verbs keep the single-writer-per-container invariant, and
//! every write is an atomic replace so concurrent readers see either the old
//! record or the new one.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils;

use super::container::Container;

/// Name of the metadata file inside the container directory.
pub const METADATA_FILENAME: &str = "meta.json";

/// OCI spec version reported in state documents.
pub const OCI_VERSION: &str = "1.0.2";

const DIR_MODE: u32 = 0o711;
const FILE_MODE: u32 = 0o640;

/// Externally visible container status.
///
/// Observed transitions are always a prefix of
/// `Creating -> Created -> Running -> Stopped`; `Creating` is an in-memory
/// construction state and is never valid on disk.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Creating,
    Created,
    Running,
    Stopped,
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // lowercase, matching the status strings of the OCI state document
        let status = match self {
            Status::Creating => "creating",
            Status::Created => "created",
            Status::Running => "running",
            Status::Stopped => "stopped",
        };
        write!(f, "{status}")
    }
}

/// The state document handed to hooks and printed by the `state` verb,
/// shaped per the OCI runtime specification.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OciState {
    pub oci_version: String,
    pub id: String,
    pub status: String,
    pub pid: i32,
    pub bundle: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata file {path:?} is missing")]
    Missing { path: PathBuf },
    #[error("failed to read metadata file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode metadata file {path:?}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode container metadata")]
    Encode(#[source] serde_json::Error),
    #[error("failed to create container directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write metadata file {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Returns the path of the metadata file for a container rooted at
/// `container_root`.
pub fn metadata_path(container_root: &Path) -> PathBuf {
    container_root.join(METADATA_FILENAME)
}

/// Persists the record, creating the container directory (mode 0711) if
/// needed and atomically replacing `meta.json` (mode 0640).
pub fn save(container: &Container) -> Result<(), MetadataError> {
    tracing::debug!(id = %container.id, root = ?container.root, "save container");
    utils::create_dir_all_with_mode(&container.root, DIR_MODE).map_err(|err| {
        MetadataError::CreateDir {
            path: container.root.clone(),
            source: err,
        }
    })?;
    let encoded = serde_json::to_vec(container).map_err(MetadataError::Encode)?;
    let path = metadata_path(&container.root);
    utils::write_file_atomic(&path, &encoded, FILE_MODE)
        .map_err(|err| MetadataError::Write { path, source: err })
}

/// Reads the record back from `container_root`.
pub fn load(container_root: &Path) -> Result<Container, MetadataError> {
    let path = metadata_path(container_root);
    let contents = match fs::read(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(MetadataError::Missing { path })
        }
        Err(err) => return Err(MetadataError::Read { path, source: err }),
    };
    serde_json::from_slice(&contents).map_err(|err| MetadataError::Decode { path, source: err })
}

/// Recursively removes the container directory. Removing a directory that is
/// already gone is not an error; destruction has to make progress.
pub fn remove(container_root: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(container_root) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// True iff the container directory is present.
pub fn exists(container_root: &Path) -> bool {
    container_root.exists()
}

/// Enumerates the immediate subdirectory names of the root directory.
/// Entries are not validated to hold a decodable record.
pub fn list(root_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(root_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            ids.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    ids.sort();
    Ok(ids)
}
