//! Resolution of the container-state root directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const DEFAULT_ROOT: &str = "/var/run/vessel";

/// Picks the root directory for container state: the `--root` flag if given,
/// else `$XDG_RUNTIME_DIR/vessel`, else the system-wide default. The
/// directory itself is created lazily by the first record written under it.
pub fn determine(root: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = root {
        if root.exists() {
            return root
                .canonicalize()
                .with_context(|| format!("invalid root directory {root:?}"));
        }
        return Ok(root);
    }

    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        if !runtime_dir.is_empty() {
            return Ok(Path::new(&runtime_dir).join("vessel"));
        }
    }

    Ok(PathBuf::from(DEFAULT_ROOT))
}
