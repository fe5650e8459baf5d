//! Small filesystem and environment helpers shared across the crate.

use std::collections::HashMap;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::Path;

/// Splits `KEY=VALUE` pairs into a map. Entries without `=` are dropped, and
/// values keep any further `=` characters they contain.
pub fn parse_env(envs: &[String]) -> HashMap<String, String> {
    envs.iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Creates `path` and any missing parents, applying `mode` to every directory
/// created. Existing directories keep their mode.
pub fn create_dir_all_with_mode<P: AsRef<Path>>(path: P, mode: u32) -> std::io::Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(path.as_ref())
}

/// Replaces the file at `path` atomically: the contents are written to a
/// sibling temporary file with `mode`, synced, then renamed over the target.
/// A crashed invocation leaves either the old file or the new one, never a
/// truncated hybrid.
pub fn write_file_atomic<P: AsRef<Path>>(
    path: P,
    contents: &[u8],
    mode: u32,
) -> std::io::Result<()> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("tmp");
    let mut tmp = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(&tmp_path)?;
    tmp.write_all(contents)?;
    tmp.sync_all()?;
    drop(tmp);
    fs::rename(&tmp_path, path)
}

/// Writes a small file in one shot with the given mode, truncating any
/// previous contents.
pub fn write_file_with_mode<P: AsRef<Path>>(
    path: P,
    contents: &[u8],
    mode: u32,
) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path.as_ref())?;
    file.write_all(contents)
}
