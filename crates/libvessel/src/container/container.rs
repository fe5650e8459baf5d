//! The container record and its read-side operations.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use oci_spec::runtime::Spec;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};
use crate::sandbox::control::{Event, ExecArgs, ProcessInfo, WaitStatus};
use crate::sandbox::{Sandbox, SandboxError};
use crate::signal::Signal;

use super::state::{self, OciState, Status, OCI_VERSION};

/// A containerized application managed across CLI invocations.
///
/// The struct is the durable record: it serializes verbatim to `meta.json`
/// in the container's directory under the root, and every state-changing
/// verb persists it before returning success. The sandbox reference is
/// present exactly while the status is `Created` or `Running`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container id, unique within the root directory.
    pub id: String,
    /// The OCI runtime spec supplied at creation; immutable afterwards.
    pub spec: Spec,
    /// Bundle directory the spec was loaded from.
    pub bundle_dir: PathBuf,
    /// Directory holding this record: `<root_dir>/<id>`.
    pub root: PathBuf,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// User that invoked create, best-effort from `$USER`.
    pub owner: String,
    pub status: Status,
    /// The sandbox hosting this container, absent once stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<Sandbox>,
}

/// Checks a container id against the accepted alphabet
/// (`[A-Za-z0-9_+-.]`, at least one character, and not a path component).
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(RuntimeError::InvalidId {
            id: id.to_string(),
            reason: "id is empty",
        });
    }
    if id == "." || id == ".." {
        return Err(RuntimeError::InvalidId {
            id: id.to_string(),
            reason: "id is a reserved file name",
        });
    }
    for c in id.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '+' | '-' | '.' => (),
            _ => {
                return Err(RuntimeError::InvalidId {
                    id: id.to_string(),
                    reason: "id contains characters outside [A-Za-z0-9_+-.]",
                })
            }
        }
    }
    Ok(())
}

impl Container {
    /// Loads the container with the given id from the root directory.
    ///
    /// The returned record is reconciled against the host: when the stored
    /// status claims a live sandbox but the sandbox process is gone, the
    /// status collapses to `Stopped` and the reference is cleared. The check
    /// is inherently racy; the record reflects the truth at the moment of
    /// observation. The reconciled view is not written back to disk.
    pub fn load(root_dir: &Path, id: &str) -> Result<Container> {
        tracing::debug!(%id, ?root_dir, "load container");
        validate_id(id)?;
        let container_root = root_dir.join(id);
        if !state::exists(&container_root) {
            return Err(RuntimeError::NotFound { id: id.to_string() });
        }
        let mut container = match state::load(&container_root) {
            Ok(container) => container,
            Err(err @ state::MetadataError::Missing { .. }) => {
                tracing::debug!(%id, %err, "container directory has no metadata");
                return Err(RuntimeError::NotFound { id: id.to_string() });
            }
            Err(err) => {
                return Err(RuntimeError::Corrupt {
                    id: id.to_string(),
                    reason: err.to_string(),
                })
            }
        };
        if container.status == Status::Creating {
            // a crashed create never reached its first persist; the record
            // should not exist with this status
            return Err(RuntimeError::Corrupt {
                id: id.to_string(),
                reason: "record holds the transient status creating".to_string(),
            });
        }
        container.reconcile();
        Ok(container)
    }

    /// Returns all container ids under the root directory.
    pub fn list(root_dir: &Path) -> Result<Vec<String>> {
        tracing::debug!(?root_dir, "list containers");
        state::list(root_dir).map_err(|err| RuntimeError::ListRoot {
            path: root_dir.to_path_buf(),
            source: err,
        })
    }

    /// Runs the supplied command inside the container and blocks until it
    /// exits.
    pub fn execute(&self, args: ExecArgs) -> Result<WaitStatus> {
        tracing::debug!(id = %self.id, ?args, "execute in container");
        if !matches!(self.status, Status::Created | Status::Running) {
            return Err(RuntimeError::BadState {
                verb: "exec in",
                status: self.status,
            });
        }
        Ok(self.sandbox()?.execute(&self.id, args)?)
    }

    /// Blocks until the container's init process exits and returns its wait
    /// status. Permitted in any status; waiting on a container whose sandbox
    /// is already gone fails rather than blocking forever.
    pub fn wait(&self) -> Result<WaitStatus> {
        tracing::debug!(id = %self.id, "wait on container");
        Ok(self.sandbox()?.wait(&self.id)?)
    }

    /// Forwards a signal to the container's init process. Signalling a
    /// stopped container is a no-op by contract.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        tracing::debug!(id = %self.id, %signal, "signal container");
        if self.status == Status::Stopped {
            tracing::warn!(id = %self.id, %signal, "container not running, not sending signal");
            return Ok(());
        }
        Ok(self.sandbox()?.signal(&self.id, signal)?)
    }

    /// Returns a live metrics snapshot for the container.
    pub fn event(&self) -> Result<Event> {
        tracing::debug!(id = %self.id, "events for container");
        if !matches!(self.status, Status::Created | Status::Running) {
            return Err(RuntimeError::BadState {
                verb: "get events for",
                status: self.status,
            });
        }
        Ok(self.sandbox()?.event(&self.id)?)
    }

    /// Enumerates the processes running inside the container.
    pub fn processes(&self) -> Result<Vec<ProcessInfo>> {
        if self.status != Status::Running {
            return Err(RuntimeError::BadState {
                verb: "get processes of",
                status: self.status,
            });
        }
        Ok(self.sandbox()?.processes(&self.id)?)
    }

    /// Pid of the sandbox hosting this container, or -1 when it has none.
    pub fn pid(&self) -> i32 {
        match (&self.sandbox, self.status) {
            (Some(sandbox), Status::Created | Status::Running) => sandbox.pid,
            _ => -1,
        }
    }

    /// The OCI state document for this container.
    pub fn state(&self) -> OciState {
        OciState {
            oci_version: OCI_VERSION.to_string(),
            id: self.id.clone(),
            status: self.status.to_string(),
            pid: self.pid(),
            bundle: self.bundle_dir.clone(),
        }
    }

    pub(crate) fn save(&self) -> Result<()> {
        state::save(self).map_err(|err| RuntimeError::Persist {
            id: self.id.clone(),
            source: err,
        })
    }

    fn sandbox(&self) -> Result<&Sandbox> {
        self.sandbox
            .as_ref()
            .ok_or(RuntimeError::Sandbox(SandboxError::NotRunning))
    }

    fn reconcile(&mut self) {
        if !matches!(self.status, Status::Created | Status::Running) {
            return;
        }
        let alive = self.sandbox.as_ref().is_some_and(|s| s.is_running());
        if !alive {
            tracing::debug!(id = %self.id, "sandbox is gone, container is stopped");
            self.status = Status::Stopped;
            self.sandbox = None;
        }
    }
}

#[cfg(test)]
impl Container {
    pub(crate) fn test_record(id: &str, root_dir: &Path, status: Status) -> Container {
        Container {
            id: id.to_string(),
            spec: Spec::default(),
            bundle_dir: PathBuf::from("/tmp/bundle"),
            root: root_dir.join(id),
            created_at: Utc::now(),
            owner: "tester".to_string(),
            status,
            sandbox: None,
        }
    }

    pub(crate) fn with_sandbox(mut self, pid: i32) -> Container {
        let control_socket = self.root.join(crate::sandbox::CONTROL_SOCKET);
        self.sandbox = Some(Sandbox {
            id: self.id.clone(),
            pid,
            control_socket,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use std::process::{Command, Stdio};

    use anyhow::Result;

    use crate::container::state;

    use super::*;

    #[test]
    fn test_validate_id() {
        for id in ["abc", "ABC-123", "a_b.c+d", "0", "..."] {
            assert!(validate_id(id).is_ok(), "{id} should be accepted");
        }
        for id in ["", ".", "..", "a/b", "a b", "a!b", "höhle"] {
            assert!(
                matches!(validate_id(id), Err(RuntimeError::InvalidId { .. })),
                "{id} should be rejected"
            );
        }
    }

    #[test]
    fn test_load_of_absent_container() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let err = Container::load(root_dir.path(), "nope").unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound { .. }));
        Ok(())
    }

    #[test]
    fn test_load_rejects_invalid_id_without_touching_fs() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let err = Container::load(root_dir.path(), "bad id!").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidId { .. }));
        assert_eq!(Container::list(root_dir.path())?, Vec::<String>::new());
        Ok(())
    }

    #[test]
    fn test_load_directory_without_metadata() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        std::fs::create_dir(root_dir.path().join("empty"))?;
        let err = Container::load(root_dir.path(), "empty").unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound { .. }));
        Ok(())
    }

    #[test]
    fn test_load_treats_persisted_creating_as_corrupt() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let container = Container::test_record("half-made", root_dir.path(), Status::Creating);
        state::save(&container)?;
        let err = Container::load(root_dir.path(), "half-made").unwrap_err();
        assert!(matches!(err, RuntimeError::Corrupt { .. }));
        Ok(())
    }

    #[test]
    fn test_load_reconciles_dead_sandbox() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        // a process that is guaranteed dead by the time load probes it
        let mut child = Command::new("true").stdout(Stdio::null()).spawn()?;
        let pid = child.id() as i32;
        child.wait()?;

        let container = Container::test_record("gone", root_dir.path(), Status::Running)
            .with_sandbox(pid);
        state::save(&container)?;

        let loaded = Container::load(root_dir.path(), "gone")?;
        assert_eq!(loaded.status, Status::Stopped);
        assert!(loaded.sandbox.is_none());

        // the reconciled view is not written back
        let on_disk = state::load(&container.root)?;
        assert_eq!(on_disk.status, Status::Running);
        Ok(())
    }

    #[test]
    fn test_load_keeps_live_sandbox() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()?;
        let pid = child.id() as i32;

        let container =
            Container::test_record("alive", root_dir.path(), Status::Running).with_sandbox(pid);
        state::save(&container)?;

        let loaded = Container::load(root_dir.path(), "alive")?;
        assert_eq!(loaded.status, Status::Running);
        assert_eq!(loaded.pid(), pid);

        child.kill()?;
        child.wait()?;
        Ok(())
    }

    #[test]
    fn test_pid_reporting() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let stopped = Container::test_record("s", root_dir.path(), Status::Stopped);
        assert_eq!(stopped.pid(), -1);

        let created = Container::test_record("c", root_dir.path(), Status::Created)
            .with_sandbox(4242);
        assert_eq!(created.pid(), 4242);
        Ok(())
    }

    #[test]
    fn test_state_document() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let container = Container::test_record("doc", root_dir.path(), Status::Created)
            .with_sandbox(7);
        let state = container.state();
        assert_eq!(state.oci_version, OCI_VERSION);
        assert_eq!(state.id, "doc");
        assert_eq!(state.status, "created");
        assert_eq!(state.pid, 7);
        assert_eq!(state.bundle, container.bundle_dir);
        Ok(())
    }

    #[test]
    fn test_signal_on_stopped_container_is_noop() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let container = Container::test_record("quiet", root_dir.path(), Status::Stopped);
        container.signal(Signal::try_from("KILL")?)?;
        Ok(())
    }

    #[test]
    fn test_wait_without_sandbox_fails() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let container = Container::test_record("no-sb", root_dir.path(), Status::Stopped);
        let err = container.wait().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Sandbox(SandboxError::NotRunning)
        ));
        Ok(())
    }

    #[test]
    fn test_execute_requires_live_status() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let container = Container::test_record("halted", root_dir.path(), Status::Stopped);
        let err = container
            .execute(ExecArgs {
                args: vec!["true".to_string()],
                env: vec![],
                cwd: None,
            })
            .unwrap_err();
        assert!(matches!(err, RuntimeError::BadState { .. }));
        Ok(())
    }

    #[test]
    fn test_processes_requires_running() -> Result<()> {
        let root_dir = tempfile::tempdir()?;
        let container =
            Container::test_record("fresh", root_dir.path(), Status::Created).with_sandbox(1);
        let err = container.processes().unwrap_err();
        assert!(matches!(err, RuntimeError::BadState { .. }));
        Ok(())
    }
}
