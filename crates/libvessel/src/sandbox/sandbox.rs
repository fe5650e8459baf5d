//! Handle to a running sandbox process.

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal as NixSignal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::signal::Signal;

use super::control::{self, Event, ExecArgs, ProcessInfo, Request, Response, WaitStatus};

/// Name of the control socket inside the sandbox's container directory.
pub const CONTROL_SOCKET: &str = "ctrl.sock";

const DIR_MODE: u32 = 0o711;
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const STARTUP_POLL: Duration = Duration::from_millis(20);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to launch sandbox process")]
    Spawn(#[source] std::io::Error),
    #[error("failed to create sandbox directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sandbox process exited during startup")]
    StartupExited,
    #[error("timed out waiting for sandbox control socket {path:?}")]
    StartupTimeout { path: PathBuf },
    #[error("failed to connect to sandbox control socket {path:?}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("control channel i/o failed")]
    Channel(#[source] std::io::Error),
    #[error("failed to encode control request")]
    Encode(#[source] serde_json::Error),
    #[error("malformed control response")]
    Decode(#[source] serde_json::Error),
    #[error("sandbox refused request: {0}")]
    Refused(String),
    #[error("unexpected control response")]
    UnexpectedResponse,
    #[error("sandbox is not running")]
    NotRunning,
    #[error("failed to signal sandbox process {pid}")]
    Kill {
        pid: i32,
        #[source]
        source: nix::Error,
    },
}

/// A user-space kernel process hosting one or more containers.
///
/// The handle is all the lifecycle core knows about the sandbox: its id
/// (equal to the id of its init container), the pid to probe and terminate,
/// and the control socket every other operation is funnelled through. It is
/// embedded in the container record and reconstructed from it on later
/// invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sandbox {
    pub id: String,
    pub pid: i32,
    pub control_socket: PathBuf,
}

impl Sandbox {
    /// Launches a new sandbox for the given container by re-invoking the
    /// runtime binary with the internal `boot` verb, carrying the current
    /// configuration on the child's command line. Returns once the sandbox
    /// is serving its control socket.
    pub fn create(
        id: &str,
        config: &Config,
        bundle_dir: &Path,
        console_socket: Option<&Path>,
    ) -> Result<Sandbox, SandboxError> {
        let container_root = config.root_dir.join(id);
        crate::utils::create_dir_all_with_mode(&container_root, DIR_MODE).map_err(|err| {
            SandboxError::CreateDir {
                path: container_root.clone(),
                source: err,
            }
        })?;
        let control_socket = container_root.join(CONTROL_SOCKET);

        let exe = std::env::current_exe().map_err(SandboxError::Spawn)?;
        let mut command = Command::new(exe);
        command
            .args(config.global_args())
            .arg("boot")
            .arg("--id")
            .arg(id)
            .arg("--bundle")
            .arg(bundle_dir);
        if let Some(console_socket) = console_socket {
            command.arg("--console-socket").arg(console_socket);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // Detach from the invoking terminal; the sandbox outlives this
        // short-lived CLI process.
        unsafe {
            command.pre_exec(|| {
                if nix::libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        tracing::debug!(%id, ?bundle_dir, "launch sandbox");
        let mut child = command.spawn().map_err(SandboxError::Spawn)?;
        let pid = child.id() as i32;

        // The sandbox signals readiness by accepting connections.
        let deadline = Instant::now() + STARTUP_TIMEOUT;
        loop {
            if std::os::unix::net::UnixStream::connect(&control_socket).is_ok() {
                break;
            }
            if let Ok(Some(_)) = child.try_wait() {
                return Err(SandboxError::StartupExited);
            }
            if Instant::now() > deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SandboxError::StartupTimeout {
                    path: control_socket,
                });
            }
            std::thread::sleep(STARTUP_POLL);
        }

        Ok(Sandbox {
            id: id.to_string(),
            pid,
            control_socket,
        })
    }

    /// Instructs the sandbox to begin executing the container's application
    /// process.
    pub fn start(&self, cid: &str) -> Result<(), SandboxError> {
        self.ack(Request::Start {
            cid: cid.to_string(),
        })
    }

    /// Runs an additional process inside the container, blocking until it
    /// exits.
    pub fn execute(&self, cid: &str, args: ExecArgs) -> Result<WaitStatus, SandboxError> {
        let response = self.roundtrip(Request::Execute {
            cid: cid.to_string(),
            args,
        })?;
        match response {
            Response::WaitResult(status) => Ok(status),
            _ => Err(SandboxError::UnexpectedResponse),
        }
    }

    /// Blocks until the container's init process exits.
    pub fn wait(&self, cid: &str) -> Result<WaitStatus, SandboxError> {
        let response = self.roundtrip(Request::Wait {
            cid: cid.to_string(),
        })?;
        match response {
            Response::WaitResult(status) => Ok(status),
            _ => Err(SandboxError::UnexpectedResponse),
        }
    }

    /// Forwards a signal to the container's init process.
    pub fn signal(&self, cid: &str, signal: Signal) -> Result<(), SandboxError> {
        self.ack(Request::Signal {
            cid: cid.to_string(),
            signo: signal.as_i32(),
        })
    }

    /// Returns a live metrics snapshot for the container.
    pub fn event(&self, cid: &str) -> Result<Event, SandboxError> {
        let response = self.roundtrip(Request::Event {
            cid: cid.to_string(),
        })?;
        match response {
            Response::EventResult(event) => Ok(event),
            _ => Err(SandboxError::UnexpectedResponse),
        }
    }

    /// Enumerates processes running inside the container.
    pub fn processes(&self, cid: &str) -> Result<Vec<ProcessInfo>, SandboxError> {
        let response = self.roundtrip(Request::Processes {
            cid: cid.to_string(),
        })?;
        match response {
            Response::ProcessList(processes) => Ok(processes),
            _ => Err(SandboxError::UnexpectedResponse),
        }
    }

    /// Requests a graceful stop of one container. Other containers hosted by
    /// the same sandbox are unaffected.
    pub fn stop(&self, cid: &str) -> Result<(), SandboxError> {
        self.ack(Request::Stop {
            cid: cid.to_string(),
        })
    }

    /// Terminates the entire sandbox process and waits for it to disappear.
    pub fn destroy(&self) -> Result<(), SandboxError> {
        tracing::debug!(id = %self.id, pid = self.pid, "destroy sandbox");
        match kill(Pid::from_raw(self.pid), NixSignal::SIGKILL) {
            Ok(()) => {}
            Err(nix::errno::Errno::ESRCH) => return Ok(()),
            Err(err) => {
                return Err(SandboxError::Kill {
                    pid: self.pid,
                    source: err,
                })
            }
        }
        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        while process_alive(self.pid) && Instant::now() < deadline {
            std::thread::sleep(STARTUP_POLL);
        }
        Ok(())
    }

    /// Probes whether the sandbox process is alive.
    pub fn is_running(&self) -> bool {
        process_alive(self.pid)
    }

    fn roundtrip(&self, request: Request) -> Result<Response, SandboxError> {
        control::expect_ok(control::call(&self.control_socket, &request)?)
    }

    fn ack(&self, request: Request) -> Result<(), SandboxError> {
        match self.roundtrip(request)? {
            Response::Ack => Ok(()),
            _ => Err(SandboxError::UnexpectedResponse),
        }
    }
}

/// True while a process with this pid exists and is not a zombie. A zombie
/// still answers signal 0, but nothing lives behind it; treating it as dead
/// keeps reconciliation honest even when no one reaps the sandbox promptly.
fn process_alive(pid: i32) -> bool {
    use procfs::process::ProcState;
    match procfs::process::Process::new(pid) {
        Ok(proc) => !matches!(
            proc.stat().and_then(|stat| stat.state()),
            Ok(ProcState::Zombie | ProcState::Dead) | Err(_)
        ),
        Err(_) => false,
    }
}
