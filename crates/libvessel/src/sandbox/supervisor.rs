//! The sandbox supervisor: what actually runs behind the internal `boot`
//! verb.
//!
//! A supervisor process hosts one container group. It loads the spec from
//! the bundle, serves the control socket, spawns the container's application
//! process on `Start`, and reaps it on exit. Once the init container's
//! process is gone and in-flight connections have drained, the supervisor
//! exits; the lifecycle core keys its dead-sandbox reconciliation off
//! exactly that.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal as NixSignal};
use nix::unistd::{Pid, Uid, User};
use oci_spec::runtime::Spec;

use crate::config::Config;
use crate::utils;

use super::control::{Event, EventData, ExecArgs, ProcessInfo, Request, Response, WaitStatus};
use super::sandbox::CONTROL_SOCKET;

const DIR_MODE: u32 = 0o711;
const ACCEPT_POLL: Duration = Duration::from_millis(25);
/// How long the supervisor lingers after the workload exits, so that a
/// caller racing the exit can still collect the wait status.
const LINGER: Duration = Duration::from_secs(2);
/// Hard cap on draining; a hung client cannot keep a dead sandbox alive.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to load runtime spec from bundle {path:?}")]
    Spec {
        path: PathBuf,
        #[source]
        source: oci_spec::OciSpecError,
    },
    #[error("failed to create sandbox directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to bind control socket {path:?}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to accept control connection")]
    Accept(#[source] std::io::Error),
}

#[derive(Default)]
struct WorkloadState {
    started: bool,
    stopped: bool,
    pid: Option<i32>,
    result: Option<WaitStatus>,
    /// Pids spawned into the sandbox, the workload plus exec'd processes.
    tracked: Vec<i32>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<WorkloadState>,
    exited: Condvar,
    active: AtomicUsize,
    shutdown: AtomicBool,
}

pub struct Supervisor {
    id: String,
    bundle: PathBuf,
    spec: Spec,
    socket_path: PathBuf,
    shared: Arc<Shared>,
}

impl Supervisor {
    pub fn new(config: &Config, id: &str, bundle: &Path) -> Result<Supervisor, SupervisorError> {
        let spec_path = bundle.join("config.json");
        let spec = Spec::load(&spec_path).map_err(|err| SupervisorError::Spec {
            path: spec_path,
            source: err,
        })?;

        let container_root = config.root_dir.join(id);
        utils::create_dir_all_with_mode(&container_root, DIR_MODE).map_err(|err| {
            SupervisorError::CreateDir {
                path: container_root.clone(),
                source: err,
            }
        })?;

        tracing::info!(
            %id,
            platform = %config.platform,
            network = %config.network,
            file_access = %config.file_access,
            overlay = config.overlay,
            strace = config.strace,
            "sandbox configuration"
        );

        Ok(Supervisor {
            id: id.to_string(),
            bundle: bundle.to_path_buf(),
            spec,
            socket_path: container_root.join(CONTROL_SOCKET),
            shared: Arc::default(),
        })
    }

    /// Serves the control socket until the workload has exited and pending
    /// connections have drained.
    pub fn serve(self) -> Result<(), SupervisorError> {
        // a stale socket from a previous pid of this sandbox id would make
        // bind fail with AddrInUse
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = UnixListener::bind(&self.socket_path).map_err(|err| {
            SupervisorError::Bind {
                path: self.socket_path.clone(),
                source: err,
            }
        })?;
        listener
            .set_nonblocking(true)
            .map_err(SupervisorError::Accept)?;
        tracing::info!(id = %self.id, socket = ?self.socket_path, "sandbox supervisor serving");

        let supervisor = Arc::new(self);
        let mut draining_since: Option<Instant> = None;
        loop {
            match listener.accept() {
                Ok((stream, _)) => {
                    supervisor.shared.active.fetch_add(1, Ordering::SeqCst);
                    let worker = Arc::clone(&supervisor);
                    std::thread::spawn(move || {
                        worker.handle_connection(stream);
                        worker.shared.active.fetch_sub(1, Ordering::SeqCst);
                    });
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if supervisor.shared.shutdown.load(Ordering::SeqCst) {
                        let since = *draining_since.get_or_insert_with(Instant::now);
                        let idle = supervisor.shared.active.load(Ordering::SeqCst) == 0;
                        if since.elapsed() > DRAIN_TIMEOUT
                            || (idle && since.elapsed() > LINGER)
                        {
                            break;
                        }
                    }
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(err) => return Err(SupervisorError::Accept(err)),
            }
        }

        tracing::info!(id = %supervisor.id, "sandbox supervisor exiting");
        let _ = std::fs::remove_file(&supervisor.socket_path);
        Ok(())
    }

    fn handle_connection(&self, stream: UnixStream) {
        let mut line = String::new();
        if let Err(err) = BufReader::new(&stream).read_line(&mut line) {
            tracing::warn!(%err, "failed to read control request");
            return;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => self.dispatch(request),
            Err(err) => Response::Error {
                message: format!("malformed request: {err}"),
            },
        };
        let mut encoded = match serde_json::to_vec(&response) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::error!(%err, "failed to encode control response");
                return;
            }
        };
        encoded.push(b'\n');
        if let Err(err) = (&stream).write_all(&encoded) {
            // the client may have gone away; a one-shot connection has
            // nothing left to clean up
            tracing::debug!(%err, "failed to write control response");
        }
    }

    fn dispatch(&self, request: Request) -> Response {
        tracing::debug!(id = %self.id, ?request, "control request");
        let cid = match &request {
            Request::Start { cid }
            | Request::Execute { cid, .. }
            | Request::Wait { cid }
            | Request::Signal { cid, .. }
            | Request::Event { cid }
            | Request::Processes { cid }
            | Request::Stop { cid } => cid,
        };
        if cid != &self.id {
            return Response::Error {
                message: format!("sandbox {} does not host container {cid}", self.id),
            };
        }
        match request {
            Request::Start { .. } => self.start_workload(),
            Request::Execute { args, .. } => self.execute(args),
            Request::Wait { .. } => self.wait_workload(),
            Request::Signal { signo, .. } => self.signal_workload(signo),
            Request::Event { .. } => self.event(),
            Request::Processes { .. } => self.processes(),
            Request::Stop { .. } => self.stop(),
        }
    }

    fn start_workload(&self) -> Response {
        let mut state = self.lock();
        if state.stopped {
            return Response::Error {
                message: "container has been stopped".to_string(),
            };
        }
        if state.started {
            return Response::Error {
                message: "container process has already been started".to_string(),
            };
        }
        let command = match self.workload_command() {
            Ok(command) => command,
            Err(err) => {
                return Response::Error {
                    message: format!("cannot build container process: {err}"),
                }
            }
        };
        let pid = match self.spawn_and_reap(command) {
            Ok(pid) => pid,
            Err(err) => {
                return Response::Error {
                    message: format!("failed to spawn container process: {err}"),
                }
            }
        };
        tracing::info!(id = %self.id, pid, "container process started");
        state.started = true;
        state.pid = Some(pid);
        state.tracked.push(pid);
        Response::Ack
    }

    fn workload_command(&self) -> std::io::Result<Command> {
        let process = self.spec.process().as_ref().ok_or_else(|| {
            std::io::Error::new(ErrorKind::InvalidInput, "spec has no process")
        })?;
        let args = process
            .args()
            .as_ref()
            .filter(|args| !args.is_empty())
            .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "process has no args"))?;

        let mut command = Command::new(&args[0]);
        command.args(&args[1..]);
        command.env_clear();
        if let Some(env) = process.env() {
            command.envs(utils::parse_env(env));
        }
        let cwd = process.cwd();
        if cwd.as_os_str().is_empty() || !cwd.exists() {
            command.current_dir(&self.bundle);
        } else {
            command.current_dir(cwd);
        }
        Ok(command)
    }

    /// Spawns the workload from the thread that will also reap it. The
    /// parent-death signal is delivered when the spawning *thread* exits,
    /// not the process, so the spawner must stay alive for the workload's
    /// whole lifetime; a short-lived connection handler cannot do it.
    fn spawn_and_reap(&self, command: Command) -> std::io::Result<i32> {
        let shared = Arc::clone(&self.shared);
        let id = self.id.clone();
        let (sender, receiver) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let mut command = command;
            let mut child = match spawn_in_sandbox(&mut command) {
                Ok(child) => child,
                Err(err) => {
                    let _ = sender.send(Err(err));
                    return;
                }
            };
            let _ = sender.send(Ok(child.id() as i32));

            let result = match child.wait() {
                Ok(status) => WaitStatus::from_exit_status(status),
                Err(err) => {
                    tracing::error!(%id, %err, "failed to wait on container process");
                    WaitStatus {
                        exit_code: None,
                        signal: None,
                    }
                }
            };
            tracing::info!(%id, %result, "container process exited");
            {
                let mut state = shared.state.lock().expect("supervisor state poisoned");
                state.result = Some(result);
            }
            shared.exited.notify_all();
            shared.shutdown.store(true, Ordering::SeqCst);
        });
        receiver
            .recv()
            .unwrap_or_else(|_| Err(std::io::Error::other("workload thread died")))
    }

    fn wait_workload(&self) -> Response {
        let mut state = self.lock();
        loop {
            if let Some(result) = state.result {
                return Response::WaitResult(result);
            }
            state = self
                .shared
                .exited
                .wait(state)
                .expect("supervisor state poisoned");
        }
    }

    fn execute(&self, args: ExecArgs) -> Response {
        if args.args.is_empty() {
            return Response::Error {
                message: "exec requires a command".to_string(),
            };
        }
        let mut command = Command::new(&args.args[0]);
        command.args(&args.args[1..]);
        command.env_clear();
        command.envs(utils::parse_env(&args.env));
        command.current_dir(args.cwd.as_deref().unwrap_or(self.bundle.as_path()));
        // the handler thread waits on the exec'd process inline, so it is a
        // valid parent-death anchor, unlike the Start path
        let mut child = match spawn_in_sandbox(&mut command) {
            Ok(child) => child,
            Err(err) => {
                return Response::Error {
                    message: format!("failed to spawn exec process: {err}"),
                }
            }
        };

        let pid = child.id() as i32;
        self.lock().tracked.push(pid);
        let response = match child.wait() {
            Ok(status) => Response::WaitResult(WaitStatus::from_exit_status(status)),
            Err(err) => Response::Error {
                message: format!("failed to wait on exec process: {err}"),
            },
        };
        self.lock().tracked.retain(|tracked| *tracked != pid);
        response
    }

    fn signal_workload(&self, signo: i32) -> Response {
        let signal = match NixSignal::try_from(signo) {
            Ok(signal) => signal,
            Err(_) => {
                return Response::Error {
                    message: format!("invalid signal {signo}"),
                }
            }
        };
        let state = self.lock();
        let pid = match (state.pid, state.result) {
            (Some(pid), None) => pid,
            _ => {
                return Response::Error {
                    message: "container process is not running".to_string(),
                }
            }
        };
        drop(state);
        match kill(Pid::from_raw(pid), signal) {
            Ok(()) => Response::Ack,
            Err(err) => Response::Error {
                message: format!("failed to signal pid {pid}: {err}"),
            },
        }
    }

    fn event(&self) -> Response {
        let state = self.lock();
        let memory_bytes = match (state.pid, state.result) {
            (Some(pid), None) => resident_bytes(pid).unwrap_or(0),
            _ => 0,
        };
        let pids = state
            .tracked
            .iter()
            .filter(|pid| kill(Pid::from_raw(**pid), None).is_ok())
            .count() as u32;
        Response::EventResult(Event {
            event_type: "stats".to_string(),
            id: self.id.clone(),
            data: EventData { memory_bytes, pids },
        })
    }

    fn processes(&self) -> Response {
        let state = self.lock();
        let mut rows = Vec::new();
        for &pid in &state.tracked {
            let proc = match procfs::process::Process::new(pid) {
                Ok(proc) => proc,
                Err(_) => continue,
            };
            let stat = match proc.stat() {
                Ok(stat) => stat,
                Err(_) => continue,
            };
            let user = proc
                .uid()
                .ok()
                .and_then(|uid| User::from_uid(Uid::from_raw(uid)).ok().flatten())
                .map(|user| user.name)
                .unwrap_or_else(|| "?".to_string());
            rows.push(ProcessInfo {
                pid,
                ppid: stat.ppid,
                user,
                comm: stat.comm,
            });
        }
        Response::ProcessList(rows)
    }

    fn stop(&self) -> Response {
        tracing::info!(id = %self.id, "stop container");
        let mut state = self.lock();
        state.stopped = true;
        if let (Some(pid), None) = (state.pid, state.result) {
            let _ = kill(Pid::from_raw(pid), NixSignal::SIGKILL);
            while state.result.is_none() {
                let (guard, timeout) = self
                    .shared
                    .exited
                    .wait_timeout(state, Duration::from_secs(5))
                    .expect("supervisor state poisoned");
                state = guard;
                if timeout.timed_out() {
                    break;
                }
            }
        }
        Response::Ack
    }

    fn lock(&self) -> MutexGuard<'_, WorkloadState> {
        self.shared.state.lock().expect("supervisor state poisoned")
    }
}

/// Spawns a child that cannot outlive the sandbox: stdio detached, and the
/// kernel delivers SIGKILL to it the moment the supervisor dies.
fn spawn_in_sandbox(command: &mut Command) -> std::io::Result<Child> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    unsafe {
        command.pre_exec(|| {
            if nix::libc::prctl(nix::libc::PR_SET_PDEATHSIG, nix::libc::SIGKILL as nix::libc::c_ulong) == -1
            {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
    command.spawn()
}

fn resident_bytes(pid: i32) -> Option<u64> {
    let proc = procfs::process::Process::new(pid).ok()?;
    let statm = proc.statm().ok()?;
    Some(statm.resident * procfs::page_size())
}
