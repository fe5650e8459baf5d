//! Wire types for the sandbox control channel.
//!
//! The channel is a Unix stream socket inside the sandbox's container
//! directory. Each request is one newline-delimited JSON message on a fresh
//! connection, answered by exactly one response. Blocking requests (`Wait`,
//! `Execute`) simply hold the connection open until they resolve.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::sandbox::SandboxError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Request {
    Start { cid: String },
    Execute { cid: String, args: ExecArgs },
    Wait { cid: String },
    Signal { cid: String, signo: i32 },
    Event { cid: String },
    Processes { cid: String },
    Stop { cid: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Response {
    Ack,
    Error { message: String },
    WaitResult(WaitStatus),
    EventResult(Event),
    ProcessList(Vec<ProcessInfo>),
}

/// Exit information for a process: an exit code, or the signal that
/// terminated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitStatus {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl WaitStatus {
    pub fn from_exit_status(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        WaitStatus {
            exit_code: status.code(),
            signal: status.signal(),
        }
    }

    /// Collapses the wait status into the exit code the runtime process
    /// reports: `128 + signal` for a signalled process, the exit code
    /// otherwise.
    pub fn into_exit_code(self) -> i32 {
        if let Some(signal) = self.signal {
            return 128 + signal;
        }
        self.exit_code.unwrap_or(0)
    }
}

impl std::fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.exit_code, self.signal) {
            (_, Some(signal)) => write!(f, "terminated by signal {signal}"),
            (Some(code), None) => write!(f, "exit status {code}"),
            (None, None) => write!(f, "unknown wait status"),
        }
    }
}

/// A command to run inside an existing container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecArgs {
    pub args: Vec<String>,
    /// `KEY=VALUE` pairs; the process environment is built from these alone.
    pub env: Vec<String>,
    pub cwd: Option<PathBuf>,
}

/// A live metrics snapshot for one container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub id: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub memory_bytes: u64,
    pub pids: u32,
}

/// One row of the `ps` report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: i32,
    pub ppid: i32,
    pub user: String,
    pub comm: String,
}

/// Sends one request to the control socket and reads back the response.
pub fn call(socket_path: &Path, request: &Request) -> Result<Response, SandboxError> {
    let stream = UnixStream::connect(socket_path).map_err(|err| SandboxError::Connect {
        path: socket_path.to_path_buf(),
        source: err,
    })?;

    let mut encoded = serde_json::to_vec(request).map_err(SandboxError::Encode)?;
    encoded.push(b'\n');
    (&stream)
        .write_all(&encoded)
        .map_err(SandboxError::Channel)?;

    let mut line = String::new();
    BufReader::new(&stream)
        .read_line(&mut line)
        .map_err(SandboxError::Channel)?;
    serde_json::from_str(&line).map_err(SandboxError::Decode)
}

/// Like [`call`], but unwraps the three response shapes callers actually
/// distinguish: success payload or a sandbox-side error message.
pub fn expect_ok(response: Response) -> Result<Response, SandboxError> {
    match response {
        Response::Error { message } => Err(SandboxError::Refused(message)),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_status_exit_code_mapping() {
        let exited = WaitStatus {
            exit_code: Some(7),
            signal: None,
        };
        assert_eq!(exited.into_exit_code(), 7);

        let signalled = WaitStatus {
            exit_code: None,
            signal: Some(9),
        };
        assert_eq!(signalled.into_exit_code(), 137);
    }

    #[test]
    fn test_wait_status_display() {
        let exited = WaitStatus {
            exit_code: Some(0),
            signal: None,
        };
        assert_eq!(exited.to_string(), "exit status 0");
        let signalled = WaitStatus {
            exit_code: None,
            signal: Some(15),
        };
        assert_eq!(signalled.to_string(), "terminated by signal 15");
    }
}
