//! OCI lifecycle hook execution.
//!
//! Hooks are external programs run at defined transitions, with the current
//! OCI state document piped into stdin. The two failure policies the OCI
//! lifecycle mandates live here: [`run_hooks`] stops at the first failure
//! (prestart), [`run_hooks_best_effort`] logs and keeps going (poststart and
//! poststop).

use std::io::{ErrorKind, Write};
use std::os::unix::prelude::CommandExt;
use std::{process, thread, time};

use nix::sys::signal;
use nix::unistd::Pid;
use oci_spec::runtime::Hook;

use crate::container::OciState;
use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("failed to execute hook command")]
    CommandExecute(#[source] std::io::Error),
    #[error("failed to encode container state")]
    EncodeState(#[source] serde_json::Error),
    #[error("failed to write container state to hook stdin")]
    WriteState(#[source] std::io::Error),
    #[error("hook command exited with non-zero exit code: {0}")]
    NonZeroExitCode(i32),
    #[error("hook command was killed by a signal")]
    Killed,
    #[error("hook command timed out")]
    Timeout,
}

type Result<T> = std::result::Result<T, HookError>;

/// Runs the hooks in declared order, stopping at the first failure.
pub fn run_hooks(hooks: &[Hook], state: &OciState) -> Result<()> {
    for hook in hooks {
        run_hook(hook, state)?;
    }
    Ok(())
}

/// Runs every hook in declared order; a failing hook is logged as a warning
/// and the remaining hooks still run, as if it had succeeded.
pub fn run_hooks_best_effort(hooks: &[Hook], state: &OciState) {
    for hook in hooks {
        if let Err(err) = run_hook(hook, state) {
            tracing::warn!(hook = ?hook.path(), %err, "hook failed, continuing");
        }
    }
}

fn run_hook(hook: &Hook, state: &OciState) -> Result<()> {
    let mut command = process::Command::new(hook.path());

    // The OCI args vector includes arg0, which may differ from the path;
    // rust's Command keeps arg0 separate, so split it off.
    if let Some((arg0, args)) = hook.args().as_ref().and_then(|a| a.split_first()) {
        command.arg0(arg0).args(args);
    } else {
        command.arg0(hook.path());
    }

    let envs = hook
        .env()
        .as_ref()
        .map(|envs| utils::parse_env(envs))
        .unwrap_or_default();

    let mut child = command
        .env_clear()
        .envs(envs)
        .stdin(process::Stdio::piped())
        .stdout(process::Stdio::null())
        .stderr(process::Stdio::null())
        .spawn()
        .map_err(HookError::CommandExecute)?;
    let child_pid = Pid::from_raw(child.id() as i32);

    if let Some(stdin) = &mut child.stdin {
        let encoded = serde_json::to_vec(state).map_err(HookError::EncodeState)?;
        if let Err(err) = stdin.write_all(&encoded) {
            // A broken pipe means the hook finished (or crashed) without
            // reading its stdin; its exit status decides the outcome below.
            // Any other error means the hook may still be waiting on us.
            if err.kind() != ErrorKind::BrokenPipe {
                let _ = signal::kill(child_pid, signal::Signal::SIGKILL);
                return Err(HookError::WriteState(err));
            }
        }
    }
    drop(child.stdin.take());

    let waited = if let Some(timeout_secs) = hook.timeout() {
        // Command has no wait-with-deadline; park the wait on a helper
        // thread and bound it with a channel timeout, killing the hook by
        // pid when it fires.
        let (sender, receiver) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let _ = sender.send(child.wait());
        });
        match receiver.recv_timeout(time::Duration::from_secs(timeout_secs as u64)) {
            Ok(waited) => waited,
            Err(_) => {
                let _ = signal::kill(child_pid, signal::Signal::SIGKILL);
                return Err(HookError::Timeout);
            }
        }
    } else {
        child.wait()
    };

    match waited {
        Ok(exit_status) => match exit_status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(HookError::NonZeroExitCode(code)),
            None => Err(HookError::Killed),
        },
        Err(err) => Err(HookError::CommandExecute(err)),
    }
}
