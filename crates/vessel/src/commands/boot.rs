//! The internal `boot` verb: the body of a sandbox process.
//!
//! Never invoked by users; `create` re-runs this binary with `boot` and the
//! parent invocation's global flags to bring up the supervisor for a new
//! container.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libvessel::config::Config;
use libvessel::sandbox::Supervisor;

/// Launch the sandbox supervisor for a container (internal use only)
#[derive(Parser, Debug)]
pub struct Boot {
    /// Id of the init container this sandbox hosts
    #[arg(long)]
    pub id: String,
    /// Bundle directory holding config.json
    #[arg(long)]
    pub bundle: PathBuf,
    /// Console socket passed through from create
    #[arg(long)]
    pub console_socket: Option<PathBuf>,
}

pub fn boot(args: Boot, config: &Config) -> Result<()> {
    if let Some(console_socket) = &args.console_socket {
        // terminal forwarding is not wired into the supervisor
        tracing::debug!(?console_socket, "ignoring console socket");
    }
    let supervisor = Supervisor::new(config, &args.id, &args.bundle)
        .with_context(|| format!("failed to set up sandbox for container {}", args.id))?;
    supervisor
        .serve()
        .with_context(|| format!("sandbox for container {} failed", args.id))
}
