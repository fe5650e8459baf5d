//! Create a container and immediately run it to completion.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libvessel::config::Config;
use libvessel::container::Container;
use oci_spec::runtime::Spec;

/// Create a container and run it until its init process exits
#[derive(Parser, Debug)]
pub struct Run {
    /// Path to the bundle directory, containing config.json and the root
    /// filesystem
    #[arg(short, long, default_value = ".")]
    pub bundle: PathBuf,
    /// Unix socket path that will receive the console file descriptor
    #[arg(long)]
    pub console_socket: Option<PathBuf>,
    /// File to write the sandbox pid to
    #[arg(long)]
    pub pid_file: Option<PathBuf>,
    /// Name of the container instance
    pub container_id: String,
}

pub fn run(args: Run, config: &Config) -> Result<i32> {
    let bundle = fs::canonicalize(&args.bundle)
        .with_context(|| format!("invalid bundle directory {:?}", args.bundle))?;
    let spec = Spec::load(bundle.join("config.json"))
        .with_context(|| format!("failed to load runtime spec from bundle {}", bundle.display()))?;
    let status = Container::run(
        &args.container_id,
        spec,
        config,
        &bundle,
        args.console_socket.as_deref(),
        args.pid_file.as_deref(),
    )
    .with_context(|| format!("failed to run container {}", args.container_id))?;
    tracing::info!(id = %args.container_id, %status, "container exited");
    Ok(status.into_exit_code())
}
