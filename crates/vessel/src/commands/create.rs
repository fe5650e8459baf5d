//! Handles the creation of a new container.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libvessel::config::Config;
use libvessel::container::Container;
use oci_spec::runtime::Spec;

/// Create a container from an OCI bundle
#[derive(Parser, Debug)]
pub struct Create {
    /// Path to the bundle directory, containing config.json and the root
    /// filesystem
    #[arg(short, long, default_value = ".")]
    pub bundle: PathBuf,
    /// Unix socket path that will receive the console file descriptor
    #[arg(long)]
    pub console_socket: Option<PathBuf>,
    /// File to write the sandbox pid to; written last, as the completion
    /// signal for the engine
    #[arg(long)]
    pub pid_file: Option<PathBuf>,
    /// Name of the container instance
    pub container_id: String,
}

pub fn create(args: Create, config: &Config) -> Result<()> {
    let bundle = fs::canonicalize(&args.bundle)
        .with_context(|| format!("invalid bundle directory {:?}", args.bundle))?;
    let spec = Spec::load(bundle.join("config.json"))
        .with_context(|| format!("failed to load runtime spec from bundle {}", bundle.display()))?;
    Container::create(
        &args.container_id,
        spec,
        config,
        &bundle,
        args.console_socket.as_deref(),
        args.pid_file.as_deref(),
    )
    .with_context(|| format!("failed to create container {}", args.container_id))?;
    Ok(())
}
