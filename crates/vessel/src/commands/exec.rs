use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libvessel::config::Config;
use libvessel::sandbox::control::ExecArgs;

use super::load_container;

/// Execute an additional process inside an existing container
#[derive(Parser, Debug)]
pub struct Exec {
    /// Working directory for the executed process
    #[arg(long)]
    pub cwd: Option<PathBuf>,
    /// Environment variables for the process, KEY=VALUE, may be repeated
    #[arg(short, long)]
    pub env: Vec<String>,
    /// Name of the container instance
    pub container_id: String,
    /// Command to run inside the container
    #[arg(required = true, trailing_var_arg = true)]
    pub command: Vec<String>,
}

pub fn exec(args: Exec, config: &Config) -> Result<i32> {
    let container = load_container(config, &args.container_id)?;
    let status = container
        .execute(ExecArgs {
            args: args.command,
            env: args.env,
            cwd: args.cwd,
        })
        .with_context(|| format!("failed to exec in container {}", args.container_id))?;
    Ok(status.into_exit_code())
}
