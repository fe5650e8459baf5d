use anyhow::{Context, Result};
use clap::Parser;
use libvessel::config::Config;

use super::load_container;

/// Release all resources held by the container
#[derive(Parser, Debug)]
pub struct Delete {
    /// Name of the container instance
    pub container_id: String,
}

pub fn delete(args: Delete, config: &Config) -> Result<()> {
    tracing::debug!(id = %args.container_id, "delete container");
    let mut container = load_container(config, &args.container_id)?;
    container
        .destroy()
        .with_context(|| format!("failed to delete container {}", args.container_id))
}
