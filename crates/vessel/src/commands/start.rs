use anyhow::{Context, Result};
use clap::Parser;
use libvessel::config::Config;

use super::load_container;

/// Start a previously created container
#[derive(Parser, Debug)]
pub struct Start {
    pub container_id: String,
}

pub fn start(args: Start, config: &Config) -> Result<()> {
    let mut container = load_container(config, &args.container_id)?;
    container
        .start()
        .with_context(|| format!("failed to start container {}", args.container_id))
}
