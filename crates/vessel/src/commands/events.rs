//! The `events` verb: periodic stats snapshots for one container.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use libvessel::config::Config;

use super::load_container;

/// Show resource statistics for the container
#[derive(Parser, Debug)]
pub struct Events {
    /// Stats collection interval in seconds
    #[arg(long, default_value_t = 5)]
    pub interval: u32,
    /// Display the container stats once and exit
    #[arg(long)]
    pub stats: bool,
    /// Name of the container instance
    pub container_id: String,
}

pub fn events(args: Events, config: &Config) -> Result<()> {
    let container = load_container(config, &args.container_id)?;

    loop {
        let event = container
            .event()
            .with_context(|| format!("failed to get events for container {}", args.container_id))?;
        println!("{}", serde_json::to_string(&event)?);
        if args.stats {
            return Ok(());
        }
        std::thread::sleep(Duration::from_secs(args.interval as u64));
    }
}
