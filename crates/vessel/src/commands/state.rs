use anyhow::Result;
use clap::Parser;
use libvessel::config::Config;

use super::load_container;

/// Show the OCI state document of the container
#[derive(Parser, Debug)]
pub struct State {
    /// Name of the container instance
    pub container_id: String,
}

pub fn state(args: State, config: &Config) -> Result<()> {
    let container = load_container(config, &args.container_id)?;
    println!("{}", serde_json::to_string_pretty(&container.state())?);
    Ok(())
}
