use anyhow::{Context, Result};
use clap::Parser;
use libvessel::config::Config;
use libvessel::signal::Signal;

use super::load_container;

/// Send a signal to the container's init process
#[derive(Parser, Debug)]
pub struct Kill {
    /// Name of the container instance
    pub container_id: String,
    /// Signal to send: a name (TERM, SIGKILL) or a number
    #[arg(default_value = "TERM")]
    pub signal: String,
}

pub fn kill(args: Kill, config: &Config) -> Result<()> {
    let container = load_container(config, &args.container_id)?;
    let signal = Signal::try_from(args.signal.as_str())?;
    container
        .signal(signal)
        .with_context(|| format!("failed to signal container {}", args.container_id))
}
