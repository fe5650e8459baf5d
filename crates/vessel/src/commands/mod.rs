//! One module per CLI verb. Each exposes its clap args struct and a
//! function taking those args plus the invocation [`Config`].

use anyhow::{Context, Result};
use libvessel::config::Config;
use libvessel::container::Container;

pub mod boot;
pub mod create;
pub mod delete;
pub mod events;
pub mod exec;
pub mod kill;
pub mod list;
pub mod ps;
pub mod run;
pub mod start;
pub mod state;

fn load_container(config: &Config, container_id: &str) -> Result<Container> {
    Container::load(&config.root_dir, container_id)
        .with_context(|| format!("could not load container {container_id}"))
}
