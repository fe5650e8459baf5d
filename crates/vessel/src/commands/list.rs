//! The `list` verb: every container under the root directory.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use libvessel::config::Config;
use libvessel::container::Container;
use tabwriter::TabWriter;

/// List containers known to the runtime
#[derive(Parser, Debug)]
pub struct List {
    /// Output format: table or json
    #[arg(long, default_value = "table")]
    pub format: String,
    /// Display only container ids
    #[arg(long, short)]
    pub quiet: bool,
}

pub fn list(args: List, config: &Config) -> Result<()> {
    let ids = Container::list(&config.root_dir)?;

    if args.quiet {
        for id in ids {
            println!("{id}");
        }
        return Ok(());
    }

    let mut containers = Vec::new();
    for id in &ids {
        match Container::load(&config.root_dir, id) {
            Ok(container) => containers.push(container),
            Err(err) => {
                tracing::warn!(%id, %err, "skipping unreadable container");
            }
        }
    }

    match args.format.as_str() {
        "table" => {
            let mut content = String::new();
            for container in &containers {
                let pid = match container.pid() {
                    -1 => String::new(),
                    pid => pid.to_string(),
                };
                let created: DateTime<Local> = container.created_at.into();
                let _ = writeln!(
                    content,
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    container.id,
                    pid,
                    container.status,
                    container.bundle_dir.display(),
                    created.to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
                    container.owner,
                );
            }
            let mut tab_writer = TabWriter::new(std::io::stdout());
            writeln!(&mut tab_writer, "ID\tPID\tSTATUS\tBUNDLE\tCREATED\tOWNER")?;
            write!(&mut tab_writer, "{content}")?;
            tab_writer.flush()?;
        }
        "json" => {
            let states: Vec<_> = containers.iter().map(|c| c.state()).collect();
            println!("{}", serde_json::to_string_pretty(&states)?);
        }
        other => bail!("unknown list format {other:?}"),
    }

    Ok(())
}
