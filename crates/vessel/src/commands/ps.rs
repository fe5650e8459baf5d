//! The `ps` verb: processes running inside one container.

use std::io::Write;

use anyhow::{bail, Context, Result};
use clap::Parser;
use libvessel::config::Config;
use tabwriter::TabWriter;

use super::load_container;

/// Display the processes inside the container
#[derive(Parser, Debug)]
pub struct Ps {
    /// Output format: table or json
    #[arg(long, default_value = "table")]
    pub format: String,
    /// Name of the container instance
    pub container_id: String,
}

pub fn ps(args: Ps, config: &Config) -> Result<()> {
    let container = load_container(config, &args.container_id)?;
    let processes = container
        .processes()
        .with_context(|| format!("failed to get processes of container {}", args.container_id))?;

    match args.format.as_str() {
        "table" => {
            let mut tab_writer = TabWriter::new(std::io::stdout());
            writeln!(&mut tab_writer, "PID\tPPID\tUSER\tCOMM")?;
            for process in &processes {
                writeln!(
                    &mut tab_writer,
                    "{}\t{}\t{}\t{}",
                    process.pid, process.ppid, process.user, process.comm
                )?;
            }
            tab_writer.flush()?;
        }
        "json" => println!("{}", serde_json::to_string_pretty(&processes)?),
        other => bail!("unknown ps format {other:?}"),
    }

    Ok(())
}
