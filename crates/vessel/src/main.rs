//! Binary `vessel` is an implementation of the Open Container Initiative
//! runtime contract that runs applications inside a user-space kernel
//! sandbox. Each invocation performs one lifecycle verb and exits; container
//! state lives on disk under the root directory between invocations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use libvessel::config::Config;

mod commands;
mod observability;
mod rootpath;

#[derive(Parser, Debug)]
#[command(version, about, author)]
struct Opts {
    #[command(flatten)]
    global: GlobalOpts,
    #[command(subcommand)]
    subcmd: SubCommand,
}

/// Flags shared by every verb. They are not part of the OCI spec, but
/// engines pass them, so names and defaults are stable.
#[derive(Args, Debug)]
pub(crate) struct GlobalOpts {
    /// Root directory for storage of container state
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
    /// File path where internal debug information is written; always
    /// appended to, since engines reuse one path across invocations
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,
    /// Log format: text (default) or json
    #[arg(long, global = true)]
    pub log_format: Option<String>,
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
    /// Additional location for logs; creates an individual log file per command
    #[arg(long, global = true)]
    pub debug_log_dir: Option<PathBuf>,
    /// Which sandbox kernel backend to use: ptrace (default) or kvm
    #[arg(long, global = true, default_value = "ptrace")]
    pub platform: String,
    /// Which network to use: sandbox (default), host or none
    #[arg(long, global = true, default_value = "sandbox")]
    pub network: String,
    /// Which filesystem access to use: proxy (default) or direct
    #[arg(long, global = true, default_value = "proxy")]
    pub file_access: String,
    /// Wrap filesystem mounts with a writable overlay held in memory
    #[arg(long, global = true)]
    pub overlay: bool,
    /// Enable network packet logging
    #[arg(long, global = true)]
    pub log_packets: bool,
    /// Enable strace
    #[arg(long, global = true)]
    pub strace: bool,
    /// Comma-separated list of syscalls to trace; empty traces all of them
    #[arg(long, global = true)]
    pub strace_syscalls: Option<String>,
    /// Default size (in bytes) to log data argument blobs
    #[arg(long, global = true, default_value_t = 1024)]
    pub strace_log_size: u32,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    Create(commands::create::Create),
    Start(commands::start::Start),
    Run(commands::run::Run),
    Exec(commands::exec::Exec),
    Kill(commands::kill::Kill),
    Delete(commands::delete::Delete),
    List(commands::list::List),
    Ps(commands::ps::Ps),
    State(commands::state::State),
    Events(commands::events::Events),
    #[command(hide = true)]
    Boot(commands::boot::Boot),
}

impl SubCommand {
    fn name(&self) -> &'static str {
        match self {
            SubCommand::Create(_) => "create",
            SubCommand::Start(_) => "start",
            SubCommand::Run(_) => "run",
            SubCommand::Exec(_) => "exec",
            SubCommand::Kill(_) => "kill",
            SubCommand::Delete(_) => "delete",
            SubCommand::List(_) => "list",
            SubCommand::Ps(_) => "ps",
            SubCommand::State(_) => "state",
            SubCommand::Events(_) => "events",
            SubCommand::Boot(_) => "boot",
        }
    }
}

fn build_config(global: &GlobalOpts) -> Result<Config> {
    Ok(Config {
        root_dir: rootpath::determine(global.root.clone())?,
        debug: global.debug,
        log_file: global.log.clone(),
        log_format: global.log_format.clone(),
        debug_log_dir: global.debug_log_dir.clone(),
        platform: global.platform.parse()?,
        network: global.network.parse()?,
        file_access: global.file_access.parse()?,
        overlay: global.overlay,
        log_packets: global.log_packets,
        strace: global.strace,
        strace_syscalls: global
            .strace_syscalls
            .as_deref()
            .map(|list| list.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
        strace_log_size: global.strace_log_size,
    })
}

fn dispatch(subcmd: SubCommand, config: &Config) -> Result<i32> {
    match subcmd {
        SubCommand::Create(args) => commands::create::create(args, config).map(|_| 0),
        SubCommand::Start(args) => commands::start::start(args, config).map(|_| 0),
        SubCommand::Run(args) => commands::run::run(args, config),
        SubCommand::Exec(args) => commands::exec::exec(args, config),
        SubCommand::Kill(args) => commands::kill::kill(args, config).map(|_| 0),
        SubCommand::Delete(args) => commands::delete::delete(args, config).map(|_| 0),
        SubCommand::List(args) => commands::list::list(args, config).map(|_| 0),
        SubCommand::Ps(args) => commands::ps::ps(args, config).map(|_| 0),
        SubCommand::State(args) => commands::state::state(args, config).map(|_| 0),
        SubCommand::Events(args) => commands::events::events(args, config).map(|_| 0),
        SubCommand::Boot(args) => commands::boot::boot(args, config).map(|_| 0),
    }
}

fn main() {
    let opts = Opts::parse();

    if let Err(err) = observability::init(&opts.global, opts.subcmd.name()) {
        eprintln!("vessel: failed to initialize logging: {err:#}");
        std::process::exit(128);
    }

    let exit_code = build_config(&opts.global)
        .context("invalid configuration")
        .and_then(|config| {
            tracing::debug!(
                pid = std::process::id(),
                args = ?std::env::args().collect::<Vec<_>>(),
                root = ?config.root_dir,
                "invocation"
            );
            dispatch(opts.subcmd, &config)
        });

    match exit_code {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!("command failed: {err:#}");
            std::process::exit(128);
        }
    }
}
