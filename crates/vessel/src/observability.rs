//! Logging initialization.
//!
//! Three destinations can be active at once: stderr (the default), the
//! engine-provided `--log` file, and a per-command file under
//! `--debug-log-dir`. Log files are only ever opened with `O_APPEND`:
//! engines pass the same path to every invocation and parse the result, so
//! truncating would destroy another invocation's output.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

use crate::GlobalOpts;

const LOG_FORMAT_TEXT: &str = "text";
const LOG_FORMAT_JSON: &str = "json";

enum LogFormat {
    Text,
    Json,
}

fn detect_log_format(log_format: Option<&str>) -> Result<LogFormat> {
    match log_format {
        None | Some(LOG_FORMAT_TEXT) => Ok(LogFormat::Text),
        Some(LOG_FORMAT_JSON) => Ok(LogFormat::Json),
        Some(unknown) => bail!("unknown log format: {unknown}"),
    }
}

fn detect_log_level(is_debug: bool) -> Level {
    if is_debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// A log file shared across layers and worker threads. Writes go through
/// `&File`, which is append-atomic for the line-sized records we emit.
#[derive(Clone)]
struct SharedFile(Arc<File>);

impl std::io::Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (&*self.0).flush()
    }
}

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = SharedFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn open_append(path: &Path) -> std::io::Result<SharedFile> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(SharedFile(Arc::new(file)))
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn file_layer(format: &LogFormat, file: SharedFile) -> BoxedLayer {
    match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().with_writer(file).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(file)
            .boxed(),
    }
}

pub fn init(opts: &GlobalOpts, verb: &str) -> Result<()> {
    let level = detect_log_level(opts.debug);
    let format = detect_log_format(opts.log_format.as_deref())?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    match &opts.log {
        Some(path) => {
            let file = open_append(path)
                .with_context(|| format!("failed to open log file {path:?}"))?;
            layers.push(file_layer(&format, file));
        }
        None => {
            layers.push(match format {
                LogFormat::Text => tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .boxed(),
                LogFormat::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .boxed(),
            });
        }
    }

    if let Some(dir) = &opts.debug_log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create debug log dir {dir:?}"))?;
        let filename = format!(
            "vessel.log.{}.{verb}",
            chrono::Local::now().format("%Y%m%d-%H%M%S%.6f")
        );
        let path = dir.join(filename);
        let file = open_append(&path)
            .with_context(|| format!("failed to open debug log file {path:?}"))?;
        // per-command debug files are always text, whatever --log-format says
        layers.push(file_layer(&LogFormat::Text, file));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(tracing_subscriber::filter::LevelFilter::from_level(level))
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install logging subscriber: {err}"))
}
