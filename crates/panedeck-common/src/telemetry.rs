//! Log routing for the host process.
//!
//! stdout carries the JSON-lines protocol, so a [`LogSink`] is either stderr
//! or a file. Problems found while resolving settings are held back and
//! logged once the subscriber exists instead of being printed.

use std::any::Any;
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::error;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::env::env_string;

pub const LOG_FILE_ENV: &str = "PANEDECK_LOG";
pub const LOG_FORMAT_ENV: &str = "PANEDECK_LOG_FORMAT";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LogSink {
    #[default]
    Stderr,
    File(PathBuf),
}

/// Keeps the non-blocking file writer flushing until the host exits.
#[derive(Debug)]
#[must_use = "dropping the guard stops file logging"]
pub struct TelemetryGuard {
    _worker: Option<WorkerGuard>,
}

#[derive(Clone, Debug)]
pub struct LogSettings {
    default_filter: String,
    format: LogFormat,
    sink: LogSink,
    deferred: Vec<String>,
}

impl LogSettings {
    /// `default_filter` applies when `RUST_LOG` is unset or invalid.
    pub fn new(default_filter: impl Into<String>) -> Self {
        Self {
            default_filter: default_filter.into(),
            format: LogFormat::default(),
            sink: LogSink::default(),
            deferred: Vec::new(),
        }
    }

    pub fn from_env(default_filter: impl Into<String>) -> Self {
        let mut settings = Self::new(default_filter);
        if let Some(raw) = env_string(LOG_FORMAT_ENV) {
            match raw.parse() {
                Ok(format) => settings.format = format,
                Err(err) => settings
                    .deferred
                    .push(format!("{LOG_FORMAT_ENV}: {err}; using text")),
            }
        }
        if let Some(path) = env_string(LOG_FILE_ENV) {
            settings.sink = LogSink::File(PathBuf::from(path));
        }
        settings
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = LogSink::File(path.into());
        self
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Installs the global subscriber. A second install is a no-op.
    pub fn install(self) -> TelemetryGuard {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.default_filter));
        let mut deferred = self.deferred;

        let (writer, worker, ansi) = match open_sink(&self.sink) {
            Ok(parts) => parts,
            Err(note) => {
                deferred.push(note);
                stderr_writer()
            }
        };

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
            LogFormat::Text => fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .with_ansi(ansi)
                .with_writer(writer)
                .boxed(),
        };

        if tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()
            .is_err()
        {
            return TelemetryGuard { _worker: None };
        }
        for note in deferred {
            warn!("{note}");
        }
        TelemetryGuard { _worker: worker }
    }
}

fn stderr_writer() -> (BoxMakeWriter, Option<WorkerGuard>, bool) {
    (
        BoxMakeWriter::new(std::io::stderr),
        None,
        std::io::stderr().is_terminal(),
    )
}

fn open_sink(sink: &LogSink) -> Result<(BoxMakeWriter, Option<WorkerGuard>, bool), String> {
    match sink {
        LogSink::Stderr => Ok(stderr_writer()),
        LogSink::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| {
                    format!(
                        "cannot open log file {}: {err}; logging to stderr",
                        path.display()
                    )
                })?;
            let (writer, worker) = tracing_appender::non_blocking(file);
            Ok((BoxMakeWriter::new(writer), Some(worker), false))
        }
    }
}

/// Routes panics through tracing so a crashed pump or connection thread
/// leaves a log line while the rest of the host keeps running.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let thread = std::thread::current();
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_default();
        error!(
            thread = thread.name().unwrap_or("<unnamed>"),
            location = %location,
            panic = panic_message(info.payload()),
            "Thread panicked"
        );
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        "<non-string panic payload>"
    }
}
