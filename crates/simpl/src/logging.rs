use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Layer, Registry};

/// Default location of the warning log.
pub const DEFAULT_LOG_FILE: &str = "/var/tmp/sry.log";
/// Size at which the warning log starts over.
pub const LOG_FILE_CAP: u64 = 100 * 1024;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the stderr layer and, when `log_file` is set, a second layer
/// copying warnings and errors into that file.
pub fn init_logging(format: LogFormat, level: LogLevel, log_file: Option<&Path>) {
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false);
    let stderr: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Text => stderr.with_filter(level.as_filter()).boxed(),
        LogFormat::Json => stderr.json().with_filter(level.as_filter()).boxed(),
    };

    let file = log_file.map(|path| {
        tracing_subscriber::fmt::layer()
            .with_writer(CappedLog::new(path, LOG_FILE_CAP))
            .with_ansi(false)
            .with_filter(LevelFilter::WARN)
    });

    let _ = tracing_subscriber::registry().with(stderr).with(file).try_init();
}

/// A log file that is truncated once it reaches `cap` bytes.
///
/// The file is opened per event: below the cap the event is appended, at or
/// above it the file is emptied first. An unwritable file drops the event.
#[derive(Debug, Clone)]
pub struct CappedLog {
    path: Arc<PathBuf>,
    cap: u64,
}

impl CappedLog {
    pub fn new(path: impl Into<PathBuf>, cap: u64) -> Self {
        Self {
            path: Arc::new(path.into()),
            cap,
        }
    }

    fn open(&self) -> io::Result<File> {
        let full = std::fs::metadata(self.path.as_ref())
            .map(|meta| meta.len() >= self.cap)
            .unwrap_or(false);
        let mut options = OpenOptions::new();
        options.create(true);
        if full {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        options.open(self.path.as_ref())
    }
}

impl<'a> MakeWriter<'a> for CappedLog {
    type Writer = CappedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CappedWriter {
            file: self.open().ok(),
        }
    }
}

pub struct CappedWriter {
    file: Option<File>,
}

impl Write for CappedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Check that `path` can be opened for appending without writing to it.
pub fn log_file_writable(path: &Path) -> io::Result<()> {
    OpenOptions::new().create(true).append(true).open(path).map(drop)
}
