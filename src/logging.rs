//! Structured logging
//!
//! Two sinks: a colored human-readable layer on stderr and an optional
//! JSON-lines file layer with size-based rotation (10 MB, keeping the last
//! 3 files). Standard output stays reserved for protocol messages.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::Config;
use crate::error::Result;

/// Rotation threshold
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Rotated files kept beside the active one
const KEEP_ROTATED: usize = 3;

struct RotateState {
    path: PathBuf,
    file: File,
    written: u64,
}

/// Size-rotating file writer
///
/// When the active file would exceed the threshold it is renamed to
/// `<path>.1` (older files shift up, the last is dropped) and a fresh file
/// is started.
#[derive(Clone)]
pub struct RotatingWriter {
    inner: Arc<Mutex<RotateState>>,
}

impl RotatingWriter {
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            inner: Arc::new(Mutex::new(RotateState {
                path: path.to_path_buf(),
                file,
                written,
            })),
        })
    }

    fn rotate(state: &mut RotateState) -> std::io::Result<()> {
        let path = state.path.clone();
        let rotated = |n: usize| PathBuf::from(format!("{}.{}", path.display(), n));

        let _ = std::fs::remove_file(rotated(KEEP_ROTATED));
        for n in (1..KEEP_ROTATED).rev() {
            let _ = std::fs::rename(rotated(n), rotated(n + 1));
        }
        let _ = std::fs::rename(&path, rotated(1));

        state.file = OpenOptions::new().create(true).append(true).open(&path)?;
        state.written = 0;
        Ok(())
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.inner.lock();
        if state.written + buf.len() as u64 > MAX_LOG_BYTES {
            Self::rotate(&mut state)?;
        }
        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.lock().file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Initialize the global subscriber from the resolved configuration
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(config.effective_log_level())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Verbose mode shows module targets on the console
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(config.verbose)
        .with_ansi(true)
        .with_writer(std::io::stderr);

    let file_layer = match &config.log_file {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(RotatingWriter::new(path)?),
        ),
        None => None,
    };

    let error_layer = match &config.error_log_file {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(RotatingWriter::new(path)?)
                .with_filter(LevelFilter::ERROR),
        ),
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .with(error_layer)
        .try_init();

    Ok(())
}
