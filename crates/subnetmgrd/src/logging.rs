//! Tracing subscriber setup and log file reopening.
//!
//! Logs go to stderr, or to a file that can be closed and reopened by path
//! so external log rotation works (SIGUSR1).

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Something that can reopen its log destination.
pub trait LogReopen: Send + Sync {
    fn reopen(&self) -> io::Result<()>;
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Append-mode log file shared by every writer the subscriber hands out.
#[derive(Debug, Clone)]
pub struct ReopenableFile {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl ReopenableFile {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(open_append(path)?)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogReopen for ReopenableFile {
    fn reopen(&self) -> io::Result<()> {
        let fresh = open_append(&self.path)?;
        let mut file = self.file.lock();
        let _ = file.flush();
        *file = fresh;
        Ok(())
    }
}

/// Writer handed to the fmt layer for one event.
#[derive(Debug)]
pub struct FileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for ReopenableFile {
    type Writer = FileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriter {
            file: Arc::clone(&self.file),
        }
    }
}

/// Handle kept by the daemon to reopen the active log destination.
#[derive(Debug, Clone, Default)]
pub struct LogHandle {
    file: Option<ReopenableFile>,
}

impl LogHandle {
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(ReopenableFile::path)
    }
}

impl LogReopen for LogHandle {
    fn reopen(&self) -> io::Result<()> {
        match &self.file {
            Some(file) => {
                file.reopen()?;
                info!(path = %file.path().display(), "Log file reopened");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> anyhow::Result<LogHandle> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true);

    match log_file {
        Some(path) => {
            let file = ReopenableFile::open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(file.clone())
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;
            Ok(LogHandle { file: Some(file) })
        }
        None => {
            builder
                .with_writer(io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;
            Ok(LogHandle::default())
        }
    }
}
