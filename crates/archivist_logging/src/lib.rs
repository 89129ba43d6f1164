//! Logging setup for the Archivist binaries.
//!
//! Two sinks: a size-capped plain-text file under `$ARCHIVIST_HOME/logs`
//! and stderr. Both honour `RUST_LOG`.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "archivist=info,archivist_scout=info,archivist_db=info";
const VERBOSE_FILTER: &str = "archivist=debug,archivist_scout=debug,archivist_db=debug";

/// Current file plus this many older generations
const KEEP_GENERATIONS: usize = 4;
const FILE_LIMIT_BYTES: u64 = 10 * 1024 * 1024;

pub struct LogConfig<'a> {
    /// Log file stem (`<app_name>.log`)
    pub app_name: &'a str,
    /// Console gets debug output
    pub verbose: bool,
    /// Defaults to [`logs_dir`]
    pub log_dir: Option<PathBuf>,
}

/// Install the global subscriber.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let dir = config.log_dir.unwrap_or_else(logs_dir);
    let sink = Arc::new(
        LogSink::open(&dir, config.app_name, KEEP_GENERATIONS, FILE_LIMIT_BYTES)
            .with_context(|| format!("Failed to open log file in {}", dir.display()))?,
    );

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(move || SinkWriter(Arc::clone(&sink)))
        .with_filter(env_filter(false));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(env_filter(config.verbose));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")
}

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new(VERBOSE_FILTER);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// `$ARCHIVIST_HOME`, else `~/.archivist`.
pub fn archivist_home() -> PathBuf {
    match std::env::var_os("ARCHIVIST_HOME") {
        Some(home) => PathBuf::from(home),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".archivist"),
    }
}

pub fn logs_dir() -> PathBuf {
    archivist_home().join("logs")
}

/// Append-only log file that starts a new generation once it reaches `limit`.
///
/// Generations are `<stem>.log`, `<stem>.log.1` (previous), ... `<stem>.log.<keep>`.
struct LogSink {
    dir: PathBuf,
    stem: String,
    keep: usize,
    limit: u64,
    current: Mutex<OpenLog>,
}

struct OpenLog {
    file: File,
    len: u64,
}

impl OpenLog {
    fn append_to(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

fn generation_path(dir: &Path, stem: &str, n: usize) -> PathBuf {
    match n {
        0 => dir.join(format!("{}.log", stem)),
        n => dir.join(format!("{}.log.{}", stem, n)),
    }
}

impl LogSink {
    fn open(dir: &Path, app_name: &str, keep: usize, limit: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stem: String = app_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();

        let log = OpenLog::append_to(&generation_path(dir, &stem, 0))?;
        let oversized = log.len > limit;
        let sink = Self {
            dir: dir.to_path_buf(),
            stem,
            keep,
            limit,
            current: Mutex::new(log),
        };
        if oversized {
            let mut current = sink.lock()?;
            sink.start_generation(&mut current)?;
        }
        Ok(sink)
    }

    fn generation_path(&self, n: usize) -> PathBuf {
        generation_path(&self.dir, &self.stem, n)
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, OpenLog>> {
        self.current
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink poisoned"))
    }

    /// Shift every generation up by one, dropping the oldest, and reopen.
    fn start_generation(&self, current: &mut OpenLog) -> io::Result<()> {
        current.file.flush()?;

        let oldest = self.generation_path(self.keep);
        if let Err(e) = fs::remove_file(&oldest) {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(e);
            }
        }
        for n in (0..self.keep).rev() {
            let from = self.generation_path(n);
            if from.exists() {
                fs::rename(&from, self.generation_path(n + 1))?;
            }
        }

        *current = OpenLog::append_to(&self.generation_path(0))?;
        Ok(())
    }

    fn append(&self, buf: &[u8]) -> io::Result<usize> {
        let mut current = self.lock()?;
        if current.len > 0 && current.len + buf.len() as u64 > self.limit {
            self.start_generation(&mut current)?;
        }
        let written = current.file.write(buf)?;
        current.len += written as u64;
        Ok(written)
    }

    fn flush(&self) -> io::Result<()> {
        self.lock()?.file.flush()
    }
}

/// Per-event handle handed to the fmt layer.
struct SinkWriter(Arc<LogSink>);

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.append(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generations_shift_and_oldest_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let sink = LogSink::open(tmp.path(), "scan run", 2, 16).unwrap();

        for _ in 0..5 {
            sink.append(b"0123456789\n").unwrap();
        }
        sink.flush().unwrap();

        assert!(tmp.path().join("scan_run.log").exists());
        assert!(tmp.path().join("scan_run.log.1").exists());
        assert!(tmp.path().join("scan_run.log.2").exists());
        assert!(!tmp.path().join("scan_run.log.3").exists());
    }

    #[test]
    fn test_reopen_appends_to_existing_file() {
        let tmp = TempDir::new().unwrap();
        {
            let sink = LogSink::open(tmp.path(), "archivist", 2, 1024).unwrap();
            sink.append(b"first\n").unwrap();
        }
        let sink = LogSink::open(tmp.path(), "archivist", 2, 1024).unwrap();
        sink.append(b"second\n").unwrap();
        sink.flush().unwrap();

        let content = fs::read_to_string(tmp.path().join("archivist.log")).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}
