//! Logging for the SyncSentinel binary.
//!
//! Two `tracing` outputs: a size-rotated file under `<home>/logs` that keeps the
//! full `RUST_LOG` level, and stderr, which shows warnings unless `--verbose`.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "syncsentinel=info,syncsentinel_sinks=info,notify=warn";

/// When the live log file is rotated and how many old ones survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub max_bytes: u64,
    /// Rotated files kept next to the live one (`<app>.log.1` ..= `<app>.log.N`).
    pub keep: usize,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            keep: 4,
        }
    }
}

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Send the file filter to stderr too, instead of warnings only.
    pub verbose: bool,
}

/// Install the global subscriber. Returns the live log file path.
pub fn init_logging(config: LogConfig<'_>) -> Result<PathBuf> {
    init_logging_in(ensure_logs_dir()?, config, Rotation::default())
}

/// Like [`init_logging`] but with an explicit directory and rotation policy.
pub fn init_logging_in(dir: PathBuf, config: LogConfig<'_>, rotation: Rotation) -> Result<PathBuf> {
    let file = RotatingFile::open(dir, config.app_name, rotation)
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;
    let live_path = file.live_path();

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr_filter = if config.verbose {
        file_filter.to_string()
    } else {
        "warn".to_string()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(EnvFilter::new(stderr_filter)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(live_path)
}

/// `$SYNCSENTINEL_HOME`, else `~/.syncsentinel`, else `.syncsentinel`.
pub fn sentinel_home() -> PathBuf {
    if let Some(home) = std::env::var_os("SYNCSENTINEL_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|home| home.join(".syncsentinel"))
        .unwrap_or_else(|| PathBuf::from(".syncsentinel"))
}

pub fn logs_dir() -> PathBuf {
    sentinel_home().join("logs")
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Append-only log file that rotates by size. Shared by every `tracing` event.
struct RotatingFile {
    state: Mutex<LiveFile>,
}

struct LiveFile {
    dir: PathBuf,
    stem: String,
    rotation: Rotation,
    file: File,
    written: u64,
}

impl RotatingFile {
    fn open(dir: PathBuf, app_name: &str, rotation: Rotation) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let stem = file_stem(app_name);
        let (file, written) = open_append(&dir.join(format!("{stem}.log")))?;
        let mut live = LiveFile {
            dir,
            stem,
            rotation,
            file,
            written,
        };
        if live.written >= live.rotation.max_bytes {
            live.rotate()?;
        }
        Ok(Self {
            state: Mutex::new(live),
        })
    }

    fn live_path(&self) -> PathBuf {
        self.lock().live_path()
    }

    fn lock(&self) -> MutexGuard<'_, LiveFile> {
        // A panic mid-write leaves at worst a torn line; keep logging.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LiveFile {
    fn live_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.stem))
    }

    fn numbered(&self, n: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.stem, n))
    }

    /// `.log.N-1 -> .log.N`, ..., `.log -> .log.1`; the oldest falls off.
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let keep = self.rotation.keep;
        if keep == 0 {
            // Nothing to keep: start the live file over.
            self.file = File::create(self.live_path())?;
            self.written = 0;
            return Ok(());
        }

        remove_if_exists(&self.numbered(keep))?;
        for n in (1..keep).rev() {
            rename_if_exists(&self.numbered(n), &self.numbered(n + 1))?;
        }
        rename_if_exists(&self.live_path(), &self.numbered(1))?;

        let (file, written) = open_append(&self.live_path())?;
        self.file = file;
        self.written = written;
        Ok(())
    }

    fn write_line(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.rotation.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }
}

/// Holds the lock for one formatted event, so lines never interleave.
struct RotatingWriter<'a>(MutexGuard<'a, LiveFile>);

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingWriter(self.lock())
    }
}

impl Write for RotatingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_line(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn rename_if_exists(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// App names become file names; anything but `[A-Za-z0-9_-]` turns into `_`.
fn file_stem(app_name: &str) -> String {
    let stem: String = app_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "syncsentinel".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_events(file: &RotatingFile, count: usize, line: &[u8]) {
        for _ in 0..count {
            let mut writer = file.make_writer();
            writer.write_all(line).unwrap();
            writer.flush().unwrap();
        }
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("sync sentinel/v1"), "sync_sentinel_v1");
        assert_eq!(file_stem("syncsentinel-cli_2"), "syncsentinel-cli_2");
        assert_eq!(file_stem(""), "syncsentinel");
    }

    #[test]
    fn test_rotation_keeps_bounded_file_count() {
        let dir = tempdir().unwrap();
        let rotation = Rotation {
            max_bytes: 16,
            keep: 2,
        };
        let file = RotatingFile::open(dir.path().to_path_buf(), "app", rotation).unwrap();
        write_events(&file, 10, b"0123456789");

        assert!(dir.path().join("app.log").exists());
        assert!(dir.path().join("app.log.1").exists());
        assert!(dir.path().join("app.log.2").exists());
        assert!(!dir.path().join("app.log.3").exists());
        assert!(fs::metadata(file.live_path()).unwrap().len() <= 16);
    }

    #[test]
    fn test_event_larger_than_limit_is_written_whole() {
        let dir = tempdir().unwrap();
        let rotation = Rotation {
            max_bytes: 4,
            keep: 1,
        };
        let file = RotatingFile::open(dir.path().to_path_buf(), "app", rotation).unwrap();
        write_events(&file, 1, b"a long line\n");

        assert_eq!(fs::read_to_string(file.live_path()).unwrap(), "a long line\n");
        assert!(!dir.path().join("app.log.1").exists());
    }

    #[test]
    fn test_reopen_appends_and_rotates_oversized_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.log"), "previous run\n").unwrap();

        let roomy = Rotation {
            max_bytes: 1024,
            keep: 1,
        };
        let file = RotatingFile::open(dir.path().to_path_buf(), "app", roomy).unwrap();
        write_events(&file, 1, b"next run\n");
        assert_eq!(
            fs::read_to_string(file.live_path()).unwrap(),
            "previous run\nnext run\n"
        );
        drop(file);

        let tight = Rotation {
            max_bytes: 8,
            keep: 1,
        };
        let file = RotatingFile::open(dir.path().to_path_buf(), "app", tight).unwrap();
        assert_eq!(fs::metadata(file.live_path()).unwrap().len(), 0);
        assert_eq!(
            fs::read_to_string(dir.path().join("app.log.1")).unwrap(),
            "previous run\nnext run\n"
        );
    }

    #[test]
    fn test_keep_zero_truncates_in_place() {
        let dir = tempdir().unwrap();
        let rotation = Rotation {
            max_bytes: 8,
            keep: 0,
        };
        let file = RotatingFile::open(dir.path().to_path_buf(), "app", rotation).unwrap();
        write_events(&file, 3, b"123456\n");

        assert_eq!(fs::read_to_string(file.live_path()).unwrap(), "123456\n");
        assert!(!dir.path().join("app.log.1").exists());
    }
}
