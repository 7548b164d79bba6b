//! SyncSentinel configuration

use crate::error::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use syncsentinel_sinks::{CsvOptions, SinkMode};

/// Default CSV file name inside the watch directory.
pub const DEFAULT_CSV_NAME: &str = "media_assets.csv";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelConfig {
    /// Directory the sync tool writes its logs to
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// CSV target; `<watch_dir>/media_assets.csv` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<PathBuf>,

    /// Watch and rescan subdirectories too
    #[serde(default)]
    pub recursive: bool,

    /// Quiet period before a changed log counts as fully written
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Log file extensions to pick up
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub csv: CsvSection,

    #[serde(default)]
    pub mirror: MirrorSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvSection {
    /// Newest rows directly under the header
    #[serde(default)]
    pub prepend: bool,

    /// Separator row after each written batch
    #[serde(default)]
    pub entry_breaks: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSection {
    #[serde(default)]
    pub enabled: bool,

    /// File the mirror snapshot is written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_watch_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("FreeFileSync").join("Logs"))
        .unwrap_or_else(|| PathBuf::from("FreeFileSync").join("Logs"))
}

fn default_debounce_ms() -> u64 {
    1500
}

fn default_extensions() -> Vec<String> {
    vec!["log".to_string(), "html".to_string(), "htm".to_string()]
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            csv_path: None,
            recursive: false,
            debounce_ms: default_debounce_ms(),
            extensions: default_extensions(),
            csv: CsvSection::default(),
            mirror: MirrorSection::default(),
        }
    }
}

impl SentinelConfig {
    /// `<home>/config.toml`
    pub fn default_path() -> PathBuf {
        syncsentinel_logging::sentinel_home().join("config.toml")
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SentinelError::io(path, e))?;
        let config: SentinelConfig =
            toml::from_str(&content).map_err(|e| SentinelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| SentinelError::Config(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SentinelError::io(parent, e))?;
        }
        std::fs::write(path, content).map_err(|e| SentinelError::io(path, e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(SentinelError::Config(
                "debounce_ms must be greater than zero".to_string(),
            ));
        }
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(SentinelError::Config(
                "extensions must name at least one log extension".to_string(),
            ));
        }
        if self.mirror.enabled && self.mirror.path.is_none() {
            return Err(SentinelError::Config(
                "mirror is enabled but mirror.path is not set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn csv_path(&self) -> PathBuf {
        self.csv_path
            .clone()
            .unwrap_or_else(|| self.watch_dir.join(DEFAULT_CSV_NAME))
    }

    pub fn csv_options(&self) -> CsvOptions {
        CsvOptions {
            mode: if self.csv.prepend {
                SinkMode::Prepend
            } else {
                SinkMode::Append
            },
            entry_breaks: self.csv.entry_breaks,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Mirror target, when mirroring is enabled
    pub fn mirror_path(&self) -> Option<&Path> {
        if self.mirror.enabled {
            self.mirror.path.as_deref()
        } else {
            None
        }
    }
}
