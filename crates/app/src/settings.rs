//! Layered settings for the admin binary.
//!
//! Priority: command-line flag, then environment (clap reads both), then the
//! optional TOML file, then compiled defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use services::SyncConfig;

pub const DEFAULT_DB_URL: &str = "sqlite://progress.sqlite3";

/// Keys accepted in the `--config` file. All optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub db_url: Option<String>,
    pub batch_size: Option<u32>,
    pub max_concurrency: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Values already resolved by clap from flags and environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub db_url: Option<String>,
    pub batch_size: Option<u32>,
    pub max_concurrency: Option<usize>,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_url: String,
    pub sync: SyncConfig,
}

impl Settings {
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        let file = match &overrides.config_path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(overrides, file))
    }

    fn merge(overrides: Overrides, file: FileConfig) -> Self {
        let defaults = SyncConfig::default();
        let db_url = overrides
            .db_url
            .or(file.db_url)
            .unwrap_or_else(|| DEFAULT_DB_URL.to_string());

        Self {
            db_url: normalize_sqlite_url(&db_url),
            sync: SyncConfig {
                batch_size: overrides
                    .batch_size
                    .or(file.batch_size)
                    .unwrap_or(defaults.batch_size),
                max_concurrency: overrides
                    .max_concurrency
                    .or(file.max_concurrency)
                    .unwrap_or(defaults.max_concurrency),
            }
            .normalized(),
        }
    }
}

/// Turn `sqlite:relative.db` or a bare path into an absolute `sqlite://` URL.
///
/// In-memory and already absolute URLs pass through untouched.
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("sqlite::memory:")
        || trimmed.starts_with("sqlite://")
        || trimmed.starts_with("sqlite:file:")
    {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file (and parent directories) so the pool can open it.
pub fn prepare_sqlite_file(db_url: &str) -> Result<()> {
    let Some(rest) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = rest.split('?').next().unwrap_or(rest);
    anyhow::ensure!(!path.is_empty(), "invalid database url: {db_url}");

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn flags_beat_file_and_file_beats_defaults() {
        let overrides = Overrides {
            batch_size: Some(10),
            ..Overrides::default()
        };
        let file = FileConfig {
            db_url: Some("sqlite:file:cfg?mode=memory&cache=shared".into()),
            batch_size: Some(500),
            max_concurrency: Some(4),
        };

        let settings = Settings::merge(overrides, file);
        assert_eq!(settings.db_url, "sqlite:file:cfg?mode=memory&cache=shared");
        assert_eq!(settings.sync.batch_size, 10);
        assert_eq!(settings.sync.max_concurrency, 4);
    }

    #[test]
    fn empty_layers_fall_back_to_defaults() {
        let settings = Settings::merge(Overrides::default(), FileConfig::default());
        assert!(settings.db_url.starts_with("sqlite://"));
        assert!(settings.db_url.ends_with("progress.sqlite3"));
        assert_eq!(settings.sync, SyncConfig::default());
    }

    #[test]
    fn config_file_is_read_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size = 25\nmax_concurrency = 0").unwrap();

        let settings = Settings::resolve(Overrides {
            db_url: Some("sqlite::memory:".into()),
            config_path: Some(file.path().to_path_buf()),
            ..Overrides::default()
        })
        .unwrap();

        assert_eq!(settings.db_url, "sqlite::memory:");
        assert_eq!(settings.sync.batch_size, 25);
        assert_eq!(settings.sync.max_concurrency, 1);
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let parsed: Result<FileConfig, _> = toml::from_str("batch = 3");
        assert!(parsed.is_err());
    }

    #[test]
    fn relative_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/progress.db");
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/progress.db"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
    }
}
