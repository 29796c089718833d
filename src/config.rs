use crate::compression::{BelowThreshold, CompressionOptions, DEFAULT_QUALITY};
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "compressor_config.json";
pub const DEFAULT_TARGET_FILENAME: &str = "capture.png";

/// Where watch-triggered outputs are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchOutput {
    #[default]
    WatchDirectory,
    SaveDirectory,
}

/// Persisted settings. Paths are stored as JSON strings, so a directory
/// whose path is not valid UTF-8 makes [`ConfigStore::save`] fail;
/// [`ConfigStore::persist`] only logs that and the file keeps its old contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub save_directory: PathBuf,
    pub watch_directory: PathBuf,
    pub target_filename: String,
    pub below_threshold: BelowThreshold,
    pub quality: u8,
    pub watch_output: WatchOutput,
}

impl Config {
    pub fn with_default_dir(dir: PathBuf) -> Self {
        Self {
            save_directory: dir.clone(),
            watch_directory: dir,
            target_filename: DEFAULT_TARGET_FILENAME.to_string(),
            below_threshold: BelowThreshold::default(),
            quality: DEFAULT_QUALITY,
            watch_output: WatchOutput::default(),
        }
    }

    pub fn compression_options(&self) -> CompressionOptions {
        CompressionOptions {
            quality: self.quality,
            below_threshold: self.below_threshold,
            ..CompressionOptions::default()
        }
    }

    pub fn watch_output_dir(&self) -> &Path {
        match self.watch_output {
            WatchOutput::WatchDirectory => &self.watch_directory,
            WatchOutput::SaveDirectory => &self.save_directory,
        }
    }
}

/// The user's downloads folder, falling back to `~/Downloads` and then `.`.
pub fn default_directory() -> PathBuf {
    match UserDirs::new() {
        Some(dirs) => dirs
            .download_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dirs.home_dir().join("Downloads")),
        None => PathBuf::from("."),
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    default_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE)),
            default_dir: default_directory(),
        }
    }

    pub fn with_default_dir(path: PathBuf, default_dir: PathBuf) -> Self {
        Self { path, default_dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the config, replacing any missing or invalid field with its
    /// default. Whenever something was replaced the file is rewritten.
    pub fn load(&self) -> Config {
        let (config, repaired) = match self.read_object() {
            Ok(object) => self.resolve(&object),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %format!("{err:#}"), "config unreadable, using defaults");
                (Config::with_default_dir(self.default_dir.clone()), true)
            }
        };
        if repaired {
            self.persist(&config);
        }
        config
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        let contents = serde_json::to_string_pretty(config).context("serialize config")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("write config {}", self.path.display()))?;
        Ok(())
    }

    /// [`save`](Self::save), logging instead of returning the error.
    pub fn persist(&self, config: &Config) {
        if let Err(err) = self.save(config) {
            tracing::warn!(error = %format!("{err:#}"), "config save failed");
        }
    }

    fn read_object(&self) -> Result<Map<String, Value>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read config {}", self.path.display()))?;
        let object: Map<String, Value> = serde_json::from_str(&contents)
            .with_context(|| format!("parse config {}", self.path.display()))?;
        Ok(object)
    }

    fn resolve(&self, object: &Map<String, Value>) -> (Config, bool) {
        let defaults = Config::with_default_dir(self.default_dir.clone());
        let mut repaired = false;

        let save_directory = or_default(
            &mut repaired,
            "save_directory",
            existing_dir(object.get("save_directory")),
            defaults.save_directory,
        );
        let watch_directory = or_default(
            &mut repaired,
            "watch_directory",
            existing_dir(object.get("watch_directory")),
            defaults.watch_directory,
        );
        let target_filename = or_default(
            &mut repaired,
            "target_filename",
            object
                .get("target_filename")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            defaults.target_filename,
        );
        let below_threshold = or_default(
            &mut repaired,
            "below_threshold",
            typed(object.get("below_threshold")),
            defaults.below_threshold,
        );
        let quality = or_default(
            &mut repaired,
            "quality",
            object
                .get("quality")
                .and_then(Value::as_u64)
                .filter(|q| (1..=100).contains(q))
                .map(|q| q as u8),
            defaults.quality,
        );
        let watch_output = or_default(
            &mut repaired,
            "watch_output",
            typed(object.get("watch_output")),
            defaults.watch_output,
        );

        let config = Config {
            save_directory,
            watch_directory,
            target_filename,
            below_threshold,
            quality,
            watch_output,
        };
        (config, repaired)
    }
}

fn or_default<T>(repaired: &mut bool, field: &str, value: Option<T>, default: T) -> T {
    value.unwrap_or_else(|| {
        tracing::warn!(field, "config field missing or invalid, reset to default");
        *repaired = true;
        default
    })
}

fn existing_dir(value: Option<&Value>) -> Option<PathBuf> {
    value
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .filter(|path| path.is_dir())
}

fn typed<T: serde::de::DeserializeOwned>(value: Option<&Value>) -> Option<T> {
    value.and_then(|value| serde_json::from_value(value.clone()).ok())
}
