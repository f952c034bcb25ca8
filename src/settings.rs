use anyhow::Context;
use log::{LevelFilter, debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use crate::flip::{DEFAULT_CAPACITY_BYTES, DEFAULT_WORKERS, Zoom};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pageflip";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Render worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Rasterization scale at 100% zoom
    #[serde(default = "default_base_scale")]
    pub base_scale: f32,

    /// Keep the last document and its rendered pages on disk
    #[serde(default = "default_true")]
    pub persist_documents: bool,

    #[serde(default = "default_store_capacity")]
    pub store_capacity_bytes: usize,

    /// One of off, error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_base_scale() -> f32 {
    Zoom::BASE_SCALE
}

fn default_store_capacity() -> usize {
    DEFAULT_CAPACITY_BYTES
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            workers: default_workers(),
            base_scale: default_base_scale(),
            persist_documents: true,
            store_capacity_bytes: default_store_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Parse a settings file. Missing fields take their defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {path:?}"))?;
        let mut settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {path:?}"))?;
        settings.sanitize();
        Ok(settings)
    }

    /// Log level filter, `Info` when the configured name is unknown
    #[must_use]
    pub fn log_level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.log_level);
            LevelFilter::Info
        })
    }

    fn sanitize(&mut self) {
        if self.workers == 0 {
            warn!("workers must be at least 1");
            self.workers = 1;
        }
        if !self.base_scale.is_finite() || self.base_scale <= 0.0 {
            warn!(
                "Invalid base_scale {}, using {}",
                self.base_scale,
                default_base_scale()
            );
            self.base_scale = default_base_scale();
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load the settings file into the global settings, creating it with
/// defaults when it does not exist yet.
pub fn load_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };

    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

pub fn load_settings_from_path(path: &Path) {
    match Settings::load_from(path) {
        Ok(mut settings) => {
            debug!("Loaded settings from {path:?}");

            if settings.version < CURRENT_VERSION {
                settings.version = CURRENT_VERSION;
                save_settings_to_file(&settings, path);
            }

            if let Ok(mut global) = SETTINGS.write() {
                *global = settings;
            }
        }
        Err(e) => error!("{e:#}"),
    }
}

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    match fs::write(path, generate_settings_yaml(settings)) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str("# Render worker threads\n");
    content.push_str(&format!("workers: {}\n", settings.workers));
    content.push_str("# Rasterization scale at 100% zoom\n");
    content.push_str(&format!("base_scale: {}\n", settings.base_scale));
    content.push_str("# Keep the last document and its rendered pages between runs\n");
    content.push_str(&format!(
        "persist_documents: {}\n",
        settings.persist_documents
    ));
    content.push_str(&format!(
        "store_capacity_bytes: {}\n",
        settings.store_capacity_bytes
    ));
    content.push_str("# off, error, warn, info, debug or trace\n");
    content.push_str(&format!("log_level: {}\n", settings.log_level));

    content
}

/// Snapshot of the global settings
pub fn current() -> Settings {
    SETTINGS
        .read()
        .map(|s| s.clone())
        .unwrap_or_else(|e| e.into_inner().clone())
}
