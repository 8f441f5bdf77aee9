//! Configuration file handling for pwa-camera.
//!
//! Loads configuration from `~/.config/pwa-camera/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::camera::{FacingMode, MediaStreamConstraints, Resolution, VideoConstraints};
use crate::offline::{store_name, ASSETS, DEFAULT_CACHE_NAME, DEFAULT_CACHE_VERSION};

/// Configuration file structure for pwa-camera.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Origin the application is served from
    #[serde(default = "default_origin")]
    pub origin: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_name")]
    pub name: String,
    #[serde(default = "default_cache_version")]
    pub version: u32,
    /// Store directory (default: ~/.cache/pwa-camera/stores)
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Assets to pre-cache on install
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: default_cache_name(),
            version: default_cache_version(),
            dir: None,
            assets: default_assets(),
        }
    }
}

impl CacheConfig {
    /// Versioned store name, e.g. `pwa-camara-v1`.
    pub fn store_name(&self) -> String {
        store_name(&self.name, self.version)
    }
}

/// Which camera backend to use.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CameraBackend {
    #[default]
    TestPattern,
    Native,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    #[serde(default)]
    pub backend: CameraBackend,
    /// Device index for the native backend
    #[serde(default)]
    pub device: u32,
    #[serde(default)]
    pub facing_mode: FacingMode,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackend::default(),
            device: 0,
            facing_mode: FacingMode::default(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl CameraConfig {
    pub fn constraints(&self) -> MediaStreamConstraints {
        MediaStreamConstraints {
            video: Some(VideoConstraints {
                facing_mode: self.facing_mode,
                ideal: Resolution {
                    width: self.width,
                    height: self.height,
                },
            }),
            audio: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StatusConfig {
    /// How long notifications stay visible
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_cache_name() -> String {
    DEFAULT_CACHE_NAME.to_string()
}

fn default_cache_version() -> u32 {
    DEFAULT_CACHE_VERSION
}

fn default_assets() -> Vec<String> {
    ASSETS.iter().map(|a| a.to_string()).collect()
}

fn default_width() -> u32 {
    Resolution::HD.width
}

fn default_height() -> u32 {
    Resolution::HD.height
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Commented default configuration written by `config init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# pwa-camera configuration

[app]
# Origin the application is served from
origin = "http://localhost:8080"

[cache]
# Store name; the version is appended as "-v<version>"
name = "pwa-camara"
# Bump to invalidate every cached asset
version = 1
# Store directory (default: ~/.cache/pwa-camera/stores)
# dir = "/var/cache/pwa-camera"
assets = [
    "/",
    "/index.html",
    "/app.js",
    "/manifest.json",
    "/assets/192.png",
    "/assets/512.png",
]

[camera]
# Backend: test-pattern or native (requires the native-camera feature)
backend = "test-pattern"
device = 0
# user (front) or environment (rear)
facing_mode = "environment"
width = 1280
height = 720

[status]
# Notification display time in milliseconds
timeout_ms = 5000
"#;

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    directories::ProjectDirs::from("com", "pwa-camera", "pwa-camera")
        .map(|d| d.config_dir().to_path_buf().join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/pwa-camera/config.toml")
        })
}
