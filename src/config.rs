//! Service configuration.
//!
//! All processing knobs live in [`ServiceConfig`]: size bounds, encoding
//! quality, thumbnail settings, EXIF toggle, storage layout, and worker-pool
//! size. The config is pure data — its only behavior is output-path
//! derivation and validation. It is constructed once at process start
//! (stock defaults, optionally overridden by a `config.toml`) and passed
//! explicitly into every component; there is no ambient global lookup.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! supported_extensions = [".jpg", ".jpeg", ".png", ".webp", ".bmp", ".tiff", ".tif"]
//!
//! [limits]
//! max_width = 2048          # Images wider than this are scaled down
//! max_height = 2048         # Images taller than this are scaled down
//!
//! [encoding]
//! jpeg_quality = 85         # JPEG quality (1-100)
//! webp_quality = 80         # WebP quality (1-100)
//! default_format = "webp"   # Output format when the caller specifies none
//!
//! [thumbnails]
//! enabled = true            # Generate thumbnails alongside the main artifact
//! size = 200                # Square bounding box in pixels
//!
//! [exif]
//! enabled = true            # Extract the EXIF subset into page metadata
//!
//! [storage]
//! workspace = "workspace"      # Default workspace when the caller supplies none
//! image_store = "image_store"  # Subpath for persisted artifacts
//! thumbnail_dir = "thumbnails" # Subdirectory (under image_store) for thumbnails
//!
//! [processing]
//! workers = 4               # Worker-pool size for offloaded requests
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Output format for persisted artifacts.
///
/// Only the two formats the downstream consumer accepts. Requests for
/// anything else are rejected at the boundary, before processing begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl OutputFormat {
    /// File extension for the persisted artifact (`jpg`, not `jpeg`).
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Webp => write!(f, "webp"),
            OutputFormat::Jpeg => write!(f, "jpeg"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    /// Accepts `webp`, `jpeg`, and the `jpg` alias, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webp" => Ok(OutputFormat::Webp),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            other => Err(format!("unsupported output format: {other}")),
        }
    }
}

/// Service configuration.
///
/// All fields have stock defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Accepted source file extensions (with leading dot, lowercase).
    /// Declared before the sections so TOML serialization stays valid
    /// (top-level values must precede tables).
    #[serde(default = "default_extensions")]
    pub supported_extensions: Vec<String>,
    /// Size bounds for normalization.
    pub limits: LimitsConfig,
    /// Encoding quality and default output format.
    pub encoding: EncodingConfig,
    /// Thumbnail generation settings.
    pub thumbnails: ThumbnailsConfig,
    /// EXIF extraction toggle.
    pub exif: ExifConfig,
    /// Workspace directory layout.
    pub storage: StorageConfig,
    /// Worker-pool settings.
    pub processing: ProcessingConfig,
}

fn default_extensions() -> Vec<String> {
    [".jpg", ".jpeg", ".png", ".webp", ".bmp", ".tiff", ".tif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            supported_extensions: default_extensions(),
            limits: LimitsConfig::default(),
            encoding: EncodingConfig::default(),
            thumbnails: ThumbnailsConfig::default(),
            exif: ExifConfig::default(),
            storage: StorageConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load a config file, layered over stock defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_width == 0 || self.limits.max_height == 0 {
            return Err(ConfigError::Validation(
                "limits.max_width and limits.max_height must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.encoding.jpeg_quality) {
            return Err(ConfigError::Validation(
                "encoding.jpeg_quality must be 1-100".into(),
            ));
        }
        if !(1..=100).contains(&self.encoding.webp_quality) {
            return Err(ConfigError::Validation(
                "encoding.webp_quality must be 1-100".into(),
            ));
        }
        if self.thumbnails.size == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.size must be non-zero".into(),
            ));
        }
        if self.processing.workers == 0 {
            return Err(ConfigError::Validation(
                "processing.workers must be non-zero".into(),
            ));
        }
        if self.supported_extensions.is_empty() {
            return Err(ConfigError::Validation(
                "supported_extensions must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Whether a source path carries an accepted extension (case-insensitive).
    pub fn is_supported_source(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let dotted = format!(".{}", ext.to_ascii_lowercase());
        self.supported_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&dotted))
    }

    /// Effective workspace: the caller's override, or the configured default.
    pub fn workspace_path(&self, workspace: Option<&Path>) -> PathBuf {
        workspace
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&self.storage.workspace))
    }

    /// `{workspace}/{image_store}` — where main artifacts land.
    pub fn image_store_path(&self, workspace: Option<&Path>) -> PathBuf {
        self.workspace_path(workspace)
            .join(&self.storage.image_store)
    }

    /// `{workspace}/{image_store}/{thumbnail_dir}` — where thumbnails land.
    pub fn thumbnail_dir_path(&self, workspace: Option<&Path>) -> PathBuf {
        self.image_store_path(workspace)
            .join(&self.storage.thumbnail_dir)
    }
}

/// Size bounds for normalization. Larger images are scaled down
/// preserving aspect ratio; smaller images are never upscaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_width: 2048,
            max_height: 2048,
        }
    }
}

/// Encoding quality and default output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    /// JPEG encoding quality (1-100).
    pub jpeg_quality: u8,
    /// WebP encoding quality (1-100).
    pub webp_quality: u8,
    /// Format used when the caller does not request one.
    pub default_format: OutputFormat,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            webp_quality: 80,
            default_format: OutputFormat::Webp,
        }
    }
}

/// Thumbnail generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    pub enabled: bool,
    /// Square bounding box in pixels; thumbnails fit within `size`×`size`.
    pub size: u32,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 200,
        }
    }
}

/// EXIF extraction toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExifConfig {
    pub enabled: bool,
}

impl Default for ExifConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Workspace directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Default workspace directory when the caller supplies none.
    pub workspace: String,
    /// Subpath under the workspace for persisted artifacts.
    pub image_store: String,
    /// Subdirectory under the image store for thumbnails.
    pub thumbnail_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            workspace: "workspace".to_string(),
            image_store: "image_store".to_string(),
            thumbnail_dir: "thumbnails".to_string(),
        }
    }
}

/// Worker-pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Number of threads processing offloaded requests.
    pub workers: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Stock `config.toml` with every option at its default, for `gen-config`.
pub fn stock_config_toml() -> String {
    let header = "# pagelift configuration - all options shown at their defaults\n\n";
    let body =
        toml::to_string_pretty(&ServiceConfig::default()).unwrap_or_else(|_| String::new());
    format!("{header}{body}")
}
