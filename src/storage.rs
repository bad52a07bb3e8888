//! Artifact persistence: deterministic naming, encoding, thumbnails.
//!
//! ## Naming
//!
//! Artifact filenames are a weak content-address: SHA-256 over the original
//! path plus its modification time, truncated to 12 hex chars —
//! `img_3fa94c01be72.webp`. Reprocessing an unchanged source yields the
//! same name; touching or moving the source yields a new one. This is *not*
//! a pixel hash: two different images written to the same path with an
//! identical mtime collide, and the same image at two paths never dedups.
//! Downstream consumers may rely on the path-stability semantics, so don't
//! switch to content hashing without checking with them first.
//!
//! Concurrent requests for the same unchanged source compute the same
//! destination name; the filesystem's last-writer-wins semantics apply and
//! no request-level locking is attempted.
//!
//! ## Output layout
//!
//! ```text
//! {workspace}/
//! └── image_store/
//!     ├── img_3fa94c01be72.webp      # Main artifact
//!     └── thumbnails/
//!         └── thumb_img_3fa94c01be72.jpg
//! ```
//!
//! Main-image persistence is fatal on failure; thumbnails are best-effort
//! (logged and skipped), and always JPEG — so they get the same white-flatten
//! treatment as the main pipeline before encoding.

use crate::config::{OutputFormat, ServiceConfig};
use crate::normalize;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Hex chars of the naming digest kept in filenames.
const NAME_DIGEST_LEN: usize = 12;

/// Thumbnails are always JPEG at a fixed quality.
const THUMBNAIL_JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{format} encode failed: {reason}")]
    Encode { format: &'static str, reason: String },
}

/// A persisted main artifact: where it landed and how big it came out.
#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub path: PathBuf,
    /// Byte size measured after the write, not estimated.
    pub bytes: u64,
}

/// Counts and paths for a workspace's image store.
#[derive(Debug, Clone)]
pub struct StorageReport {
    pub image_store: PathBuf,
    pub thumbnail_dir: PathBuf,
    pub images: usize,
    pub thumbnails: usize,
}

/// Persists normalized images and thumbnails under the workspace layout.
pub struct ImageStorage {
    config: Arc<ServiceConfig>,
}

impl ImageStorage {
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self { config }
    }

    /// Create the image store directory (parents included, idempotent).
    ///
    /// The thumbnails subdirectory is deliberately not created here — it is
    /// part of the best-effort thumbnail path, not the fatal one.
    pub fn ensure_layout(&self, workspace: Option<&Path>) -> io::Result<()> {
        std::fs::create_dir_all(self.config.image_store_path(workspace))
    }

    /// Deterministic artifact filename for a source file:
    /// `img_` + 12 hex chars of `sha256(path, mtime)` + the format extension.
    pub fn artifact_filename(
        &self,
        original: &Path,
        format: OutputFormat,
    ) -> io::Result<String> {
        let mtime = std::fs::metadata(original)?.modified()?;
        let nanos = mtime
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(original.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(nanos.to_le_bytes());
        let digest = format!("{:x}", hasher.finalize());

        Ok(format!(
            "img_{}.{}",
            &digest[..NAME_DIGEST_LEN],
            format.extension()
        ))
    }

    /// Thumbnail filename derived from the main artifact's filename:
    /// `thumb_` + stem + `.jpg`.
    pub fn thumbnail_filename(image_filename: &str) -> String {
        let stem = Path::new(image_filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| image_filename.to_string());
        format!("thumb_{stem}.jpg")
    }

    /// Persist the normalized image into the image store.
    ///
    /// Encodes with the configured per-format quality and reports the
    /// resulting byte size. Failure here is fatal to the request.
    pub fn save_image(
        &self,
        image: &DynamicImage,
        original: &Path,
        workspace: Option<&Path>,
        format: OutputFormat,
    ) -> Result<SavedArtifact, StorageError> {
        self.ensure_layout(workspace)?;

        let filename = self.artifact_filename(original, format)?;
        let path = self.config.image_store_path(workspace).join(&filename);

        match format {
            OutputFormat::Jpeg => {
                encode_jpeg(&path, image, self.config.encoding.jpeg_quality)?
            }
            OutputFormat::Webp => {
                encode_webp(&path, image, self.config.encoding.webp_quality)?
            }
        }

        let bytes = std::fs::metadata(&path)?.len();
        info!(path = %path.display(), bytes, "saved image");
        Ok(SavedArtifact { path, bytes })
    }

    /// Generate and persist a thumbnail for an already-saved artifact.
    ///
    /// Best-effort: any failure is logged and yields `None` — the main
    /// pipeline must never fail because a thumbnail did.
    pub fn create_thumbnail(
        &self,
        image: &DynamicImage,
        image_filename: &str,
        workspace: Option<&Path>,
    ) -> Option<PathBuf> {
        if !self.config.thumbnails.enabled {
            return None;
        }
        match self.write_thumbnail(image, image_filename, workspace) {
            Ok(path) => {
                info!(path = %path.display(), "created thumbnail");
                Some(path)
            }
            Err(err) => {
                warn!(%err, "thumbnail generation failed");
                None
            }
        }
    }

    fn write_thumbnail(
        &self,
        image: &DynamicImage,
        image_filename: &str,
        workspace: Option<&Path>,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.config.thumbnail_dir_path(workspace);
        std::fs::create_dir_all(&dir)?;

        let size = self.config.thumbnails.size;
        let scaled = if image.width() > size || image.height() > size {
            image.resize(size, size, FilterType::Lanczos3)
        } else {
            image.clone()
        };
        // Thumbnails are always JPEG; flatten exactly as the main path does.
        let opaque = if scaled.color() == ColorType::Rgb8 {
            scaled
        } else if scaled.color().has_alpha() {
            normalize::flatten_onto_white(&scaled)
        } else {
            DynamicImage::ImageRgb8(scaled.to_rgb8())
        };

        let path = dir.join(Self::thumbnail_filename(image_filename));
        encode_jpeg(&path, &opaque, THUMBNAIL_JPEG_QUALITY)?;
        Ok(path)
    }

    /// Keep a backup copy of the original upload in the image store as
    /// `original_<name>`. Best-effort.
    pub fn copy_original(&self, source: &Path, workspace: Option<&Path>) -> Option<PathBuf> {
        match self.copy_original_inner(source, workspace) {
            Ok(dest) => {
                info!(from = %source.display(), to = %dest.display(), "copied original file");
                Some(dest)
            }
            Err(err) => {
                warn!(path = %source.display(), %err, "failed to copy original file");
                None
            }
        }
    }

    fn copy_original_inner(
        &self,
        source: &Path,
        workspace: Option<&Path>,
    ) -> Result<PathBuf, StorageError> {
        self.ensure_layout(workspace)?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());
        let dest = self
            .config
            .image_store_path(workspace)
            .join(format!("original_{name}"));
        std::fs::copy(source, &dest)?;
        Ok(dest)
    }

    /// Remove transport-owned temporary artifacts, files or directories.
    /// Missing paths are skipped; failures are logged, never raised.
    pub fn cleanup_temp_files(&self, paths: &[PathBuf]) {
        for path in paths {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else if path.is_file() {
                std::fs::remove_file(path)
            } else {
                continue;
            };
            match result {
                Ok(()) => debug!(path = %path.display(), "cleaned up temp file"),
                Err(err) => warn!(path = %path.display(), %err, "failed to clean up temp file"),
            }
        }
    }

    /// Paths and artifact counts for a workspace's store.
    pub fn report(&self, workspace: Option<&Path>) -> StorageReport {
        let image_store = self.config.image_store_path(workspace);
        let thumbnail_dir = self.config.thumbnail_dir_path(workspace);
        StorageReport {
            images: count_with_prefix(&image_store, "img_"),
            thumbnails: count_with_prefix(&thumbnail_dir, "thumb_"),
            image_store,
            thumbnail_dir,
        }
    }
}

fn count_with_prefix(dir: &Path, prefix: &str) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(prefix))
                && e.path().is_file()
        })
        .count()
}

fn encode_jpeg(path: &Path, image: &DynamicImage, quality: u8) -> Result<(), StorageError> {
    let file = std::fs::File::create(path)?;
    let writer = io::BufWriter::new(file);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|e| StorageError::Encode {
            format: "JPEG",
            reason: e.to_string(),
        })
}

fn encode_webp(path: &Path, image: &DynamicImage, quality: u8) -> Result<(), StorageError> {
    let encoder = webp::Encoder::from_image(image).map_err(|reason| StorageError::Encode {
        format: "WebP",
        reason: reason.to_string(),
    })?;
    let encoded = encoder.encode(quality as f32);
    std::fs::write(path, &*encoded)?;
    Ok(())
}
