//! Image metadata extraction.
//!
//! Builds the [`ImageMetadata`] value for a page from the *original*
//! decoded image (pre-normalization) plus the final processed dimensions.
//! The split matters: mode, container format, and transparency describe
//! what the source actually was, while width/height describe the artifact
//! that got persisted — a consumer can tell that a now-opaque JPEG started
//! out as a transparent PNG.
//!
//! ## EXIF subset
//!
//! When enabled, the EXIF block is read straight from the source file and
//! filtered down to a fixed allow-list of semantically useful fields
//! (camera make/model, capture timestamps, resolution, orientation, color
//! space, white balance, recorded dimensions). Values render as display
//! strings; anything longer than 200 characters is a binary blob in
//! disguise and is dropped. No EXIF — or the feature being disabled —
//! yields `None`, never an empty map.
//!
//! Metadata is best-effort throughout: a file that refuses to yield EXIF
//! is logged and skipped, never an error. Persistence is not best-effort;
//! that distinction lives in the orchestrator.

use crate::config::ServiceConfig;
use crate::document::{ColorMode, ImageFormatKind, ImageMetadata};
use exif::{In, Tag};
use image::{ColorType, DynamicImage, ImageFormat};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Values longer than this are embedded binary (maker notes, thumbnails),
/// not text worth forwarding.
const MAX_EXIF_VALUE_LEN: usize = 200;

/// EXIF fields worth forwarding to the document consumer.
const EXIF_FIELDS: &[Tag] = &[
    Tag::Make,
    Tag::Model,
    Tag::Software,
    Tag::DateTime,
    Tag::DateTimeOriginal,
    Tag::Orientation,
    Tag::XResolution,
    Tag::YResolution,
    Tag::ResolutionUnit,
    Tag::ColorSpace,
    Tag::WhiteBalance,
    Tag::PixelXDimension,
    Tag::PixelYDimension,
];

/// Map a decoded buffer's color type onto the interchange mode names.
pub fn color_mode_of(color: ColorType) -> ColorMode {
    match color {
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => ColorMode::Rgb,
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => ColorMode::Rgba,
        ColorType::L8 | ColorType::L16 => ColorMode::Luma,
        ColorType::La8 | ColorType::La16 => ColorMode::LumaAlpha,
        _ => ColorMode::Unknown,
    }
}

/// Map the sniffed container format onto the interchange format names.
pub fn format_kind_of(format: Option<ImageFormat>) -> ImageFormatKind {
    match format {
        Some(ImageFormat::Jpeg) => ImageFormatKind::Jpeg,
        Some(ImageFormat::Png) => ImageFormatKind::Png,
        Some(ImageFormat::WebP) => ImageFormatKind::Webp,
        Some(ImageFormat::Bmp) => ImageFormatKind::Bmp,
        Some(ImageFormat::Tiff) => ImageFormatKind::Tiff,
        _ => ImageFormatKind::Unknown,
    }
}

/// Extracts structured metadata for processed images.
pub struct MetadataExtractor {
    config: Arc<ServiceConfig>,
}

impl MetadataExtractor {
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self { config }
    }

    /// Build the metadata value for a page.
    ///
    /// `image` and `file_path` refer to the original source;
    /// `processed_size` is the shape of what was actually persisted.
    /// `file_size` is left at zero here — only the orchestrator knows the
    /// byte count once the write completes.
    pub fn extract(
        &self,
        image: &DynamicImage,
        format: Option<ImageFormat>,
        file_path: &Path,
        processed_size: (u32, u32),
    ) -> ImageMetadata {
        let (width, height) = processed_size;
        let metadata = ImageMetadata {
            width,
            height,
            mode: color_mode_of(image.color()),
            format: format_kind_of(format),
            file_size: 0,
            has_transparency: image.color().has_alpha(),
            exif: self.extract_exif(file_path),
        };
        debug!(
            path = %file_path.display(),
            mode = metadata.mode.as_str(),
            format = metadata.format.as_str(),
            "extracted metadata"
        );
        metadata
    }

    /// Read the EXIF subset from the source file. Best-effort: any failure
    /// degrades to `None`.
    fn extract_exif(&self, file_path: &Path) -> Option<BTreeMap<String, String>> {
        if !self.config.exif.enabled {
            return None;
        }

        let file = match std::fs::File::open(file_path) {
            Ok(f) => f,
            Err(err) => {
                warn!(path = %file_path.display(), %err, "could not open file for EXIF");
                return None;
            }
        };
        let mut reader = std::io::BufReader::new(file);
        let exif = match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => exif,
            // Most files simply carry no EXIF block; that is not a failure.
            Err(exif::Error::NotFound(_)) => return None,
            Err(err) => {
                warn!(path = %file_path.display(), %err, "EXIF extraction failed");
                return None;
            }
        };

        let mut fields = BTreeMap::new();
        for field in exif.fields() {
            if field.ifd_num != In::PRIMARY || !EXIF_FIELDS.contains(&field.tag) {
                continue;
            }
            let value = field.display_value().with_unit(&exif).to_string();
            if value.len() > MAX_EXIF_VALUE_LEN {
                continue;
            }
            fields.insert(field.tag.to_string(), value);
        }

        if fields.is_empty() { None } else { Some(fields) }
    }
}
