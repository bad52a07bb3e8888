//! Interchange data model shared with the document-assembly consumer.
//!
//! These types are serialized to JSON at the service boundary and must keep
//! a uniform shape regardless of the original source (photo, scan, PDF
//! page). A [`Document`] exclusively owns its [`Page`]s; a page exclusively
//! owns its [`ImageMetadata`]. The page→document back-reference is a
//! denormalized label patched once at assembly — never a navigable parent
//! pointer, so no ownership cycle exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Processing status of a document.
///
/// The pipeline is synchronous per request, so callers only ever observe
/// `Completed` (a failed run returns an error instead of a document); the
/// other states exist for interchange with consumers that track documents
/// across services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Color mode of a decoded image, in the interchange naming downstream
/// consumers expect.
///
/// Indexed/palette sources have no variant of their own: the decoder
/// expands the palette at load time, so they surface as `Rgb` — or `Rgba`
/// when the palette carried a transparency key, which is also what makes
/// the transparency flag behave uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "RGBA")]
    Rgba,
    #[serde(rename = "L")]
    Luma,
    #[serde(rename = "LA")]
    LumaAlpha,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl ColorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ColorMode::Rgb => "RGB",
            ColorMode::Rgba => "RGBA",
            ColorMode::Luma => "L",
            ColorMode::LumaAlpha => "LA",
            ColorMode::Unknown => "Unknown",
        }
    }

    /// Whether the mode carries an alpha channel.
    pub fn has_alpha(self) -> bool {
        matches!(self, ColorMode::Rgba | ColorMode::LumaAlpha)
    }
}

/// Container format of the original source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormatKind {
    #[serde(rename = "JPEG")]
    Jpeg,
    #[serde(rename = "PNG")]
    Png,
    #[serde(rename = "WEBP")]
    Webp,
    #[serde(rename = "BMP")]
    Bmp,
    #[serde(rename = "TIFF")]
    Tiff,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl ImageFormatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormatKind::Jpeg => "JPEG",
            ImageFormatKind::Png => "PNG",
            ImageFormatKind::Webp => "WEBP",
            ImageFormatKind::Bmp => "BMP",
            ImageFormatKind::Tiff => "TIFF",
            ImageFormatKind::Unknown => "Unknown",
        }
    }
}

/// Structured metadata for one processed image.
///
/// `width`/`height` describe the *persisted* artifact (post-normalization),
/// while `mode`, `format`, and `has_transparency` describe the original
/// source — a consumer can tell that a now-opaque JPEG started out as a
/// transparent PNG. `file_size` is the byte size of the persisted artifact,
/// filled in after the write completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub mode: ColorMode,
    pub format: ImageFormatKind,
    pub file_size: u64,
    pub has_transparency: bool,
    /// EXIF subset, present only when extraction is enabled and the source
    /// carries data. Absence is `None`, never an empty map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exif: Option<BTreeMap<String, String>>,
}

/// One page of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number; always 1 for single-image documents.
    pub page_number: u32,
    /// Reserved for non-image sources; always `None` here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    /// Path to the persisted normalized image.
    pub image_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
    pub metadata: ImageMetadata,
    /// Denormalized label of the owning document's title, set at assembly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
    /// Denormalized label of the owning document's id, set at assembly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

/// A normalized document: one or more pages plus free-form metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Derived from the original file's base name; non-empty.
    pub title: String,
    /// Path to the processed artifact, not the original upload.
    pub file_path: String,
    /// Always equals `pages.len()`; enforced by [`Document::new`].
    pub num_pages: usize,
    pub pages: Vec<Page>,
    pub status: DocumentStatus,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Assemble a document from its pages.
    ///
    /// `num_pages` is computed from the pages handed in, and each page's
    /// `document_name`/`document_id` labels are patched to match — the one
    /// mutation pages see after construction.
    pub fn new(
        id: String,
        title: String,
        file_path: String,
        pages: Vec<Page>,
        status: DocumentStatus,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let mut document = Self {
            id,
            title,
            file_path,
            num_pages: pages.len(),
            pages,
            status,
            metadata,
            created_at: Utc::now(),
        };
        document.patch_page_references();
        document
    }

    /// Look up a page by its 1-based number.
    pub fn get_page(&self, page_number: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }

    fn patch_page_references(&mut self) {
        for page in &mut self.pages {
            page.document_name = Some(self.title.clone());
            page.document_id = Some(self.id.clone());
        }
    }
}

/// Generate a document id: `doc_` + 8 random hex chars.
pub fn generate_document_id() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("doc_{}", &token[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> ImageMetadata {
        ImageMetadata {
            width: 800,
            height: 600,
            mode: ColorMode::Rgb,
            format: ImageFormatKind::Jpeg,
            file_size: 12345,
            has_transparency: false,
            exif: None,
        }
    }

    fn sample_page(number: u32) -> Page {
        Page {
            page_number: number,
            text_content: None,
            image_path: format!("store/img_{number}.webp"),
            thumbnail_path: None,
            metadata: sample_metadata(),
            document_name: None,
            document_id: None,
        }
    }

    // =========================================================================
    // Document assembly invariants
    // =========================================================================

    #[test]
    fn num_pages_always_matches_pages_len() {
        let doc = Document::new(
            "doc_ab12cd34".into(),
            "photo.jpg".into(),
            "store/img_x.webp".into(),
            vec![sample_page(1)],
            DocumentStatus::Completed,
            BTreeMap::new(),
        );
        assert_eq!(doc.num_pages, 1);
        assert_eq!(doc.num_pages, doc.pages.len());
    }

    #[test]
    fn page_back_references_are_patched() {
        let doc = Document::new(
            "doc_ab12cd34".into(),
            "photo.jpg".into(),
            "store/img_x.webp".into(),
            vec![sample_page(1)],
            DocumentStatus::Completed,
            BTreeMap::new(),
        );
        let page = &doc.pages[0];
        assert_eq!(page.document_id.as_deref(), Some("doc_ab12cd34"));
        assert_eq!(page.document_name.as_deref(), Some("photo.jpg"));
    }

    #[test]
    fn get_page_finds_by_number() {
        let doc = Document::new(
            "doc_1".into(),
            "t".into(),
            "f".into(),
            vec![sample_page(1)],
            DocumentStatus::Completed,
            BTreeMap::new(),
        );
        assert!(doc.get_page(1).is_some());
        assert!(doc.get_page(2).is_none());
    }

    // =========================================================================
    // Id generation
    // =========================================================================

    #[test]
    fn generated_ids_have_prefix_and_length() {
        let id = generate_document_id();
        assert!(id.starts_with("doc_"));
        assert_eq!(id.len(), "doc_".len() + 8);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(generate_document_id(), generate_document_id());
    }

    // =========================================================================
    // Serialization shape
    // =========================================================================

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DocumentStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn color_mode_serializes_interchange_names() {
        assert_eq!(serde_json::to_string(&ColorMode::Rgb).unwrap(), "\"RGB\"");
        assert_eq!(
            serde_json::to_string(&ColorMode::LumaAlpha).unwrap(),
            "\"LA\""
        );
    }

    #[test]
    fn absent_optionals_are_omitted_from_json() {
        let page = sample_page(1);
        let json = serde_json::to_value(&page).unwrap();
        assert!(json.get("text_content").is_none());
        assert!(json.get("thumbnail_path").is_none());
        assert!(json["metadata"].get("exif").is_none());
    }

    #[test]
    fn document_roundtrips_through_json() {
        let doc = Document::new(
            generate_document_id(),
            "scan.png".into(),
            "store/img_y.jpg".into(),
            vec![sample_page(1)],
            DocumentStatus::Completed,
            BTreeMap::from([(
                "processor".to_string(),
                serde_json::Value::String("pagelift".into()),
            )]),
        );
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, doc.id);
        assert_eq!(back.num_pages, 1);
        assert_eq!(back.pages[0].metadata.width, 800);
    }

    #[test]
    fn color_mode_alpha_flags() {
        assert!(ColorMode::Rgba.has_alpha());
        assert!(ColorMode::LumaAlpha.has_alpha());
        assert!(!ColorMode::Rgb.has_alpha());
        assert!(!ColorMode::Luma.has_alpha());
    }
}
