//! # pagelift
//!
//! Image normalization service core. Takes a single raster image file and
//! produces a uniform `Document` record — one `Page` holding a re-encoded,
//! size-bounded image, structured metadata (dimensions, color mode, EXIF
//! subset, transparency flag), and an optional thumbnail — so a downstream
//! document-assembly consumer sees the same shape whether the source was a
//! photo, a scan, or a rendered PDF page.
//!
//! # Architecture: One Pipeline, Pooled Across Requests
//!
//! ```text
//! validate → decode → normalize → persist → thumbnail → metadata → Page → Document
//! ```
//!
//! Every stage consumes the previous one's output, so a single request is
//! strictly sequential. Throughput comes from running *requests* in
//! parallel on a bounded worker pool — decode and resize are CPU-bound, so
//! real threads beat cooperative scheduling here.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `ServiceConfig` — bounds, quality, layout, and toggle knobs with TOML loading and validation |
//! | [`document`] | Interchange data model: `Document`, `Page`, `ImageMetadata` |
//! | [`normalize`] | Transparency flattening onto white + bounded Lanczos3 resize |
//! | [`metadata`] | Dimensions/mode/format/transparency plus the EXIF allow-list subset |
//! | [`storage`] | Deterministic `img_<12-hex>` naming, JPEG/WebP encoding, best-effort thumbnails |
//! | [`processor`] | `ImageProcessor` orchestrator, error taxonomy, worker pool |
//!
//! # Design Decisions
//!
//! ## Errors Are the Contract
//!
//! Every way a request can fail has a [`processor::ProcessError`] variant
//! carrying the offending path. Two failures are deliberately *not* errors:
//! thumbnails (logged, page gets a null thumbnail path) and metadata
//! extraction (degrades to minimal fields). Persistence of the main
//! artifact is never best-effort.
//!
//! ## Weak Content-Addressed Naming
//!
//! Artifact names hash the source *path and mtime*, not pixel data:
//! reprocessing an unchanged file is idempotent, touching it produces a new
//! artifact. The trade-offs (no dedup across paths, collision on same-path
//! same-mtime rewrites) are documented in [`storage`].
//!
//! ## Explicit Configuration
//!
//! One [`config::ServiceConfig`] value is built at startup and passed into
//! every component. Nothing reads ambient global state, which keeps the
//! pipeline reproducible and the tests hermetic.
//!
//! ## Flatten to White, Always Opaque
//!
//! Alpha channels and palette transparency cannot survive JPEG or the
//! downstream consumers, so normalization composites onto opaque white —
//! deterministic output, and the metadata still records that the *source*
//! had transparency.

pub mod config;
pub mod document;
pub mod metadata;
pub mod normalize;
pub mod processor;
pub mod storage;
