//! The image processing pipeline orchestrator.
//!
//! Each request runs the stages strictly in order — every stage consumes
//! the previous one's output:
//!
//! ```text
//! validate → decode → normalize → persist(main) → persist(thumbnail, best-effort)
//!          → extract metadata → assemble Page → assemble Document
//! ```
//!
//! A call either returns a fully `completed` [`Document`] or a typed
//! [`ProcessError`]; no caller ever observes a half-built document.
//! Thumbnail and metadata problems are absorbed inside their stages —
//! validation, decode, and main-image persistence failures abort.
//!
//! ## Concurrency
//!
//! There is no intra-request parallelism. Concurrency exists only *across*
//! requests: [`ImageProcessor`] owns a bounded worker pool, and
//! [`ImageProcessor::submit`] hands the fully-synchronous pipeline to it,
//! returning a [`PendingDocument`] the caller redeems later. This is
//! CPU-bound work on threads, deliberately not async I/O. Requests share
//! no mutable state; two concurrent requests for the *same* unchanged
//! source race on one destination name with last-writer-wins semantics
//! (see [`crate::storage`]).

use crate::config::{OutputFormat, ServiceConfig};
use crate::document::{self, Document, DocumentStatus, Page};
use crate::metadata::MetadataExtractor;
use crate::normalize;
use crate::storage::{ImageStorage, StorageError};
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, mpsc};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("file path is required")]
    MissingPath,
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("path is not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("file is empty: {0}")]
    EmptyFile(PathBuf),
    #[error("unsupported extension {extension:?}: {path}")]
    UnsupportedExtension { path: PathBuf, extension: String },
    #[error("unsupported output format: {0}")]
    UnsupportedOutputFormat(String),
    #[error("unrecognized image data: {path}")]
    UnrecognizedImage { path: PathBuf },
    #[error("failed to decode {path}: {source}")]
    DecodeFailed { path: PathBuf, source: ImageError },
    #[error("failed to prepare workspace for {path}: {source}")]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to persist image for {path}: {source}")]
    Persist { path: PathBuf, source: StorageError },
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("worker terminated before returning a result")]
    WorkerLost,
}

/// Per-request options. Everything is optional; the config supplies
/// defaults for workspace and output format, and document ids are
/// generated when absent.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub workspace: Option<PathBuf>,
    pub output_format: Option<OutputFormat>,
    pub document_id: Option<String>,
}

/// A decoded source image plus the container format it was sniffed from.
struct Decoded {
    image: DynamicImage,
    format: Option<ImageFormat>,
}

/// The shared, immutable pipeline: config plus the components it wires up.
/// One instance serves all requests, blocking and offloaded alike.
struct Pipeline {
    config: Arc<ServiceConfig>,
    storage: ImageStorage,
    extractor: MetadataExtractor,
}

impl Pipeline {
    fn validate_file(&self, file_path: &Path) -> Result<(), ProcessError> {
        if file_path.as_os_str().is_empty() {
            return Err(ProcessError::MissingPath);
        }
        let Ok(meta) = std::fs::metadata(file_path) else {
            return Err(ProcessError::NotFound(file_path.to_path_buf()));
        };
        if !meta.is_file() {
            return Err(ProcessError::NotAFile(file_path.to_path_buf()));
        }
        if meta.len() == 0 {
            return Err(ProcessError::EmptyFile(file_path.to_path_buf()));
        }
        if !self.config.is_supported_source(file_path) {
            let extension = file_path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            return Err(ProcessError::UnsupportedExtension {
                path: file_path.to_path_buf(),
                extension,
            });
        }
        debug!(path = %file_path.display(), "file validation passed");
        Ok(())
    }

    /// Eagerly decode the full pixel buffer. The result is independent of
    /// the source file handle — safe to use after the file is gone.
    fn decode(&self, file_path: &Path) -> Result<Decoded, ProcessError> {
        let reader = ImageReader::open(file_path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|err| ProcessError::DecodeFailed {
                path: file_path.to_path_buf(),
                source: ImageError::IoError(err),
            })?;

        let Some(format) = reader.format() else {
            return Err(ProcessError::UnrecognizedImage {
                path: file_path.to_path_buf(),
            });
        };

        let image = reader.decode().map_err(|err| match err {
            ImageError::Unsupported(_) => ProcessError::UnrecognizedImage {
                path: file_path.to_path_buf(),
            },
            other => ProcessError::DecodeFailed {
                path: file_path.to_path_buf(),
                source: other,
            },
        })?;

        Ok(Decoded {
            image,
            format: Some(format),
        })
    }

    fn process_page(
        &self,
        file_path: &Path,
        workspace: Option<&Path>,
        format: OutputFormat,
    ) -> Result<Page, ProcessError> {
        let decoded = self.decode(file_path)?;
        let normalized = normalize::normalize(&decoded.image, &self.config.limits);

        let saved = self
            .storage
            .save_image(&normalized, file_path, workspace, format)
            .map_err(|source| ProcessError::Persist {
                path: file_path.to_path_buf(),
                source,
            })?;

        let artifact_name = saved
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let thumbnail = self
            .storage
            .create_thumbnail(&normalized, &artifact_name, workspace);

        // Metadata comes from the original decode; width/height report the
        // persisted shape, and the byte count only exists post-write.
        let mut metadata = self.extractor.extract(
            &decoded.image,
            decoded.format,
            file_path,
            (normalized.width(), normalized.height()),
        );
        metadata.file_size = saved.bytes;

        Ok(Page {
            page_number: 1,
            text_content: None,
            image_path: saved.path.to_string_lossy().into_owned(),
            thumbnail_path: thumbnail.map(|p| p.to_string_lossy().into_owned()),
            metadata,
            document_name: None,
            document_id: None,
        })
    }

    fn process_document(
        &self,
        file_path: &Path,
        options: &ProcessOptions,
    ) -> Result<Document, ProcessError> {
        self.validate_file(file_path)?;

        let workspace = options.workspace.as_deref();
        self.storage
            .ensure_layout(workspace)
            .map_err(|source| ProcessError::Workspace {
                path: file_path.to_path_buf(),
                source,
            })?;

        let format = options
            .output_format
            .unwrap_or(self.config.encoding.default_format);
        let page = self.process_page(file_path, workspace, format)?;
        let document = self.assemble_document(page, file_path, options.document_id.clone());

        info!(
            id = %document.id,
            path = %file_path.display(),
            image = %document.file_path,
            "image processing completed"
        );
        Ok(document)
    }

    fn assemble_document(
        &self,
        page: Page,
        original: &Path,
        document_id: Option<String>,
    ) -> Document {
        let id = document_id.unwrap_or_else(document::generate_document_id);
        let title = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "untitled".to_string());

        let metadata = BTreeMap::from([
            (
                "original_file".to_string(),
                json!(original.to_string_lossy()),
            ),
            ("processor".to_string(), json!("pagelift")),
            (
                "created_at".to_string(),
                json!(chrono::Utc::now().to_rfc3339()),
            ),
            ("file_size".to_string(), json!(page.metadata.file_size)),
            (
                "image_format".to_string(),
                json!(page.metadata.format.as_str()),
            ),
            (
                "dimensions".to_string(),
                json!(format!("{}x{}", page.metadata.width, page.metadata.height)),
            ),
        ]);

        let file_path = page.image_path.clone();
        Document::new(
            id,
            title,
            file_path,
            vec![page],
            DocumentStatus::Completed,
            metadata,
        )
    }
}

/// Tracks offloaded requests so shutdown can drain them.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn enter(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        *count += 1;
    }

    fn exit(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn drain(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(|p| p.into_inner());
        }
    }
}

/// A submitted request's future result. Redeem it with [`wait`](Self::wait).
pub struct PendingDocument {
    rx: mpsc::Receiver<Result<Document, ProcessError>>,
}

impl PendingDocument {
    /// Block until the offloaded request completes.
    pub fn wait(self) -> Result<Document, ProcessError> {
        self.rx.recv().unwrap_or(Err(ProcessError::WorkerLost))
    }

    /// Non-blocking poll: `None` while the request is still running.
    pub fn try_wait(&self) -> Option<Result<Document, ProcessError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(ProcessError::WorkerLost)),
        }
    }
}

/// Turns raster images into normalized [`Document`] records.
///
/// Stateless across requests: each call reads its own input and writes its
/// own deterministically-named output. Construct once, share freely.
pub struct ImageProcessor {
    pipeline: Arc<Pipeline>,
    pool: rayon::ThreadPool,
    in_flight: Arc<InFlight>,
}

impl ImageProcessor {
    /// Build a processor and its worker pool from an explicit config.
    pub fn new(config: ServiceConfig) -> Result<Self, ProcessError> {
        let config = Arc::new(config);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.processing.workers)
            .thread_name(|i| format!("pagelift-worker-{i}"))
            .build()?;

        Ok(Self {
            pipeline: Arc::new(Pipeline {
                storage: ImageStorage::new(Arc::clone(&config)),
                extractor: MetadataExtractor::new(Arc::clone(&config)),
                config,
            }),
            pool,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.pipeline.config
    }

    /// The source extension allow-list in effect.
    pub fn supported_extensions(&self) -> &[String] {
        &self.pipeline.config.supported_extensions
    }

    /// Check an input file against the validation contract without
    /// processing it.
    pub fn validate_file(&self, file_path: &Path) -> Result<(), ProcessError> {
        self.pipeline.validate_file(file_path)
    }

    /// Blocking entry point: run the whole pipeline on the caller's thread.
    pub fn process(
        &self,
        file_path: &Path,
        options: &ProcessOptions,
    ) -> Result<Document, ProcessError> {
        self.pipeline
            .process_document(file_path, options)
            .inspect_err(|err| error!(path = %file_path.display(), %err, "processing failed"))
    }

    /// Non-blocking entry point: hand the pipeline to the worker pool and
    /// return immediately. The caller redeems the [`PendingDocument`]
    /// whenever it needs the result.
    pub fn submit(&self, file_path: PathBuf, options: ProcessOptions) -> PendingDocument {
        let (tx, rx) = mpsc::channel();
        let pipeline = Arc::clone(&self.pipeline);
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.enter();

        self.pool.spawn(move || {
            let result = pipeline
                .process_document(&file_path, &options)
                .inspect_err(
                    |err| error!(path = %file_path.display(), %err, "processing failed"),
                );
            // The caller may have dropped the receiver; that only discards
            // the result, it cannot cancel the work.
            let _ = tx.send(result);
            in_flight.exit();
        });

        PendingDocument { rx }
    }

    /// Release the worker pool, blocking until all in-flight work drains.
    pub fn shutdown(self) {
        self.in_flight.drain();
    }
}
