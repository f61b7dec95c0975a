//! End-to-end "firmware blob → extracted tree + manifest" pipeline.
//!
//! [`Extractor`] is the single entry point. It classifies the top-level blob
//! (unless a format is forced), runs the matching decoder, lets the
//! [`RecursionController`] unwrap nested containers, and finally scans the
//! output directory into an [`ExtractionManifest`].
//!
//! Construction helpers:
//! - [`Extractor::new`] — system tools and a silent observer.
//! - [`Extractor::with_tools`] / [`Extractor::with_observer`] — inject collaborators.

use crate::blob::BlobRef;
use crate::classifier::classify;
use crate::config::ExtractorConfig;
use crate::decoders::{self, DecodeContext};
use crate::error::ExtractError;
use crate::format::FormatTag;
use crate::manifest::{self, ExtractionManifest};
use crate::notifier::{ExtractionEvent, ExtractionObserver, SilentObserver};
use crate::recursion::RecursionController;
use crate::tools::{ImageTools, SystemTools};
use std::path::{Path, PathBuf};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// The tree was extracted and the manifest written. Check
    /// [`ExtractionManifest::complete`] for failed nested branches.
    Completed(ExtractionManifest),
    /// The blob is handled by an external tool; no manifest was written.
    Delegated { blob: PathBuf, format: FormatTag },
}

impl ExtractionOutcome {
    pub fn manifest(&self) -> Option<&ExtractionManifest> {
        match self {
            ExtractionOutcome::Completed(manifest) => Some(manifest),
            ExtractionOutcome::Delegated { .. } => None,
        }
    }
}

/// Orchestrates classification, decoding, recursion and the manifest scan.
///
/// The extractor holds no per-run state; reuse it for any number of blobs.
/// Runs are single-threaded and depth-first, and external tools block the
/// calling thread.
pub struct Extractor {
    config: ExtractorConfig,
    tools: Box<dyn ImageTools>,
    observer: Box<dyn ExtractionObserver>,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let tools = SystemTools::new(config.tools.clone());
        Self {
            config,
            tools: Box::new(tools),
            observer: Box::new(SilentObserver),
        }
    }

    pub fn with_tools(mut self, tools: impl ImageTools + 'static) -> Self {
        self.tools = Box::new(tools);
        self
    }

    pub fn with_observer(mut self, observer: impl ExtractionObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extracts `blob_path` into `output_dir`.
    ///
    /// # Returns
    /// - [`ExtractionOutcome::Completed`] once the manifest is written. Nested
    ///   failures do not fail the run; they are listed in the manifest, which
    ///   is then marked incomplete.
    /// - [`ExtractionOutcome::Delegated`] for OTA payload bundles.
    ///
    /// # Errors
    /// - [`ExtractError::MissingInput`] if the blob does not exist.
    /// - [`ExtractError::ClassificationUnresolved`] if no format matches.
    /// - [`ExtractError::Decode`] if the top-level decode fails, with the
    ///   path, the format and the underlying tool's message.
    /// - [`ExtractError::ManifestWrite`] / [`ExtractError::Scan`] for output I/O.
    ///
    /// ### Examples
    /// ```no_run
    /// use fwunwrap::{ExtractionOutcome, Extractor, ExtractorConfig};
    ///
    /// let extractor = Extractor::new(ExtractorConfig::default());
    /// match extractor.extract("firmware.zip", "out")? {
    ///     ExtractionOutcome::Completed(manifest) => println!("{} files", manifest.files.len()),
    ///     ExtractionOutcome::Delegated { .. } => println!("use a payload dumper"),
    /// }
    /// # Ok::<(), fwunwrap::ExtractError>(())
    /// ```
    pub fn extract<P, Q>(&self, blob_path: P, output_dir: Q) -> Result<ExtractionOutcome, ExtractError>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let blob = BlobRef::new(blob_path.as_ref());
        let output_dir = output_dir.as_ref();

        if !blob.exists() {
            return Err(ExtractError::MissingInput {
                path: blob.path().to_path_buf(),
            });
        }

        let format = match self.config.forced_format {
            Some(forced) => {
                log::debug!("Format forced to {}", forced);
                forced
            }
            None => classify(&blob),
        };
        self.observer.on_event(&ExtractionEvent::Classified {
            path: blob.path(),
            format,
            depth: 0,
        });

        if !format.is_known() {
            return Err(ExtractError::ClassificationUnresolved {
                path: blob.path().to_path_buf(),
            });
        }

        let ctx = DecodeContext::new(self.tools.as_ref());

        self.observer.on_event(&ExtractionEvent::DecodingStarted {
            path: blob.path(),
            format,
            depth: 0,
        });
        let result = decoders::decode(format, &blob, output_dir, &ctx).map_err(|source| {
            self.observer.on_event(&ExtractionEvent::BranchFailed {
                path: blob.path(),
                format,
                reason: &source.message,
            });
            ExtractError::Decode {
                path: blob.path().to_path_buf(),
                format,
                source,
            }
        })?;
        self.observer.on_event(&ExtractionEvent::DecodingFinished {
            path: blob.path(),
            format,
            produced: result.files.len(),
        });

        if result.delegated {
            self.observer.on_event(&ExtractionEvent::Delegated {
                path: blob.path(),
                format,
            });
            return Ok(ExtractionOutcome::Delegated {
                blob: blob.path().to_path_buf(),
                format,
            });
        }

        let controller = RecursionController::new(&ctx, self.observer.as_ref(), self.config.max_depth);
        let expansion = controller.expand(result, 0);

        let manifest = manifest::scan(output_dir, format, expansion.failures)?;
        self.observer.on_event(&ExtractionEvent::ManifestWritten {
            path: &ExtractionManifest::path_in(output_dir),
            files: manifest.files.len(),
            complete: manifest.complete,
        });

        Ok(ExtractionOutcome::Completed(manifest))
    }
}
