pub mod blob;
pub mod classifier;
pub mod config;
pub mod decoders;
pub mod error;
pub mod format;
pub mod manifest;
pub mod notifier;
pub mod orchestrator;
pub mod recursion;
pub mod tools;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

// Re-exports for easy access
pub use blob::BlobRef;
pub use classifier::classify;
pub use config::{ExtractorConfig, ToolConfig};
pub use decoders::{DecodeContext, DecodeResult};
pub use error::{DecodeError, DecodeErrorKind, ExtractError};
pub use format::FormatTag;
pub use manifest::ExtractionManifest;
pub use notifier::{ExtractionEvent, ExtractionObserver, Notifier, SilentObserver};
pub use orchestrator::{ExtractionOutcome, Extractor};
pub use recursion::{BranchFailure, FailureKind, RecursionController};
pub use tools::{ImageTools, MountGuard, SystemTools};
