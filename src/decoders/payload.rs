use super::DecodeResult;
use crate::blob::BlobRef;
use crate::error::DecodeOutcome;
use std::path::Path;

/// A/B OTA payloads are decoded by an external payload dumper. Nothing is
/// written locally and recursion stops here.
pub fn decode(blob: &BlobRef, dest: &Path) -> DecodeOutcome<DecodeResult> {
    log::info!(
        "{} is an OTA payload bundle, delegating to an external payload tool",
        blob.path().display()
    );
    Ok(DecodeResult::delegated(dest))
}
