use super::{DecodeContext, DecodeResult};
use crate::blob::BlobRef;
use crate::classifier::classify;
use crate::error::{DecodeError, DecodeErrorKind, DecodeOutcome};
use crate::format::FormatTag;
use std::path::{Path, PathBuf};

const SUFFIX: &str = ".md5";

/// The file a checksum sidecar belongs to: same path without `.md5`.
pub fn base_path(sidecar: &Path) -> PathBuf {
    let name = sidecar
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if name.len() > SUFFIX.len() && name.to_ascii_lowercase().ends_with(SUFFIX) {
        sidecar.with_file_name(&name[..name.len() - SUFFIX.len()])
    } else {
        sidecar.to_path_buf()
    }
}

/// Classifies and decodes the base file next to the sidecar into `dest`.
/// The base is reported as consumed.
pub fn decode(blob: &BlobRef, dest: &Path, ctx: &DecodeContext<'_>) -> DecodeOutcome<DecodeResult> {
    let base = base_path(blob.path());
    if base == blob.path() || !base.is_file() {
        return Err(DecodeError::new(
            DecodeErrorKind::MissingSidecarTarget,
            format!(
                "expected {} alongside {}",
                base.display(),
                blob.path().display()
            ),
        ));
    }

    let base_blob = BlobRef::new(&base);
    let format = classify(&base_blob);
    log::debug!("Sidecar {} covers {} ({})", blob.path().display(), base.display(), format);

    if format == FormatTag::Unknown {
        return Err(DecodeError::unsupported(format!(
            "{} has no recognizable format",
            base.display()
        )));
    }

    let mut result = super::decode(format, &base_blob, dest, ctx)?;
    result.consumed.push(base);
    Ok(result)
}
