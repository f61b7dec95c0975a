//! Decoder adapters and the dispatch over the closed set of formats.
//!
//! Each adapter turns one classified blob into files under a destination
//! directory and reports which of those files look like containers again.
//! Adapters never recurse themselves; that is the job of
//! [`crate::recursion::RecursionController`]. The one exception is the
//! checksum sidecar, which has no content of its own and forwards to its
//! base file.

pub mod payload;
pub mod sidecar;
pub mod sparse;
pub mod stream;
pub mod tar;
pub mod zip;

use crate::blob::BlobRef;
use crate::error::{DecodeError, DecodeOutcome};
use crate::format::FormatTag;
use crate::tools::ImageTools;
use std::path::{Path, PathBuf};

/// Produced-file suffixes that mark a file as a nested candidate.
pub const NESTED_SUFFIXES: &[&str] = &[".zip", ".tar", ".md5", ".lz4"];

/// Suffixes removed when naming the directory a nested candidate expands into.
const STRIPPABLE_SUFFIXES: &[&str] = &[".md5", ".zip", ".tar", ".lz4", ".br", ".gz", ".tgz"];

/// Output of one decode step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeResult {
    pub dest_dir: PathBuf,
    /// Every regular file written, as absolute paths under `dest_dir`.
    pub files: Vec<PathBuf>,
    /// Produced files that are themselves containers.
    pub nested: Vec<PathBuf>,
    /// Decoding was handed to an external tool; nothing was produced locally.
    pub delegated: bool,
    /// Inputs other than the blob itself that this step exploded.
    pub consumed: Vec<PathBuf>,
}

impl DecodeResult {
    pub fn new(dest_dir: &Path) -> Self {
        Self {
            dest_dir: dest_dir.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn delegated(dest_dir: &Path) -> Self {
        Self {
            delegated: true,
            ..Self::new(dest_dir)
        }
    }

    /// Records a produced file, flagging it as nested when its name says so.
    pub fn push_file(&mut self, path: PathBuf) {
        if is_nested_candidate(&path) {
            self.nested.push(path.clone());
        }
        self.files.push(path);
    }
}

/// Collaborators available to adapters.
pub struct DecodeContext<'a> {
    pub tools: &'a dyn ImageTools,
}

impl<'a> DecodeContext<'a> {
    pub fn new(tools: &'a dyn ImageTools) -> Self {
        Self { tools }
    }
}

/// Decodes `blob` as `format` into `dest`.
pub fn decode(
    format: FormatTag,
    blob: &BlobRef,
    dest: &Path,
    ctx: &DecodeContext<'_>,
) -> DecodeOutcome<DecodeResult> {
    log::debug!(
        "Decoding {} as {} into {}",
        blob.path().display(),
        format,
        dest.display()
    );

    match format {
        FormatTag::Zip => zip::decode(blob, dest),
        FormatTag::Tar => tar::decode(blob, dest),
        FormatTag::Lz4 => stream::decode(blob, dest, stream::Codec::Lz4),
        FormatTag::Brotli => stream::decode(blob, dest, stream::Codec::Brotli),
        FormatTag::SparseImage => sparse::decode(blob, dest, ctx.tools),
        FormatTag::PayloadBundle => payload::decode(blob, dest),
        FormatTag::ChecksumSidecar => sidecar::decode(blob, dest, ctx),
        FormatTag::Unknown => Err(DecodeError::unsupported(format!(
            "no decoder for {}",
            blob.path().display()
        ))),
    }
}

pub fn is_nested_candidate(path: &Path) -> bool {
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy().to_lowercase(),
        None => return false,
    };
    NESTED_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix) && name.len() > suffix.len())
}

/// Directory a nested candidate expands into: its name without container
/// suffixes, next to it. Falls back to `<name>.d` when that is taken.
pub fn nested_destination(candidate: &Path) -> PathBuf {
    let parent = candidate.parent().unwrap_or_else(|| Path::new("."));
    let name = candidate
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let stripped = strip_container_suffixes(&name);
    let preferred = parent.join(stripped);
    if !stripped.is_empty() && !preferred.exists() {
        return preferred;
    }
    parent.join(format!("{}.d", name))
}

fn strip_container_suffixes(name: &str) -> &str {
    let mut rest = name;
    loop {
        let lower = rest.to_ascii_lowercase();
        match STRIPPABLE_SUFFIXES
            .iter()
            .find(|suffix| lower.ends_with(*suffix) && lower.len() > suffix.len())
        {
            Some(suffix) => rest = &rest[..rest.len() - suffix.len()],
            None => return rest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_nested_candidate_suffixes() {
        assert!(is_nested_candidate(Path::new("out/inner.zip")));
        assert!(is_nested_candidate(Path::new("out/AP.TAR")));
        assert!(is_nested_candidate(Path::new("out/AP.tar.md5")));
        assert!(is_nested_candidate(Path::new("out/super.lz4")));
        assert!(!is_nested_candidate(Path::new("out/system.img")));
        assert!(!is_nested_candidate(Path::new("out/build.prop")));
        assert!(!is_nested_candidate(Path::new("out/.zip")));
    }

    #[test]
    fn test_strip_container_suffixes() {
        assert_eq!(strip_container_suffixes("inner.tar.md5"), "inner");
        assert_eq!(strip_container_suffixes("system.tar"), "system");
        assert_eq!(strip_container_suffixes("Update.ZIP"), "Update");
        assert_eq!(strip_container_suffixes("vendor.img"), "vendor.img");
        assert_eq!(strip_container_suffixes(".tar"), ".tar");
    }

    #[test]
    fn test_nested_destination_avoids_existing_paths() {
        let dir = TempDir::new().unwrap();
        let candidate = dir.path().join("system.tar");
        assert_eq!(nested_destination(&candidate), dir.path().join("system"));

        fs::create_dir(dir.path().join("system")).unwrap();
        assert_eq!(nested_destination(&candidate), dir.path().join("system.tar.d"));
    }

    #[test]
    fn test_unknown_has_no_decoder() {
        let dir = TempDir::new().unwrap();
        let tools = crate::test_support::FakeTools::default();
        let ctx = DecodeContext::new(&tools);
        let blob = BlobRef::new(dir.path().join("notes.txt"));

        let err = decode(FormatTag::Unknown, &blob, dir.path(), &ctx).unwrap_err();
        assert_eq!(err.kind, crate::error::DecodeErrorKind::UnsupportedSubformat);
    }
}
