//! Inventory of an extraction output tree.
//!
//! [`scan`] walks the output directory once, after recursion has settled,
//! and records every file and directory relative to the root. Property
//! files (`build.prop`) and partition images (`*.img`) are listed again on
//! their own. The result is written to [`MANIFEST_FILE_NAME`] in the same
//! directory.

use crate::error::ExtractError;
use crate::format::FormatTag;
use crate::recursion::BranchFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub const MANIFEST_FILE_NAME: &str = "extraction_metadata.json";

const PROPERTY_FILE_NAME: &str = "build.prop";
const PARTITION_IMAGE_SUFFIX: &str = ".img";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionManifest {
    pub format: FormatTag,
    pub output_dir: PathBuf,
    pub files: Vec<String>,
    pub directories: Vec<String>,
    pub build_props: Vec<String>,
    pub partition_images: Vec<String>,
    /// False when any nested branch failed; see `failed_branches`.
    pub complete: bool,
    pub failed_branches: Vec<BranchFailure>,
    pub generated_at: DateTime<Utc>,
}

impl ExtractionManifest {
    pub fn path_in(output_dir: &Path) -> PathBuf {
        output_dir.join(MANIFEST_FILE_NAME)
    }

    /// Reads a previously written manifest from `output_dir`.
    pub fn load(output_dir: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = Self::path_in(output_dir);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))
    }
}

/// Builds the manifest for `output_dir` and writes it there.
pub fn scan(
    output_dir: &Path,
    format: FormatTag,
    failed_branches: Vec<BranchFailure>,
) -> Result<ExtractionManifest, ExtractError> {
    let mut manifest = ExtractionManifest {
        format,
        output_dir: output_dir.to_path_buf(),
        files: Vec::new(),
        directories: Vec::new(),
        build_props: Vec::new(),
        partition_images: Vec::new(),
        complete: failed_branches.is_empty(),
        failed_branches: Vec::new(),
        generated_at: Utc::now(),
    };

    let manifest_path = ExtractionManifest::path_in(output_dir);

    for entry in WalkDir::new(output_dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| ExtractError::Scan {
            path: output_dir.to_path_buf(),
            message: e.to_string(),
        })?;
        if entry.path() == manifest_path {
            continue;
        }

        let rel_path = relative_string(output_dir, entry.path());
        if entry.file_type().is_dir() {
            manifest.directories.push(rel_path);
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if name == PROPERTY_FILE_NAME {
            manifest.build_props.push(rel_path.clone());
        } else if name.to_ascii_lowercase().ends_with(PARTITION_IMAGE_SUFFIX) {
            manifest.partition_images.push(rel_path.clone());
        }
        manifest.files.push(rel_path);
    }

    manifest.failed_branches = failed_branches
        .into_iter()
        .map(|failure| BranchFailure {
            path: failure
                .path
                .strip_prefix(output_dir)
                .map(Path::to_path_buf)
                .unwrap_or(failure.path),
            ..failure
        })
        .collect();

    write(&manifest, &manifest_path)?;
    Ok(manifest)
}

fn write(manifest: &ExtractionManifest, path: &Path) -> Result<(), ExtractError> {
    let json = serde_json::to_string_pretty(manifest).map_err(|e| ExtractError::ManifestWrite {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    fs::write(path, json).map_err(|source| ExtractError::ManifestWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// `path` relative to `root`, with `/` separators on every platform.
fn relative_string(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
