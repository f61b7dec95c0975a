use super::DecodeResult;
use crate::blob::BlobRef;
use crate::error::{DecodeError, DecodeOutcome};
use crate::tools::{ImageTools, MountGuard};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Converts a sparse image to raw, mounts it read-only and copies the
/// filesystem into `dest`.
///
/// The raw image stays in `dest` as `<stem>.raw.img`. The mount is held by a
/// [`MountGuard`], so a failed copy still unmounts.
pub fn decode(blob: &BlobRef, dest: &Path, tools: &dyn ImageTools) -> DecodeOutcome<DecodeResult> {
    let path = blob.path();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());

    fs::create_dir_all(dest).map_err(|e| DecodeError::io("Failed to create directory", dest, e))?;

    let raw_image = dest.join(format!("{}.raw.img", stem));
    tools.sparse_to_raw(path, &raw_image)?;
    log::debug!("Converted sparse image {} to {}", path.display(), raw_image.display());

    let mountpoint = dest.join(format!(".{}.mnt", stem));
    let guard = MountGuard::mount(tools, &raw_image, &mountpoint)?;

    let mut result = DecodeResult::new(dest);
    let copied = copy_tree(guard.path(), dest)
        .map_err(|e| DecodeError::io("Failed to copy mounted contents into", dest, e))?;
    guard.release()?;

    result.files.push(raw_image);
    for file in copied {
        result.push_file(file);
    }
    Ok(result)
}

/// Copies everything below `src` into `dest`, returning the files written.
fn copy_tree(src: &Path, dest: &Path) -> io::Result<Vec<PathBuf>> {
    let mut copied = Vec::new();

    for entry in WalkDir::new(src).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let rel_path = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dest.join(rel_path);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            #[cfg(unix)]
            {
                let link = fs::read_link(entry.path())?;
                let _ = fs::remove_file(&target);
                std::os::unix::fs::symlink(link, &target)?;
            }
        } else {
            fs::copy(entry.path(), &target)?;
            copied.push(target);
        }
    }

    Ok(copied)
}
