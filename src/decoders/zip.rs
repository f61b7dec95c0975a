use super::DecodeResult;
use crate::blob::BlobRef;
use crate::error::{DecodeError, DecodeOutcome};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

/// Expands every entry of a zip archive into `dest`.
///
/// Entries named like containers are reported as nested candidates and left
/// on disk for the controller.
pub fn decode(blob: &BlobRef, dest: &Path) -> DecodeOutcome<DecodeResult> {
    let path = blob.path();
    let file = File::open(path).map_err(|e| DecodeError::io("Failed to open zip", path, e))?;

    let mut archive = ::zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| DecodeError::corrupt(format!("{}: {}", path.display(), e)))?;

    fs::create_dir_all(dest).map_err(|e| DecodeError::io("Failed to create directory", dest, e))?;

    log::debug!("Extracting {} zip entries from {}", archive.len(), path.display());

    let mut result = DecodeResult::new(dest);
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| DecodeError::corrupt(format!("{} entry {}: {}", path.display(), i, e)))?;

        let rel_path = entry.enclosed_name().ok_or_else(|| {
            DecodeError::corrupt(format!(
                "{}: entry '{}' escapes the extraction root",
                path.display(),
                entry.name()
            ))
        })?;
        let out_path = dest.join(&rel_path);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| DecodeError::io("Failed to create directory", &out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DecodeError::io("Failed to create directory", parent, e))?;
        }

        let mut out_file = File::create(&out_path)
            .map_err(|e| DecodeError::io("Failed to create file", &out_path, e))?;
        io::copy(&mut entry, &mut out_file)
            .map_err(|e| DecodeError::io("Failed to inflate", &out_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                // Owner must keep read/write so the tree can be cleaned up later
                let _ = fs::set_permissions(&out_path, fs::Permissions::from_mode(mode | 0o600));
            }
        }

        result.push_file(out_path);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeErrorKind;
    use crate::test_support::zip_bytes;
    use tempfile::TempDir;

    #[test]
    fn test_expands_entries_and_reports_nested() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("update.zip");
        fs::write(
            &archive,
            zip_bytes(&[
                ("system/build.prop", b"ro.product.device=raven\n"),
                ("images/boot.img", b"ANDROID!"),
                ("AP.tar.md5", b"not inspected"),
                ("inner.zip", b"not inspected either"),
            ]),
        )
        .unwrap();

        let dest = dir.path().join("out");
        let result = decode(&BlobRef::new(&archive), &dest).unwrap();

        assert_eq!(result.files.len(), 4);
        assert!(dest.join("system/build.prop").is_file());
        assert!(dest.join("images/boot.img").is_file());
        assert_eq!(
            result.nested,
            vec![dest.join("AP.tar.md5"), dest.join("inner.zip")]
        );
        assert!(!result.delegated);
    }

    #[test]
    fn test_garbage_is_corrupt_input() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"PK\x03\x04 this is not a zip").unwrap();

        let err = decode(&BlobRef::new(&archive), &dir.path().join("out")).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::CorruptInput);
    }
}
