use super::DecodeResult;
use crate::blob::BlobRef;
use crate::error::{DecodeError, DecodeOutcome};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar_rs as tar;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];

/// Normalizes a member path so it stays inside the extraction root
fn normalize_tar_path(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(c) => out.push(c),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }

    out
}

/// Creates a hardlink, falling back to a copy where links are not supported.
fn link_or_copy(target: &Path, dest: &Path) -> std::io::Result<()> {
    if !target.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("hardlink target missing: {}", target.display()),
        ));
    }

    if dest.exists() {
        fs::remove_file(dest)?;
    }

    if let Err(e) = fs::hard_link(target, dest) {
        log::debug!(
            "hardlink failed ({}), falling back to copy: {} -> {}",
            e,
            target.display(),
            dest.display()
        );
        fs::copy(target, dest)?;
    }

    Ok(())
}

/// Resolves a relative link target against the directory of `rel_path`.
/// `None` when it climbs above the extraction root.
fn resolve_link_target(rel_path: &Path, link: &Path) -> Option<PathBuf> {
    let mut out = rel_path.parent().map(Path::to_path_buf).unwrap_or_default();

    for comp in link.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(c) => out.push(c),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }

    Some(out)
}

/// True when a directory between `dest` and `rel_path` is a symlink, so
/// writing the member would follow it.
fn crosses_symlink(dest: &Path, rel_path: &Path) -> bool {
    let mut current = dest.to_path_buf();
    let parent = match rel_path.parent() {
        Some(parent) => parent,
        None => return false,
    };

    for comp in parent.components() {
        current.push(comp);
        match fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }

    false
}

struct PendingHardlink {
    dest: PathBuf,
    rel_target: PathBuf,
}

fn open_stream(path: &Path) -> DecodeOutcome<Box<dyn Read>> {
    let mut magic = [0u8; 6];
    let mut probe = File::open(path).map_err(|e| DecodeError::io("Failed to open tar", path, e))?;
    let read = probe
        .read(&mut magic)
        .map_err(|e| DecodeError::io("Failed to read magic bytes from", path, e))?;
    let magic = &magic[..read];

    let file = BufReader::new(
        File::open(path).map_err(|e| DecodeError::io("Failed to open tar", path, e))?,
    );

    if magic.starts_with(GZIP_MAGIC) {
        Ok(Box::new(GzDecoder::new(file)))
    } else if magic.starts_with(BZIP2_MAGIC) {
        Err(DecodeError::unsupported(format!(
            "{}: bzip2-compressed tar is not supported",
            path.display()
        )))
    } else if magic.starts_with(XZ_MAGIC) {
        Err(DecodeError::unsupported(format!(
            "{}: xz-compressed tar is not supported",
            path.display()
        )))
    } else {
        Ok(Box::new(file))
    }
}

/// Expands a plain or gzip-compressed tar into `dest`.
///
/// Members are taken as a final filesystem tree, so no nested candidates are
/// reported here; the controller still looks at the produced files.
pub fn decode(blob: &BlobRef, dest: &Path) -> DecodeOutcome<DecodeResult> {
    let path = blob.path();
    let mut archive = tar::Archive::new(open_stream(path)?);

    fs::create_dir_all(dest).map_err(|e| DecodeError::io("Failed to create directory", dest, e))?;

    let mut result = DecodeResult::new(dest);
    let mut pending_hardlinks = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| DecodeError::io("Failed to read tar", path, e))?;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| DecodeError::io("Failed to read tar entry in", path, e))?;
        let entry_type = entry.header().entry_type();

        let member_path = entry
            .path()
            .map_err(|e| DecodeError::io("Invalid member path in", path, e))?;
        let rel_path = normalize_tar_path(&member_path);
        if rel_path.as_os_str().is_empty() {
            continue;
        }
        let out_path = dest.join(&rel_path);

        if crosses_symlink(dest, &rel_path) {
            log::warn!(
                "Skipping {}: a parent directory is a symlink",
                rel_path.display()
            );
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DecodeError::io("Failed to create directory", parent, e))?;
        }

        match entry_type {
            tar::EntryType::Directory => {
                fs::create_dir_all(&out_path)
                    .map_err(|e| DecodeError::io("Failed to create directory", &out_path, e))?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let mode = entry.header().mode().unwrap_or(0o755);
                    let _ = fs::set_permissions(&out_path, fs::Permissions::from_mode(mode | 0o700));
                }
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                #[cfg(unix)]
                let mode = entry.header().mode().ok();

                if let Ok(metadata) = fs::symlink_metadata(&out_path) {
                    if metadata.is_dir() && !metadata.is_symlink() {
                        fs::remove_dir_all(&out_path).ok();
                    } else {
                        fs::remove_file(&out_path).ok();
                    }
                }

                let mut out_file = File::create(&out_path)
                    .map_err(|e| DecodeError::io("Failed to create file", &out_path, e))?;
                std::io::copy(&mut entry, &mut out_file)
                    .map_err(|e| DecodeError::io("Failed to write", &out_path, e))?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Some(mode) = mode {
                        let _ = fs::set_permissions(&out_path, fs::Permissions::from_mode(mode | 0o600));
                    }
                }

                result.files.push(out_path);
            }
            tar::EntryType::Symlink => {
                let link_name = entry
                    .link_name()
                    .map_err(|e| DecodeError::io("Invalid symlink in", path, e))?
                    .ok_or_else(|| {
                        DecodeError::corrupt(format!("symlink without target: {}", rel_path.display()))
                    })?;

                // Absolute targets are re-rooted inside the extraction directory
                let target = if link_name.is_absolute() {
                    dest.join(normalize_tar_path(&link_name))
                } else if resolve_link_target(&rel_path, &link_name).is_some() {
                    link_name.to_path_buf()
                } else {
                    log::warn!(
                        "Skipping symlink {} -> {}: target leaves the extraction root",
                        rel_path.display(),
                        link_name.display()
                    );
                    continue;
                };

                #[cfg(unix)]
                {
                    let _ = fs::remove_file(&out_path);
                    if let Err(e) = std::os::unix::fs::symlink(&target, &out_path) {
                        log::warn!(
                            "Skipping symlink {} -> {}: {}",
                            out_path.display(),
                            target.display(),
                            e
                        );
                    }
                }

                #[cfg(not(unix))]
                {
                    log::warn!("Symlinks are not supported on this platform: {}", out_path.display());
                }
            }
            tar::EntryType::Link => {
                let link_name = entry
                    .link_name()
                    .map_err(|e| DecodeError::io("Invalid hardlink in", path, e))?
                    .ok_or_else(|| {
                        DecodeError::corrupt(format!("hardlink without target: {}", rel_path.display()))
                    })?;

                pending_hardlinks.push(PendingHardlink {
                    dest: out_path,
                    rel_target: normalize_tar_path(&link_name),
                });
            }
            other => {
                log::debug!("Skipping unsupported tar entry type: {:?}", other);
            }
        }
    }

    // Hardlinks last: their targets may appear later in the stream
    for hardlink in pending_hardlinks {
        let target = dest.join(&hardlink.rel_target);
        let through_symlink = crosses_symlink(dest, &hardlink.rel_target)
            || fs::symlink_metadata(&target)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
        if through_symlink {
            log::warn!(
                "Skipping hardlink {} -> {}: target is reached through a symlink",
                hardlink.dest.display(),
                target.display()
            );
            continue;
        }

        match link_or_copy(&target, &hardlink.dest) {
            Ok(()) => result.files.push(hardlink.dest),
            Err(e) => log::warn!(
                "Skipping broken hardlink {} -> {}: {}",
                hardlink.dest.display(),
                target.display(),
                e
            ),
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeErrorKind;
    use crate::test_support::{tar_bytes, tar_members, TarMember};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_tar_path() {
        assert_eq!(normalize_tar_path(Path::new("./a/b")), PathBuf::from("a/b"));
        assert_eq!(normalize_tar_path(Path::new("/etc/passwd")), PathBuf::from("etc/passwd"));
        assert_eq!(normalize_tar_path(Path::new("../../x")), PathBuf::from("x"));
        assert_eq!(normalize_tar_path(Path::new("a/../../b")), PathBuf::from("b"));
    }

    #[test]
    fn test_plain_tar() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("rom.tar");
        fs::write(
            &archive,
            tar_bytes(&[
                ("system/build.prop", b"ro.build.id=UP1A\n"),
                ("system/bin/sh", b"\x7fELF"),
            ]),
        )
        .unwrap();

        let dest = dir.path().join("out");
        let result = decode(&BlobRef::new(&archive), &dest).unwrap();

        assert!(dest.join("system/build.prop").is_file());
        assert!(dest.join("system/bin/sh").is_file());
        assert_eq!(result.files.len(), 2);
        assert!(result.nested.is_empty());
    }

    #[test]
    fn test_gzip_tar() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("rom.tar.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&tar_bytes(&[("vendor/build.prop", b"ro.vendor=1\n")]))
            .unwrap();
        fs::write(&archive, encoder.finish().unwrap()).unwrap();

        let dest = dir.path().join("out");
        decode(&BlobRef::new(&archive), &dest).unwrap();
        assert_eq!(
            fs::read_to_string(dest.join("vendor/build.prop")).unwrap(),
            "ro.vendor=1\n"
        );
    }

    #[test]
    fn test_inner_containers_are_left_to_the_controller() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("odin.tar");
        fs::write(&archive, tar_bytes(&[("BL.tar", b"x"), ("notes.txt", b"y")])).unwrap();

        let dest = dir.path().join("out");
        let result = decode(&BlobRef::new(&archive), &dest).unwrap();
        assert!(result.nested.is_empty());
        assert!(result.files.contains(&dest.join("BL.tar")));
    }

    #[test]
    fn test_resolve_link_target() {
        assert_eq!(
            resolve_link_target(Path::new("bin/sh"), Path::new("toybox")),
            Some(PathBuf::from("bin/toybox"))
        );
        assert_eq!(
            resolve_link_target(Path::new("system/lib/a.so"), Path::new("../../vendor/a.so")),
            Some(PathBuf::from("vendor/a.so"))
        );
        assert_eq!(resolve_link_target(Path::new("lib"), Path::new("../outside")), None);
        assert_eq!(resolve_link_target(Path::new("a/b"), Path::new("../../x")), None);
    }

    #[test]
    fn test_escaping_symlink_is_not_followed() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.tar");
        fs::write(
            &archive,
            tar_members(&[
                ("lib", TarMember::Symlink("../outside")),
                ("lib/pwned", TarMember::File(b"gotcha")),
            ]),
        )
        .unwrap();

        let dest = dir.path().join("out");
        let result = decode(&BlobRef::new(&archive), &dest).unwrap();

        assert!(!dir.path().join("outside").exists());
        assert!(!fs::symlink_metadata(dest.join("lib")).unwrap().file_type().is_symlink());
        assert_eq!(result.files, vec![dest.join("lib/pwned")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_member_below_symlinked_directory_is_skipped() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("rootfs.tar");
        fs::write(
            &archive,
            tar_members(&[
                ("system/lib/libc.so", TarMember::File(b"libc")),
                ("lib", TarMember::Symlink("system/lib")),
                ("lib/libevil.so", TarMember::File(b"evil")),
                ("lib/libc-link.so", TarMember::Hardlink("lib/libc.so")),
            ]),
        )
        .unwrap();

        let dest = dir.path().join("out");
        let result = decode(&BlobRef::new(&archive), &dest).unwrap();

        assert!(fs::symlink_metadata(dest.join("lib")).unwrap().file_type().is_symlink());
        assert!(!dest.join("system/lib/libevil.so").exists());
        assert!(!dest.join("system/lib/libc-link.so").exists());
        assert_eq!(result.files, vec![dest.join("system/lib/libc.so")]);
    }

    #[test]
    fn test_hardlink_is_created_after_its_target() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("rootfs.tar");
        fs::write(
            &archive,
            tar_members(&[
                ("bin/ls", TarMember::Hardlink("bin/toybox")),
                ("bin/toybox", TarMember::File(b"toybox")),
            ]),
        )
        .unwrap();

        let dest = dir.path().join("out");
        let result = decode(&BlobRef::new(&archive), &dest).unwrap();

        assert_eq!(fs::read(dest.join("bin/ls")).unwrap(), b"toybox");
        assert_eq!(result.files.len(), 2);
    }

    #[test]
    fn test_xz_tar_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("rom.tar.xz");
        fs::write(&archive, [0xfd, b'7', b'z', b'X', b'Z', 0x00, 0, 0]).unwrap();

        let err = decode(&BlobRef::new(&archive), &dir.path().join("out")).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnsupportedSubformat);
    }
}
